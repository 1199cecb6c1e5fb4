//! # cs-store
//!
//! Keyed histogram template stores for cardsmith.
//!
//! A store maps `/`-separated keys to binned templates. Input stores are
//! opened read-only; output stores are append-only and never overwrite a key.
//!
//! ## Example
//!
//! ```no_run
//! use cs_store::TemplateStore;
//!
//! let s = TemplateStore::open("shapes.json").unwrap();
//! for key in s.keys() {
//!     println!("{key}");
//! }
//! let h = s.get("cat1/TT").unwrap();
//! println!("bins: {}, integral: {}", h.n_bins(), h.integral());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod histogram;
pub mod store;

pub use error::{Result, StoreError};
pub use histogram::Histogram;
pub use store::{OutputStore, PendingEntry, STORE_FORMAT, TemplateStore};
