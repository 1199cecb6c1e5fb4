//! Canonical bin names.

use std::collections::{HashMap, HashSet};

use cs_core::{Error, Result};

use crate::registry::Registry;

/// Canonical name of a category: `{analysis}_{channel}_{bin_id}_{era}`.
pub fn standard_bin_name(analysis: &str, channel: &str, bin_id: u32, era: &str) -> String {
    format!("{}_{}_{}_{}", analysis, channel, bin_id, era)
}

fn collision(name: &str, bin_id: u32) -> Error {
    Error::Configuration(format!(
        "canonical bin name '{}' (bin_id={}) collides with another category",
        name, bin_id
    ))
}

/// Rename every category to its canonical name.
///
/// Fields come from the category's observation; categories without one keep
/// their name. Records and systematic scope bin matchers follow the rename,
/// bin ids and systematic names are untouched. Returns the number of renamed
/// categories, so a second call returns 0.
pub fn standardize_bin_names(registry: &mut Registry) -> Result<usize> {
    let mut renames: HashMap<String, String> = HashMap::new();
    let mut targets: HashSet<String> = HashSet::new();
    for cat in registry.categories() {
        let Some(obs) = registry.observations().iter().find(|o| o.bin_id == cat.id) else {
            log::debug!("category {} ('{}') has no observation, name kept", cat.id, cat.name);
            if !targets.insert(cat.name.clone()) {
                return Err(collision(&cat.name, cat.id));
            }
            continue;
        };
        let name = standard_bin_name(&obs.analysis, &obs.channel, cat.id, &obs.era);
        if !targets.insert(name.clone()) {
            return Err(collision(&name, cat.id));
        }
        if name != cat.name {
            renames.insert(cat.name.clone(), name);
        }
    }

    if !renames.is_empty() {
        registry.rename_bins(&renames);
    }
    log::info!("standardized {} bin names", renames.len());
    Ok(renames.len())
}
