use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use cs_core::Error;
use cs_store::{Histogram, OutputStore, TemplateStore};

use super::*;
use crate::registry::{Category, Registry, Scope, Selection, SystKind};
use crate::shapes::extract_shapes;

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("cs_cards_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn hist(content: &[f64]) -> Arc<Histogram> {
    Arc::new(Histogram::uniform(0.0, content.len() as f64, content.to_vec()).unwrap())
}

fn input_store() -> TemplateStore {
    let mut s = TemplateStore::new();
    for bin in ["cat_a", "cat_b"] {
        s.insert(format!("{bin}/data_obs"), hist(&[5.0, 3.0])).unwrap();
        s.insert(format!("{bin}/TT"), hist(&[4.0, 2.0])).unwrap();
        s.insert(format!("{bin}/TT_jesUp"), hist(&[4.5, 2.5])).unwrap();
        s.insert(format!("{bin}/TT_jesDown"), hist(&[3.5, 1.5])).unwrap();
        s.insert(format!("{bin}/QCD"), hist(&[1.0, 0.5])).unwrap();
        for m in ["300", "400"] {
            s.insert(format!("{bin}/sig_{m}"), hist(&[0.25, 0.5])).unwrap();
        }
    }
    s
}

fn bound_registry() -> Registry {
    let cats = [Category::new(0, "cat_a"), Category::new(1, "cat_b")];
    let mut r = Registry::new();
    r.add_observations(&["XYH"], &["4b"], &["X"], &["*"], &cats).unwrap();
    r.add_processes(&["TT", "QCD"], &["XYH"], &["4b"], &["X"], &["*"], &cats, false).unwrap();
    r.add_processes(&["sig_"], &["XYH"], &["4b"], &["X"], &["300", "400"], &cats, true).unwrap();
    r.add_systematic("lumi", SystKind::lnn(1.015), Scope::all().eras(["X"])).unwrap();
    r.add_systematic("qcd_norm", SystKind::lnn_asym(0.9, 1.2), Scope::all().processes(["QCD"])).unwrap();
    r.add_systematic("jes", SystKind::shape(1.0), Scope::all().processes(["TT"])).unwrap();
    r.add_systematic("unused", SystKind::lnn(1.1), Scope::all().processes(["nothing"])).unwrap();
    let s = input_store();
    extract_shapes(&mut r, &Selection::all().backgrounds(), &s, "$BIN/$PROCESS", "$BIN/$PROCESS_$SYSTEMATIC")
        .unwrap();
    extract_shapes(&mut r, &Selection::all().signals(), &s, "$BIN/$PROCESS$MASS", "$BIN/$PROCESS$MASS_$SYSTEMATIC")
        .unwrap();
    r
}

#[test]
fn rendered_card_layout() {
    let r = bound_registry();
    let sel = Selection::all().bin(["cat_a"]).mass("300");
    let text = render_datacard(r.view(&sel), "out_300.input.json").unwrap();
    let card = Datacard::parse(&text).unwrap();

    assert_eq!(card.imax, Some(1));
    assert_eq!(card.jmax, Some(2));
    assert_eq!(card.kmax, Some(3));
    assert_eq!(card.bins, vec!["cat_a"]);
    assert_eq!(card.observations, vec![8.0]);
    let procs: Vec<(&str, i32, f64)> =
        card.columns.iter().map(|c| (c.process.as_str(), c.index, c.rate)).collect();
    assert_eq!(procs, vec![("sig_", 0, 0.75), ("TT", 1, 6.0), ("QCD", 2, 1.5)]);

    let rows: Vec<(&str, &str)> =
        card.systematics.iter().map(|s| (s.name.as_str(), s.kind.as_str())).collect();
    assert_eq!(rows, vec![("lumi", "lnN"), ("qcd_norm", "lnN"), ("jes", "shape")]);
    assert_eq!(card.systematics[0].cells, vec![Some("1.015".to_string()); 3]);
    assert_eq!(card.systematics[1].cells, vec![None, None, Some("0.9/1.2".to_string())]);
    assert_eq!(card.systematics[2].cells, vec![None, Some("1".to_string()), None]);

    let sig_line = card.shapes_for("sig_", "cat_a").unwrap();
    assert_eq!(sig_line.nominal, "cat_a/sig_300");
    assert_eq!(card.shapes_for("TT", "cat_a").unwrap().nominal, OUTPUT_NOMINAL);
    assert_eq!(card.shape_files(), vec!["out_300.input.json"]);
}

#[test]
fn view_must_be_single_bin_and_mass() {
    let r = bound_registry();
    for sel in [Selection::all().mass("300"), Selection::all().bin(["cat_a"]), Selection::all()] {
        let err = render_datacard(r.view(&sel), "x.json").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}

#[test]
fn mass_independent_card_has_backgrounds_only() {
    let r = bound_registry();
    let sel = Selection::all().bin(["cat_b"]).mass("*");
    let card = Datacard::parse(&render_datacard(r.view(&sel), "bkg.json").unwrap()).unwrap();
    assert!(card.columns.iter().all(|c| c.index > 0));
    assert_eq!(card.columns.len(), 2);
}

#[test]
fn written_card_round_trips_through_store() {
    let dir = tmp_dir("roundtrip");
    let r = bound_registry();
    let mut out = OutputStore::create(dir.join("XYH_300.input.json")).unwrap();
    for bin in ["cat_a", "cat_b"] {
        let sel = Selection::all().bin([bin]).mass("300");
        let summary = write_datacard(r.view(&sel), dir.join(format!("{bin}_300.txt")), &mut out).unwrap();
        assert!(!summary.counting);
        // data_obs + 3 nominal + jes up/down on TT
        assert_eq!(summary.keys_written, 6);
    }
    let store_path = out.finish().unwrap();
    let store = TemplateStore::open(&store_path).unwrap();
    assert!(store.contains("cat_a/sig_300"));
    assert!(store.contains("cat_b/TT_jesDown"));

    for bin in ["cat_a", "cat_b"] {
        let text = std::fs::read_to_string(dir.join(format!("{bin}_300.txt"))).unwrap();
        let card = Datacard::parse(&text).unwrap();
        let report = validate(&card, &store);
        assert!(report.is_ok(), "{:?}", report.problems);
        // data_obs, 3 nominal, 2 jes variations
        assert_eq!(report.keys_checked, 6);
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn rewriting_the_same_card_is_allowed() {
    let dir = tmp_dir("rewrite");
    let r = bound_registry();
    let mut out = OutputStore::create(dir.join("s.input.json")).unwrap();
    let sel = Selection::all().bin(["cat_a"]).mass("300");
    write_datacard(r.view(&sel), dir.join("a.txt"), &mut out).unwrap();
    let again = write_datacard(r.view(&sel), dir.join("a.txt"), &mut out).unwrap();
    assert_eq!(again.keys_written, 0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn colliding_output_key_aborts_before_text() {
    let dir = tmp_dir("collide");
    let cats = [Category::new(0, "cat_a")];
    let mut r = Registry::new();
    r.add_observations(&["A"], &["c"], &["X"], &["*"], &cats).unwrap();
    r.add_processes(&["sig_300"], &["A"], &["c"], &["X"], &["*"], &cats, false).unwrap();
    r.add_processes(&["sig_"], &["A"], &["c"], &["X"], &["300"], &cats, true).unwrap();
    extract_shapes(&mut r, &Selection::all(), &input_store(), "$BIN/$PROCESS$MASS", "$BIN/$PROCESS$MASS_$SYSTEMATIC")
        .unwrap();

    let mut out = OutputStore::create(dir.join("s.input.json")).unwrap();
    let sel = Selection::all().bin(["cat_a"]).mass("300");
    let err = write_datacard(r.view(&sel), dir.join("a.txt"), &mut out).unwrap_err();
    match err {
        Error::DuplicateKey { key, bin, mass, .. } => {
            assert_eq!(key, "cat_a/sig_300");
            assert_eq!(bin, "cat_a");
            assert_eq!(mass, "300");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!dir.join("a.txt").exists());
    assert!(out.store().is_empty());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_records_are_excluded() {
    let cats = [Category::new(0, "cat_a")];
    let mut r = Registry::new();
    r.add_observations(&["A"], &["c"], &["X"], &["*"], &cats).unwrap();
    r.add_processes(&["TT", "WJ"], &["A"], &["c"], &["X"], &["*"], &cats, false).unwrap();
    extract_shapes(&mut r, &Selection::all(), &input_store(), "$BIN/$PROCESS", "$BIN/$PROCESS_$SYSTEMATIC")
        .unwrap();
    let dir = tmp_dir("excluded");
    let mut out = OutputStore::create(dir.join("s.input.json")).unwrap();
    let sel = Selection::all().bin(["cat_a"]).mass("*");
    let summary = write_datacard(r.view(&sel), dir.join("a.txt"), &mut out).unwrap();
    assert_eq!(summary.processes, vec!["TT"]);
    assert_eq!(summary.excluded, vec!["cat_a/WJ"]);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_observation_is_fatal_for_the_card() {
    let cats = [Category::new(0, "cat_z")];
    let mut r = Registry::new();
    r.add_observations(&["A"], &["c"], &["X"], &["*"], &cats).unwrap();
    r.add_processes(&["TT"], &["A"], &["c"], &["X"], &["*"], &cats, false).unwrap();
    extract_shapes(&mut r, &Selection::all(), &input_store(), "$BIN/$PROCESS", "$BIN/$PROCESS_$SYSTEMATIC")
        .unwrap();
    let sel = Selection::all().bin(["cat_z"]).mass("*");
    let err = render_datacard(r.view(&sel), "s.json").unwrap_err();
    assert!(matches!(err, Error::MissingTemplate { ref key, .. } if key == "cat_z/data_obs"));
}

#[test]
fn counting_cards_and_mixed_mode() {
    let cats = [Category::new(0, "sr")];
    let mut r = Registry::new();
    r.add_observations(&["A"], &["c"], &["X"], &["*"], &cats).unwrap();
    r.add_processes(&["TT"], &["A"], &["c"], &["X"], &["*"], &cats, false).unwrap();
    r.add_processes(&["sig_"], &["A"], &["c"], &["X"], &["300"], &cats, true).unwrap();
    r.set_rate(&Selection::all().backgrounds(), 10.0);
    r.set_rate(&Selection::all().signals(), 2.5);

    let sel = Selection::all().bin(["sr"]).mass("300");
    let text = render_datacard(r.view(&sel), "unused.json").unwrap();
    let card = Datacard::parse(&text).unwrap();
    assert!(card.shapes.is_empty());
    assert_eq!(card.columns.iter().map(|c| c.rate).collect::<Vec<_>>(), vec![2.5, 10.0]);
    assert!(card.referenced_keys().is_empty());

    let mut s = TemplateStore::new();
    s.insert("sr/TT", hist(&[1.0])).unwrap();
    extract_shapes(&mut r, &Selection::all().backgrounds(), &s, "$BIN/$PROCESS", "$BIN/$PROCESS_$SYSTEMATIC")
        .unwrap();
    let err = render_datacard(r.view(&sel), "unused.json").unwrap_err();
    // data_obs went missing; TT bound, signal unbound
    assert!(matches!(err, Error::MissingTemplate { .. }));
}

#[test]
fn parse_rejects_malformed_cards() {
    assert!(matches!(Datacard::parse("imax x\n"), Err(Error::Datacard(_))));
    let no_rate = "imax 1\njmax 0\nkmax 0\nbin a\nobservation 1\nbin a\nprocess TT\nprocess 1\n";
    assert!(Datacard::parse(no_rate).is_err());
    let ragged = "bin a\nobservation 1\nbin a a\nprocess TT QCD\nprocess 1 2\nrate 1\n";
    assert!(Datacard::parse(ragged).is_err());
    let extras = "bin a\nobservation 1\nbin a\nprocess TT\nprocess 1\nrate 1\nlumi lnN 1.02\n* autoMCStats 0\n";
    let card = Datacard::parse(extras).unwrap();
    assert_eq!(card.systematics.len(), 1);
    assert_eq!(card.extra, vec!["* autoMCStats 0"]);
}
