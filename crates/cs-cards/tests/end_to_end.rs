use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use approx::assert_relative_eq;
use cs_cards::config::{CardConfig, ScopeConfig, SystematicConfig, ValueConfig};
use cs_cards::datacard::{Datacard, validate};
use cs_cards::manifest::{ArtifactKind, MANIFEST_FILE, Manifest};
use cs_cards::{Category, pipeline};
use cs_core::Error;
use cs_store::{Histogram, TemplateStore};

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("cs_cards_e2e_{}_{}_{}", std::process::id(), nanos, name));
    p
}

fn hist(content: &[f64]) -> Arc<Histogram> {
    Arc::new(Histogram::uniform(0.0, content.len() as f64, content.to_vec()).unwrap())
}

fn config() -> CardConfig {
    CardConfig {
        analysis: "XYH".into(),
        channel: "4b".into(),
        era: "X".into(),
        tag: "NMSSM_XYHto4b".into(),
        input: None,
        categories: vec![Category::new(1, "h_a"), Category::new(2, "h_b")],
        backgrounds: vec!["TT".into()],
        signals: vec!["NMSSM_".into()],
        mass_points: vec!["MX-300".into(), "MX-400".into()],
        systematics: vec![SystematicConfig {
            name: "lumi".into(),
            kind: "lnN".into(),
            value: Some(ValueConfig::Number(1.015)),
            scope: ScopeConfig { era: Some(vec!["X".into()]), ..Default::default() },
            up_suffix: None,
            down_suffix: None,
        }],
        shapes: Default::default(),
        bin_by_bin: None,
        standard_bin_names: false,
    }
}

fn input() -> TemplateStore {
    let mut s = TemplateStore::new();
    for bin in ["h_a", "h_b"] {
        s.insert(format!("{bin}/data_obs"), hist(&[10.0, 6.0, 2.0])).unwrap();
        s.insert(format!("{bin}/TT"), hist(&[9.0, 5.0, 2.5])).unwrap();
        s.insert(format!("{bin}/NMSSM_MX-300"), hist(&[0.5, 1.0, 0.5])).unwrap();
        s.insert(format!("{bin}/NMSSM_MX-400"), hist(&[0.25, 0.75, 1.0])).unwrap();
    }
    s
}

#[test]
fn two_bins_two_masses_give_four_cards() {
    let out = tmp_dir("four_cards");
    let store = input();
    let summary = pipeline::run(&config(), &store, &out).unwrap();

    assert!(summary.failed.is_empty());
    assert_eq!(summary.datacards.len(), 4);
    assert_eq!(summary.stores.len(), 2);
    assert_eq!(summary.extraction.observations_bound, 2);
    assert_eq!(summary.extraction.processes_bound, 6);

    for bin in ["h_a", "h_b"] {
        for mass in ["MX-300", "MX-400"] {
            let text = std::fs::read_to_string(out.join(format!("{bin}_{mass}.txt"))).unwrap();
            let card = Datacard::parse(&text).unwrap();
            assert_eq!(card.columns.len(), 2);
            assert_eq!(card.systematics.len(), 1);
            assert_eq!(card.systematics[0].name, "lumi");
            assert_eq!(card.systematics[0].cells, vec![Some("1.015".to_string()); 2]);

            let written = TemplateStore::open(out.join(format!("NMSSM_XYHto4b_{mass}.input.json"))).unwrap();
            let report = validate(&card, &written);
            assert!(report.is_ok(), "{:?}", report.problems);
            assert_eq!(report.keys_checked, 3);

            let sig = &card.columns[0];
            assert_eq!(sig.process, "NMSSM_");
            let nominal = written.get(&format!("{bin}/NMSSM_{mass}")).unwrap();
            assert_relative_eq!(sig.rate, nominal.integral());
        }
    }

    let manifest: Manifest =
        serde_json::from_slice(&std::fs::read(out.join(MANIFEST_FILE)).unwrap()).unwrap();
    assert_eq!(manifest.artifacts.iter().filter(|a| a.kind == ArtifactKind::Datacard).count(), 4);
    assert_eq!(manifest.artifacts.iter().filter(|a| a.kind == ArtifactKind::Store).count(), 2);
    let _ = std::fs::remove_dir_all(&out);
}

#[test]
fn signal_pattern_outside_data_layout_keeps_observations() {
    let out = tmp_dir("signal_subdir");
    let mut cfg = config();
    cfg.shapes.signal.nominal = "$BIN/sig/$PROCESS$MASS".into();
    cfg.shapes.signal.systematic = "$BIN/sig/$PROCESS$MASS_$SYSTEMATIC".into();

    let mut store = TemplateStore::new();
    for bin in ["h_a", "h_b"] {
        store.insert(format!("{bin}/data_obs"), hist(&[10.0, 6.0, 2.0])).unwrap();
        store.insert(format!("{bin}/TT"), hist(&[9.0, 5.0, 2.5])).unwrap();
        store.insert(format!("{bin}/sig/NMSSM_MX-300"), hist(&[0.5, 1.0, 0.5])).unwrap();
        store.insert(format!("{bin}/sig/NMSSM_MX-400"), hist(&[0.25, 0.75, 1.0])).unwrap();
    }

    let summary = pipeline::run(&cfg, &store, &out).unwrap();
    assert!(summary.failed.is_empty(), "{:?}", summary.failed);
    assert!(summary.extraction.missing.is_empty());
    assert_eq!(summary.extraction.observations_bound, 2);
    assert_eq!(summary.datacards.len(), 4);
    let _ = std::fs::remove_dir_all(&out);
}

#[test]
fn canonical_names_and_bin_by_bin() {
    let out = tmp_dir("canonical");
    let mut cfg = config();
    cfg.standard_bin_names = true;
    cfg.bin_by_bin = Some(cs_cards::config::BinByBinConfig {
        add_threshold: 0.1,
        fix_norm: true,
        pattern: None,
    });
    let summary = pipeline::run(&cfg, &input(), &out).unwrap();
    assert_eq!(summary.renamed_bins, 2);
    // TT relative errors 1/3, 0.447, 0.632: every bin qualifies in both categories
    assert_eq!(summary.bin_by_bin.as_ref().unwrap().created.len(), 6);

    let text = std::fs::read_to_string(out.join("XYH_4b_1_X_MX-300.txt")).unwrap();
    let card = Datacard::parse(&text).unwrap();
    assert_eq!(card.bins, vec!["XYH_4b_1_X"]);
    let names: Vec<&str> = card.systematics.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "lumi",
            "CMS_XYH_4b_h_a_X_TT_bin_1",
            "CMS_XYH_4b_h_a_X_TT_bin_2",
            "CMS_XYH_4b_h_a_X_TT_bin_3"
        ]
    );
    let store = TemplateStore::open(out.join("NMSSM_XYHto4b_MX-300.input.json")).unwrap();
    assert!(validate(&card, &store).is_ok());
    let up = store.get("XYH_4b_1_X/TT_CMS_XYH_4b_h_a_X_TT_bin_1Up").unwrap();
    assert_relative_eq!(up.integral(), 16.5, epsilon = 1e-9);
    let _ = std::fs::remove_dir_all(&out);
}

#[test]
fn duplicate_category_id_fails_before_io() {
    let out = tmp_dir("dup_id");
    let mut cfg = config();
    cfg.categories.push(Category::new(1, "h_c"));
    let err = pipeline::run(&cfg, &input(), &out).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(!out.exists());
}

#[test]
fn missing_signal_mass_fails_alone() {
    let out = tmp_dir("missing_mass");
    let full = input();
    let mut store = TemplateStore::new();
    for key in full.keys().filter(|k| !k.ends_with("MX-400")) {
        store.insert(key, full.get(key).unwrap()).unwrap();
    }
    let summary = pipeline::run(&config(), &store, &out).unwrap();
    // the signal template is missing, so the MX-400 cards carry the background only
    assert!(summary.failed.is_empty());
    assert_eq!(summary.extraction.missing.len(), 2);
    let text = std::fs::read_to_string(out.join("h_a_MX-400.txt")).unwrap();
    let card = Datacard::parse(&text).unwrap();
    assert_eq!(card.columns.len(), 1);
    assert_eq!(card.columns[0].process, "TT");
    let _ = std::fs::remove_dir_all(&out);
}
