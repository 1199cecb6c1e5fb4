use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cardsmith"))
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("cardsmith_cli_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn hist(content: &[f64]) -> serde_json::Value {
    let edges: Vec<f64> = (0..=content.len()).map(|i| i as f64).collect();
    serde_json::json!({ "bin_edges": edges, "bin_content": content })
}

fn write_store(path: &Path, entries: &[(&str, &[f64])]) {
    let histograms: serde_json::Map<String, serde_json::Value> =
        entries.iter().map(|(k, v)| (k.to_string(), hist(v))).collect();
    let doc = serde_json::json!({ "format": "cardsmith-templates/1", "histograms": histograms });
    std::fs::write(path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
}

const CONFIG: &str = r#"
analysis: XYH
channel: 4b
era: X
tag: NMSSM_XYHto4b
input: input.json
categories:
  - { id: 1, name: h_a }
  - { id: 2, name: h_b }
backgrounds: [TT]
signals: [NMSSM_]
mass_points: [MX-300, MX-400]
systematics:
  - name: lumi
    type: lnN
    value: 1.015
    scope: { era: [X] }
standard_bin_names: false
"#;

fn fixture(dir: &Path) -> PathBuf {
    let mut entries: Vec<(String, Vec<f64>)> = Vec::new();
    for bin in ["h_a", "h_b"] {
        entries.push((format!("{bin}/data_obs"), vec![10.0, 6.0]));
        entries.push((format!("{bin}/TT"), vec![9.0, 5.0]));
        entries.push((format!("{bin}/NMSSM_MX-300"), vec![0.5, 1.0]));
        entries.push((format!("{bin}/NMSSM_MX-400"), vec![0.25, 0.75]));
    }
    let borrowed: Vec<(&str, &[f64])> = entries.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
    write_store(&dir.join("input.json"), &borrowed);
    let config = dir.join("cards.yaml");
    std::fs::write(&config, CONFIG).unwrap();
    config
}

#[test]
fn cards_writes_datacards_stores_and_manifest() {
    let dir = tmp_dir("cards");
    let config = fixture(&dir);
    let out_dir = dir.join("out");

    let out = run(&[
        "cards",
        "--config",
        config.to_str().unwrap(),
        "--out-dir",
        out_dir.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "cards failed: stderr={}", String::from_utf8_lossy(&out.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).expect("summary JSON");
    assert_eq!(summary["datacards"].as_array().unwrap().len(), 4);
    assert_eq!(summary["stores"].as_array().unwrap().len(), 2);
    assert!(summary["failed"].as_array().unwrap().is_empty());

    for name in ["h_a_MX-300.txt", "h_a_MX-400.txt", "h_b_MX-300.txt", "h_b_MX-400.txt"] {
        let text = std::fs::read_to_string(out_dir.join(name)).unwrap();
        assert!(text.lines().any(|l| l.starts_with("lumi") && l.split_whitespace().skip(2).all(|c| c == "1.015")));
    }
    assert!(out_dir.join("NMSSM_XYHto4b_MX-300.input.json").exists());
    let manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out_dir.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest["artifacts"].as_array().unwrap().len(), 6);

    let card = out_dir.join("h_b_MX-400.txt");
    let out = run(&["validate", "--datacard", card.to_str().unwrap()]);
    assert!(out.status.success(), "validate failed: stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["keys_checked"].as_u64(), Some(3));
    assert!(v["problems"].as_array().unwrap().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn validate_reports_missing_keys() {
    let dir = tmp_dir("validate_bad");
    let config = fixture(&dir);
    let out_dir = dir.join("out");
    let out = run(&["cards", "-c", config.to_str().unwrap(), "--out-dir", out_dir.to_str().unwrap()]);
    assert!(out.status.success());

    let empty = dir.join("empty.json");
    write_store(&empty, &[("h_a/data_obs", &[10.0, 6.0])]);
    let card = out_dir.join("h_a_MX-300.txt");
    let out = run(&["validate", "--datacard", card.to_str().unwrap(), "--store", empty.to_str().unwrap()]);
    assert!(!out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["problems"].as_array().unwrap().len(), 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn duplicate_category_id_fails_without_output() {
    let dir = tmp_dir("dup_id");
    let config = fixture(&dir);
    let text = std::fs::read_to_string(&config).unwrap().replace("{ id: 2, name: h_b }", "{ id: 1, name: h_b }");
    std::fs::write(&config, text).unwrap();
    let out_dir = dir.join("out");

    let out = run(&["cards", "--config", config.to_str().unwrap(), "--out-dir", out_dir.to_str().unwrap()]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("configuration error"), "stderr={stderr}");
    assert!(!out_dir.exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn stat_unc_csv_and_json() {
    let dir = tmp_dir("stat_unc");
    let store = dir.join("s.json");
    write_store(&store, &[("h_a/TT", &[4.0, 0.0, 16.0])]);

    let out = run(&["stat-unc", "--store", store.to_str().unwrap(), "--key", "h_a/TT"]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let text = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec!["bin_center,uncertainty", "0.5,0.5", "1.5,0.0", "2.5,0.25"]);

    let json_out = dir.join("unc.json");
    let out = run(&[
        "stat-unc",
        "--store",
        store.to_str().unwrap(),
        "--key",
        "h_a/TT",
        "--format",
        "json",
        "-o",
        json_out.to_str().unwrap(),
    ]);
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&std::fs::read(&json_out).unwrap()).unwrap();
    assert_eq!(v["bins"].as_array().unwrap().len(), 3);

    let out = run(&["stat-unc", "--store", store.to_str().unwrap(), "--key", "nope"]);
    assert!(!out.status.success());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn assemble_builds_input_store() {
    let dir = tmp_dir("assemble");
    let samples = dir.join("samples");
    std::fs::create_dir_all(&samples).unwrap();
    write_store(&samples.join("Histogram_NMSSM_MX-300.json"), &[("h_a", &[1.0]), ("h_b", &[2.0])]);
    write_store(&samples.join("Output_TT.json"), &[("h_a", &[3.0]), ("h_b", &[4.0])]);
    write_store(&samples.join("Output_JetMET.json"), &[("h_a", &[5.0])]);
    let spec = dir.join("assemble.yaml");
    std::fs::write(
        &spec,
        "input_dir: samples\ncategories: [h_a, h_b]\nsignals: [NMSSM_MX-300]\nbackgrounds: [TT, QCD]\ndata: JetMET\n",
    )
    .unwrap();
    let output = dir.join("input.json");

    let out = run(&["assemble", "--config", spec.to_str().unwrap(), "--output", output.to_str().unwrap()]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["inserted"].as_u64(), Some(5));
    assert_eq!(v["skipped"].as_array().unwrap().len(), 2);

    let store: serde_json::Value = serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
    let keys: Vec<&String> = store["histograms"].as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["h_a/NMSSM_MX-300", "h_a/TT", "h_a/data_obs", "h_b/NMSSM_MX-300", "h_b/TT"]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_crate_version() {
    let out = run(&["version"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("cardsmith "));
}
