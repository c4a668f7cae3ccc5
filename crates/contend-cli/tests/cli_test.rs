use std::process::Command;

const CONTEND: &str = env!("CARGO_BIN_EXE_contend");

fn contend(dir: &tempfile::TempDir, args: &[&str]) -> std::process::Output {
    Command::new(CONTEND)
        .current_dir(dir.path())
        .env_remove("CONTEND_CONFIG")
        .env("RUST_LOG", "off")
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_scenario_lists_reference_workers() {
    let dir = tempfile::tempdir().unwrap();
    let output = contend(&dir, &["scenario", "--json"]);
    assert!(output.status.success());

    let workers: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let labels: Vec<_> = workers
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["label"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(labels, vec!["P1", "P2", "P3"]);
}

#[test]
fn test_clean_run_prints_banner_and_hint() {
    let dir = tempfile::tempdir().unwrap();
    let output = contend(&dir, &["run", "--db", "pets.db", "--policy", "serialize"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("STARTING UP"));
    assert!(stdout.contains("Run clean"));
    assert!(stdout.contains("--hold-ms"));

    let list = contend(&dir, &["list", "--db", "pets.db", "--json"]);
    let records: serde_json::Value = serde_json::from_slice(&list.stdout).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 6);
}

#[test]
fn test_config_file_supplies_workers() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("contend.toml"),
        r#"
database = "from-config.db"
policy = "serialize"

[[workers]]
label = "solo"
records = [{ name = "Rex", category = "Dog" }]
"#,
    )
    .unwrap();

    let output = contend(&dir, &["run", "--json"]);
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["summary"]["succeeded"], 1);
    assert_eq!(report["summary"]["outcome"], "clean");
    assert!(dir.path().join("from-config.db").exists());
}

#[test]
fn test_unopenable_store_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = contend(&dir, &["run", "--db", "missing/dir/pets.db"]);
    assert!(!output.status.success());
}
