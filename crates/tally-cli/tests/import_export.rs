use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn tally(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tally"))
        .env_remove("TALLY_LOG")
        .arg("--home")
        .arg(home)
        .arg("--json")
        .args(args)
        .output()
        .expect("run tally")
}

fn json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("json")
}

fn seed(home: &Path) {
    assert!(tally(home, &["create", "2", "--label", "Archived goal"]).status.success());
    assert!(tally(home, &["archive"]).status.success());
    assert!(tally(home, &["create", "5", "--label", "Live goal"]).status.success());
    assert!(tally(home, &["inc"]).status.success());
}

#[test]
fn export_then_import_into_fresh_home() {
    let source = TempDir::new().expect("source");
    seed(source.path());
    let file = source.path().join("backup.json");

    let exported = tally(
        source.path(),
        &["export", "--out", file.to_str().expect("utf8 path")],
    );
    assert!(exported.status.success());
    let exported = json(&exported);
    assert_eq!(exported["contentType"], "application/json");

    let document: Value =
        serde_json::from_str(&std::fs::read_to_string(&file).expect("read")).expect("json");
    assert_eq!(document["version"], 1);
    assert_eq!(document["activeTracker"]["label"], "Live goal");
    assert_eq!(document["history"][0]["label"], "Archived goal");

    let target = TempDir::new().expect("target");
    let imported = tally(target.path(), &["import", file.to_str().expect("utf8 path")]);
    assert!(imported.status.success());
    let imported = json(&imported);
    assert_eq!(imported["historyCount"], 1);
    assert_eq!(imported["hasActiveTracker"], true);

    let shown = json(&tally(target.path(), &["show"]));
    assert_eq!(shown["activeTracker"], document["activeTracker"]);
    let history = json(&tally(target.path(), &["history"]));
    assert_eq!(history["history"], document["history"]);
}

#[test]
fn export_defaults_to_dated_file_in_export_dir() {
    let home = TempDir::new().expect("home");
    let exports = home.path().join("exports");
    std::fs::write(
        home.path().join("config.toml"),
        format!("export_dir = {:?}\n", exports.to_str().expect("utf8 path")),
    )
    .expect("config");
    seed(home.path());

    let exported = json(&tally(home.path(), &["export"]));
    let path = exported["path"].as_str().expect("path");
    let name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .expect("file name");
    assert!(name.starts_with("tally-backup-"), "{name}");
    assert!(name.ends_with(".json"), "{name}");
    assert!(Path::new(path).starts_with(&exports));
    assert!(Path::new(path).is_file());
}

#[test]
fn rejected_imports_leave_state_untouched() {
    let home = TempDir::new().expect("home");
    seed(home.path());
    let before_show = json(&tally(home.path(), &["show"]));
    let before_history = json(&tally(home.path(), &["history"]));

    let cases = [
        ("garbage.json", "this is not json"),
        ("zero.json", r#"{"version":0,"activeTracker":null,"history":[]}"#),
        ("empty.json", r#"{"version":1}"#),
    ];
    for (name, body) in cases {
        let file = home.path().join(name);
        std::fs::write(&file, body).expect("write");
        let output = tally(home.path(), &["import", file.to_str().expect("utf8 path")]);
        assert!(!output.status.success(), "{name} should be rejected");
        let result = json(&output);
        assert_eq!(result["ok"], false);
        assert_eq!(result["error"], "That file is not a valid tally export.");
    }

    let missing = tally(
        home.path(),
        &["import", home.path().join("absent.json").to_str().expect("utf8 path")],
    );
    assert!(!missing.status.success());
    assert_eq!(json(&missing)["error"], "That file is not a valid tally export.");
    let stderr = String::from_utf8_lossy(&missing.stderr);
    assert!(stderr.contains("could not read import file"), "{stderr}");

    assert_eq!(json(&tally(home.path(), &["show"])), before_show);
    assert_eq!(json(&tally(home.path(), &["history"])), before_history);
}

#[test]
fn export_to_stdout() {
    let home = TempDir::new().expect("home");
    seed(home.path());
    let output = tally(home.path(), &["export", "--out", "-"]);
    assert!(output.status.success());
    let document = json(&output);
    assert_eq!(document["version"], 1);
    assert_eq!(document["history"].as_array().map(Vec::len), Some(1));
}
