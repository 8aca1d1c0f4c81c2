use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

const CONFIG: &str = r#"
modules:
  - name: categorize
    runtime: { type: local, plugin: value_category }
routes:
  - name: orders
    request: { modules: [categorize] }
    response: { modules: [categorize], policy: fail_closed }
"#;

fn config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

fn interpose() -> Command {
    let mut cmd = Command::cargo_bin("interpose").unwrap();
    cmd.env_remove("INTERPOSE_CONFIG").env("RUST_LOG", "off");
    cmd
}

// --- validate ---

#[test]
fn validate_prints_summary() {
    let cfg = config(CONFIG);
    interpose()
        .args(["validate", "--config"])
        .arg(cfg.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\": true"))
        .stdout(predicate::str::contains("categorize"));
}

#[test]
fn validate_reports_every_problem() {
    let cfg = config(
        r#"
modules:
  - name: ""
    runtime: { type: local, plugin: value_category }
routes:
  - name: orders
    request: { modules: [ghost] }
"#,
    );
    interpose()
        .args(["validate", "--config"])
        .arg(cfg.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("modules[0].name is required"))
        .stderr(predicate::str::contains("unknown module \"ghost\""));
}

#[test]
fn validate_rejects_unknown_plugin() {
    let cfg = config("modules:\n  - name: m\n    runtime: { type: local, plugin: nope }\n");
    interpose()
        .args(["validate", "--config"])
        .arg(cfg.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown plugin"));
}

// --- test ---

#[test]
fn test_runs_value_category() {
    let cfg = config(CONFIG);
    let out = interpose()
        .args(["test", "--route", "orders", "--leg", "request", "--config"])
        .arg(cfg.path())
        .args([
            "--input",
            r#"{"payload":{"amount":199.99},"headers":{},"direction":"request"}"#,
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["outcome"]["status"], "done");
    assert_eq!(
        report["outcome"]["envelope"]["payload"]["value_category"],
        "medium"
    );
    assert_eq!(report["outcome"]["log"][0]["outcome"], "transformed");
    assert_eq!(report["metrics"]["chains"]["orders/request"]["dispatches"], 1);
}

#[test]
fn aborted_chain_exits_with_two() {
    let cfg = config(CONFIG);
    let out = interpose()
        .args(["test", "--route", "orders", "--leg", "response", "--input", "[1]", "--config"])
        .arg(cfg.path())
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["outcome"]["status"], "aborted");
    assert_eq!(report["outcome"]["reason"]["kind"], "module_error");
}

#[test]
fn input_can_come_from_a_file() {
    let cfg = config(CONFIG);
    let input = config(r#"{"amount": 20}"#);
    let out = interpose()
        .args(["test", "--route", "orders", "--config"])
        .arg(cfg.path())
        .arg("--input")
        .arg(format!("@{}", input.path().display()))
        .args(["-H", "X-Tenant=acme"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let envelope = &report["outcome"]["envelope"];
    assert_eq!(envelope["payload"]["value_category"], "low");
    assert_eq!(envelope["headers"]["X-Tenant"], "acme");
}
