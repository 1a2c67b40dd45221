mod common;

use std::fs;

use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use serde_json::Value;

use common::{TestWorkspace, student_csv};

fn bin() -> Command {
    Command::cargo_bin("csv-insights").expect("binary exists")
}

#[test]
fn columns_lists_semantic_resolution() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("students.csv", &student_csv(20));
    bin()
        .args(["columns", "-i", csv.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("semantic").and(contains("Cumulative GPA")))
        .stdout(contains("Scholarship Amount"));
}

#[test]
fn discover_prints_a_table_and_json() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("students.csv", &student_csv(200));
    bin()
        .args(["discover", "-i", csv.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("category").and(contains("anomalies")));

    let output = bin()
        .args(["discover", "-i", csv.to_str().unwrap(), "--json"])
        .output()
        .expect("run discover");
    assert!(output.status.success());
    let discoveries: Value = serde_json::from_slice(&output.stdout).expect("json");
    let items = discoveries.as_array().expect("array");
    assert!(items.iter().any(|d| d["key"] == "zero_gpa"));
}

#[test]
fn offline_analyze_writes_a_complete_report() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("students.csv", &student_csv(300));
    let report_path = workspace.path().join("report.json");
    bin()
        .args([
            "analyze",
            "-i",
            csv.to_str().unwrap(),
            "--offline",
            "--context",
            "financial",
            "-o",
            report_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let text = fs::read_to_string(&report_path).expect("read report");
    let report: Value = serde_json::from_str(&text).expect("json");
    assert_eq!(report["context"], "financial");
    assert_eq!(report["findings"].as_array().unwrap().len(), 3);
    assert_eq!(report["recommendations"].as_array().unwrap().len(), 3);
    let visualizations = report["visualizations"].as_array().unwrap();
    assert!(!visualizations.is_empty() && visualizations.len() <= 6);
    assert!(visualizations.iter().all(|v| v["insight"].is_string()));
    let journeys = report["journeys"].as_array().unwrap();
    assert!(journeys.len() >= 5 && journeys.len() <= 15);
    assert_eq!(report["journey_origin"], "fallback");
    assert!(report.get("narratives").is_none());
}

#[test]
fn offline_analyze_can_narrate_journeys() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("students.csv", &student_csv(120));
    let output = bin()
        .args(["analyze", "-i", csv.to_str().unwrap(), "--offline", "--narratives", "2"])
        .output()
        .expect("run analyze");
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("json");
    let narratives = report["narratives"].as_array().expect("narratives");
    assert_eq!(narratives.len(), 2);
    for narrative in narratives {
        let sections = narrative["sections"].as_array().unwrap();
        assert_eq!(sections.len(), 6);
        assert_eq!(sections[0]["component"], "business_context");
        assert_eq!(sections[5]["component"], "action_plan");
        assert!(sections.iter().all(|s| s["source"] == "fallback"));
    }
}

#[test]
fn header_only_input_is_rejected() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("empty.csv", "gpa,nationality\n");
    bin()
        .args(["analyze", "-i", csv.to_str().unwrap(), "--offline"])
        .assert()
        .failure()
        .stderr(contains("error:").and(contains("empty")));
}

#[test]
fn invalid_config_reports_its_path() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("students.csv", &student_csv(10));
    let config = workspace.write("insights.yml", "gateway: [not, a, map]\n");
    bin()
        .args([
            "analyze",
            "-i",
            csv.to_str().unwrap(),
            "--offline",
            "-c",
            config.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("insights.yml"));
}

#[test]
fn tier_marks_tunnelled_endpoints_remote() {
    bin()
        .args(["tier", "--endpoint", "https://abc123.ngrok.io"])
        .assert()
        .success()
        .stdout(contains("remote").and(contains("true")))
        .stdout(contains("num_thread"));
}
