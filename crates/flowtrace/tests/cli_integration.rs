//! CLI integration tests.
//!
//! Argument parsing is checked without a server; the end-to-end tests run
//! the binary against a mock n8n API.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[allow(deprecated)]
fn flowtrace() -> Command {
    Command::cargo_bin("flowtrace").unwrap()
}

/// A command isolated from the user's config, keyring and environment.
fn isolated(dir: &TempDir) -> Command {
    let mut cmd = flowtrace();
    cmd.current_dir(dir.path())
        .env("FLOWTRACE_CONFIG_DIR", dir.path())
        .env_remove("N8N_BASE_URL")
        .env_remove("N8N_API_KEY")
        .env_remove("N8N_API_TOKEN");
    cmd
}

fn against(server: &MockServer, dir: &TempDir) -> Command {
    let mut cmd = isolated(dir);
    cmd.env("N8N_API_KEY", "test-key").args(["--server", &server.uri()]);
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help() {
    flowtrace()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("n8n workflow execution forensics"));
}

#[test]
fn test_version() {
    flowtrace()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("flowtrace"));
}

#[test]
fn test_help_lists_subcommands() {
    let assert = flowtrace().arg("--help").assert().success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    for sub in [
        "trace-error",
        "inspect-code",
        "follow-chain",
        "analyze",
        "exec-node",
        "exec-errors",
        "exec-delete",
        "status",
    ] {
        assert!(output.contains(sub), "missing subcommand {sub}");
    }
}

#[test]
fn test_no_subcommand_fails() {
    flowtrace().assert().failure();
}

#[test]
fn test_unknown_subcommand_fails() {
    flowtrace().arg("replay").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Global Flags
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_global_flags_accepted() {
    flowtrace()
        .args(["--json", "--verbose", "--server", "http://localhost:9999", "--help"])
        .assert()
        .success();
}

#[test]
fn test_global_flags_after_subcommand() {
    flowtrace()
        .args(["status", "--json", "--help"])
        .assert()
        .success();
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommand Arguments
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_trace_error_help() {
    flowtrace()
        .args(["trace-error", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--context"));
}

#[test]
fn test_follow_chain_help() {
    flowtrace()
        .args(["follow-chain", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--max-depth"))
        .stdout(predicate::str::contains("--concurrency"));
}

#[test]
fn test_exec_errors_help() {
    flowtrace()
        .args(["exec-errors", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--include-manual"))
        .stdout(predicate::str::contains("--hours"));
}

#[test]
fn test_trace_error_requires_execution_id() {
    flowtrace().arg("trace-error").assert().failure();
}

#[test]
fn test_exec_node_requires_node() {
    flowtrace().args(["exec-node", "42"]).assert().failure();
}

#[test]
fn test_exec_node_rejects_bad_run_index() {
    flowtrace()
        .args(["exec-node", "42", "Transform", "--run", "first"])
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_server_url_fails() {
    let dir = TempDir::new().unwrap();
    isolated(&dir)
        .env("N8N_API_KEY", "test-key")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no server URL configured"));
}

#[test]
fn test_missing_api_key_fails() {
    let dir = TempDir::new().unwrap();
    isolated(&dir)
        .args(["--server", "http://127.0.0.1:9", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key not found"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Against a Mock Server
// ─────────────────────────────────────────────────────────────────────────────

fn failed_child_execution() -> Value {
    json!({
        "id": "E1",
        "workflowId": "W1",
        "mode": "integrated",
        "status": "error",
        "workflowData": {
            "id": "W1",
            "name": "Child",
            "nodes": [
                { "id": "n1", "name": "Start",
                  "type": "n8n-nodes-base.executeWorkflowTrigger", "parameters": {} },
                { "id": "n2", "name": "Transform", "type": "n8n-nodes-base.code",
                  "parameters": { "jsCode": "const out = [];\nreturn out;" } }
            ],
            "connections": {
                "Start": { "main": [[{ "node": "Transform", "type": "main", "index": 0 }]] }
            }
        },
        "data": { "resultData": { "runData": {
            "Start": [{
                "source": [],
                "metadata": { "parentExecution": { "executionId": "P1", "workflowId": "W0" } },
                "data": { "main": [[{ "json": { "id": 7 } }]] }
            }],
            "Transform": [{
                "source": [{ "previousNode": "Start" }],
                "error": { "message": "Cannot read properties of undefined" }
            }]
        } } }
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_trace_error_json_reports_failure_and_parent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/executions/E1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(failed_child_execution()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "W0", "name": "Parent", "active": true },
                { "id": "W1", "name": "Child", "active": true }
            ],
            "nextCursor": null
        })))
        .mount(&server)
        .await;

    let assert = against(&server, &dir)
        .args(["--json", "trace-error", "E1"])
        .assert()
        .success();

    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(out["failedNode"], "Transform");
    assert_eq!(out["origin"], "integrated");
    assert_eq!(out["parent"]["executionId"], "P1");
    assert_eq!(out["parent"]["workflowName"], "Parent");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_trace_error_text_output() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/executions/E1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(failed_child_execution()))
        .mount(&server)
        .await;

    against(&server, &dir)
        .args(["trace-error", "E1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Transform"))
        .stdout(predicate::str::contains("Cannot read properties of undefined"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unsupported_endpoint_reports_setup_required() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // Nothing mounted: every route is a bare 404.
    let assert = against(&server, &dir)
        .args(["--json", "trace-error", "E1"])
        .assert()
        .success();

    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(out["status"], "setup_required");
    assert!(!out["remediation"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_execution_fails() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/executions/404404"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })),
        )
        .mount(&server)
        .await;

    against(&server, &dir)
        .args(["trace-error", "404404"])
        .assert()
        .failure();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exec_node_unknown_node_lists_alternatives() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/executions/E1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(failed_child_execution()))
        .mount(&server)
        .await;

    let assert = against(&server, &dir)
        .args(["--json", "exec-node", "E1", "Nonexistent"])
        .assert()
        .success();

    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(out["status"], "not_found");
    let available = out["available"].as_array().unwrap();
    assert!(available.iter().any(|n| n == "Transform"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_counts_workflows() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/workflows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "W0", "name": "Parent", "active": true },
                { "id": "W1", "name": "Child", "active": false }
            ],
            "nextCursor": null
        })))
        .mount(&server)
        .await;

    let assert = against(&server, &dir)
        .args(["--json", "status"])
        .assert()
        .success();

    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(out["connected"], true);
    assert_eq!(out["workflowCount"], 2);
    assert_eq!(out["activeCount"], 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_project_config_supplies_server_url() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("flowtrace.toml"),
        format!("[remote]\nbase_url = \"{}\"\n", server.uri()),
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/workflows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [], "nextCursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    isolated(&dir)
        .env("N8N_API_KEY", "test-key")
        .args(["--json", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"workflowCount\": 0"));
}

fn workflow_json(id: &str, name: &str, nodes: Value, connections: Value) -> Value {
    json!({
        "id": id,
        "name": name,
        "active": true,
        "nodes": nodes,
        "connections": connections,
        "settings": { "executionOrder": "v1" }
    })
}

async fn mount_workflow(server: &MockServer, workflow: Value) {
    let id = workflow["id"].as_str().unwrap().to_string();
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/workflows/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(workflow))
        .mount(server)
        .await;
}

fn invoker(name: &str, target: &str) -> Value {
    json!({
        "id": name,
        "name": name,
        "type": "n8n-nodes-base.executeWorkflow",
        "parameters": { "workflowId": { "__rl": true, "value": target, "mode": "list" } }
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_analyze_json_reports_half_wired_branch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_workflow(
        &server,
        workflow_json(
            "W2",
            "Half",
            json!([
                { "id": "n1", "name": "Start", "type": "n8n-nodes-base.manualTrigger", "parameters": {} },
                { "id": "n2", "name": "Gate", "type": "n8n-nodes-base.if", "parameters": {} },
                { "id": "n3", "name": "Yes", "type": "n8n-nodes-base.noOp", "parameters": {} }
            ]),
            json!({
                "Start": { "main": [[{ "node": "Gate", "type": "main", "index": 0 }]] },
                "Gate": { "main": [[{ "node": "Yes", "type": "main", "index": 0 }]] }
            }),
        ),
    )
    .await;

    let assert = against(&server, &dir)
        .args(["--json", "analyze", "W2"])
        .assert()
        .success();

    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(out["workflowId"], "W2");
    assert_eq!(out["integrityScore"], 97);
    let branches = out["branchIssues"].as_array().unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0]["node"], "Gate");
    assert_eq!(branches[0]["type"], "missing-false-path");
    assert!(out["deadEnds"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_follow_chain_json_marks_cycle() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let trigger = json!({
        "id": "t", "name": "Start",
        "type": "n8n-nodes-base.executeWorkflowTrigger", "parameters": {}
    });
    let call = |target: &str| {
        json!({ "Start": { "main": [[{ "node": format!("Call {}", target), "type": "main", "index": 0 }]] } })
    };
    mount_workflow(
        &server,
        workflow_json("W1", "Outer", json!([trigger.clone(), invoker("Call W2", "W2")]), call("W2")),
    )
    .await;
    mount_workflow(
        &server,
        workflow_json("W2", "Inner", json!([trigger, invoker("Call W1", "W1")]), call("W1")),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "W1", "name": "Outer", "active": true },
                { "id": "W2", "name": "Inner", "active": true }
            ],
            "nextCursor": null
        })))
        .mount(&server)
        .await;

    let assert = against(&server, &dir)
        .args(["--json", "follow-chain", "W1"])
        .assert()
        .success();

    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(out["workflowId"], "W1");
    assert_eq!(out["cycle"], false);
    let inner = &out["children"][0];
    assert_eq!(inner["workflowId"], "W2");
    assert_eq!(inner["calledViaNodeName"], "Call W2");
    let back = &inner["children"][0];
    assert_eq!(back["workflowId"], "W1");
    assert_eq!(back["cycle"], true);
    assert!(back["children"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inspect_code_unknown_filter_lists_scripts() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_workflow(
        &server,
        workflow_json(
            "W3",
            "Scripts",
            json!([
                { "id": "n1", "name": "Start", "type": "n8n-nodes-base.manualTrigger", "parameters": {} },
                { "id": "n2", "name": "Transform", "type": "n8n-nodes-base.code",
                  "parameters": { "jsCode": "return items;" } }
            ]),
            json!({
                "Start": { "main": [[{ "node": "Transform", "type": "main", "index": 0 }]] }
            }),
        ),
    )
    .await;

    against(&server, &dir)
        .args(["inspect-code", "W3", "normalize"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not found"))
        .stdout(predicate::str::contains("normalize"))
        .stdout(predicate::str::contains("Transform"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inspect_code_json_omits_code_when_asked() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_workflow(
        &server,
        workflow_json(
            "W3",
            "Scripts",
            json!([
                { "id": "n2", "name": "Transform", "type": "n8n-nodes-base.code",
                  "parameters": { "jsCode": "return items;" } }
            ]),
            json!({}),
        ),
    )
    .await;

    let assert = against(&server, &dir)
        .args(["--json", "inspect-code", "W3", "--no-code"])
        .assert()
        .success();
    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(out[0]["node"], "Transform");
    assert!(out[0].get("code").is_none());

    let assert = against(&server, &dir)
        .args(["--json", "inspect-code", "W3"])
        .assert()
        .success();
    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(out[0]["code"], "return items;");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exec_errors_filters_manual_and_old_runs() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let recent = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
    let old = (chrono::Utc::now() - chrono::Duration::hours(72)).to_rfc3339();
    Mock::given(method("GET"))
        .and(path("/api/v1/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "30", "workflowId": "W1", "status": "error", "mode": "trigger",
                  "startedAt": recent },
                { "id": "29", "workflowId": "W1", "status": "error", "mode": "manual",
                  "startedAt": recent },
                { "id": "12", "workflowId": "W1", "status": "error", "mode": "trigger",
                  "startedAt": old }
            ],
            "nextCursor": null
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "W1", "name": "Intake", "active": true }],
            "nextCursor": null
        })))
        .mount(&server)
        .await;

    let assert = against(&server, &dir)
        .args(["--json", "exec-errors", "W1", "--hours", "24"])
        .assert()
        .success();
    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(out["fetched"], 3);
    assert_eq!(out["excludedManual"], 1);
    let rows = out["executions"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["executionId"], "30");
    assert_eq!(rows[0]["workflowName"], "Intake");

    let assert = against(&server, &dir)
        .args(["--json", "exec-errors", "W1", "--include-manual"])
        .assert()
        .success();
    let out: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(out["excludedManual"], 0);
    assert_eq!(out["executions"].as_array().unwrap().len(), 3);
}

#[test]
fn test_exec_errors_rejects_non_positive_hours() {
    flowtrace()
        .args(["exec-errors", "--hours", "-5"])
        .assert()
        .failure();
    flowtrace()
        .args(["exec-errors", "--hours", "0"])
        .assert()
        .failure();
}
