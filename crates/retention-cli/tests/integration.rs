#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn rmctl(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rmctl").unwrap();
    cmd.current_dir(dir.path())
        .env("RMCTL_ROOT", dir.path())
        .env("RMCTL_USER", "admin")
        .env_remove("RMCTL_AT");
    cmd
}

fn rmctl_at(dir: &TempDir, at: &str) -> Command {
    let mut cmd = rmctl(dir);
    cmd.env("RMCTL_AT", at);
    cmd
}

fn json_of(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.arg("--json").output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap()
}

fn init_project(dir: &TempDir) {
    rmctl(dir)
        .args(["init", "--name", "Corporate"])
        .assert()
        .success();
}

/// A "Legal" category: cutoff when the case closes, destroy five years later.
fn legal_schedule(dir: &TempDir) {
    let at = "2024-01-02T09:00:00Z";
    rmctl_at(dir, at)
        .args(["category", "create", "Legal"])
        .assert()
        .success();
    rmctl_at(dir, at)
        .args(["schedule", "create", "Legal", "--authority", "GRS 1.1"])
        .assert()
        .success();
    rmctl_at(dir, at)
        .args(["schedule", "add-step", "Legal", "cutoff", "--event", "case_closed"])
        .assert()
        .success();
    rmctl_at(dir, at)
        .args([
            "schedule",
            "add-step",
            "Legal",
            "destroy",
            "--period",
            "year|5",
            "--period-property",
            "rma:dispositionAsOf",
        ])
        .assert()
        .success();
    rmctl_at(dir, at)
        .args(["folder", "create", "Legal", "Case 42"])
        .assert()
        .success();
    rmctl_at(dir, at)
        .args(["record", "file", "Legal/Case 42", "statement.pdf", "--originator", "jdoe"])
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// rmctl init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_store() {
    let dir = TempDir::new().unwrap();
    rmctl(&dir)
        .args(["init", "--name", "Corporate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created: file plan 'Corporate'"));

    assert!(dir.path().join(".retention/config.yaml").exists());
    assert!(dir.path().join(".retention/store.yaml").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    rmctl(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  file plan 'Corporate'"));
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    rmctl(&dir)
        .args(["category", "create", "Legal"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rmctl init"));
}

// ---------------------------------------------------------------------------
// File plan structure
// ---------------------------------------------------------------------------

#[test]
fn filed_record_is_listed_and_shown() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);

    rmctl(&dir)
        .args(["node", "list", "Legal/Case 42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("statement.pdf"));

    let node = json_of(rmctl(&dir).args(["node", "show", "Legal/Case 42/statement.pdf"]));
    assert_eq!(node["kind"], "record");
    assert_eq!(node["path"], "Legal/Case 42/statement.pdf");
    assert_eq!(node["properties"]["rma:originator"]["value"], "jdoe");
    assert_eq!(node["properties"]["rma:dateFiled"]["value"], "2024-01-02T09:00:00Z");
}

#[test]
fn duplicate_names_are_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    rmctl(&dir)
        .args(["category", "create", "Finance"])
        .assert()
        .success();
    rmctl(&dir)
        .args(["category", "create", "Finance"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn unknown_node_is_reported() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    rmctl(&dir)
        .args(["node", "show", "Nowhere/Nothing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("node 'Nowhere/Nothing' not found"));
}

// ---------------------------------------------------------------------------
// Disposition lifecycle
// ---------------------------------------------------------------------------

#[test]
fn case_closure_to_destruction() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);
    let folder = "Legal/Case 42";

    let next = json_of(rmctl(&dir).args(["disposition", "next", folder]));
    assert_eq!(next["action"]["name"], "cutoff");
    assert_eq!(next["eligible"], false);

    let fired = json_of(
        rmctl_at(&dir, "2024-03-01T10:00:00Z").args(["disposition", "fire", folder, "case_closed"]),
    );
    assert_eq!(fired["as_of"], "2024-03-01T10:00:00Z");

    rmctl_at(&dir, "2024-03-01T10:00:00Z")
        .args(["disposition", "execute", folder])
        .assert()
        .success()
        .stdout(predicate::str::contains("Executed cutoff"));

    let next = json_of(rmctl(&dir).args(["disposition", "next", folder]));
    assert_eq!(next["action"]["name"], "destroy");
    assert_eq!(next["action"]["as_of"], "2029-03-01T10:00:00Z");

    let early = json_of(rmctl_at(&dir, "2029-02-28T10:00:00Z").args(["disposition", "execute", folder]));
    assert_eq!(early["outcome"], "not_eligible");

    let due = "2029-03-01T10:00:00Z";
    rmctl_at(&dir, due)
        .args(["hold", "create", "Litigation", "--reason", "pending lawsuit"])
        .assert()
        .success();
    rmctl_at(&dir, due)
        .args(["hold", "add", "Litigation", folder])
        .assert()
        .success();
    let held = json_of(rmctl_at(&dir, due).args(["disposition", "execute", folder]));
    assert_eq!(held["outcome"], "frozen");

    rmctl_at(&dir, due)
        .args(["hold", "remove", "Litigation", folder])
        .assert()
        .success();
    let done = json_of(rmctl_at(&dir, due).args(["disposition", "execute", folder]));
    assert_eq!(done["outcome"], "executed");
    assert_eq!(done["completed"]["name"], "destroy");
    assert!(done["next"].is_null());

    let history = json_of(rmctl(&dir).args(["disposition", "history", folder]));
    let steps: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    assert_eq!(steps, vec!["cutoff", "destroy"]);
}

#[test]
fn undo_withdraws_event_date() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);
    let folder = "Legal/Case 42";

    rmctl_at(&dir, "2024-03-01T10:00:00Z")
        .args(["disposition", "fire", folder, "case_closed"])
        .assert()
        .success();
    let undone = json_of(rmctl(&dir).args(["disposition", "undo", folder, "case_closed"]));
    assert!(undone["as_of"].is_null());
    assert_eq!(undone["events"][0]["complete"], false);
}

#[test]
fn schedule_show_lists_steps_in_order() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);

    let schedule = json_of(rmctl(&dir).args(["schedule", "show", "Legal/Case 42"]));
    assert_eq!(schedule["authority"], "GRS 1.1");
    assert_eq!(schedule["definitions"][0]["name"], "cutoff");
    assert_eq!(schedule["definitions"][1]["name"], "destroy");
}

#[test]
fn updated_step_moves_pending_date() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);
    let folder = "Legal/Case 42";
    let closed = "2024-03-01T10:00:00Z";

    rmctl_at(&dir, closed)
        .args(["disposition", "fire", folder, "case_closed"])
        .assert()
        .success();
    rmctl_at(&dir, closed)
        .args(["disposition", "execute", folder])
        .assert()
        .success();

    let schedule = json_of(rmctl(&dir).args(["schedule", "show", "Legal"]));
    let destroy = schedule["definitions"][1]["id"].as_str().unwrap().to_string();
    let updated = json_of(rmctl(&dir).args([
        "schedule",
        "update-step",
        "Legal",
        &destroy,
        "destroy",
        "--period",
        "year|3",
        "--period-property",
        "rma:dispositionAsOf",
    ]));
    assert_eq!(updated["index"], 1);

    let next = json_of(rmctl(&dir).args(["disposition", "next", folder]));
    assert_eq!(next["action"]["name"], "destroy");
    assert_eq!(next["action"]["as_of"], "2027-03-01T10:00:00Z");

    rmctl(&dir)
        .args(["schedule", "update-step", "Legal", &destroy, "shred", "--period", "year|1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown disposition step 'shred'"));
}

#[test]
fn manual_cutoff_ahead_of_event() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);
    let folder = "Legal/Case 42";

    let cut = json_of(rmctl_at(&dir, "2024-05-15T00:00:00Z").args(["disposition", "cutoff", folder]));
    assert_eq!(cut["cut_off"], true);
    assert_eq!(cut["next"]["name"], "destroy");
    assert_eq!(cut["next"]["as_of"], "2029-05-15T00:00:00Z");

    let next = json_of(rmctl(&dir).args(["disposition", "next", folder]));
    assert_eq!(next["cut_off"], true);

    rmctl(&dir)
        .args(["disposition", "cutoff", folder])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already cut off"));
    rmctl(&dir)
        .env("RMCTL_USER", "clerk")
        .args(["disposition", "cutoff", "Legal/Case 42/statement.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ApproveRecordsScheduledForCutoff"));
}

#[test]
fn held_record_blocks_folder_execution() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);
    let folder = "Legal/Case 42";
    let closed = "2024-03-01T10:00:00Z";

    rmctl(&dir)
        .args(["hold", "create", "Subpoena", "--reason", "subpoena 7"])
        .assert()
        .success();
    rmctl(&dir)
        .args(["hold", "add", "Subpoena", "Legal/Case 42/statement.pdf"])
        .assert()
        .success();
    rmctl_at(&dir, closed)
        .args(["disposition", "fire", folder, "case_closed"])
        .assert()
        .success();

    let held = json_of(rmctl_at(&dir, closed).args(["disposition", "execute", folder]));
    assert_eq!(held["outcome"], "frozen");
    let record = json_of(rmctl(&dir).args(["node", "show", "Legal/Case 42/statement.pdf"]));
    assert!(record["properties"].get("rma:cutOffDate").is_none());
}

// ---------------------------------------------------------------------------
// Holds
// ---------------------------------------------------------------------------

#[test]
fn hold_lifecycle() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);

    rmctl(&dir)
        .args(["hold", "create", "Audit", "--reason", "annual audit"])
        .assert()
        .success();
    rmctl(&dir)
        .args(["hold", "add", "Audit", "Legal/Case 42/statement.pdf"])
        .assert()
        .success();

    let holds = json_of(rmctl(&dir).args(["hold", "list", "--item", "Legal/Case 42/statement.pdf"]));
    assert_eq!(holds[0]["name"], "Audit");
    assert_eq!(holds[0]["reason"], "annual audit");

    rmctl(&dir)
        .args(["hold", "delete", "Audit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("released 1 item(s)"));
    let holds = json_of(rmctl(&dir).args(["hold", "list"]));
    assert!(holds.as_array().unwrap().is_empty());
}

#[test]
fn hold_reason_and_excluded_holds() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);
    let folder = "Legal/Case 42";

    for (name, reason) in [("Audit", "annual audit"), ("Lawsuit", "claim 42")] {
        rmctl(&dir)
            .args(["hold", "create", name, "--reason", reason])
            .assert()
            .success();
    }
    rmctl(&dir)
        .args(["hold", "add", "Audit", folder])
        .assert()
        .success();

    rmctl(&dir)
        .args(["hold", "reason", "Lawsuit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("claim 42"));
    let changed = json_of(rmctl(&dir).args(["hold", "reason", "Lawsuit", "--set", "claim 43"]));
    assert_eq!(changed["reason"], "claim 43");
    rmctl(&dir)
        .args(["hold", "reason", "Lawsuit", "--set", " "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("needs a reason"));

    let covering = json_of(rmctl(&dir).args(["hold", "list", "--item", folder]));
    assert_eq!(covering.as_array().unwrap().len(), 1);
    assert_eq!(covering[0]["name"], "Audit");
    let others = json_of(rmctl(&dir).args(["hold", "list", "--item", folder, "--excluded"]));
    assert_eq!(others.as_array().unwrap().len(), 1);
    assert_eq!(others[0]["name"], "Lawsuit");
    assert_eq!(others[0]["reason"], "claim 43");
}

#[test]
fn filing_into_held_folder_marks_record_frozen() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);

    rmctl(&dir)
        .args(["hold", "create", "Audit", "--reason", "annual audit"])
        .assert()
        .success();
    rmctl(&dir)
        .args(["hold", "add", "Audit", "Legal/Case 42"])
        .assert()
        .success();
    rmctl(&dir)
        .args(["record", "file", "Legal/Case 42", "later.pdf"])
        .assert()
        .success();

    let later = json_of(rmctl(&dir).args(["node", "show", "Legal/Case 42/later.pdf"]));
    let aspects: Vec<&str> = later["aspects"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a.as_str().unwrap())
        .collect();
    assert!(aspects.contains(&"rma:frozen"));
    assert_eq!(later["properties"]["rma:frozenBy"]["value"], "admin");
}

#[test]
fn system_user_name_carries_no_privilege() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    rmctl(&dir)
        .env("RMCTL_USER", "System")
        .args(["hold", "create", "Audit", "--reason", "annual audit"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("capability 'CreateHold'"));
}

#[test]
fn hold_commands_need_capabilities() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    rmctl(&dir)
        .env("RMCTL_USER", "clerk")
        .args(["hold", "create", "Audit", "--reason", "annual audit"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("capability 'CreateHold'"));
}

// ---------------------------------------------------------------------------
// Model security
// ---------------------------------------------------------------------------

#[test]
fn protected_property_edit_is_denied_without_capability() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);
    let record = "Legal/Case 42/statement.pdf";

    rmctl(&dir)
        .env("RMCTL_USER", "clerk")
        .args(["prop", "set", record, "rma:dateFiled=2020-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("protected property 'rma:dateFiled'"));

    let check = json_of(
        rmctl(&dir)
            .env("RMCTL_USER", "clerk")
            .args(["security", "check", record, "rma:dateFiled"]),
    );
    assert_eq!(check["protected"], true);
    assert_eq!(check["allowed"], false);

    rmctl(&dir)
        .args(["prop", "set", record, "rma:dateFiled=2020-01-01"])
        .assert()
        .success();
}

#[test]
fn unprotected_property_edits_freely() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);
    let record = "Legal/Case 42/statement.pdf";

    rmctl(&dir)
        .env("RMCTL_USER", "clerk")
        .args(["prop", "set", record, "cm:description=Witness statement"])
        .assert()
        .success();
    rmctl(&dir)
        .env("RMCTL_USER", "clerk")
        .args(["prop", "clear", record, "cm:description"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared cm:description"));
}

// ---------------------------------------------------------------------------
// Vital records
// ---------------------------------------------------------------------------

#[test]
fn vital_definition_flows_to_new_records() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let at = "2024-01-02T09:00:00Z";
    rmctl_at(&dir, at)
        .args(["category", "create", "Contracts"])
        .assert()
        .success();
    rmctl_at(&dir, at)
        .args(["vital", "set", "Contracts", "month|6"])
        .assert()
        .success();
    rmctl_at(&dir, at)
        .args(["category", "create", "Leases", "--parent", "Contracts"])
        .assert()
        .success();
    rmctl_at(&dir, at)
        .args(["folder", "create", "Contracts/Leases", "Building A"])
        .assert()
        .success();
    rmctl_at(&dir, at)
        .args(["record", "file", "Contracts/Leases/Building A", "lease.pdf"])
        .assert()
        .success();

    let vital = json_of(rmctl(&dir).args(["vital", "show", "Contracts/Leases/Building A/lease.pdf"]));
    assert_eq!(vital["vital"], true);
    assert_eq!(vital["review_as_of"], "2024-07-02T09:00:00Z");

    let reviewed = json_of(
        rmctl_at(&dir, "2024-07-01T12:00:00Z")
            .args(["vital", "review", "Contracts/Leases/Building A/lease.pdf"]),
    );
    assert_eq!(reviewed["review_as_of"], "2025-01-01T12:00:00Z");
}

// ---------------------------------------------------------------------------
// Events and config
// ---------------------------------------------------------------------------

#[test]
fn events_persist_in_config() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    rmctl(&dir)
        .args(["event", "add", "audit_complete", "--label", "Audit Complete"])
        .assert()
        .success();

    let events = json_of(rmctl(&dir).args(["event", "list"]));
    assert!(events
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["name"] == "audit_complete" && e["type"] == "rmEventType.simple"));

    rmctl(&dir)
        .args(["event", "remove", "audit_complete"])
        .assert()
        .success();
    rmctl(&dir)
        .args(["event", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("audit_complete").not());
}

#[test]
fn event_in_use_cannot_be_removed() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    legal_schedule(&dir);
    rmctl(&dir)
        .args(["event", "remove", "case_closed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("referenced by a retention schedule"));
}

#[test]
fn config_validate_accepts_defaults() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    rmctl(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(
        dir.path().join(".retention/config.yaml"),
        "version: 1\nfile_plan:\n  name: ''\n",
    )
    .unwrap();
    rmctl(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("config validation found errors"));
}
