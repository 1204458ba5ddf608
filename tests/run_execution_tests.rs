//! End-to-end run execution: real dispatcher, real worker processes, real
//! ledger files on disk.
//!
//! Every scenario uses its own test name so the process-table scans of
//! concurrently running scenarios never see each other's workers.

mod common;

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

struct RunSpace {
    root: tempfile::TempDir,
    defs: PathBuf,
    logs: PathBuf,
    backups: PathBuf,
}

fn run_space() -> RunSpace {
    let root = tempfile::tempdir().unwrap();
    let defs = root.path().join("definitions");
    let logs = root.path().join("logs");
    let backups = root.path().join("backups");
    fs::create_dir_all(&defs).unwrap();
    fs::create_dir_all(&logs).unwrap();
    fs::create_dir_all(&backups).unwrap();
    RunSpace {
        root,
        defs,
        logs,
        backups,
    }
}

impl RunSpace {
    fn envs(&self) -> Vec<(&str, &str)> {
        vec![
            ("PTO_DEFINITIONS_DIR", self.defs.to_str().unwrap()),
            ("PTO_LOGS_DIR", self.logs.to_str().unwrap()),
            ("PTO_BACKUPS_DIR", self.backups.to_str().unwrap()),
            ("PTO_LOCK_ACQUIRE_TIMEOUT_SECS", "5"),
            ("PTO_LOCK_POLL_INTERVAL_MS", "5"),
        ]
    }

    fn write_definition(&self, name: &str, body: &str) {
        fs::write(self.defs.join(format!("{name}.toml")), body).expect("write definition fixture");
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.logs.join(run_id)
    }
}

fn read_ledger(run_dir: &Path, run_id: &str) -> Value {
    let path = run_dir.join(format!("{run_id}.json"));
    let raw = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("read ledger {}: {e}", path.display()));
    serde_json::from_str(&raw).expect("ledger is valid JSON")
}

fn entries_of<'a>(ledger: &'a Value, test: &str) -> &'a Vec<Value> {
    ledger["test_execution"][test]
        .as_array()
        .unwrap_or_else(|| panic!("no ledger entries for test [ {test} ]"))
}

#[test]
fn sequential_run_seals_a_validatable_ledger() {
    let space = run_space();
    space.write_definition(
        "seq_smoke",
        r#"
        type = "test"
        name = "seq_smoke"
        descp = "two quick cases back to back"

        [test_cases.1]
        name = "sleep_then_pass"
        descp = "short nap"
        mode = "normal"
        args = "duration=0.2"

        [test_cases.2]
        name = "emit_marker"
        descp = "drops its marker"
        mode = "normal"
        "#,
    );

    let result = common::run_cli_case_env(
        "sequential_run_seals_a_validatable_ledger",
        &["run-test", "seq_smoke", "--run-id", "seq_smoke_run"],
        &space.envs(),
    );
    assert_eq!(
        result.status.code(),
        Some(0),
        "run failed; log: {}",
        result.log_path.display()
    );
    assert!(
        result
            .stdout
            .contains("Execution finished!: TEST ID [ seq_smoke_run ] ends without error(s)"),
        "missing success banner; log: {}",
        result.log_path.display()
    );

    let run_dir = space.run_dir("seq_smoke_run");
    assert!(run_dir.join("seq_smoke_run.log").is_file());
    assert!(run_dir.join("seq_smoke_sleep_then_pass_1.log").is_file());
    assert!(run_dir.join("seq_smoke_emit_marker_1.log").is_file());
    assert!(run_dir.join("emit_marker_1.marker").is_file());

    let ledger = read_ledger(&run_dir, "seq_smoke_run");
    assert!(ledger["start_date"].is_string());
    assert!(ledger["end_date"].is_string());
    assert_eq!(ledger["mode"], "automation");
    assert_eq!(ledger["exit_status"], 0);
    assert_eq!(ledger["exit_msg"], "Exit without error (0)");
    assert_eq!(ledger["sha256sum"].as_str().map(str::len), Some(64));
    assert!(ledger.get("profile").is_none());

    let entries = entries_of(&ledger, "seq_smoke");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["order_exec"], 1);
    assert_eq!(entries[0]["method"], "sleep_then_pass");
    assert_eq!(entries[0]["parameters"], "duration=0.2");
    assert_eq!(entries[0]["method_mode"], "normal");
    assert_eq!(entries[0]["concurrency_inst"], 1);
    assert_eq!(entries[0]["exit_status"], 0);
    assert_eq!(entries[0]["exit_msg"], "Exit without error (0)");
    assert_eq!(entries[1]["order_exec"], 2);
    assert_eq!(entries[1]["method"], "emit_marker");
    assert_eq!(entries[1]["parameters"], "");
    // The timestamp format orders lexicographically, so back-to-back
    // execution is a plain string comparison.
    assert!(
        entries[1]["start_date"].as_str().unwrap() >= entries[0]["end_date"].as_str().unwrap(),
        "second case started before the first ended"
    );

    let run_dir_arg = run_dir.to_str().unwrap().to_string();
    let verdict = common::run_cli_case("validate_a_sealed_run", &["validate", &run_dir_arg]);
    assert_eq!(
        verdict.status.code(),
        Some(0),
        "sealed run should validate; log: {}",
        verdict.log_path.display()
    );
    assert!(
        verdict.stdout.contains("is Valid") && verdict.stdout.contains("[ OK ]"),
        "missing valid verdict; log: {}",
        verdict.log_path.display()
    );

    let archived = common::run_cli_case_env(
        "backup_a_sealed_run",
        &["backup", &run_dir_arg],
        &space.envs(),
    );
    assert_eq!(
        archived.status.code(),
        Some(0),
        "backup failed; log: {}",
        archived.log_path.display()
    );
    assert!(
        archived.stdout.contains("Backup generated"),
        "missing archive notice; log: {}",
        archived.log_path.display()
    );
    assert!(space.backups.join("seq_smoke_run.tar").is_file());

    let again = common::run_cli_case_env(
        "backup_never_overwrites",
        &["backup", &run_dir_arg],
        &space.envs(),
    );
    assert_eq!(
        again.status.code(),
        Some(1),
        "second backup must refuse; log: {}",
        again.log_path.display()
    );
    assert!(
        again.stdout.contains("already exist"),
        "missing refusal notice; log: {}",
        again.log_path.display()
    );

    // A single appended line to any covered file flips the verdict.
    let mut tampered = fs::read(run_dir.join("seq_smoke_emit_marker_1.log")).unwrap();
    tampered.extend_from_slice(b"tampered\n");
    fs::write(run_dir.join("seq_smoke_emit_marker_1.log"), tampered).unwrap();
    let verdict = common::run_cli_case("validate_a_tampered_run", &["validate", &run_dir_arg]);
    assert_eq!(
        verdict.status.code(),
        Some(1),
        "tampered run should not validate; log: {}",
        verdict.log_path.display()
    );
    assert!(
        verdict.stdout.contains("was manipulated"),
        "missing tamper verdict; log: {}",
        verdict.log_path.display()
    );
}

#[test]
fn parallel_run_records_every_instance() {
    let space = run_space();
    space.write_definition(
        "par_burst",
        r#"
        type = "test"
        name = "par_burst"
        descp = "three instances of one case"

        [test_cases.1]
        name = "sleep_then_pass"
        descp = "short nap, three wide"
        mode = "concurrency"
        concurrency_inst = 3
        args = "duration=0.2"
        "#,
    );

    let result = common::run_cli_case_env(
        "parallel_run_records_every_instance",
        &[
            "run-test",
            "par_burst",
            "--runmode",
            "parallel",
            "--run-id",
            "par_burst_run",
        ],
        &space.envs(),
    );
    assert_eq!(
        result.status.code(),
        Some(0),
        "run failed; log: {}",
        result.log_path.display()
    );

    let run_dir = space.run_dir("par_burst_run");
    for instance in 1..=3 {
        assert!(
            run_dir
                .join(format!("par_burst_sleep_then_pass_{instance}.log"))
                .is_file(),
            "missing case log for instance {instance}"
        );
    }

    let ledger = read_ledger(&run_dir, "par_burst_run");
    let entries = entries_of(&ledger, "par_burst");
    assert_eq!(entries.len(), 3);
    let mut instances: Vec<u64> = entries
        .iter()
        .map(|e| e["concurrency_inst"].as_u64().unwrap())
        .collect();
    instances.sort_unstable();
    assert_eq!(instances, vec![1, 2, 3]);
    for entry in entries {
        assert_eq!(entry["method"], "sleep_then_pass");
        assert_eq!(entry["method_mode"], "concurrency");
        assert_eq!(entry["exit_status"], 0);
    }
    assert_eq!(ledger["exit_status"], 0);
}

#[test]
fn failing_case_flips_the_run_exit_code() {
    let space = run_space();
    space.write_definition(
        "fail_leg",
        r#"
        type = "test"
        name = "fail_leg"
        descp = "second case fails on purpose"

        [test_cases.1]
        name = "sleep_then_pass"
        mode = "normal"
        args = "duration=0.2"

        [test_cases.2]
        name = "sleep_then_fail"
        mode = "normal"
        args = "duration=0.2,rc=7"
        "#,
    );

    let result = common::run_cli_case_env(
        "failing_case_flips_the_run_exit_code",
        &["run-test", "fail_leg", "--run-id", "fail_leg_run"],
        &space.envs(),
    );
    assert_eq!(
        result.status.code(),
        Some(1),
        "expected aggregate failure; log: {}",
        result.log_path.display()
    );
    assert!(
        result
            .stdout
            .contains("Execution finished!: TEST ID [ fail_leg_run ] ends with error(s)"),
        "missing failure banner; log: {}",
        result.log_path.display()
    );

    let ledger = read_ledger(&space.run_dir("fail_leg_run"), "fail_leg_run");
    assert_eq!(ledger["exit_status"], 1);
    assert_eq!(ledger["exit_msg"], "Exit with error (1)");
    let entries = entries_of(&ledger, "fail_leg");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["exit_status"], 0);
    assert_eq!(entries[1]["exit_status"], 7);
    assert_eq!(entries[1]["exit_msg"], "Unknown reason exit");
}

#[test]
fn worker_with_wrong_mode_refuses_and_records_nothing() {
    let space = run_space();
    space.write_definition(
        "gate_leg",
        r#"
        type = "test"
        name = "gate_leg"
        descp = "configured for concurrency only"

        [test_cases.1]
        name = "sleep_then_pass"
        mode = "concurrency"
        "#,
    );

    // Spawn the worker entry point directly, the way the dispatcher would,
    // but with a mode the case does not support.
    let logs_arg = space.logs.to_str().unwrap().to_string();
    let result = common::run_cli_case_env(
        "worker_with_wrong_mode_refuses_and_records_nothing",
        &[
            "worker",
            "gate_leg",
            "sleep_then_pass",
            "normal",
            "1",
            "gate_run",
            &logs_arg,
            "1",
        ],
        &space.envs(),
    );
    assert_eq!(
        result.status.code(),
        Some(1),
        "mismatched mode must fail; log: {}",
        result.log_path.display()
    );
    assert!(
        result
            .stdout
            .contains("[PTO-2002] mode [ normal ] invalid, supported [ concurrency ]"),
        "missing mode gate error; log: {}",
        result.log_path.display()
    );

    let run_dir = space.run_dir("gate_run");
    let case_log = fs::read_to_string(run_dir.join("gate_leg_sleep_then_pass_1.log")).unwrap();
    assert!(
        case_log.contains("[PTO-2002]"),
        "gate error missing from the case log"
    );
    assert!(
        !run_dir.join("gate_run.json").exists(),
        "refused worker must write no ledger"
    );
}

#[test]
fn custom_run_id_collision_is_refused() {
    let space = run_space();
    space.write_definition(
        "dup_leg",
        r#"
        type = "test"
        name = "dup_leg"
        descp = "single quick case"

        [test_cases.1]
        name = "sleep_then_pass"
        mode = "normal"
        args = "duration=0.2"
        "#,
    );

    let first = common::run_cli_case_env(
        "custom_run_id_first_claim",
        &["run-test", "dup_leg", "--run-id", "dup_run"],
        &space.envs(),
    );
    assert_eq!(
        first.status.code(),
        Some(0),
        "first run failed; log: {}",
        first.log_path.display()
    );

    let second = common::run_cli_case_env(
        "custom_run_id_collision_is_refused",
        &["run-test", "dup_leg", "--run-id", "dup_run"],
        &space.envs(),
    );
    assert_eq!(
        second.status.code(),
        Some(1),
        "collision must fail; log: {}",
        second.log_path.display()
    );
    assert!(
        second.stderr.contains("[PTO-2001]") && second.stderr.contains("try another"),
        "missing collision error; log: {}",
        second.log_path.display()
    );
    // The first run's ledger survives the refused second claim.
    let ledger = read_ledger(&space.run_dir("dup_run"), "dup_run");
    assert_eq!(ledger["exit_status"], 0);
}

#[test]
fn usermode_disabled_test_is_skipped() {
    let space = run_space();
    space.write_definition(
        "skip_leg",
        r#"
        type = "test"
        name = "skip_leg"
        descp = "only wired for interactive"

        [usermodes]
        automation = false
        interactive = true

        [test_cases.1]
        name = "sleep_then_pass"
        mode = "normal"
        "#,
    );

    let result = common::run_cli_case_env(
        "usermode_disabled_test_is_skipped",
        &["run-test", "skip_leg", "--run-id", "skip_run"],
        &space.envs(),
    );
    assert_eq!(
        result.status.code(),
        Some(0),
        "a skipped test is not a failure; log: {}",
        result.log_path.display()
    );
    assert!(
        result
            .stdout
            .contains("Test [skip_leg] is not configured to run in current usermode [automation]"),
        "missing skip warning; log: {}",
        result.log_path.display()
    );

    let ledger = read_ledger(&space.run_dir("skip_run"), "skip_run");
    assert_eq!(ledger["exit_status"], 0);
    assert!(
        ledger["test_execution"].as_object().unwrap().is_empty(),
        "skipped test must record no entries"
    );
}

#[test]
fn profile_resolves_and_runs_tests_in_order() {
    let space = run_space();
    for name in ["prof_leg_a", "prof_leg_b"] {
        space.write_definition(
            name,
            &format!(
                r#"
                type = "test"
                name = "{name}"
                descp = "profile member"

                [test_cases.1]
                name = "sleep_then_pass"
                mode = "normal"
                args = "duration=0.2"
                "#
            ),
        );
    }
    space.write_definition(
        "prof_pair",
        r#"
        type = "profile"
        name = "prof_pair"
        descp = "two members back to back"

        [tests.1]
        name = "prof_leg_a"

        [tests.2]
        name = "prof_leg_b"
        "#,
    );

    let result = common::run_cli_case_env(
        "profile_resolves_and_runs_tests_in_order",
        &["run-profile", "prof_pair", "--run-id", "prof_pair_run"],
        &space.envs(),
    );
    assert_eq!(
        result.status.code(),
        Some(0),
        "profile run failed; log: {}",
        result.log_path.display()
    );
    let first = result.stdout.find("[ prof_leg_a ]").expect("first banner");
    let second = result.stdout.find("[ prof_leg_b ]").expect("second banner");
    assert!(first < second, "profile members ran out of order");

    let ledger = read_ledger(&space.run_dir("prof_pair_run"), "prof_pair_run");
    assert_eq!(ledger["profile"], "prof_pair");
    assert_eq!(entries_of(&ledger, "prof_leg_a").len(), 1);
    assert_eq!(entries_of(&ledger, "prof_leg_b").len(), 1);
}

#[test]
fn profile_with_a_missing_test_never_starts() {
    let space = run_space();
    space.write_definition(
        "broken_pair",
        r#"
        type = "profile"
        name = "broken_pair"
        descp = "references a test that is not there"

        [tests.1]
        name = "no_such_leg"
        "#,
    );

    let result = common::run_cli_case_env(
        "profile_with_a_missing_test_never_starts",
        &["run-profile", "broken_pair"],
        &space.envs(),
    );
    assert_eq!(
        result.status.code(),
        Some(1),
        "expected resolution failure; log: {}",
        result.log_path.display()
    );
    assert!(
        result
            .stderr
            .contains("profile execution can't continue due missing test [ no_such_leg ]"),
        "missing resolution error; log: {}",
        result.log_path.display()
    );
    // Resolution happens before the run identity is allocated.
    assert_eq!(fs::read_dir(&space.logs).unwrap().count(), 0);
}

#[test]
fn custom_definition_document_runs_from_its_own_directory() {
    let space = run_space();
    let docs = space.root.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("adhoc_leg.toml"),
        r#"
        type = "test"
        name = "adhoc_leg"
        descp = "document outside the catalog"

        [test_cases.1]
        name = "sleep_then_pass"
        mode = "normal"
        args = "duration=0.2"
        "#,
    )
    .unwrap();

    let doc_arg = docs.join("adhoc_leg.toml").to_str().unwrap().to_string();
    let result = common::run_cli_case_env(
        "custom_definition_document_runs_from_its_own_directory",
        &[
            "run-definition",
            "--definition",
            &doc_arg,
            "--run-id",
            "adhoc_run",
        ],
        &space.envs(),
    );
    assert_eq!(
        result.status.code(),
        Some(0),
        "custom definition run failed; log: {}",
        result.log_path.display()
    );
    let ledger = read_ledger(&space.run_dir("adhoc_run"), "adhoc_run");
    let entries = entries_of(&ledger, "adhoc_leg");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["exit_status"], 0);
}

#[test]
fn custom_definition_file_must_carry_its_own_name() {
    let space = run_space();
    let docs = space.root.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("misnamed.toml"),
        r#"
        type = "test"
        name = "other_name"
        descp = "file stem disagrees with the name field"

        [test_cases.1]
        name = "sleep_then_pass"
        mode = "normal"
        "#,
    )
    .unwrap();

    let doc_arg = docs.join("misnamed.toml").to_str().unwrap().to_string();
    let result = common::run_cli_case_env(
        "custom_definition_file_must_carry_its_own_name",
        &["run-definition", "--definition", &doc_arg],
        &space.envs(),
    );
    assert_eq!(
        result.status.code(),
        Some(1),
        "expected refusal; log: {}",
        result.log_path.display()
    );
    assert!(
        result
            .stderr
            .contains("must be named after its definition [ other_name ]"),
        "missing naming error; log: {}",
        result.log_path.display()
    );
    assert_eq!(fs::read_dir(&space.logs).unwrap().count(), 0);
}
