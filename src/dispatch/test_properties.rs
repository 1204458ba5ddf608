//! Property-based tests for dispatch and definition invariants.
//!
//! Uses `proptest` to verify the laws the run machinery leans on: worker
//! argv recognition is exact, run-id allocation is always one past the
//! highest, order keys sort numerically, user args survive the comma
//! round trip, the exit-code vocabulary is total, and batch aggregation
//! composes.

use std::collections::BTreeMap;
use std::fs;

use proptest::prelude::*;

use super::dispatcher::{RunMode, aggregate_code};
use super::proc_table;
use crate::core::exit::{ExitStatus, exit_message};
use crate::registry::definition::{CaseMode, CaseSpec, TestDefinition, UserMode, UserModes};

// ──────────────────── strategies ────────────────────

fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}"
}

fn arb_case_mode() -> impl Strategy<Value = CaseMode> {
    prop_oneof![Just(CaseMode::Normal), Just(CaseMode::Concurrency)]
}

fn case_named(name: &str, mode: CaseMode) -> CaseSpec {
    CaseSpec {
        name: name.to_string(),
        descp: String::new(),
        mode,
        concurrency_inst: 1,
        protected: false,
        args: None,
    }
}

fn worker_argv(test: &str, case: &str, mode: &str, instance: u32, order: u32) -> Vec<String> {
    vec![
        "pto".to_string(),
        "worker".to_string(),
        test.to_string(),
        case.to_string(),
        mode.to_string(),
        instance.to_string(),
        "000001".to_string(),
        "/tmp/logs".to_string(),
        order.to_string(),
    ]
}

// ──────────────────── property tests ────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A worker argv matches exactly its own (test, case) pair and nothing
    /// else.
    #[test]
    fn worker_argv_recognition_is_exact(
        test in arb_name(),
        case in arb_name(),
        probe_test in arb_name(),
        probe_case in arb_name(),
        mode in arb_case_mode(),
        instance in 1u32..10,
        order in 1u32..10
    ) {
        let argv = worker_argv(&test, &case, mode.as_str(), instance, order);
        prop_assert!(proc_table::is_worker_for(&argv, &test, None));
        prop_assert!(proc_table::is_worker_for(&argv, &test, Some(&case)));

        if probe_test != test {
            prop_assert!(!proc_table::is_worker_for(&argv, &probe_test, None));
        }
        if probe_case != case {
            prop_assert!(!proc_table::is_worker_for(&argv, &test, Some(&probe_case)));
        }
    }

    /// Non-worker invocations never look like workers, whatever their
    /// positional arguments spell.
    #[test]
    fn non_worker_argv_never_matches(
        subcommand in prop_oneof![
            Just("run-test"), Just("run-profile"), Just("serve"),
            Just("validate"), Just("backup"),
        ],
        name in arb_name()
    ) {
        let argv = vec!["pto".to_string(), subcommand.to_string(), name.clone()];
        prop_assert!(!proc_table::is_worker_for(&argv, &name, None));
    }

    /// The next auto id is one past the highest existing run directory, and
    /// names that do not look like run ids never shift it.
    #[test]
    fn next_run_id_is_one_past_the_highest(
        ids in prop::collection::btree_set(0u32..200_000, 1..12),
        junk in prop::collection::vec(0usize..5, 0..4)
    ) {
        const JUNK: [&str; 5] = ["archive", "12345", "1234567", "run_000001", "000010.bak"];

        let root = tempfile::tempdir().unwrap();
        for id in &ids {
            fs::create_dir_all(root.path().join(format!("{id:06}"))).unwrap();
        }
        for idx in junk {
            fs::create_dir_all(root.path().join(JUNK[idx])).unwrap();
        }

        let highest = *ids.iter().max().unwrap();
        prop_assert_eq!(
            proc_table::next_run_id(root.path()).unwrap(),
            format!("{:06}", highest + 1)
        );
    }

    /// Order keys are sorted numerically whatever their lexicographic order
    /// in the underlying map, and every slot survives the sort.
    #[test]
    fn order_keys_sort_numerically(
        orders in prop::collection::btree_set(1u32..500, 1..10),
        mode in arb_case_mode()
    ) {
        let mut test_cases = BTreeMap::new();
        for order in &orders {
            test_cases.insert(order.to_string(), case_named("case_body", mode));
        }
        let def = TestDefinition {
            name: "ordering".to_string(),
            descp: String::new(),
            usermodes: UserModes::default(),
            test_cases,
        };

        let sorted: Vec<u32> = def.ordered_cases().unwrap().iter().map(|(o, _)| *o).collect();
        let expected: Vec<u32> = orders.into_iter().collect();
        prop_assert_eq!(sorted, expected);
    }

    /// Comma-joined `key=value` pairs come back out in order and intact.
    #[test]
    fn user_args_survive_the_comma_round_trip(
        pairs in prop::collection::vec(("[a-z]{1,8}", "[a-z0-9]{1,8}"), 0..6)
    ) {
        let joined: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let spec = CaseSpec {
            args: (!joined.is_empty()).then(|| joined.join(",")),
            ..case_named("case_body", CaseMode::Normal)
        };
        prop_assert_eq!(spec.user_args(), joined);
    }

    /// The user-mode gate mirrors the per-mode flags exactly.
    #[test]
    fn usermode_gate_mirrors_its_flags(
        automation in any::<bool>(),
        interactive in any::<bool>(),
        gui in any::<bool>()
    ) {
        let modes = UserModes { automation, interactive, gui };
        prop_assert_eq!(modes.enabled(UserMode::Automation), automation);
        prop_assert_eq!(modes.enabled(UserMode::Interactive), interactive);
        prop_assert_eq!(modes.enabled(UserMode::Gui), gui);
    }

    /// Anything outside the run-mode vocabulary is rejected.
    #[test]
    fn unknown_run_modes_are_rejected(raw in "[a-z]{1,10}") {
        prop_assume!(raw != "normal" && raw != "parallel");
        prop_assert!(raw.parse::<RunMode>().is_err());
    }

    /// The run verdict is `0` exactly when every code is `0`, and never
    /// anything but `0` or `1`.
    #[test]
    fn aggregation_is_zero_iff_all_codes_are_zero(
        codes in prop::collection::vec(any::<i32>(), 0..8)
    ) {
        let verdict = aggregate_code(&codes);
        prop_assert!(verdict == 0 || verdict == 1);
        prop_assert_eq!(verdict == 0, codes.iter().all(|c| *c == 0));
    }

    /// Folding each batch and then the batch verdicts gives the same answer
    /// as folding every code flat, so sequential runs and parallel runs
    /// agree on the verdict. An empty run passes.
    #[test]
    fn aggregation_composes_over_batches(
        batches in prop::collection::vec(prop::collection::vec(-1i32..4, 0..5), 0..5)
    ) {
        let flat: Vec<i32> = batches.iter().flatten().copied().collect();
        let per_batch: Vec<i32> = batches.iter().map(|b| aggregate_code(b)).collect();
        prop_assert_eq!(aggregate_code(&per_batch), aggregate_code(&flat));
        prop_assert_eq!(aggregate_code(&[]), 0);
    }

    /// The exit vocabulary is total over `i32`: known codes round trip,
    /// everything else folds to the error status with the unknown message.
    #[test]
    fn exit_vocabulary_is_total(code in any::<i32>()) {
        let status = ExitStatus::from_code(code);
        let message = exit_message(code);
        match code {
            -1 => prop_assert_eq!(status, ExitStatus::Timeout),
            0 => prop_assert_eq!(status, ExitStatus::Success),
            1 => prop_assert_eq!(status, ExitStatus::Error),
            2 => prop_assert_eq!(status, ExitStatus::BySignal),
            _ => {
                prop_assert_eq!(status, ExitStatus::Error);
                prop_assert_eq!(message, "Unknown reason exit");
            }
        }
        prop_assert!(!message.is_empty());
    }
}

// ──────────────────── non-proptest invariant tests ────────────────────

#[test]
fn order_keys_with_leading_zeros_collide() {
    // "07" and "7" are distinct map keys but the same order slot.
    let mut test_cases = BTreeMap::new();
    test_cases.insert("7".to_string(), case_named("case_body", CaseMode::Normal));
    test_cases.insert("07".to_string(), case_named("case_body", CaseMode::Normal));
    let def = TestDefinition {
        name: "collide".to_string(),
        descp: String::new(),
        usermodes: UserModes::default(),
        test_cases,
    };
    let err = def.ordered_cases().unwrap_err();
    assert!(err.to_string().contains("duplicate case order"));
}
