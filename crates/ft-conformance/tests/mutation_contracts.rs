use ft_audit::{AuditError, AuditSession, TrackedValue, operand_kinds, unwrap_tree};
use ft_conformance::{
    CallResult, ScenarioCall, ScenarioSpec, install_rogue_scale, run_scenario, vector_pair,
};
use ft_core::{ArgValue, TensorValue};
use std::collections::BTreeMap;

fn wrapped(values: &[i64]) -> (TensorValue, TrackedValue) {
    let tensor = TensorValue::vector_i64(values).expect("vector should build");
    let tracked = TrackedValue::checked(tensor.clone()).expect("wrap should succeed");
    (tensor, tracked)
}

#[test]
fn immutable_add_leaves_operands_intact() {
    let mut session = AuditSession::builtin();
    let (a, tracked_a) = wrapped(&[1, 2]);
    let (b, tracked_b) = wrapped(&[3, 4]);
    let args = [tracked_a, tracked_b];

    let out = session
        .dispatch("add", &operand_kinds(&args), &args, &BTreeMap::new())
        .expect("add should pass the audit");

    assert_eq!(
        out.as_checked()
            .expect("result should be wrapped")
            .inner()
            .to_i64_vec(),
        Some(vec![4, 6])
    );
    assert_eq!(a.to_i64_vec(), Some(vec![1, 2]));
    assert_eq!(b.to_i64_vec(), Some(vec![3, 4]));
    assert_eq!(session.log().render(), "add");
}

#[test]
fn mutable_receiver_updates_without_violation() {
    let mut session = AuditSession::builtin();
    let (a, tracked_a) = wrapped(&[1, 2]);
    let (_, tracked_b) = wrapped(&[3, 4]);
    let args = [tracked_a, tracked_b];

    let out = session
        .dispatch("add_", &operand_kinds(&args), &args, &BTreeMap::new())
        .expect("declared-mutable receiver must not be flagged");

    assert_eq!(a.to_i64_vec(), Some(vec![4, 6]));
    assert!(
        out.as_checked()
            .expect("result should be wrapped")
            .inner()
            .aliases(&a)
    );
}

#[test]
fn overwriting_kernel_declared_immutable_raises_naming_input() {
    let mut session = AuditSession::builtin();
    install_rogue_scale(&mut session);
    let (_, tracked) = wrapped(&[1, 2]);
    let args = [tracked];

    let err = session
        .dispatch("scale", &operand_kinds(&args), &args, &BTreeMap::new())
        .expect_err("in-place overwrite of an immutable argument must raise");

    assert_eq!(
        err,
        AuditError::MutatedImmutableArgument {
            argument: "input".to_owned(),
        }
    );
    assert_eq!(
        err.to_string(),
        "argument input is not defined as mutable but was mutated"
    );
}

#[test]
fn omitted_optional_argument_is_never_audited() {
    let mut session = AuditSession::builtin();
    let (_, tracked_a) = wrapped(&[1, 2]);
    let (_, tracked_b) = wrapped(&[3, 4]);
    let args = [tracked_a, tracked_b];

    session
        .dispatch("add", &operand_kinds(&args), &args, &BTreeMap::new())
        .expect("call omitting the optional alpha must not raise");
}

#[test]
fn log_records_every_attempted_invocation_in_order() {
    let mut session = AuditSession::builtin();
    install_rogue_scale(&mut session);

    let (_, tracked_a) = wrapped(&[1, 2]);
    let (_, tracked_b) = wrapped(&[3, 4]);
    let add_args = [tracked_a, tracked_b];
    session
        .dispatch("add", &operand_kinds(&add_args), &add_args, &BTreeMap::new())
        .expect("add should pass the audit");

    let (_, tracked) = wrapped(&[5, 6]);
    let scale_args = [tracked];
    session
        .dispatch("scale", &operand_kinds(&scale_args), &scale_args, &BTreeMap::new())
        .expect_err("rogue scale should raise");

    let (_, tracked) = wrapped(&[7]);
    let unknown_args = [tracked];
    session
        .dispatch("conv3d", &operand_kinds(&unknown_args), &unknown_args, &BTreeMap::new())
        .expect_err("unknown operation should fail schema lookup");

    assert_eq!(session.log().entries(), ["add", "scale", "conv3d"]);
    assert_eq!(session.log().len(), 3);
}

#[test]
fn reset_yields_empty_log_regardless_of_prior_content() {
    let mut session = AuditSession::builtin();
    session.log_mut().reset();
    assert!(session.log().is_empty());

    let (_, tracked_a) = wrapped(&[1]);
    let (_, tracked_b) = wrapped(&[2]);
    let args = [tracked_a, tracked_b];
    session
        .dispatch("mul", &operand_kinds(&args), &args, &BTreeMap::new())
        .expect("mul should pass the audit");
    session.log_mut().reset();
    assert!(session.log().is_empty());
    assert_eq!(session.log().render(), "");
}

#[test]
fn wrap_then_unwrap_returns_the_original_value() {
    let tensor = TensorValue::vector_f64(&[1.5, 2.5]).expect("vector should build");
    let tracked = TrackedValue::checked(tensor.clone()).expect("wrap should succeed");
    let unwrapped = unwrap_tree(&tracked);
    let inner = unwrapped.as_tensor().expect("unwrap should yield tensor");
    assert!(inner.aliases(&tensor));

    let plain = TrackedValue::Plain(ArgValue::scalar_i64(3));
    assert_eq!(unwrap_tree(&plain), ArgValue::scalar_i64(3));
}

#[test]
fn non_tensor_result_is_never_coerced_into_a_wrapped_handle() {
    let mut session = AuditSession::builtin();
    let (_, tracked) = wrapped(&[2, 3, 4]);
    let args = [tracked];

    let out = session
        .dispatch("sum", &operand_kinds(&args), &args, &BTreeMap::new())
        .expect("sum should pass the audit");
    assert!(out.as_checked().is_none());
    assert_eq!(out.as_plain().and_then(ArgValue::as_i64_scalar), Some(9));
}

#[test]
fn scenario_harness_covers_violation_and_recovery() {
    let mut session = AuditSession::builtin();
    install_rogue_scale(&mut session);

    let (a, b) = vector_pair().expect("fixture vectors should build");
    let spec = ScenarioSpec {
        name: "violation_and_recovery".to_owned(),
        calls: vec![
            ScenarioCall::positional("add", vec![a.clone(), b]),
            ScenarioCall::positional("scale", vec![a.clone()]),
            ScenarioCall::positional("sum", vec![a]),
        ],
    };

    let report = run_scenario(&mut session, &spec);
    assert_eq!(report.total_calls, 3);
    assert_eq!(report.passed_calls, 2);
    assert_eq!(report.first_violation(), Some("input"));
    assert_eq!(report.log, ["add", "scale", "sum"]);
    assert!(matches!(report.outcomes[1].result, CallResult::ContractViolation { .. }));
}
