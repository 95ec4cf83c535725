mod common;

use tokengate_engine_core::{EngineError, Severity, WorkflowState};

use common::{connect, harness, log_contains, log_contains_at, request_unlimited};

#[test]
fn allowance_read_failure_degrades_to_zero_and_reaches_the_gate() {
    let mut h = harness();
    h.evm.fail_allowance_read(true);
    connect(&mut h);

    h.engine.start(request_unlimited()).expect("start");
    assert_eq!(h.engine.state(), WorkflowState::AwaitingConfirmation);
    let log = h.engine.drain_log();
    assert!(log_contains_at(&log, Severity::Warn, "allowance read failed"));
    assert!(log_contains(&log, "current allowance"));
    assert!(log_contains(&log, ": 0.000000"));
}

#[test]
fn balance_read_failure_warns_but_does_not_abort() {
    let mut h = harness();
    h.evm.fail_balance_read(true);
    connect(&mut h);

    h.engine.start(request_unlimited()).expect("start");
    assert_eq!(h.engine.state(), WorkflowState::AwaitingConfirmation);
    let log = h.engine.drain_log();
    assert!(log_contains_at(&log, Severity::Warn, "balance read failed"));
}

#[test]
fn missing_symbol_and_name_fall_back_to_descriptor_defaults() {
    let mut h = harness();
    h.evm.set_token(6, None, None);
    connect(&mut h);

    h.engine.start(request_unlimited()).expect("start");
    assert_eq!(h.engine.state(), WorkflowState::AwaitingConfirmation);
    let log = h.engine.drain_log();
    assert!(log_contains(&log, "UNKNOWN"));
}

#[test]
fn decimals_failure_is_fatal_to_the_run() {
    let mut h = harness();
    h.evm.fail_decimals_read(true);
    connect(&mut h);

    let err = h.engine.start(request_unlimited()).expect_err("must fail");
    assert!(matches!(err, EngineError::Read(_)));
    assert_eq!(h.engine.state(), WorkflowState::Connected);
    assert_eq!(h.evm.send_count(), 0);
    let log = h.engine.drain_log();
    assert!(log_contains_at(&log, Severity::Error, "token read failed"));
}

#[test]
fn decimals_are_never_re_read_after_first_success() {
    let mut h = harness();
    connect(&mut h);

    h.engine.start(request_unlimited()).expect("start");
    h.engine.confirm(false).expect("decline");
    h.engine.start(request_unlimited()).expect("second run");

    let reads = h.evm.read_log();
    let decimals_reads = reads.iter().filter(|m| m.as_str() == "decimals").count();
    let allowance_reads = reads.iter().filter(|m| m.as_str() == "allowance").count();
    assert_eq!(decimals_reads, 1);
    // The allowance is never cached: one fresh read per run.
    assert_eq!(allowance_reads, 2);
}
