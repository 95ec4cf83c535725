mod common;

use alloy::primitives::U256;

use tokengate_engine_core::{AccountAddress, ApprovalAmount, ApprovalRequest, EngineEvent,
    Severity, TxStatus, WorkflowState};

use common::{
    connect, harness, log_contains, log_contains_at, owner, request_unlimited, spender,
    tron_handle,
};

#[test]
fn evm_approval_runs_to_completion() {
    let mut h = harness();
    h.evm.set_fee_per_tx(Some(U256::from(1_050_000_000_000_000u64)));

    connect(&mut h);
    let session = h.engine.session().expect("session").clone();
    assert_eq!(session.address, owner());
    assert_eq!(session.chain_id, 56);

    h.engine.start(request_unlimited()).expect("start");
    assert_eq!(h.engine.state(), WorkflowState::AwaitingConfirmation);
    let log = h.engine.drain_log();
    assert!(log_contains(&log, "USDT balance: 500.000000"));
    assert!(log_contains(&log, "current allowance"));
    assert!(log_contains(&log, "awaiting confirmation: approve("));
    assert!(log_contains_at(&log, Severity::Warn, "unlimited approval"));

    h.engine.confirm(true).expect("confirm");
    assert_eq!(h.engine.state(), WorkflowState::AwaitingOnChainConfirmation);
    assert_eq!(h.evm.send_count(), 1);

    // Default deterministic chain confirms on the first status check.
    h.clock.advance(2_000);
    h.engine.tick().expect("tick");
    assert_eq!(h.engine.state(), WorkflowState::Connected);

    let record = h.engine.last_transaction().expect("transaction").clone();
    assert_eq!(record.status, TxStatus::Confirmed);
    assert_eq!(record.fee_consumed, Some(U256::from(1_050_000_000_000_000u64)));

    let log = h.engine.drain_log();
    assert!(log_contains(&log, "confirmed"));
    assert!(log_contains(&log, "fee consumed: 0.001050000000000000 ETH"));

    assert_eq!(h.evm.allowance(&owner(), &spender()), U256::MAX);
    let events = h.engine.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::TransactionRecorded(_))));
}

#[test]
fn tron_approval_uses_the_tron_backend() {
    let mut h = harness();
    let tron_owner = h.tron.first_account().expect("tron account");
    h.host.clear_injected();
    h.host.inject(tron_handle(&tron_owner));
    h.tron.fund_token(&tron_owner, U256::from(250_000_000u64));
    h.tron.set_confirm_after_checks(2);
    h.tron.set_fee_per_tx(Some(U256::from(345_000u64)));

    connect(&mut h);
    let session = h.engine.session().expect("session").clone();
    assert_eq!(session.kind, tokengate_engine_core::ProviderKind::Tron);
    assert!(session.address.as_str().starts_with('T'));

    let request = ApprovalRequest {
        token: AccountAddress::new("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"),
        spender: AccountAddress::new("TN3W4H6rK2ce4vX9YnFQHwKENnHjoxb3m9"),
        amount: ApprovalAmount::Limited(U256::from(100_000_000u64)),
    };
    h.engine.start(request).expect("start");
    h.engine.confirm(true).expect("confirm");

    // First check pending, second confirms.
    h.clock.advance(2_000);
    h.engine.tick().expect("tick");
    assert_eq!(
        h.engine.state(),
        WorkflowState::AwaitingOnChainConfirmation
    );
    h.clock.advance(2_000);
    h.engine.tick().expect("tick");
    assert_eq!(h.engine.state(), WorkflowState::Connected);

    assert_eq!(h.evm.send_count(), 0);
    assert_eq!(h.tron.send_count(), 1);
    let log = h.engine.drain_log();
    // Tron fees render with the sun exponent.
    assert!(log_contains(&log, "fee consumed: 0.345000 TRX"));
}

#[test]
fn native_balance_is_reported_after_connect() {
    let mut h = harness();
    // 1.5 of the native coin at 18 decimals.
    h.evm
        .fund_native(&owner(), U256::from(1_500_000_000_000_000_000u64));
    connect(&mut h);
    let log = h.engine.drain_log();
    assert!(log_contains(&log, "native balance: 1.500000000000000000 ETH"));
}

#[test]
fn message_signing_is_session_gated() {
    let mut h = harness();
    assert!(matches!(
        h.engine.sign_message("hello"),
        Err(tokengate_engine_core::EngineError::NoSession)
    ));
    connect(&mut h);
    let signature = h.engine.sign_message("hello").expect("sign");
    assert!(signature.starts_with("0x"));
    assert_eq!(signature.len(), 2 + 65 * 2);
}
