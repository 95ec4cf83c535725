mod common;

use tokengate_engine_core::{
    AccountAddress, ChainClientPort, ProviderEventKind, SessionChange, WorkflowState,
};

use common::{
    connect, harness, log_contains, owner, request_unlimited, OTHER_ACCOUNT,
};

#[test]
fn account_disconnect_at_the_gate_aborts_without_sending() {
    let mut h = harness();
    connect(&mut h);
    h.engine.start(request_unlimited()).expect("start");

    h.engine.on_accounts_changed(None).expect("event");
    assert_eq!(h.engine.state(), WorkflowState::Idle);
    assert!(h.engine.session().is_none());
    assert_eq!(h.evm.send_count(), 0);
    let log = h.engine.drain_log();
    assert!(log_contains(&log, "approval run aborted"));
    assert!(log_contains(&log, "session cleared"));

    // The gate is gone along with the run.
    assert!(h.engine.confirm(true).is_err());
}

#[test]
fn account_switch_replaces_the_session_wholesale_and_aborts_the_run() {
    let mut h = harness();
    connect(&mut h);
    let before = h.engine.session().expect("session").clone();
    h.engine.start(request_unlimited()).expect("start");

    let replacement = AccountAddress::new(OTHER_ACCOUNT);
    h.clock.advance(5);
    h.engine
        .on_accounts_changed(Some(replacement.clone()))
        .expect("event");

    let after = h.engine.session().expect("session").clone();
    assert_eq!(after.address, replacement);
    assert_eq!(after.chain_id, before.chain_id);
    assert!(after.connected_at > before.connected_at);
    assert_eq!(h.engine.state(), WorkflowState::Connected);
    assert_eq!(h.evm.send_count(), 0);

    let changes: Vec<SessionChange> = h
        .engine
        .drain_session_events()
        .into_iter()
        .map(|e| e.change)
        .collect();
    assert!(changes.contains(&SessionChange::AccountReplaced));
}

#[test]
fn same_account_event_is_a_no_op() {
    let mut h = harness();
    connect(&mut h);
    h.engine.start(request_unlimited()).expect("start");

    h.engine.on_accounts_changed(Some(owner())).expect("event");
    assert_eq!(h.engine.state(), WorkflowState::AwaitingConfirmation);
}

#[test]
fn chain_change_invalidates_the_run() {
    let mut h = harness();
    connect(&mut h);
    h.engine.start(request_unlimited()).expect("start");

    h.engine.on_chain_changed(1).expect("event");
    assert_eq!(h.engine.session().expect("session").chain_id, 1);
    assert_eq!(h.engine.state(), WorkflowState::Connected);
    assert_eq!(h.evm.send_count(), 0);
    let log = h.engine.drain_log();
    assert!(log_contains(&log, "network changed to chain 1"));
}

#[test]
fn enforced_chain_policy_closes_the_session_on_switch() {
    let mut config = common::default_config();
    config.expected_chain_id = Some(56);
    config.enforce_expected_chain = true;
    let mut h = common::harness_with_config(config);
    connect(&mut h);

    h.engine.on_chain_changed(1).expect("event");
    assert!(h.engine.session().is_none());
    assert_eq!(h.engine.state(), WorkflowState::Idle);
}

#[test]
fn disconnect_during_the_gate_aborts() {
    let mut h = harness();
    connect(&mut h);
    h.engine.start(request_unlimited()).expect("start");

    h.engine.disconnect().expect("disconnect");
    assert_eq!(h.engine.state(), WorkflowState::Idle);
    assert!(h.engine.session().is_none());
    assert_eq!(h.evm.send_count(), 0);
}

#[test]
fn provider_events_drain_through_the_adapter() {
    let mut h = harness();
    connect(&mut h);

    let replacement = AccountAddress::new(OTHER_ACCOUNT);
    h.engine
        .evm
        .debug_inject_accounts_changed(vec![replacement.clone()]);
    h.engine.evm.debug_inject_chain_changed(8453);

    // The driver drains raw provider events and feeds them to the engine.
    let events = h.engine.evm.drain_events().expect("drain");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, ProviderEventKind::AccountsChanged);
    assert_eq!(events[1].kind, ProviderEventKind::ChainChanged);

    h.engine
        .on_accounts_changed(Some(replacement.clone()))
        .expect("accounts");
    h.engine.on_chain_changed(8453).expect("chain");

    let session = h.engine.session().expect("session");
    assert_eq!(session.address, replacement);
    assert_eq!(session.chain_id, 8453);
}
