#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::U256;

use tokengate_engine_adapters::{
    DeterministicChain, Eip1193Adapter, HostEnvironmentAdapter, TronWebAdapter,
};
use tokengate_engine_core::{
    AccountAddress, ApprovalAmount, ApprovalRequest, ClockPort, EngineConfig, EngineError,
    ProviderHandle, ProviderKind, Severity, WorkflowEngine, WorkflowLogEntry,
};

pub const TOKEN: &str = "0x000000000000000000000000000000000000CAFE";
pub const SPENDER: &str = "0x000000000000000000000000000000000000BEEF";
pub const OWNER: &str = "0x1000000000000000000000000000000000000001";
pub const OTHER_ACCOUNT: &str = "0x2000000000000000000000000000000000000002";

pub const START_MS: u64 = 1_739_750_400_000;

#[derive(Debug, Clone, Default)]
pub struct TestClock {
    now: Arc<AtomicU64>,
}

impl TestClock {
    pub fn at(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl ClockPort for TestClock {
    fn now_ms(&self) -> Result<u64, EngineError> {
        Ok(self.now.load(Ordering::SeqCst))
    }
}

pub type TestEngine =
    WorkflowEngine<Eip1193Adapter, TronWebAdapter, HostEnvironmentAdapter, TestClock>;

pub struct Harness {
    pub engine: TestEngine,
    pub clock: TestClock,
    pub host: HostEnvironmentAdapter,
    pub evm: DeterministicChain,
    pub tron: DeterministicChain,
}

pub fn token() -> AccountAddress {
    AccountAddress::new(TOKEN)
}

pub fn spender() -> AccountAddress {
    AccountAddress::new(SPENDER)
}

pub fn owner() -> AccountAddress {
    AccountAddress::new(OWNER)
}

pub fn evm_handle() -> ProviderHandle {
    ProviderHandle {
        kind: ProviderKind::Evm,
        ready: true,
        native_address: Some(owner()),
    }
}

pub fn tron_handle(address: &AccountAddress) -> ProviderHandle {
    ProviderHandle {
        kind: ProviderKind::Tron,
        ready: true,
        native_address: Some(address.clone()),
    }
}

pub fn default_config() -> EngineConfig {
    EngineConfig::for_token(token(), spender())
}

/// Engine over deterministic adapters with an EVM provider injected and the
/// owner funded with 500 six-decimal tokens.
pub fn harness() -> Harness {
    harness_with_config(default_config())
}

pub fn harness_with_config(config: EngineConfig) -> Harness {
    let clock = TestClock::at(START_MS);
    let host = HostEnvironmentAdapter::deterministic();
    host.inject(evm_handle());

    let evm_adapter = Eip1193Adapter::deterministic();
    let tron_adapter = TronWebAdapter::deterministic();
    let evm = evm_adapter.chain_handle();
    let tron = tron_adapter.chain_handle();
    evm.fund_token(&owner(), U256::from(500_000_000u64));

    let engine = WorkflowEngine::new(
        evm_adapter,
        tron_adapter,
        host.clone(),
        clock.clone(),
        config,
    );
    Harness {
        engine,
        clock,
        host,
        evm,
        tron,
    }
}

pub fn request_unlimited() -> ApprovalRequest {
    ApprovalRequest {
        token: token(),
        spender: spender(),
        amount: ApprovalAmount::Unlimited,
    }
}

pub fn request_limited(raw: u64) -> ApprovalRequest {
    ApprovalRequest {
        token: token(),
        spender: spender(),
        amount: ApprovalAmount::Limited(U256::from(raw)),
    }
}

pub fn log_contains(log: &[WorkflowLogEntry], needle: &str) -> bool {
    log.iter().any(|entry| entry.message.contains(needle))
}

pub fn log_contains_at(log: &[WorkflowLogEntry], severity: Severity, needle: &str) -> bool {
    log.iter()
        .any(|entry| entry.severity == severity && entry.message.contains(needle))
}

/// Runs probe + connect against whichever provider the host has injected.
pub fn connect(harness: &mut Harness) {
    harness.engine.probe().expect("probe").expect("provider injected");
    harness.engine.connect().expect("connect");
}

/// Advances the fake clock in poll-interval steps, ticking the engine after
/// each step, until the confirmation poll leaves its waiting state or
/// `budget_ms` elapses.
pub fn drive_confirmation(harness: &mut Harness, budget_ms: u64) {
    let mut elapsed = 0;
    while elapsed < budget_ms {
        harness.clock.advance(1_000);
        elapsed += 1_000;
        harness.engine.tick().expect("tick");
        if harness.engine.state() != tokengate_engine_core::WorkflowState::AwaitingOnChainConfirmation
        {
            return;
        }
    }
}
