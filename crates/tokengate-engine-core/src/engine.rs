use std::collections::HashMap;

use alloy::primitives::U256;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::domain::{
    format_base_units, AccountAddress, AllowanceSnapshot, ApprovalAmount, ApprovalRequest,
    ProviderHandle, ProviderKind, Session, Severity, TimestampMs, TokenDescriptor,
    TransactionRecord, TxStatus, WorkflowLogEntry,
};
use crate::poller::{PollTurn, Poller};
use crate::probe::{ProviderProbe, WatchTurn};
use crate::ports::{ChainClientPort, ClockPort, EngineError, HostPort, TxProbe};
use crate::session::{SessionChange, SessionEvent, SessionStore};
use crate::state_machine::{workflow_transition, StateTransition, WorkflowAction, WorkflowState};
use crate::token::TokenAccessor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    StateChanged(StateTransition),
    /// Recommendation only; the presentation layer decides whether to open it.
    DeepLinkSuggested { url: String },
    TransactionRecorded(TransactionRecord),
}

/// State carried by one approval (or revocation) run. Bound to the session
/// that prepared it; a session change invalidates the run.
#[derive(Debug, Clone)]
struct ApprovalRun {
    request: ApprovalRequest,
    revocation: bool,
    bound_address: AccountAddress,
    bound_chain_id: u64,
    descriptor: Option<TokenDescriptor>,
    balance_raw: Option<U256>,
    allowance: Option<AllowanceSnapshot>,
    tx: Option<TransactionRecord>,
    poll: Option<Poller>,
}

impl ApprovalRun {
    fn new(request: ApprovalRequest, revocation: bool, session: &Session) -> Self {
        Self {
            request,
            revocation,
            bound_address: session.address.clone(),
            bound_chain_id: session.chain_id,
            descriptor: None,
            balance_raw: None,
            allowance: None,
            tx: None,
            poll: None,
        }
    }
}

/// The approval workflow orchestrator. Sequences provider detection,
/// session establishment, token reads, the user-confirmation gate,
/// broadcast, and the bounded confirmation poll. Single-threaded and
/// event-driven: suspension points are deadlines against [`ClockPort`],
/// advanced by [`WorkflowEngine::tick`].
pub struct WorkflowEngine<E, T, H, C>
where
    E: ChainClientPort,
    T: ChainClientPort,
    H: HostPort,
    C: ClockPort,
{
    pub evm: E,
    pub tron: T,
    pub clock: C,
    probe: ProviderProbe<H>,
    config: EngineConfig,
    sessions: SessionStore,
    state: WorkflowState,
    handle: Option<ProviderHandle>,
    run: Option<ApprovalRun>,
    last_tx: Option<TransactionRecord>,
    descriptors: HashMap<(u64, AccountAddress), TokenDescriptor>,
    log: Vec<WorkflowLogEntry>,
    events: Vec<EngineEvent>,
    deep_link_suggested: bool,
}

impl<E, T, H, C> WorkflowEngine<E, T, H, C>
where
    E: ChainClientPort,
    T: ChainClientPort,
    H: HostPort,
    C: ClockPort,
{
    pub fn new(evm: E, tron: T, host: H, clock: C, config: EngineConfig) -> Self {
        Self {
            evm,
            tron,
            clock,
            probe: ProviderProbe::new(host),
            config,
            sessions: SessionStore::default(),
            state: WorkflowState::Idle,
            handle: None,
            run: None,
            last_tx: None,
            descriptors: HashMap::new(),
            log: Vec::new(),
            events: Vec::new(),
            deep_link_suggested: false,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.sessions.current()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn last_transaction(&self) -> Option<&TransactionRecord> {
        self.run
            .as_ref()
            .and_then(|r| r.tx.as_ref())
            .or(self.last_tx.as_ref())
    }

    pub fn drain_log(&mut self) -> Vec<WorkflowLogEntry> {
        std::mem::take(&mut self.log)
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn drain_session_events(&mut self) -> Vec<SessionEvent> {
        self.sessions.drain_events()
    }

    /// One synchronous provider check. A miss has no side effects, so the
    /// presentation layer may call this freely.
    pub fn probe(&mut self) -> Result<Option<ProviderHandle>, EngineError> {
        let found = self.probe.probe_once()?;
        if let Some(handle) = found.clone() {
            let at = self.now()?;
            self.push_log(
                at,
                Severity::Info,
                format!("detected injected {} provider", handle.kind),
            );
            self.handle = Some(handle);
        }
        Ok(found)
    }

    /// Starts the probe watch loop; [`WorkflowEngine::tick`] advances it.
    pub fn begin_probe_watch(&mut self) -> Result<(), EngineError> {
        let at = self.now()?;
        self.deep_link_suggested = false;
        self.probe.begin_watch(
            at.0,
            self.config.probe_interval_ms,
            self.config.probe_max_attempts,
        );
        self.push_log(at, Severity::Info, "watching for an injected wallet provider");
        Ok(())
    }

    /// Establishes a session against the detected provider.
    pub fn connect(&mut self) -> Result<Session, EngineError> {
        let at = self.now()?;
        if self.handle.is_none() {
            self.handle = self.probe.probe_once()?;
        }
        let Some(handle) = self.handle.clone() else {
            self.push_log(
                at,
                Severity::Error,
                "no wallet provider injected; install a wallet or open the in-wallet browser",
            );
            return Err(EngineError::ProviderNotFound);
        };
        if !handle.ready {
            self.push_log(at, Severity::Error, "wallet provider is not ready yet");
            return Err(EngineError::ProviderNotReady);
        }

        self.transition(WorkflowAction::BeginConnect)?;
        let connected = {
            let client = self.client_for(handle.kind);
            client.connect()
        };
        let connected = match connected {
            Ok(connected) => connected,
            Err(e) => {
                self.transition(WorkflowAction::ConnectFailed)?;
                self.push_log(at, Severity::Error, format!("wallet connect failed: {e}"));
                self.settle()?;
                return Err(e);
            }
        };

        if let Some(expected) = self.config.expected_chain_id {
            if connected.chain_id != expected {
                if self.config.enforce_expected_chain {
                    self.transition(WorkflowAction::ConnectFailed)?;
                    self.push_log(
                        at,
                        Severity::Error,
                        format!(
                            "wrong network: expected chain {expected}, provider reports {}",
                            connected.chain_id
                        ),
                    );
                    self.settle()?;
                    return Err(EngineError::NetworkMismatch {
                        expected,
                        actual: connected.chain_id,
                    });
                }
                self.push_log(
                    at,
                    Severity::Warn,
                    format!(
                        "connected to chain {}, expected chain {expected}",
                        connected.chain_id
                    ),
                );
            }
        }

        let session = Session {
            address: connected.address,
            chain_id: connected.chain_id,
            kind: handle.kind,
            connected_at: at,
        };
        self.sessions
            .replace(Some(session.clone()), SessionChange::Connected);
        self.transition(WorkflowAction::ConnectSucceeded)?;
        self.push_log(
            at,
            Severity::Info,
            format!(
                "wallet connected: {} on chain {}",
                session.address, session.chain_id
            ),
        );

        let balance = {
            let client = self.client_for(session.kind);
            client.native_balance(&session.address)
        };
        match balance {
            Ok(raw) => {
                let display = format_base_units(raw, session.kind.native_exponent());
                self.push_log(
                    at,
                    Severity::Info,
                    format!("native balance: {display} {}", session.kind.native_symbol()),
                );
            }
            Err(e) => {
                self.push_log(at, Severity::Warn, format!("native balance read failed: {e}"));
            }
        }

        Ok(session)
    }

    /// Tears the session down and aborts any in-flight run.
    pub fn disconnect(&mut self) -> Result<(), EngineError> {
        let at = self.now()?;
        self.abort_active_run(at, "wallet disconnected")?;
        if self.sessions.is_connected() {
            self.sessions.replace(
                None,
                SessionChange::Disconnected {
                    reason: "disconnect requested".to_owned(),
                },
            );
        }
        self.force_state(WorkflowState::Idle, "session closed");
        self.push_log(at, Severity::Info, "wallet disconnected");
        Ok(())
    }

    /// Begins an approval run: balance and allowance reads, then the
    /// confirmation gate. Nothing is broadcast until
    /// [`WorkflowEngine::confirm`] receives an explicit `true`.
    pub fn start(&mut self, request: ApprovalRequest) -> Result<(), EngineError> {
        if self.run.is_some() {
            return Err(EngineError::RunInFlight);
        }
        let session = self
            .sessions
            .current()
            .cloned()
            .ok_or(EngineError::NoSession)?;
        let at = self.now()?;

        self.transition(WorkflowAction::BeginChecks)?;
        self.run = Some(ApprovalRun::new(request.clone(), false, &session));

        if let Err(e) = self.run_checks(at, &session, &request) {
            self.push_log(at, Severity::Error, format!("token read failed: {e}"));
            self.transition(WorkflowAction::ChecksFailed)?;
            self.run = None;
            self.settle()?;
            return Err(e);
        }

        self.transition(WorkflowAction::ChecksComplete)?;
        let (decimals, symbol) = match self.run.as_ref().and_then(|r| r.descriptor.as_ref()) {
            Some(d) => (d.decimals, d.symbol.clone()),
            None => (0, String::new()),
        };
        let amount_display = match request.amount {
            ApprovalAmount::Unlimited => "unlimited".to_owned(),
            ApprovalAmount::Limited(raw) => format_base_units(raw, decimals),
        };
        self.push_log(
            at,
            Severity::Info,
            format!(
                "awaiting confirmation: approve({}, {amount_display} {symbol}); nothing is sent without explicit consent",
                request.spender
            ),
        );
        if request.amount.is_unlimited() {
            self.push_log(
                at,
                Severity::Warn,
                "unlimited approval requested; the spender could transfer the entire balance at any time",
            );
        }
        Ok(())
    }

    /// Sequential pre-checks: descriptor (cached per chain and contract,
    /// decimals never re-read after first success), then balance, then a
    /// fresh allowance read against the just-connected address.
    fn run_checks(
        &mut self,
        at: TimestampMs,
        session: &Session,
        request: &ApprovalRequest,
    ) -> Result<(), EngineError> {
        let key = (session.chain_id, request.token.clone());
        let descriptor = match self.descriptors.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let fetched = {
                    let client = self.client_for(session.kind);
                    TokenAccessor::new(client).describe(&request.token)?
                };
                self.descriptors.insert(key, fetched.clone());
                fetched
            }
        };

        let balance = {
            let client = self.client_for(session.kind);
            TokenAccessor::new(client).balance_of(&session.address, &request.token)
        };
        let balance = match balance {
            Ok(raw) => Some(raw),
            Err(e) => {
                self.push_log(at, Severity::Warn, format!("balance read failed: {e}"));
                None
            }
        };

        let allowance = {
            let client = self.client_for(session.kind);
            TokenAccessor::new(client).allowance_of(
                &session.address,
                &request.spender,
                &request.token,
            )
        };
        let allowance_raw = match allowance {
            Ok(raw) => raw,
            Err(e) => {
                self.push_log(
                    at,
                    Severity::Warn,
                    format!("allowance read failed, treating as no visible allowance: {e}"),
                );
                U256::ZERO
            }
        };

        if let Some(raw) = balance {
            self.push_log(
                at,
                Severity::Info,
                format!(
                    "{} balance: {}",
                    descriptor.symbol,
                    format_base_units(raw, descriptor.decimals)
                ),
            );
        }
        self.push_log(
            at,
            Severity::Info,
            format!(
                "current allowance for {}: {}",
                request.spender,
                format_base_units(allowance_raw, descriptor.decimals)
            ),
        );

        if let Some(run) = self.run.as_mut() {
            run.descriptor = Some(descriptor);
            run.balance_raw = balance;
            run.allowance = Some(AllowanceSnapshot {
                owner: session.address.clone(),
                spender: request.spender.clone(),
                raw_amount: allowance_raw,
                observed_at: at,
            });
        }
        Ok(())
    }

    /// The user-consent gate. `false` cancels the run without sending
    /// anything; `true` submits, but only if the session still matches the
    /// one the checks ran against.
    pub fn confirm(&mut self, approved: bool) -> Result<(), EngineError> {
        if self.state != WorkflowState::AwaitingConfirmation {
            return Err(EngineError::Validation(
                "no approval awaiting confirmation".to_owned(),
            ));
        }
        let at = self.now()?;

        if !approved {
            self.transition(WorkflowAction::Decline)?;
            self.push_log(
                at,
                Severity::Info,
                "declined at the confirmation gate; no transaction was sent",
            );
            self.run = None;
            self.settle()?;
            return Ok(());
        }

        let bound_ok = match (self.run.as_ref(), self.sessions.current()) {
            (Some(run), Some(session)) => {
                session.address == run.bound_address && session.chain_id == run.bound_chain_id
            }
            _ => false,
        };
        if !bound_ok {
            self.transition(WorkflowAction::Abort)?;
            self.push_log(
                at,
                Severity::Warn,
                "session changed since the checks ran; approval aborted",
            );
            self.run = None;
            self.settle()?;
            return Err(EngineError::StaleSession);
        }

        self.transition(WorkflowAction::Approve)?;
        self.submit_current(at)
    }

    /// Revocation: an approve-for-zero that skips the pre-check narrative
    /// and goes straight to broadcast plus the usual confirmation poll.
    pub fn revoke(&mut self) -> Result<(), EngineError> {
        if self.run.is_some() {
            return Err(EngineError::RunInFlight);
        }
        let session = self
            .sessions
            .current()
            .cloned()
            .ok_or(EngineError::NoSession)?;
        let at = self.now()?;

        self.transition(WorkflowAction::BeginRevocation)?;
        let request = ApprovalRequest {
            token: self.config.token_contract.clone(),
            spender: self.config.spender.clone(),
            amount: ApprovalAmount::Limited(U256::ZERO),
        };
        self.push_log(
            at,
            Severity::Info,
            format!("revoking allowance: approve({}, 0)", request.spender),
        );
        self.run = Some(ApprovalRun::new(request, true, &session));
        self.submit_current(at)
    }

    fn submit_current(&mut self, at: TimestampMs) -> Result<(), EngineError> {
        let (token, spender, raw, revocation) = match self.run.as_ref() {
            Some(run) => (
                run.request.token.clone(),
                run.request.spender.clone(),
                run.request.amount.raw(),
                run.revocation,
            ),
            None => return Err(EngineError::Validation("no active run".to_owned())),
        };
        let session = self
            .sessions
            .current()
            .cloned()
            .ok_or(EngineError::NoSession)?;

        let args = [
            Value::String(spender.to_string()),
            Value::String(raw.to_string()),
        ];
        let sent = {
            let client = self.client_for(session.kind);
            client.send(&token, "approve", &args, &self.config.fee)
        };

        match sent {
            Ok(tx_id) => {
                let record = TransactionRecord {
                    tx_id: tx_id.clone(),
                    submitted_at: at,
                    status: TxStatus::Pending,
                    fee_consumed: None,
                };
                if let Some(run) = self.run.as_mut() {
                    run.tx = Some(record.clone());
                    run.poll = Some(Poller::after_interval(
                        at.0,
                        self.config.poll_interval_ms,
                        self.config.poll_max_attempts,
                    ));
                }
                self.transition(WorkflowAction::BroadcastSucceeded)?;
                self.events.push(EngineEvent::TransactionRecorded(record));
                self.push_log(
                    at,
                    Severity::Info,
                    format!("transaction {tx_id} broadcast; polling for confirmation"),
                );
                Ok(())
            }
            Err(EngineError::UserRejected) => {
                if revocation {
                    self.transition(WorkflowAction::Abort)?;
                    self.push_log(at, Severity::Info, "revocation rejected in the wallet");
                    self.run = None;
                    self.settle()?;
                } else {
                    self.transition(WorkflowAction::BroadcastRejected)?;
                    self.push_log(
                        at,
                        Severity::Info,
                        "rejected in the wallet; still awaiting confirmation",
                    );
                }
                Err(EngineError::UserRejected)
            }
            Err(e) => {
                self.transition(WorkflowAction::BroadcastFailed)?;
                let message = match &e {
                    EngineError::InsufficientResources(detail) => {
                        format!("insufficient fee resources, top up and retry: {detail}")
                    }
                    other => format!("broadcast failed: {other}"),
                };
                self.push_log(at, Severity::Error, message);
                self.run = None;
                self.settle()?;
                Err(e)
            }
        }
    }

    /// Cancels whatever is cancellable: the probe watch, a run waiting at
    /// the gate (pending reads discarded), or the confirmation poll. A
    /// broadcast already in flight cannot be recalled.
    pub fn cancel(&mut self) -> Result<(), EngineError> {
        let at = self.now()?;
        if self.probe.watching() {
            self.probe.cancel_watch();
            self.push_log(at, Severity::Info, "provider watch cancelled");
        }
        match self.state {
            WorkflowState::AwaitingConfirmation => {
                self.transition(WorkflowAction::Abort)?;
                self.push_log(
                    at,
                    Severity::Info,
                    "approval run cancelled; pending reads discarded",
                );
                self.run = None;
                self.settle()?;
            }
            WorkflowState::AwaitingOnChainConfirmation => {
                self.transition(WorkflowAction::Abort)?;
                self.push_log(
                    at,
                    Severity::Warn,
                    "stopped watching the broadcast transaction; it may still confirm, check a block explorer",
                );
                self.finish_run();
                self.settle()?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Advances every pending timer: the probe watch and the confirmation
    /// poll. Drivers call this on their own cadence; tests drive it with a
    /// manual clock.
    pub fn tick(&mut self) -> Result<(), EngineError> {
        let at = self.now()?;
        self.tick_probe(at)?;
        self.tick_confirmation(at)
    }

    fn tick_probe(&mut self, at: TimestampMs) -> Result<(), EngineError> {
        if !self.probe.watching() {
            return Ok(());
        }
        match self.probe.poll_watch(at.0)? {
            WatchTurn::NotDue => {}
            WatchTurn::Found(handle) => {
                self.push_log(
                    at,
                    Severity::Info,
                    format!("detected injected {} provider", handle.kind),
                );
                self.handle = Some(handle);
            }
            WatchTurn::StillSearching(_) => {
                if !self.deep_link_suggested && self.probe.profile()?.mobile {
                    if let Some(url) = self.config.deep_link_template.clone() {
                        self.deep_link_suggested = true;
                        self.events.push(EngineEvent::DeepLinkSuggested { url });
                        self.push_log(
                            at,
                            Severity::Info,
                            "no provider injected yet; a wallet deep link is available",
                        );
                    }
                }
            }
            WatchTurn::TimedOut => {
                self.push_log(at, Severity::Warn, "no wallet provider found; watch ended");
            }
        }
        Ok(())
    }

    fn tick_confirmation(&mut self, at: TimestampMs) -> Result<(), EngineError> {
        if self.state != WorkflowState::AwaitingOnChainConfirmation {
            return Ok(());
        }
        let (turn, exhausted, tx_id) = match self.run.as_mut() {
            Some(run) => {
                let Some(poll) = run.poll.as_mut() else {
                    return Ok(());
                };
                let turn = poll.poll(at.0);
                let exhausted = poll.exhausted();
                let Some(tx_id) = run.tx.as_ref().map(|tx| tx.tx_id.clone()) else {
                    return Ok(());
                };
                (turn, exhausted, tx_id)
            }
            None => return Ok(()),
        };
        let PollTurn::Due(attempt) = turn else {
            return Ok(());
        };
        let kind = match self.sessions.current() {
            Some(session) => session.kind,
            None => return Ok(()),
        };

        let probe = {
            let client = self.client_for(kind);
            client.transaction_status(&tx_id)
        };
        match probe {
            Ok(TxProbe::Confirmed { fee_consumed }) => {
                self.set_tx_outcome(TxStatus::Confirmed, fee_consumed);
                let mut summary = format!("transaction {tx_id} confirmed");
                if let Some(fee) = fee_consumed {
                    summary.push_str(&format!(
                        ", fee consumed: {} {}",
                        format_base_units(fee, kind.native_exponent()),
                        kind.native_symbol()
                    ));
                }
                self.push_log(at, Severity::Info, summary);
                self.transition(WorkflowAction::StatusConfirmed)?;
                self.finish_run();
                self.settle()?;
            }
            Ok(TxProbe::Failed { reason }) => {
                self.set_tx_outcome(TxStatus::Failed, None);
                self.push_log(
                    at,
                    Severity::Error,
                    format!("transaction {tx_id} failed on chain: {reason}"),
                );
                self.transition(WorkflowAction::StatusFailed)?;
                self.finish_run();
                self.settle()?;
            }
            Ok(TxProbe::Pending) => {
                if exhausted {
                    self.timeout_run(at, &tx_id, attempt)?;
                }
            }
            Err(e) => {
                // A failed status check is retryable; the attempt bound still
                // guarantees termination.
                self.push_log(
                    at,
                    Severity::Warn,
                    format!("status check {attempt} failed: {e}"),
                );
                if exhausted {
                    self.timeout_run(at, &tx_id, attempt)?;
                }
            }
        }
        Ok(())
    }

    /// Account rotation or disconnect from the provider surface. Any
    /// in-flight run prepared against the old address is aborted before the
    /// session record is replaced wholesale.
    pub fn on_accounts_changed(
        &mut self,
        next: Option<AccountAddress>,
    ) -> Result<(), EngineError> {
        let at = self.now()?;
        match next {
            None => {
                self.abort_active_run(at, "wallet account disconnected")?;
                if self.sessions.is_connected() {
                    self.sessions.replace(
                        None,
                        SessionChange::Disconnected {
                            reason: "accounts changed to empty".to_owned(),
                        },
                    );
                    self.push_log(
                        at,
                        Severity::Warn,
                        "wallet account disconnected; session cleared",
                    );
                }
                self.force_state(WorkflowState::Idle, "session cleared");
            }
            Some(address) => {
                let Some(current) = self.sessions.current().cloned() else {
                    return Ok(());
                };
                if current.address == address {
                    return Ok(());
                }
                self.abort_active_run(at, "wallet account changed")?;
                let replacement = Session {
                    address: address.clone(),
                    connected_at: at,
                    ..current
                };
                self.sessions
                    .replace(Some(replacement), SessionChange::AccountReplaced);
                self.push_log(at, Severity::Info, format!("active account replaced: {address}"));
            }
        }
        Ok(())
    }

    /// Chain switch from the provider surface; same invalidation policy as
    /// an account change.
    pub fn on_chain_changed(&mut self, chain_id: u64) -> Result<(), EngineError> {
        let at = self.now()?;
        let Some(current) = self.sessions.current().cloned() else {
            return Ok(());
        };
        if current.chain_id == chain_id {
            return Ok(());
        }
        self.abort_active_run(at, "network changed")?;

        let mismatch = self
            .config
            .expected_chain_id
            .is_some_and(|expected| expected != chain_id);
        if mismatch && self.config.enforce_expected_chain {
            self.sessions.replace(
                None,
                SessionChange::Disconnected {
                    reason: "network mismatch".to_owned(),
                },
            );
            self.push_log(
                at,
                Severity::Error,
                format!("switched to unsupported chain {chain_id}; session closed"),
            );
            self.force_state(WorkflowState::Idle, "session cleared");
            return Ok(());
        }

        let replacement = Session {
            chain_id,
            connected_at: at,
            ..current
        };
        self.sessions
            .replace(Some(replacement), SessionChange::ChainReplaced);
        let severity = if mismatch { Severity::Warn } else { Severity::Info };
        self.push_log(at, severity, format!("network changed to chain {chain_id}"));
        Ok(())
    }

    /// Session-gated message signing pass-through.
    pub fn sign_message(&mut self, message: &str) -> Result<String, EngineError> {
        let session = self
            .sessions
            .current()
            .cloned()
            .ok_or(EngineError::NoSession)?;
        let at = self.now()?;
        let signed = {
            let client = self.client_for(session.kind);
            client.sign_message(&session.address, message)
        };
        match signed {
            Ok(signature) => {
                self.push_log(
                    at,
                    Severity::Info,
                    format!("message signed by {}", session.address),
                );
                Ok(signature)
            }
            Err(e) => {
                self.push_log(at, Severity::Warn, format!("message signing failed: {e}"));
                Err(e)
            }
        }
    }

    /// Native-coin balance of the session address, in base units.
    pub fn native_balance(&mut self) -> Result<U256, EngineError> {
        let session = self
            .sessions
            .current()
            .cloned()
            .ok_or(EngineError::NoSession)?;
        let at = self.now()?;
        let raw = {
            let client = self.client_for(session.kind);
            client.native_balance(&session.address)?
        };
        self.push_log(
            at,
            Severity::Info,
            format!(
                "native balance: {} {}",
                format_base_units(raw, session.kind.native_exponent()),
                session.kind.native_symbol()
            ),
        );
        Ok(raw)
    }

    /// Explicitly not a definite failure: the transaction may still land.
    fn timeout_run(
        &mut self,
        at: TimestampMs,
        tx_id: &str,
        attempts: u32,
    ) -> Result<(), EngineError> {
        self.set_tx_outcome(TxStatus::TimedOut, None);
        self.push_log(
            at,
            Severity::Warn,
            format!(
                "transaction {tx_id} not confirmed after {attempts} checks; it may still land, verify on a block explorer"
            ),
        );
        self.transition(WorkflowAction::PollExhausted)?;
        self.finish_run();
        self.settle()
    }

    fn now(&self) -> Result<TimestampMs, EngineError> {
        Ok(TimestampMs(self.clock.now_ms()?))
    }

    fn client_for(&self, kind: ProviderKind) -> &dyn ChainClientPort {
        match kind {
            ProviderKind::Evm => &self.evm,
            ProviderKind::Tron => &self.tron,
        }
    }

    fn push_log(&mut self, at: TimestampMs, severity: Severity, message: impl Into<String>) {
        self.log.push(WorkflowLogEntry {
            at,
            severity,
            message: message.into(),
        });
    }

    fn transition(&mut self, action: WorkflowAction) -> Result<StateTransition, EngineError> {
        let (next, transition) = workflow_transition(self.state, action)?;
        self.state = next;
        self.events
            .push(EngineEvent::StateChanged(transition.clone()));
        Ok(transition)
    }

    fn force_state(&mut self, to: WorkflowState, reason: &'static str) {
        if self.state == to {
            return;
        }
        let transition = StateTransition {
            from: self.state,
            to,
            reason,
        };
        self.state = to;
        self.events.push(EngineEvent::StateChanged(transition));
    }

    /// Settles a terminal state back to its retry baseline, then corrects
    /// for a missing session (aborts may have cleared it).
    fn settle(&mut self) -> Result<(), EngineError> {
        if !self.state.is_terminal() {
            return Ok(());
        }
        self.transition(WorkflowAction::Settle)?;
        if self.state == WorkflowState::Connected && !self.sessions.is_connected() {
            self.force_state(WorkflowState::Idle, "no live session");
        }
        Ok(())
    }

    fn set_tx_outcome(&mut self, status: TxStatus, fee_consumed: Option<U256>) {
        if let Some(run) = self.run.as_mut() {
            if let Some(poll) = run.poll.as_mut() {
                poll.cancel();
            }
            if let Some(tx) = run.tx.as_mut() {
                if tx.status == TxStatus::Pending {
                    tx.status = status;
                    tx.fee_consumed = fee_consumed;
                }
            }
        }
    }

    /// Drops the active run, preserving its transaction record and
    /// releasing its poller.
    fn finish_run(&mut self) {
        if let Some(mut run) = self.run.take() {
            if let Some(poll) = run.poll.as_mut() {
                poll.cancel();
            }
            if let Some(tx) = run.tx.take() {
                self.last_tx = Some(tx);
            }
        }
    }

    fn abort_active_run(&mut self, at: TimestampMs, reason: &str) -> Result<bool, EngineError> {
        if self.run.is_none() {
            return Ok(false);
        }
        if matches!(
            self.state,
            WorkflowState::Checking
                | WorkflowState::AwaitingConfirmation
                | WorkflowState::Submitting
                | WorkflowState::AwaitingOnChainConfirmation
        ) {
            self.transition(WorkflowAction::Abort)?;
            self.push_log(at, Severity::Warn, format!("approval run aborted: {reason}"));
            self.finish_run();
            self.settle()?;
        } else {
            self.finish_run();
        }
        Ok(true)
    }
}
