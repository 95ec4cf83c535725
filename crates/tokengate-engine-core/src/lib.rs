pub mod config;
pub mod domain;
pub mod engine;
pub mod poller;
pub mod probe;
pub mod ports;
pub mod session;
pub mod state_machine;
pub mod token;

pub use config::{EngineConfig, FeeOptions};
pub use domain::{
    format_base_units, parse_base_units, AccountAddress, AllowanceSnapshot, AmountError,
    ApprovalAmount, ApprovalRequest, ProviderHandle, ProviderKind, Session, Severity, TimestampMs,
    TokenDescriptor, TransactionRecord, TxStatus, WorkflowLogEntry,
};
pub use engine::{EngineEvent, WorkflowEngine};
pub use poller::{PollTurn, Poller};
pub use probe::{ProviderProbe, WatchTurn};
pub use ports::{
    ChainClientPort, ClockPort, ConnectedAccount, EngineError, HostPort, HostProfile,
    ProviderEvent, ProviderEventKind, TxProbe,
};
pub use session::{SessionChange, SessionEvent, SessionStore};
pub use state_machine::{workflow_transition, StateTransition, WorkflowAction, WorkflowState};
pub use token::{TokenAccessor, FALLBACK_NAME, FALLBACK_SYMBOL};
