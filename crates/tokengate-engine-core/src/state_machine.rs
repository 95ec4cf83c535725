use serde::{Deserialize, Serialize};

use crate::ports::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    Idle,
    Connecting,
    Connected,
    Checking,
    AwaitingConfirmation,
    Submitting,
    AwaitingOnChainConfirmation,
    Completed,
    ConnectionFailed,
    UserCancelled,
    TransactionFailed,
    ConfirmationTimedOut,
}

impl WorkflowState {
    /// Terminal states of a single run. Each settles back to a retry
    /// baseline (`Connected`, or `Idle` after a connection failure).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Completed
                | WorkflowState::ConnectionFailed
                | WorkflowState::UserCancelled
                | WorkflowState::TransactionFailed
                | WorkflowState::ConfirmationTimedOut
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowAction {
    BeginConnect,
    ConnectSucceeded,
    ConnectFailed,
    BeginChecks,
    ChecksComplete,
    ChecksFailed,
    Approve,
    Decline,
    BeginRevocation,
    BroadcastSucceeded,
    BroadcastRejected,
    BroadcastFailed,
    StatusConfirmed,
    StatusFailed,
    PollExhausted,
    Abort,
    Settle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub reason: &'static str,
}

/// Total transition function for the approval workflow. Every reachable
/// (state, action) pair is listed; anything else is a hard error so the
/// machine can never wander into an undefined state.
pub fn workflow_transition(
    state: WorkflowState,
    action: WorkflowAction,
) -> Result<(WorkflowState, StateTransition), EngineError> {
    use WorkflowAction as A;
    use WorkflowState as S;

    let (to, reason) = match (state, action) {
        (S::Idle, A::BeginConnect) => (S::Connecting, "connect requested"),
        (S::Connecting, A::ConnectSucceeded) => (S::Connected, "session established"),
        (S::Connecting, A::ConnectFailed) => (S::ConnectionFailed, "provider connect failed"),

        (S::Connected, A::BeginChecks) => (S::Checking, "approval run started"),
        (S::Connected, A::BeginRevocation) => (S::Submitting, "revocation submits directly"),
        (S::Checking, A::ChecksComplete) => (S::AwaitingConfirmation, "reads complete"),
        (S::Checking, A::ChecksFailed) => (S::TransactionFailed, "pre-check read failed"),
        (S::Checking, A::Abort) => (S::UserCancelled, "run aborted during checks"),

        (S::AwaitingConfirmation, A::Approve) => (S::Submitting, "user approved"),
        (S::AwaitingConfirmation, A::Decline) => (S::UserCancelled, "user declined"),
        (S::AwaitingConfirmation, A::Abort) => (S::UserCancelled, "run aborted at gate"),

        (S::Submitting, A::BroadcastSucceeded) => {
            (S::AwaitingOnChainConfirmation, "transaction broadcast")
        }
        (S::Submitting, A::BroadcastRejected) => {
            (S::AwaitingConfirmation, "wallet prompt rejected")
        }
        (S::Submitting, A::BroadcastFailed) => (S::TransactionFailed, "broadcast failed"),
        (S::Submitting, A::Abort) => (S::UserCancelled, "revocation prompt rejected"),

        (S::AwaitingOnChainConfirmation, A::StatusConfirmed) => {
            (S::Completed, "transaction confirmed")
        }
        (S::AwaitingOnChainConfirmation, A::StatusFailed) => {
            (S::TransactionFailed, "transaction failed on chain")
        }
        (S::AwaitingOnChainConfirmation, A::PollExhausted) => {
            (S::ConfirmationTimedOut, "poll attempts exhausted")
        }
        (S::AwaitingOnChainConfirmation, A::Abort) => {
            (S::UserCancelled, "stopped watching confirmation")
        }

        (S::Completed, A::Settle)
        | (S::UserCancelled, A::Settle)
        | (S::TransactionFailed, A::Settle)
        | (S::ConfirmationTimedOut, A::Settle) => (S::Connected, "retry baseline"),
        (S::ConnectionFailed, A::Settle) => (S::Idle, "back to idle"),

        _ => {
            return Err(EngineError::IllegalTransition(format!(
                "{state:?} on {action:?}"
            )))
        }
    };

    Ok((to, StateTransition { from: state, to, reason }))
}
