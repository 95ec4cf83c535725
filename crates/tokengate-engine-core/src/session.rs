use serde::{Deserialize, Serialize};

use crate::domain::Session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionChange {
    Connected,
    Disconnected { reason: String },
    AccountReplaced,
    ChainReplaced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub revision: u64,
    pub change: SessionChange,
    pub session: Option<Session>,
}

/// Process-wide session slot. Exactly one session is live at a time and it
/// is only ever replaced wholesale; listeners observe complete records via
/// the drained event stream, never a half-updated one.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: Option<Session>,
    revision: u64,
    events: Vec<SessionEvent>,
}

impl SessionStore {
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.current.is_some()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn replace(&mut self, next: Option<Session>, change: SessionChange) {
        self.current = next;
        self.revision += 1;
        self.events.push(SessionEvent {
            revision: self.revision,
            change,
            session: self.current.clone(),
        });
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountAddress, ProviderKind, TimestampMs};

    fn session(address: &str) -> Session {
        Session {
            address: AccountAddress::new(address),
            chain_id: 56,
            kind: ProviderKind::Evm,
            connected_at: TimestampMs(1),
        }
    }

    #[test]
    fn replace_is_whole_record_and_bumps_revision() {
        let mut store = SessionStore::default();
        store.replace(Some(session("0xaa")), SessionChange::Connected);
        store.replace(Some(session("0xbb")), SessionChange::AccountReplaced);

        assert_eq!(store.revision(), 2);
        assert_eq!(store.current().unwrap().address.as_str(), "0xbb");

        let events = store.drain_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].change, SessionChange::AccountReplaced);
        assert!(store.drain_events().is_empty());
    }

    #[test]
    fn disconnect_clears_the_slot() {
        let mut store = SessionStore::default();
        store.replace(Some(session("0xaa")), SessionChange::Connected);
        store.replace(
            None,
            SessionChange::Disconnected {
                reason: "account disconnected".to_owned(),
            },
        );
        assert!(!store.is_connected());
    }
}
