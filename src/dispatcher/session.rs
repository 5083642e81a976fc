//! Per-origin chain sessions.
//!
//! A session moves `Disconnected → AwaitingAuthorization → Connected` and
//! back to `Disconnected` on revoke or a forced disconnect. Chain switches
//! keep it `Connected`.

use std::collections::BTreeSet;

use alloy::primitives::Address;
use dashmap::DashMap;
use serde::Serialize;

use crate::provider::ChainId;

/// Permission granted by a successful account request.
pub const ACCOUNTS_PERMISSION: &str = "eth_accounts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Disconnected,
    AwaitingAuthorization,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSession {
    pub origin: String,
    pub chain_id: ChainId,
    pub active_account: Option<Address>,
    pub permissions: BTreeSet<String>,
    pub state: SessionState,
}

impl ChainSession {
    pub fn new(origin: impl Into<String>, chain_id: ChainId) -> Self {
        Self {
            origin: origin.into(),
            chain_id,
            active_account: None,
            permissions: BTreeSet::new(),
            state: SessionState::Disconnected,
        }
    }

    pub fn connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn is_authorized(&self) -> bool {
        self.permissions.contains(ACCOUNTS_PERMISSION)
    }

    pub fn begin_authorization(&mut self) {
        if self.state == SessionState::Disconnected {
            self.state = SessionState::AwaitingAuthorization;
        }
    }

    /// Grant account access. Returns whether the exposed account changed.
    pub fn authorize(&mut self, account: Address) -> bool {
        self.permissions.insert(ACCOUNTS_PERMISSION.to_string());
        self.state = SessionState::Connected;
        self.set_account(Some(account))
    }

    pub fn abort_authorization(&mut self) {
        if self.state == SessionState::AwaitingAuthorization {
            self.state = SessionState::Disconnected;
        }
    }

    /// Returns `false` when `chain_id` is already current.
    pub fn switch_chain(&mut self, chain_id: ChainId) -> bool {
        if self.chain_id == chain_id {
            return false;
        }
        self.chain_id = chain_id;
        true
    }

    pub fn set_account(&mut self, account: Option<Address>) -> bool {
        if self.active_account == account {
            return false;
        }
        self.active_account = account;
        true
    }

    /// Drop every grant. Returns whether anything was authorized.
    pub fn revoke(&mut self) -> bool {
        let was_authorized = self.is_authorized();
        self.permissions.clear();
        self.active_account = None;
        self.state = SessionState::Disconnected;
        was_authorized
    }
}

/// Sessions keyed by origin.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, ChainSession>,
    default_chain: ChainId,
}

impl SessionRegistry {
    pub fn new(default_chain: ChainId) -> Self {
        Self {
            sessions: DashMap::new(),
            default_chain,
        }
    }

    /// Snapshot of the session for `origin`, creating it on first sight.
    pub fn get(&self, origin: &str) -> ChainSession {
        self.sessions
            .entry(origin.to_string())
            .or_insert_with(|| ChainSession::new(origin, self.default_chain))
            .clone()
    }

    pub fn update<R>(&self, origin: &str, f: impl FnOnce(&mut ChainSession) -> R) -> R {
        let mut entry = self
            .sessions
            .entry(origin.to_string())
            .or_insert_with(|| ChainSession::new(origin, self.default_chain));
        f(entry.value_mut())
    }

    /// Apply `f` to every authorized session, returning the origins for which it returned `true`.
    pub fn update_authorized(&self, mut f: impl FnMut(&mut ChainSession) -> bool) -> Vec<String> {
        let mut touched = Vec::new();
        for mut entry in self.sessions.iter_mut() {
            if entry.is_authorized() && f(entry.value_mut()) {
                touched.push(entry.origin.clone());
            }
        }
        touched
    }

    pub fn authorized_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.is_authorized())
            .map(|s| s.origin.clone())
            .collect();
        origins.sort();
        origins
    }

    pub fn list(&self) -> Vec<ChainSession> {
        let mut sessions: Vec<ChainSession> = self.sessions.iter().map(|s| s.clone()).collect();
        sessions.sort_by(|a, b| a.origin.cmp(&b.origin));
        sessions
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.sessions.contains_key(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://app.example";

    #[test]
    fn authorization_state_machine() {
        let mut session = ChainSession::new(ORIGIN, 1);
        assert_eq!(session.state, SessionState::Disconnected);

        session.begin_authorization();
        assert_eq!(session.state, SessionState::AwaitingAuthorization);

        assert!(session.authorize(Address::repeat_byte(1)));
        assert!(session.connected());
        assert!(session.is_authorized());

        // Chain switch keeps the session connected.
        assert!(session.switch_chain(137));
        assert!(!session.switch_chain(137));
        assert!(session.connected());

        assert!(session.revoke());
        assert_eq!(session.state, SessionState::Disconnected);
        assert!(session.active_account.is_none());
        assert!(!session.revoke());
    }

    #[test]
    fn aborted_authorization_returns_to_disconnected() {
        let mut session = ChainSession::new(ORIGIN, 1);
        session.begin_authorization();
        session.abort_authorization();
        assert_eq!(session.state, SessionState::Disconnected);
        assert!(!session.is_authorized());
    }

    #[test]
    fn registry_updates_only_authorized_sessions() {
        let registry = SessionRegistry::new(1);
        registry.update(ORIGIN, |s| s.authorize(Address::repeat_byte(1)));
        registry.get("https://other.example");

        let touched = registry.update_authorized(|s| s.set_account(Some(Address::repeat_byte(2))));
        assert_eq!(touched, vec![ORIGIN.to_string()]);
        assert_eq!(registry.get("https://other.example").active_account, None);
        assert_eq!(registry.authorized_origins(), vec![ORIGIN.to_string()]);
        assert_eq!(registry.list().len(), 2);
    }
}
