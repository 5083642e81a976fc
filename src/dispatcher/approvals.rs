//! External-request table for interactive approvals.
//!
//! Each request that needs a human decision gets a numeric id and a oneshot
//! responder. Decisions resolve exactly one entry. When the owning channel
//! disconnects its entries are dropped, which wakes the waiting handler with
//! an abandoned result instead of a decision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};

use crate::dispatcher::ChannelId;
use crate::observability::metrics;
use crate::protocol::{Method, RequestContext};

pub type ApprovalId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Decision {
    Approve,
    Reject,
}

/// What the approval surface sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub channel: ChannelId,
    pub origin: String,
    pub method: String,
    pub params: Value,
    pub context: Option<RequestContext>,
    /// Unix seconds.
    pub created_at: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("no pending approval with id {0}")]
    Unknown(ApprovalId),
}

struct Pending {
    request: ApprovalRequest,
    responder: oneshot::Sender<Decision>,
}

pub struct ApprovalTable {
    next_id: AtomicU64,
    pending: DashMap<ApprovalId, Pending>,
    opened: broadcast::Sender<ApprovalRequest>,
}

impl ApprovalTable {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Table whose first entry gets `first_id`.
    pub fn starting_at(first_id: ApprovalId) -> Self {
        let (opened, _) = broadcast::channel(64);
        Self {
            next_id: AtomicU64::new(first_id),
            pending: DashMap::new(),
            opened,
        }
    }

    /// Notified with every newly opened request.
    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalRequest> {
        self.opened.subscribe()
    }

    pub fn open(
        &self,
        channel: ChannelId,
        origin: &str,
        method: Method,
        params: Value,
        context: Option<RequestContext>,
    ) -> (ApprovalRequest, oneshot::Receiver<Decision>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = ApprovalRequest {
            id,
            channel,
            origin: origin.to_string(),
            method: method.as_str().to_string(),
            params,
            context,
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        };
        let (responder, decision) = oneshot::channel();
        self.pending.insert(
            id,
            Pending {
                request: request.clone(),
                responder,
            },
        );
        metrics::record_pending_approvals(self.pending.len());
        tracing::debug!(approval_id = id, origin = %origin, method = %method, "Approval pending");
        let _ = self.opened.send(request.clone());
        (request, decision)
    }

    /// Record a decision for `id`. Other entries are untouched.
    pub fn resolve(&self, id: ApprovalId, decision: Decision) -> Result<ApprovalRequest, ApprovalError> {
        let (_, pending) = self.pending.remove(&id).ok_or(ApprovalError::Unknown(id))?;
        metrics::record_pending_approvals(self.pending.len());
        if pending.responder.send(decision).is_err() {
            tracing::debug!(approval_id = id, "Decision arrived after the requester went away");
        }
        tracing::info!(approval_id = id, decision = ?decision, "Approval resolved");
        Ok(pending.request)
    }

    /// Remove an entry without a decision (requester timed out).
    pub fn discard(&self, id: ApprovalId) -> bool {
        let removed = self.pending.remove(&id).is_some();
        if removed {
            metrics::record_pending_approvals(self.pending.len());
        }
        removed
    }

    /// Drop every entry owned by `channel`. Returns how many were abandoned.
    pub fn abandon_channel(&self, channel: ChannelId) -> usize {
        let ids: Vec<ApprovalId> = self
            .pending
            .iter()
            .filter(|p| p.request.channel == channel)
            .map(|p| *p.key())
            .collect();
        let abandoned = ids.into_iter().filter(|id| self.pending.remove(id).is_some()).count();
        if abandoned > 0 {
            metrics::record_pending_approvals(self.pending.len());
            tracing::info!(channel, abandoned, "Approvals abandoned on channel close");
        }
        abandoned
    }

    pub fn get(&self, id: ApprovalId) -> Option<ApprovalRequest> {
        self.pending.get(&id).map(|p| p.request.clone())
    }

    /// Pending requests, oldest first.
    pub fn list(&self) -> Vec<ApprovalRequest> {
        let mut requests: Vec<ApprovalRequest> = self.pending.iter().map(|p| p.request.clone()).collect();
        requests.sort_by_key(|r| r.id);
        requests
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for ApprovalTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolving_one_leaves_the_other_pending() {
        let table = ApprovalTable::starting_at(7);
        let (seven, mut seven_rx) = table.open(1, "https://a.example", Method::PersonalSign, json!([]), None);
        let (eight, eight_rx) = table.open(1, "https://a.example", Method::PersonalSign, json!([]), None);
        assert_eq!((seven.id, eight.id), (7, 8));

        table.resolve(8, Decision::Reject).unwrap();
        assert_eq!(eight_rx.await.unwrap(), Decision::Reject);

        assert!(seven_rx.try_recv().is_err());
        assert_eq!(table.list().iter().map(|r| r.id).collect::<Vec<_>>(), vec![7]);
        assert_eq!(table.resolve(8, Decision::Approve), Err(ApprovalError::Unknown(8)));
    }

    #[tokio::test]
    async fn channel_close_abandons_only_its_entries() {
        let table = ApprovalTable::new();
        let (_, closed_rx) = table.open(1, "https://a.example", Method::SendTransaction, json!([]), None);
        let (kept, _kept_rx) = table.open(2, "https://b.example", Method::SendTransaction, json!([]), None);

        assert_eq!(table.abandon_channel(1), 1);
        assert!(closed_rx.await.is_err());
        assert_eq!(table.list(), vec![kept]);
    }
}
