use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::schema::{Channel, Lead, Message, NewOutreachEvent};

pub mod pg;

#[cfg(test)]
pub mod memory;

pub use pg::PgStore;

/// One row of the dispatch queue: a queued message plus its joined lead.
/// The lead is optional because a dangling lead reference is a per-message
/// failure, not a reason to drop the row from the queue silently.
#[derive(Debug, Clone)]
pub struct DispatchCandidate {
    pub message: Message,
    pub lead: Option<Lead>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Queued outbound messages on the given channels, oldest schedule first
    /// (unscheduled rows ahead of scheduled ones), bounded by `limit`.
    async fn queued_messages(
        &self,
        channels: &[Channel],
        limit: i64,
    ) -> Result<Vec<DispatchCandidate>>;

    /// Conditional `queued -> sent` transition. `Ok(true)` means this caller
    /// owns the message; `Ok(false)` means another run claimed it first and
    /// the caller must skip it. An `Err` is a store problem, not contention.
    async fn claim_message(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    async fn mark_delivered(
        &self,
        id: Uuid,
        provider: &str,
        provider_message_id: Option<&str>,
    ) -> Result<()>;

    async fn mark_failed(&self, id: Uuid, error_code: &str, error_message: &str) -> Result<()>;

    async fn touch_thread_outbound(&self, thread_id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Advances the lead to `contacted` and stamps the contact time, but only
    /// from `new` or `queued`. Downstream CRM statuses are left alone.
    async fn mark_lead_contacted(&self, lead_id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Append-only audit insert. Callers treat failures as log-only.
    async fn record_event(&self, event: NewOutreachEvent) -> Result<()>;
}
