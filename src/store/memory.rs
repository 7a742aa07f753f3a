use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::schema::{
    Channel, Lead, LeadStatus, Message, MessageStatus, NewOutreachEvent, THREAD_AWAITING_REPLY,
    Thread,
};
use crate::store::{DispatchCandidate, Store};

/// In-memory stand-in for the production store. Claim semantics mirror the
/// conditional update: only a `queued` message can be claimed, and exactly
/// one claimant wins.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    leads: HashMap<Uuid, Lead>,
    threads: HashMap<Uuid, Thread>,
    messages: HashMap<Uuid, Message>,
    events: Vec<NewOutreachEvent>,
    deny_claims: bool,
    fail_claims: bool,
    fail_thread_updates: bool,
    fail_events: bool,
}

impl MemStore {
    pub fn insert_lead(&self, lead: Lead) {
        self.inner.lock().unwrap().leads.insert(lead.id, lead);
    }

    pub fn insert_thread(&self, thread: Thread) {
        self.inner.lock().unwrap().threads.insert(thread.id, thread);
    }

    pub fn insert_message(&self, message: Message) {
        self.inner.lock().unwrap().messages.insert(message.id, message);
    }

    pub fn message(&self, id: Uuid) -> Message {
        self.inner.lock().unwrap().messages[&id].clone()
    }

    pub fn lead(&self, id: Uuid) -> Lead {
        self.inner.lock().unwrap().leads[&id].clone()
    }

    pub fn thread(&self, id: Uuid) -> Thread {
        self.inner.lock().unwrap().threads[&id].clone()
    }

    pub fn events(&self) -> Vec<NewOutreachEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    /// Every claim reports zero rows affected, as if another run won the race.
    pub fn deny_claims(&self) {
        self.inner.lock().unwrap().deny_claims = true;
    }

    /// Every claim errors, as if the store connection dropped.
    pub fn fail_claims(&self) {
        self.inner.lock().unwrap().fail_claims = true;
    }

    pub fn fail_thread_updates(&self) {
        self.inner.lock().unwrap().fail_thread_updates = true;
    }

    pub fn fail_events(&self) {
        self.inner.lock().unwrap().fail_events = true;
    }
}

#[async_trait]
impl Store for MemStore {
    async fn queued_messages(
        &self,
        channels: &[Channel],
        limit: i64,
    ) -> Result<Vec<DispatchCandidate>> {
        let inner = self.inner.lock().unwrap();
        let mut queued: Vec<&Message> = inner
            .messages
            .values()
            .filter(|m| {
                m.direction == crate::schema::Direction::Outbound
                    && m.status == MessageStatus::Queued
                    && channels.contains(&m.channel)
            })
            .collect();
        queued.sort_by_key(|m| {
            (m.scheduled_at.is_some(), m.scheduled_at.clone().unwrap_or_default(), m.created_at)
        });

        Ok(queued
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|m| DispatchCandidate {
                message: m.clone(),
                lead: inner.leads.get(&m.lead_id).cloned(),
            })
            .collect())
    }

    async fn claim_message(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_claims {
            bail!("store unavailable");
        }
        if inner.deny_claims {
            return Ok(false);
        }
        match inner.messages.get_mut(&id) {
            Some(message) if message.status == MessageStatus::Queued => {
                message.status = MessageStatus::Sent;
                message.sent_at = Some(now);
                message.error_code = None;
                message.error_message = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_delivered(
        &self,
        id: Uuid,
        provider: &str,
        provider_message_id: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = inner.messages.get_mut(&id) {
            message.status = MessageStatus::Delivered;
            message.provider = Some(provider.to_string());
            message.provider_message_id = provider_message_id.map(str::to_string);
            message.error_code = None;
            message.error_message = None;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error_code: &str, error_message: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = inner.messages.get_mut(&id) {
            message.status = MessageStatus::Failed;
            message.sent_at = None;
            message.error_code = Some(error_code.to_string());
            message.error_message = Some(error_message.to_string());
        }
        Ok(())
    }

    async fn touch_thread_outbound(&self, thread_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_thread_updates {
            bail!("store unavailable");
        }
        if let Some(thread) = inner.threads.get_mut(&thread_id) {
            thread.status = THREAD_AWAITING_REPLY.to_string();
            thread.last_outbound_at = Some(now);
        }
        Ok(())
    }

    async fn mark_lead_contacted(&self, lead_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(lead) = inner.leads.get_mut(&lead_id) {
            if matches!(lead.status, LeadStatus::New | LeadStatus::Queued) {
                lead.status = LeadStatus::Contacted;
                lead.last_contacted_at = Some(now);
            }
        }
        Ok(())
    }

    async fn record_event(&self, event: NewOutreachEvent) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_events {
            bail!("store unavailable");
        }
        inner.events.push(event);
        Ok(())
    }
}
