use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::config::{DispatchConfig, ERROR_MESSAGE_MAX_CHARS};
use crate::schema::{Channel, EventType, Message, NewOutreachEvent};
use crate::services::email_client::EMAIL_PROVIDER;
use crate::services::x_client::X_PROVIDER;
use crate::services::{EmailClient, XClient};
use crate::store::{DispatchCandidate, Store};

/// Channels the dispatcher can actually deliver on. Discord leads exist
/// upstream but have no outbound adapter yet.
pub const SUPPORTED_CHANNELS: [Channel; 2] = [Channel::Email, Channel::Twitter];

const DISPATCH_FAILED_CODE: &str = "dispatch_failed";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub queued: u32,
    pub due: u32,
    pub processed: u32,
    pub delivered: u32,
    pub failed: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Failed(String),
    Skipped(Option<String>),
}

enum Adapter<'a> {
    Email(&'a EmailClient),
    X(&'a XClient),
}

/// One dispatch pass: select due queued messages, push each through the
/// per-message state machine, and report what happened. Only the initial
/// selection query can fail the whole run; everything per-message lands in
/// the summary.
pub async fn dispatch_tick(
    store: &dyn Store,
    config: &DispatchConfig,
    now: DateTime<Utc>,
) -> Result<DispatchSummary> {
    let candidates = store
        .queued_messages(&SUPPORTED_CHANNELS, config.fetch_limit())
        .await?;

    let mut summary = DispatchSummary {
        queued: candidates.len() as u32,
        ..DispatchSummary::default()
    };

    let due: Vec<DispatchCandidate> = candidates
        .into_iter()
        .filter(|c| c.message.is_due(now))
        .collect();
    summary.due = due.len() as u32;

    if due.is_empty() {
        return Ok(summary);
    }

    let email = EmailClient::from_config(config);
    let x = XClient::from_config(config);

    tracing::debug!(
        queued = summary.queued,
        due = summary.due,
        "dispatch: processing queue"
    );

    for candidate in due.into_iter().take(config.batch_size) {
        let message_id = candidate.message.id;
        let channel = candidate.message.channel;

        let outcome = dispatch_one(store, email.as_ref(), x.as_ref(), &candidate, now).await;
        summary.processed += 1;

        match outcome {
            DispatchOutcome::Delivered => {
                summary.delivered += 1;
                tracing::info!(
                    message_id = %message_id,
                    channel = %channel,
                    "dispatch: message delivered"
                );
            }
            DispatchOutcome::Failed(reason) => {
                summary.failed += 1;
                tracing::warn!(
                    message_id = %message_id,
                    channel = %channel,
                    reason = %reason,
                    "dispatch: message failed"
                );
            }
            DispatchOutcome::Skipped(reason) => {
                summary.skipped += 1;
                tracing::debug!(
                    message_id = %message_id,
                    channel = %channel,
                    reason = reason.as_deref().unwrap_or("claimed elsewhere"),
                    "dispatch: message skipped"
                );
            }
        }
    }

    Ok(summary)
}

async fn dispatch_one(
    store: &dyn Store,
    email: Option<&EmailClient>,
    x: Option<&XClient>,
    candidate: &DispatchCandidate,
    now: DateTime<Utc>,
) -> DispatchOutcome {
    let message = &candidate.message;

    let Some(lead) = candidate.lead.as_ref() else {
        let reason = "lead relation missing";
        record_failure(store, message, None, reason).await;
        return DispatchOutcome::Failed(reason.to_string());
    };

    // a blocked lead must never be sent to, so not even the claim runs
    if lead.is_blocked {
        let reason = "lead is blocked";
        record_failure(store, message, Some(lead.id), reason).await;
        return DispatchOutcome::Failed(reason.to_string());
    }

    // a missing credential is an operational gap, not a delivery error:
    // the message stays queued for a later, properly configured run
    let adapter = match message.channel {
        Channel::Email => email.map(Adapter::Email),
        Channel::Twitter => x.map(Adapter::X),
        Channel::Discord => None,
    };
    let Some(adapter) = adapter else {
        let reason = match message.channel {
            Channel::Email => "email api key not configured",
            Channel::Twitter => "x api key not configured",
            Channel::Discord => "no adapter for channel",
        };
        return DispatchOutcome::Skipped(Some(reason.to_string()));
    };

    match store.claim_message(message.id, now).await {
        Ok(true) => {}
        // another run already owns it; expected under overlapping invocations
        Ok(false) => return DispatchOutcome::Skipped(None),
        Err(error) => {
            let reason = truncate_chars(
                &format!("claim failed: {error:#}"),
                ERROR_MESSAGE_MAX_CHARS,
            );
            record_failure(store, message, Some(lead.id), &reason).await;
            return DispatchOutcome::Failed(reason);
        }
    }

    let send_result = match adapter {
        Adapter::Email(client) => client.send(message, lead).await,
        Adapter::X(client) => client.send(message, lead).await,
    };

    match send_result {
        Ok(receipt) => {
            if let Err(error) = store
                .mark_delivered(
                    message.id,
                    &receipt.provider,
                    receipt.provider_message_id.as_deref(),
                )
                .await
            {
                let reason = truncate_chars(
                    &format!("failed to record delivery: {error:#}"),
                    ERROR_MESSAGE_MAX_CHARS,
                );
                record_failure(store, message, Some(lead.id), &reason).await;
                return DispatchOutcome::Failed(reason);
            }

            if let Err(error) = store.touch_thread_outbound(message.thread_id, now).await {
                tracing::warn!(
                    thread_id = %message.thread_id,
                    error = %error,
                    "dispatch: thread update failed"
                );
            }
            if let Err(error) = store.mark_lead_contacted(lead.id, now).await {
                tracing::warn!(
                    lead_id = %lead.id,
                    error = %error,
                    "dispatch: lead update failed"
                );
            }

            let event = NewOutreachEvent {
                message_id: message.id,
                thread_id: message.thread_id,
                lead_id: Some(lead.id),
                provider: receipt.provider.clone(),
                event_type: EventType::DispatchDelivered,
                payload: receipt.payload.clone(),
            };
            if let Err(error) = store.record_event(event).await {
                tracing::warn!(
                    message_id = %message.id,
                    error = %error,
                    "dispatch: delivered event insert failed"
                );
            }

            DispatchOutcome::Delivered
        }
        Err(error) => {
            let reason = truncate_chars(&format!("{error:#}"), ERROR_MESSAGE_MAX_CHARS);
            record_failure(store, message, Some(lead.id), &reason).await;
            DispatchOutcome::Failed(reason)
        }
    }
}

/// Failure write-back: both the message update and the event insert are
/// attempted independently; either failing is logged and swallowed so the
/// outcome already decided for this message stands.
async fn record_failure(
    store: &dyn Store,
    message: &Message,
    lead_id: Option<Uuid>,
    reason: &str,
) {
    if let Err(error) = store
        .mark_failed(message.id, DISPATCH_FAILED_CODE, reason)
        .await
    {
        tracing::warn!(
            message_id = %message.id,
            error = %error,
            "dispatch: failed to record failure state"
        );
    }

    let event = NewOutreachEvent {
        message_id: message.id,
        thread_id: message.thread_id,
        lead_id,
        provider: provider_label(message.channel).to_string(),
        event_type: EventType::DispatchFailed,
        payload: json!({
            "channel": message.channel.as_str(),
            "error": reason,
        }),
    };
    if let Err(error) = store.record_event(event).await {
        tracing::warn!(
            message_id = %message.id,
            error = %error,
            "dispatch: failure event insert failed"
        );
    }
}

fn provider_label(channel: Channel) -> &'static str {
    match channel {
        Channel::Email => EMAIL_PROVIDER,
        Channel::Twitter => X_PROVIDER,
        Channel::Discord => "discord",
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
