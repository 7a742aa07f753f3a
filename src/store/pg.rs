use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::schema::{Channel, Lead, Message, NewOutreachEvent, THREAD_AWAITING_REPLY};
use crate::store::{DispatchCandidate, Store};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn candidate_from_row(row: &PgRow) -> Result<DispatchCandidate> {
    let message = Message {
        id: row.try_get("id")?,
        thread_id: row.try_get("thread_id")?,
        lead_id: row.try_get("lead_id")?,
        channel: row.try_get::<String, _>("channel")?.parse()?,
        provider: row.try_get("provider")?,
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        scheduled_at: row.try_get("scheduled_at")?,
        direction: row.try_get::<String, _>("direction")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        provider_message_id: row.try_get("provider_message_id")?,
        error_code: row.try_get("error_code")?,
        error_message: row.try_get("error_message")?,
        sent_at: row.try_get("sent_at")?,
        created_at: row.try_get("created_at")?,
    };

    // single-or-none by construction with this join; backends that hand back
    // a to-many shape must collapse it here, never in dispatch logic
    let lead = match row.try_get::<Option<Uuid>, _>("lead_pk")? {
        Some(id) => Some(Lead {
            id,
            channel: row.try_get::<String, _>("lead_channel")?.parse()?,
            contact_identifier: row.try_get("contact_identifier")?,
            display_name: row.try_get("display_name")?,
            target_name: row.try_get("target_name")?,
            status: row.try_get::<String, _>("lead_status")?.parse()?,
            is_blocked: row.try_get("is_blocked")?,
            last_contacted_at: row.try_get("lead_last_contacted_at")?,
            created_at: row.try_get("lead_created_at")?,
        }),
        None => None,
    };

    Ok(DispatchCandidate { message, lead })
}

#[async_trait]
impl Store for PgStore {
    async fn queued_messages(
        &self,
        channels: &[Channel],
        limit: i64,
    ) -> Result<Vec<DispatchCandidate>> {
        let channel_names: Vec<String> =
            channels.iter().map(|c| c.as_str().to_string()).collect();

        let rows = sqlx::query(
            r#"
            SELECT m.id, m.thread_id, m.lead_id, m.channel, m.provider, m.subject,
                   m.body, m.scheduled_at, m.direction, m.status,
                   m.provider_message_id, m.error_code, m.error_message,
                   m.sent_at, m.created_at,
                   l.id AS lead_pk, l.channel AS lead_channel,
                   l.contact_identifier, l.display_name, l.target_name,
                   l.status AS lead_status, l.is_blocked,
                   l.last_contacted_at AS lead_last_contacted_at,
                   l.created_at AS lead_created_at
            FROM messages m
            LEFT JOIN leads l ON l.id = m.lead_id
            WHERE m.direction = 'outbound'
              AND m.status = 'queued'
              AND m.channel = ANY($1)
            ORDER BY m.scheduled_at ASC NULLS FIRST, m.created_at ASC
            LIMIT $2
            "#,
        )
        .bind(&channel_names)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(candidate_from_row).collect()
    }

    async fn claim_message(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = 'sent', sent_at = $2, error_code = NULL, error_message = NULL
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_delivered(
        &self,
        id: Uuid,
        provider: &str,
        provider_message_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 'delivered', provider = $2, provider_message_id = $3,
                error_code = NULL, error_message = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(provider)
        .bind(provider_message_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error_code: &str, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 'failed', sent_at = NULL, error_code = $2, error_message = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error_code)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn touch_thread_outbound(&self, thread_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE threads
            SET status = $2, last_outbound_at = $3
            WHERE id = $1
            "#,
        )
        .bind(thread_id)
        .bind(THREAD_AWAITING_REPLY)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_lead_contacted(&self, lead_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE leads
            SET status = 'contacted', last_contacted_at = $2
            WHERE id = $1 AND status IN ('new', 'queued')
            "#,
        )
        .bind(lead_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_event(&self, event: NewOutreachEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outreach_events
                (id, message_id, thread_id, lead_id, provider, event_type, payload, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.message_id)
        .bind(event.thread_id)
        .bind(event.lead_id)
        .bind(&event.provider)
        .bind(event.event_type.as_str())
        .bind(&event.payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
