use anyhow::{Context, Result, bail};
use serde_json::{Value, json};

use crate::config::{
    DispatchConfig, ERROR_SNIPPET_MAX_CHARS, POST_MAX_CHARS, POST_TRUNCATED_CHARS,
};
use crate::schema::{Lead, Message};
use crate::services::DeliveryReceipt;

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

pub const X_PROVIDER: &str = "x";

pub struct XClient {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl XClient {
    pub fn new(api_key: String, api_base: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Option<Self> {
        config
            .x_api_key
            .as_ref()
            .map(|key| Self::new(key.clone(), config.x_api_base.clone()))
    }

    pub async fn send(&self, message: &Message, lead: &Lead) -> Result<DeliveryReceipt> {
        let body = message.body.as_deref().unwrap_or("").trim();
        if body.is_empty() {
            bail!("message body is empty");
        }

        let handle = normalize_handle(&lead.contact_identifier);
        let text = compose_post(&handle, body);

        let response = self
            .client
            .post(format!("{}/2/tweets", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({ "text": text }))
            .send()
            .await
            .context("post request failed")?;

        let status = response.status();
        // read the raw text first so error messages stay informative even
        // when the provider returns a non-json error page
        let raw = response.text().await.unwrap_or_default();
        let parsed: Option<Value> = serde_json::from_str(&raw).ok();

        if !status.is_success() {
            let snippet: String = raw.chars().take(ERROR_SNIPPET_MAX_CHARS).collect();
            bail!("X API {}: {snippet}", status.as_u16());
        }

        let provider_message_id = parsed
            .as_ref()
            .and_then(|v| v.pointer("/data/id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let provider_response = parsed.unwrap_or(Value::String(raw));

        Ok(DeliveryReceipt {
            provider: X_PROVIDER.to_string(),
            provider_message_id,
            payload: json!({
                "channel": "twitter",
                "handle": handle,
                "text": text,
                "response": provider_response,
            }),
        })
    }
}

pub fn normalize_handle(raw: &str) -> String {
    raw.trim().trim_start_matches('@').trim().to_string()
}

/// `@handle body` when a handle exists, else the body alone; truncated so the
/// result never exceeds the platform limit.
pub fn compose_post(handle: &str, body: &str) -> String {
    let text = if handle.is_empty() {
        body.to_string()
    } else {
        format!("@{handle} {body}")
    };
    if text.chars().count() <= POST_MAX_CHARS {
        return text;
    }
    let truncated: String = text.chars().take(POST_TRUNCATED_CHARS).collect();
    format!("{truncated}...")
}
