use anyhow::{Context, Result, bail};
use serde_json::{Value, json};

use crate::config::DispatchConfig;
use crate::schema::{Lead, Message};
use crate::services::DeliveryReceipt;

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

pub const EMAIL_PROVIDER: &str = "resend";

pub struct EmailClient {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    from: String,
}

impl EmailClient {
    pub fn new(api_key: String, from: String, api_base: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            from,
        }
    }

    /// None when no email credential is configured, which the dispatcher
    /// treats as a skip rather than a delivery failure.
    pub fn from_config(config: &DispatchConfig) -> Option<Self> {
        config.resend_api_key.as_ref().map(|key| {
            Self::new(key.clone(), config.from_email.clone(), config.email_api_base.clone())
        })
    }

    pub async fn send(&self, message: &Message, lead: &Lead) -> Result<DeliveryReceipt> {
        let recipient = lead.contact_identifier.trim();
        if recipient.is_empty() {
            bail!("lead has no email address");
        }

        let body = message.body.as_deref().unwrap_or("").trim();
        if body.is_empty() {
            bail!("message body is empty");
        }

        let subject = match message.subject.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.to_string(),
            None => default_subject(lead),
        };

        let response = self
            .client
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [recipient],
                "subject": subject,
                "text": body,
            }))
            .send()
            .await
            .context("email send request failed")?;

        let reply: Value = response
            .json()
            .await
            .context("email provider returned a non-json response")?;

        // the provider signals failure through an error field in the body,
        // not through the status line alone
        if let Some(error) = reply.get("error").filter(|e| !e.is_null()) {
            let detail = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            bail!("email provider error: {detail}");
        }

        // the id comes back nested under data on some endpoints and at the
        // top level on others
        let provider_message_id = reply
            .pointer("/data/id")
            .and_then(Value::as_str)
            .or_else(|| reply.get("id").and_then(Value::as_str))
            .map(str::to_string);

        Ok(DeliveryReceipt {
            provider: EMAIL_PROVIDER.to_string(),
            provider_message_id,
            payload: json!({
                "channel": "email",
                "recipient": recipient,
                "subject": subject,
            }),
        })
    }
}

fn default_subject(lead: &Lead) -> String {
    let target = lead.target_name.trim();
    if target.is_empty() {
        "Quick question about your studio".to_string()
    } else {
        format!("Quick question about {target}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Channel, Direction, LeadStatus, MessageStatus};
    use chrono::Utc;
    use uuid::Uuid;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    fn lead(email: &str) -> Lead {
        Lead {
            id: Uuid::new_v4(),
            channel: Channel::Email,
            contact_identifier: email.to_string(),
            display_name: "Ada".to_string(),
            target_name: "Starforge".to_string(),
            status: LeadStatus::Queued,
            is_blocked: false,
            last_contacted_at: None,
            created_at: Utc::now(),
        }
    }

    fn message(subject: Option<&str>, body: Option<&str>) -> Message {
        Message {
            id: Uuid::new_v4(),
            thread_id: Uuid::new_v4(),
            lead_id: Uuid::new_v4(),
            channel: Channel::Email,
            provider: None,
            subject: subject.map(str::to_string),
            body: body.map(str::to_string),
            scheduled_at: None,
            direction: Direction::Outbound,
            status: MessageStatus::Queued,
            provider_message_id: None,
            error_code: None,
            error_message: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    fn client(base: String) -> EmailClient {
        EmailClient::new("re_test_key".to_string(), "from@example.com".to_string(), base)
    }

    #[tokio::test]
    async fn sends_and_extracts_nested_id() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/emails"))
            .and(matchers::header("authorization", "Bearer re_test_key"))
            .and(matchers::body_partial_json(serde_json::json!({
                "from": "from@example.com",
                "to": ["a@b.com"],
                "subject": "Hi there",
                "text": "Hello",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "data": { "id": "email_123" } })),
            )
            .mount(&server)
            .await;

        let receipt = client(server.uri())
            .send(&message(Some("Hi there"), Some("Hello")), &lead("a@b.com"))
            .await
            .unwrap();
        assert_eq!(receipt.provider, EMAIL_PROVIDER);
        assert_eq!(receipt.provider_message_id.as_deref(), Some("email_123"));
        assert_eq!(receipt.payload["recipient"], "a@b.com");
    }

    #[tokio::test]
    async fn falls_back_to_top_level_id() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "email_456" })),
            )
            .mount(&server)
            .await;

        let receipt = client(server.uri())
            .send(&message(Some("Hi"), Some("Hello")), &lead("a@b.com"))
            .await
            .unwrap();
        assert_eq!(receipt.provider_message_id.as_deref(), Some("email_456"));
    }

    #[tokio::test]
    async fn missing_subject_uses_templated_default() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::body_partial_json(serde_json::json!({
                "subject": "Quick question about Starforge",
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "email_789" })),
            )
            .mount(&server)
            .await;

        let receipt = client(server.uri())
            .send(&message(None, Some("Hello")), &lead("a@b.com"))
            .await
            .unwrap();
        assert_eq!(receipt.payload["subject"], "Quick question about Starforge");
    }

    #[tokio::test]
    async fn provider_error_field_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": { "message": "domain not verified" },
            })))
            .mount(&server)
            .await;

        let err = client(server.uri())
            .send(&message(Some("Hi"), Some("Hello")), &lead("a@b.com"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("domain not verified"));
    }

    #[tokio::test]
    async fn rejects_empty_recipient_and_body_before_any_request() {
        // no mock mounted: a request would error differently than these do
        let client = client("http://127.0.0.1:9".to_string());

        let err = client
            .send(&message(Some("Hi"), Some("Hello")), &lead("   "))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no email address"));

        let err = client
            .send(&message(Some("Hi"), Some("   ")), &lead("a@b.com"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("body is empty"));
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = DispatchConfig::default();
        assert!(EmailClient::from_config(&config).is_none());

        let config = DispatchConfig {
            resend_api_key: Some("re_key".to_string()),
            ..DispatchConfig::default()
        };
        assert!(EmailClient::from_config(&config).is_some());
    }
}
