pub mod email_client;
pub mod x_client;

pub use email_client::EmailClient;
pub use x_client::XClient;

/// Normalized result of a provider send: which provider took the message,
/// the id it assigned (when it reports one), and channel-specific details
/// for the audit trail.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub provider: String,
    pub provider_message_id: Option<String>,
    pub payload: serde_json::Value,
}
