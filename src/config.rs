/// Upper bound on messages handed to the state machine in one run, and on
/// rows pulled from the store (over-fetch tolerates candidates filtered out
/// by due-time checks).
pub const MAX_BATCH_SIZE: usize = 100;
pub const MAX_FETCH_ROWS: i64 = 100;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const FETCH_MULTIPLIER: usize = 3;

/// Persisted error text and provider response snippets are bounded so a
/// provider cannot blow up a row or a log line.
pub const ERROR_MESSAGE_MAX_CHARS: usize = 1000;
pub const ERROR_SNIPPET_MAX_CHARS: usize = 400;

/// X enforces 280 characters per post; we truncate to 277 and add an
/// ellipsis so the composed text never exceeds the platform limit.
pub const POST_MAX_CHARS: usize = 280;
pub const POST_TRUNCATED_CHARS: usize = 277;

pub const DEFAULT_FROM_EMAIL: &str = "outreach@herald.app";
pub const DEFAULT_EMAIL_API_BASE: &str = "https://api.resend.com";
pub const DEFAULT_X_API_BASE: &str = "https://api.x.com";

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub resend_api_key: Option<String>,
    pub x_api_key: Option<String>,
    pub from_email: String,
    pub email_api_base: String,
    pub x_api_base: String,
    pub batch_size: usize,
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        Self {
            resend_api_key: non_empty_env("RESEND_API_KEY"),
            x_api_key: non_empty_env("X_API_KEY"),
            from_email: non_empty_env("OUTREACH_FROM_EMAIL")
                .unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_string()),
            email_api_base: non_empty_env("RESEND_API_BASE")
                .unwrap_or_else(|| DEFAULT_EMAIL_API_BASE.to_string()),
            x_api_base: non_empty_env("X_API_BASE")
                .unwrap_or_else(|| DEFAULT_X_API_BASE.to_string()),
            batch_size: parse_batch_size(std::env::var("DISPATCH_BATCH_SIZE").ok().as_deref()),
        }
    }

    /// Rows to request from the store for one run. Over-fetches so due-time
    /// filtering still leaves a full batch, bounded by the hard row cap.
    pub fn fetch_limit(&self) -> i64 {
        ((self.batch_size * FETCH_MULTIPLIER) as i64).min(MAX_FETCH_ROWS)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            resend_api_key: None,
            x_api_key: None,
            from_email: DEFAULT_FROM_EMAIL.to_string(),
            email_api_base: DEFAULT_EMAIL_API_BASE.to_string(),
            x_api_base: DEFAULT_X_API_BASE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Absent, empty, non-numeric, zero, and negative inputs all fall back to the
/// default; oversized values clamp to the hard maximum. The batch is never
/// unbounded and never zero-length.
pub fn parse_batch_size(raw: Option<&str>) -> usize {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => match s.parse::<i64>() {
            Ok(n) if n > 0 => (n as usize).min(MAX_BATCH_SIZE),
            _ => DEFAULT_BATCH_SIZE,
        },
        None => DEFAULT_BATCH_SIZE,
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
