use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Discord,
    Twitter,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Discord => "discord",
            Channel::Twitter => "twitter",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "discord" => Ok(Channel::Discord),
            "twitter" => Ok(Channel::Twitter),
            other => Err(anyhow::anyhow!("unknown channel: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Queued,
    Contacted,
    Replied,
    Interested,
    NotInterested,
    Bounced,
    Blocked,
    Claimed,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Queued => "queued",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Replied => "replied",
            LeadStatus::Interested => "interested",
            LeadStatus::NotInterested => "not_interested",
            LeadStatus::Bounced => "bounced",
            LeadStatus::Blocked => "blocked",
            LeadStatus::Claimed => "claimed",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStatus::New),
            "queued" => Ok(LeadStatus::Queued),
            "contacted" => Ok(LeadStatus::Contacted),
            "replied" => Ok(LeadStatus::Replied),
            "interested" => Ok(LeadStatus::Interested),
            "not_interested" => Ok(LeadStatus::NotInterested),
            "bounced" => Ok(LeadStatus::Bounced),
            "blocked" => Ok(LeadStatus::Blocked),
            "claimed" => Ok(LeadStatus::Claimed),
            other => Err(anyhow::anyhow!("unknown lead status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub channel: Channel,
    pub contact_identifier: String,
    pub display_name: String,
    pub target_name: String,
    pub status: LeadStatus,
    pub is_blocked: bool,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
