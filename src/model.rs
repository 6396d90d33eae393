use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutreachStatus {
    Generated,
    UnderReview,
    Edited,
    Approved,
    Rejected,
    Sent,
}

pub const PENDING_STATUSES: [OutreachStatus; 3] = [
    OutreachStatus::Generated,
    OutreachStatus::UnderReview,
    OutreachStatus::Edited,
];

impl OutreachStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutreachStatus::Generated => "generated",
            OutreachStatus::UnderReview => "under_review",
            OutreachStatus::Edited => "edited",
            OutreachStatus::Approved => "approved",
            OutreachStatus::Rejected => "rejected",
            OutreachStatus::Sent => "sent",
        }
    }

    /// Generated, under review and edited items are shown together as "pending".
    pub fn is_pending(&self) -> bool {
        PENDING_STATUSES.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OutreachStatus::Sent | OutreachStatus::Rejected)
    }
}

impl fmt::Display for OutreachStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown outreach status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OutreachStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generated" => Ok(OutreachStatus::Generated),
            "under_review" => Ok(OutreachStatus::UnderReview),
            "edited" => Ok(OutreachStatus::Edited),
            "approved" => Ok(OutreachStatus::Approved),
            "rejected" => Ok(OutreachStatus::Rejected),
            "sent" => Ok(OutreachStatus::Sent),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Coarse capability of the person operating the desk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum ActorRole {
    Admin,
    Reviewer,
    Viewer,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Admin => "admin",
            ActorRole::Reviewer => "reviewer",
            ActorRole::Viewer => "viewer",
        }
    }
}

// Unrecognised roles fall back to the read-only role.
impl From<String> for ActorRole {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => ActorRole::Admin,
            "reviewer" => ActorRole::Reviewer,
            _ => ActorRole::Viewer,
        }
    }
}

impl From<ActorRole> for String {
    fn from(role: ActorRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One AI-drafted outreach message as last reported by the remote store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutreachItem {
    pub id: i64,
    #[serde(default)]
    pub contact_id: Option<i64>,
    #[serde(default)]
    pub staff_id: Option<i64>,
    #[serde(default)]
    pub institution_id: Option<i64>,
    #[serde(default)]
    pub campaign_id: Option<i64>,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub status: OutreachStatus,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub role: ActorRole,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub icp_id: Option<i64>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub daily_send_limit: Option<u32>,
    #[serde(default)]
    pub is_default: bool,
}

/// Result of a generation run. The server does not report item ids.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateCounts {
    #[serde(default)]
    pub generated: u32,
    #[serde(default)]
    pub skipped: u32,
    #[serde(default)]
    pub errors: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditOutreach {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl EditOutreach {
    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.body.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApproveOutreach {
    pub approved_by: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RejectOutreach {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl RejectOutreach {
    /// An empty reason is treated as no reason at all.
    pub fn new(reason: Option<&str>) -> Self {
        Self {
            rejection_reason: reason.filter(|r| !r.is_empty()).map(str::to_string),
        }
    }
}

pub const MIN_GENERATE_LIMIT: i64 = 1;
pub const MAX_GENERATE_LIMIT: i64 = 500;

pub fn clamp_generate_limit(limit: i64) -> u32 {
    limit.clamp(MIN_GENERATE_LIMIT, MAX_GENERATE_LIMIT) as u32
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkGenerate {
    pub limit: u32,
}

impl BulkGenerate {
    pub fn new(limit: i64) -> Self {
        Self {
            limit: clamp_generate_limit(limit),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignGenerate {
    pub campaign_id: i64,
    pub limit: u32,
}

impl CampaignGenerate {
    pub fn new(campaign_id: i64, limit: i64) -> Self {
        Self {
            campaign_id,
            limit: clamp_generate_limit(limit),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SingleGenerate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Filter for `GET outreach`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub statuses: Option<Vec<OutreachStatus>>,
}

impl ListQuery {
    pub fn with_statuses(statuses: &[OutreachStatus]) -> Self {
        Self {
            limit: None,
            statuses: Some(statuses.to_vec()),
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Statuses joined with commas, in the order given.
    pub fn statuses_param(&self) -> Option<String> {
        self.statuses
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|s| s.iter().map(|st| st.as_str()).collect::<Vec<_>>().join(","))
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(statuses) = self.statuses_param() {
            pairs.push(("statuses", statuses));
        }
        pairs
    }
}

/// Tabs of the review screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Pending,
    Approved,
    Rejected,
    Sent,
}

impl StatusFilter {
    pub fn statuses(&self) -> Option<Vec<OutreachStatus>> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Pending => Some(PENDING_STATUSES.to_vec()),
            StatusFilter::Approved => Some(vec![OutreachStatus::Approved]),
            StatusFilter::Rejected => Some(vec![OutreachStatus::Rejected]),
            StatusFilter::Sent => Some(vec![OutreachStatus::Sent]),
        }
    }

    pub fn query(&self) -> ListQuery {
        ListQuery {
            limit: None,
            statuses: self.statuses(),
        }
    }
}
