use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Every column of `md_awards_submissions` except the surrogate id.
/// This is also the row layout of the CSV backup.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub name: String,
    pub submitted_at: String,
    pub total_score: f64,
    pub financial_score: f64,
    pub financial_action: String,
    pub customer_score: f64,
    pub customer_action: String,
    pub internal_score: f64,
    pub internal_action: String,
    pub learning_score: f64,
    pub learning_action: String,
    pub folder_url: Option<String>,
    pub files: String,
    pub evaluator_vote: Option<String>,
    pub evaluator_comment: Option<String>,
    pub stage1_recommendation: Option<String>,
    pub stage1_comment: Option<String>,
    pub committee_votes: Option<String>,
    pub current_status: String,
    pub lock_token: Option<String>,
    pub lock_expiry: Option<String>,
    pub lock_holder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: SubmissionRecord,
}

/// One uploaded evidence file, serialized into the `files` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub url: Option<String>,
    pub content_type: String,
    pub size: usize,
    pub perspective: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    #[serde(rename = "Submitted")]
    Submitted,
    #[serde(rename = "Under Review")]
    UnderReview,
    #[serde(rename = "Stage 1 Recommended")]
    Stage1Recommended,
    #[serde(rename = "Stage 1 Not Recommended")]
    Stage1NotRecommended,
    #[serde(rename = "Committee Review")]
    CommitteeReview,
    #[serde(rename = "Awarded")]
    Awarded,
    #[serde(rename = "Not Awarded")]
    NotAwarded,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 7] = [
        SubmissionStatus::Submitted,
        SubmissionStatus::UnderReview,
        SubmissionStatus::Stage1Recommended,
        SubmissionStatus::Stage1NotRecommended,
        SubmissionStatus::CommitteeReview,
        SubmissionStatus::Awarded,
        SubmissionStatus::NotAwarded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "Submitted",
            SubmissionStatus::UnderReview => "Under Review",
            SubmissionStatus::Stage1Recommended => "Stage 1 Recommended",
            SubmissionStatus::Stage1NotRecommended => "Stage 1 Not Recommended",
            SubmissionStatus::CommitteeReview => "Committee Review",
            SubmissionStatus::Awarded => "Awarded",
            SubmissionStatus::NotAwarded => "Not Awarded",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == label)
    }

    /// Final statuses are not overwritten by committee votes.
    pub fn is_final(&self) -> bool {
        matches!(self, SubmissionStatus::Awarded | SubmissionStatus::NotAwarded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "Recommended")]
    Recommended,
    #[serde(rename = "Not Recommended")]
    NotRecommended,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Recommended => "Recommended",
            Recommendation::NotRecommended => "Not Recommended",
        }
    }

    pub fn status(&self) -> SubmissionStatus {
        match self {
            Recommendation::Recommended => SubmissionStatus::Stage1Recommended,
            Recommendation::NotRecommended => SubmissionStatus::Stage1NotRecommended,
        }
    }
}

/// A write to evaluation state. Only applied while the caller holds the row's lock.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationUpdate {
    Evaluation { vote: String, comment: String },
    Stage1 { recommendation: Recommendation, comment: String },
    CommitteeVote { member: String, vote: String },
    Status(SubmissionStatus),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockStatus {
    Unlocked,
    Held { holder: String, expires_at: String },
}
