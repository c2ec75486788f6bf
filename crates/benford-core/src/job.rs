//! Job model and the typed job lifecycle.
//!
//! The persisted status column is a display string (`"processing - page 2 of 5
//! completed"`). [`JobStatus`] is the typed form; `Display` and `FromStr`
//! convert between the two without changing the external text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Identifier assigned to a job by the job store on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

/// Identifier of a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

macro_rules! id_conversions {
    ($ty:ident, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<i64>()
                    .map($ty)
                    .map_err(|_| CoreError::InvalidInput(format!("invalid {} '{}'", $what, s)))
            }
        }
    };
}

id_conversions!(JobId, "job id");
id_conversions!(UserId, "user id");

/// The analysis requested for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Benford,
    Sentiment,
    Ner,
    Pii,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 4] = [
        AnalysisKind::Benford,
        AnalysisKind::Sentiment,
        AnalysisKind::Ner,
        AnalysisKind::Pii,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Benford => "benford",
            AnalysisKind::Sentiment => "sentiment",
            AnalysisKind::Ner => "ner",
            AnalysisKind::Pii => "pii",
        }
    }

    /// Human-readable label used in menus and reports.
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisKind::Benford => "Benford",
            AnalysisKind::Sentiment => "Sentiment Analysis",
            AnalysisKind::Ner => "Named Entity Recognition",
            AnalysisKind::Pii => "Personally Identifiable Entities",
        }
    }

    /// Whether this kind needs the external NLP service.
    pub fn needs_nlp(&self) -> bool {
        !matches!(self, AnalysisKind::Benford)
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown job type '{}'", s)))
    }
}

/// A registered user. Serialized with the column names used on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "userid")]
    pub id: UserId,
    pub username: String,
    pub pwdhash: String,
}

/// One document's analysis request, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "jobid")]
    pub id: JobId,
    #[serde(rename = "userid")]
    pub user_id: UserId,
    /// Display form of [`JobStatus`].
    pub status: String,
    #[serde(rename = "jobtype")]
    pub kind: AnalysisKind,
    #[serde(rename = "originaldatafile")]
    pub original_file: String,
    /// Object key of the source document.
    #[serde(rename = "datafilekey")]
    pub data_key: String,
    /// Object key of the results artifact; empty until one is recorded.
    #[serde(rename = "resultsfilekey")]
    pub results_key: String,
}

/// Fields supplied when a job is created. The store assigns the id, sets the
/// status to `uploaded`, and leaves the results key empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub user_id: UserId,
    pub kind: AnalysisKind,
    pub original_file: String,
    pub data_key: String,
}

const PROCESSING_PREFIX: &str = "processing";
const STARTING: &str = "processing - starting";

/// Typed job lifecycle.
///
/// ```text
/// Uploaded -> Starting -> PageCompleted{1,n} -> ... -> PageCompleted{n,n} -> Completed
///     \__________\_______________\______________________________\__________-> Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Uploaded,
    Starting,
    /// `page` is 1-based.
    PageCompleted { page: u32, total: u32 },
    Completed,
    Error,
}

impl JobStatus {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: &JobStatus) -> bool {
        use JobStatus::*;
        match (*self, *next) {
            (Completed | Error, _) => false,
            (_, Error) => true,
            (Uploaded, Starting) => true,
            (Starting, PageCompleted { page: 1, total }) => total >= 1,
            (
                PageCompleted { page, total },
                PageCompleted {
                    page: next_page,
                    total: next_total,
                },
            ) => total == next_total && page < total && next_page == page + 1,
            (PageCompleted { page, total }, Completed) => page == total,
            _ => false,
        }
    }

    pub fn bucket(&self) -> StatusBucket {
        match self {
            JobStatus::Uploaded => StatusBucket::Uploaded,
            JobStatus::Starting | JobStatus::PageCompleted { .. } => StatusBucket::Processing,
            JobStatus::Completed => StatusBucket::Completed,
            JobStatus::Error => StatusBucket::Error,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Uploaded => f.write_str("uploaded"),
            JobStatus::Starting => f.write_str(STARTING),
            JobStatus::PageCompleted { page, total } => {
                write!(f, "processing - page {} of {} completed", page, total)
            }
            JobStatus::Completed => f.write_str("completed"),
            JobStatus::Error => f.write_str("error"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unexpected = || CoreError::UnexpectedStatus(s.to_string());
        match s {
            "uploaded" => Ok(JobStatus::Uploaded),
            STARTING => Ok(JobStatus::Starting),
            "completed" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            _ => {
                let rest = s
                    .strip_prefix("processing - page ")
                    .and_then(|r| r.strip_suffix(" completed"))
                    .ok_or_else(unexpected)?;
                let (page, total) = rest.split_once(" of ").ok_or_else(unexpected)?;
                let page = parse_page_number(page).ok_or_else(unexpected)?;
                let total = parse_page_number(total).ok_or_else(unexpected)?;
                if page == 0 || page > total {
                    return Err(unexpected());
                }
                Ok(JobStatus::PageCompleted { page, total })
            }
        }
    }
}

/// Plain decimal without sign or leading zeros, so that it prints back the same.
fn parse_page_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    s.parse().ok()
}

/// The four classes of status the read path distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBucket {
    Uploaded,
    Processing,
    Completed,
    Error,
}

impl StatusBucket {
    /// Classify a persisted status string. Any `processing` prefix counts as
    /// in progress; the other buckets need an exact match.
    pub fn classify(status: &str) -> Option<StatusBucket> {
        match status {
            "uploaded" => Some(StatusBucket::Uploaded),
            "completed" => Some(StatusBucket::Completed),
            "error" => Some(StatusBucket::Error),
            s if s.starts_with(PROCESSING_PREFIX) => Some(StatusBucket::Processing),
            _ => None,
        }
    }
}
