//! The persistent document record and its status transitions.
//!
//! A [`Document`] is created in [`DocumentStatus::Processing`] when an
//! upload is accepted and only ever changes through [`Document::begin_run`],
//! [`Document::complete`] and [`Document::fail`]. Those three methods keep
//! the record consistent: structured data is present exactly when the
//! document is completed, and an error message (with its kind) exactly when
//! it failed.

use crate::error::{FailureKind, PipelineError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    /// URL or local path the PDF is read from on every run.
    pub source: String,
    pub status: DocumentStatus,
    pub structured_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// A freshly ingested record.
    pub fn new(id: DocumentId, filename: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id,
            filename: filename.into(),
            source: source.into(),
            status: DocumentStatus::Processing,
            structured_data: None,
            error_message: None,
            error_kind: None,
            created_at: Utc::now(),
        }
    }

    /// Enter `processing` for a new run. Any previous result or error is
    /// cleared.
    pub fn begin_run(&mut self) {
        self.status = DocumentStatus::Processing;
        self.structured_data = None;
        self.error_message = None;
        self.error_kind = None;
    }

    /// `processing → completed`.
    pub fn complete(&mut self, data: serde_json::Value) {
        self.status = DocumentStatus::Completed;
        self.structured_data = Some(data);
        self.error_message = None;
        self.error_kind = None;
    }

    /// `processing → failed`.
    pub fn fail(&mut self, error: &PipelineError) {
        self.status = DocumentStatus::Failed;
        self.structured_data = None;
        self.error_message = Some(error.to_string());
        self.error_kind = Some(error.kind());
    }

    pub fn is_completed(&self) -> bool {
        self.status == DocumentStatus::Completed
    }

    /// Whether the status/result/error fields agree with each other.
    pub fn is_consistent(&self) -> bool {
        let completed = self.status == DocumentStatus::Completed;
        let failed = self.status == DocumentStatus::Failed;
        self.structured_data.is_some() == completed
            && self.error_message.is_some() == failed
            && self.error_kind.is_some() == failed
    }
}
