//
// models.rs
// dicom-deident
//
// Serializable records produced by a de-identification: the engine report, the audit record and the invocation outcome.
//

use dicom::core::Tag;
use serde::{Deserialize, Serialize, Serializer};

/// What the engine did to one attribute tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeidentReport {
    /// Anchor value read before substitution; `None` when the attribute is absent or empty.
    pub subject_id: Option<String>,
    pub subject_unmatched: bool,
    #[serde(serialize_with = "serialize_tags")]
    pub replaced: Vec<Tag>,
    /// Configured targets the object does not carry.
    #[serde(serialize_with = "serialize_tags")]
    pub skipped: Vec<Tag>,
}

/// One line of the audit trail. Written once per committed transform, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_key: String,
    pub bucket: String,
    pub source_key: String,
    pub output_key: String,
    pub digest_before: String,
    pub digest_after: String,
    pub subject_matched: bool,
    pub replaced_tags: usize,
    /// RFC 3339, UTC.
    pub transformed_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Sanitized,
    /// Subject not configured and the pipeline policy allowed an unmodified copy.
    PassedThrough,
}

/// Result handed back to the caller of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationOutcome {
    pub status: InvocationStatus,
    pub processed_key: String,
    pub output_key: String,
    pub audit_key: String,
    pub digest_before: String,
    pub digest_after: String,
    pub report: DeidentReport,
}

fn serialize_tags<S: Serializer>(tags: &[Tag], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(tags.iter().map(|tag| crate::tag::config_key(*tag)))
}
