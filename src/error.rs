//
// error.rs
// dicom-deident
//
// Error taxonomy shared by the de-identification engine, the stores and the pipeline.
//

use std::fmt;

use dicom::core::Tag;
use thiserror::Error;

/// Failure reported by a store collaborator (object, config or audit store).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Only produced by table creation; the audit adapter treats it as success.
    #[error("already exists: {0}")]
    AlreadyExists(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(err.to_string()),
            std::io::ErrorKind::AlreadyExists => StoreError::AlreadyExists(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Every way a single de-identification can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeidentError {
    #[error("configuration unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("configuration malformed: {0}")]
    ConfigMalformed(String),

    #[error("invalid DICOM object: {0}")]
    InvalidFormat(String),

    /// The subject identifier has no entry in the substitution table.
    #[error("subject {} not present in configuration", .0.as_deref().unwrap_or("<absent>"))]
    SubjectUnmatched(Option<String>),

    #[error("invalid replacement for {tag}: {reason}")]
    InvalidReplacementValue { tag: Tag, reason: String },

    #[error("missing audit field: {0}")]
    MissingAuditField(&'static str),

    #[error("unrecognized path shape: {0}")]
    UnrecognizedPathShape(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("audit write failed: {0}")]
    AuditWriteFailed(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(Stage),
}

impl From<StoreError> for DeidentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => DeidentError::NotFound(what),
            StoreError::Unavailable(what) | StoreError::AlreadyExists(what) => {
                DeidentError::StoreUnavailable(what)
            }
        }
    }
}

/// States of a single invocation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetching,
    Parsing,
    HashingOriginal,
    Transforming,
    HashingResult,
    Writing,
    Auditing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Parsing => "parsing",
            Stage::HashingOriginal => "hashing-original",
            Stage::Transforming => "transforming",
            Stage::HashingResult => "hashing-result",
            Stage::Writing => "writing",
            Stage::Auditing => "auditing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A failed invocation: the originating error plus the object it was working on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{bucket}/{key} failed while {stage}: {kind}")]
pub struct InvocationError {
    pub bucket: String,
    pub key: String,
    pub stage: Stage,
    #[source]
    pub kind: DeidentError,
}

pub type Result<T, E = DeidentError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_invocation_taxonomy() {
        let missing: DeidentError = StoreError::NotFound("b/k".into()).into();
        assert_eq!(missing, DeidentError::NotFound("b/k".into()));

        let down: DeidentError = StoreError::Unavailable("timeout".into()).into();
        assert!(matches!(down, DeidentError::StoreUnavailable(_)));
    }

    #[test]
    fn io_errors_keep_their_kind() {
        let err = std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists");
        assert!(matches!(StoreError::from(err), StoreError::AlreadyExists(_)));
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(StoreError::from(err), StoreError::Unavailable(_)));
    }

    #[test]
    fn invalid_replacement_names_the_tag() {
        let err = DeidentError::InvalidReplacementValue {
            tag: Tag(0x0010, 0x0030),
            reason: "not a date".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid replacement for (0010,0030): not a date"
        );
    }

    #[test]
    fn invocation_error_carries_context() {
        let err = InvocationError {
            bucket: "scans".into(),
            key: "dicom/input/a.dcm".into(),
            stage: Stage::Transforming,
            kind: DeidentError::SubjectUnmatched(Some("999999".into())),
        };
        assert_eq!(
            err.to_string(),
            "scans/dicom/input/a.dcm failed while transforming: subject 999999 not present in configuration"
        );
    }
}
