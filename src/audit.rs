//
// audit.rs
// dicom-deident
//
// Audit trail: the composite key identifying a processed instance and the adapter that writes records to the audit table.
//

use std::sync::Arc;

use dicom::core::Tag;
use dicom_dictionary_std::tags;
use tracing::{debug, info, warn};

use crate::dicom_access::ElementAccess;
use crate::error::{DeidentError, Result, StoreError};
use crate::models::AuditRecord;
use crate::stores::AuditBackend;

pub const DEFAULT_AUDIT_TABLE: &str = "dicom-edits";

const KEY_DELIMITER: char = '_';
const INSTANCE_NUMBER_WIDTH: usize = 3;

/// Build `<subject>_<series date>_<series time>_<instance number>` from the sanitized tree.
///
/// Depends only on those four attributes, so the same clinical instance always maps to
/// the same key no matter which object path it arrived under.
pub fn derive_key<T: ElementAccess>(tree: &T) -> Result<String> {
    let subject = required(tree, tags::PATIENT_ID, "PatientID")?;
    let series_date = required(tree, tags::SERIES_DATE, "SeriesDate")?;
    let series_time = required(tree, tags::SERIES_TIME, "SeriesTime")?;
    let instance: i64 = required(tree, tags::INSTANCE_NUMBER, "InstanceNumber")?
        .parse()
        .map_err(|_| DeidentError::MissingAuditField("InstanceNumber"))?;

    Ok(format!(
        "{subject}{d}{series_date}{d}{series_time}{d}{instance:0width$}",
        d = KEY_DELIMITER,
        width = INSTANCE_NUMBER_WIDTH
    ))
}

fn required<T: ElementAccess>(tree: &T, tag: Tag, name: &'static str) -> Result<String> {
    tree.element_str(tag)
        .ok_or(DeidentError::MissingAuditField(name))
}

/// Writes audit records to one named table of an [`AuditBackend`].
#[derive(Clone)]
pub struct AuditStore {
    backend: Arc<dyn AuditBackend>,
    table: String,
    dedup: bool,
}

impl AuditStore {
    pub fn new(backend: Arc<dyn AuditBackend>, table: impl Into<String>) -> Self {
        Self {
            backend,
            table: table.into(),
            dedup: false,
        }
    }

    /// Skip records whose key is already in the table instead of appending a duplicate.
    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    /// Create the audit table unless it exists. Losing a creation race is success.
    pub async fn ensure_schema(&self) -> Result<()> {
        match self.backend.create_table(&self.table).await {
            Ok(()) => {
                info!(table = %self.table, "audit table created");
                Ok(())
            }
            Err(StoreError::AlreadyExists(_)) => {
                debug!(table = %self.table, "audit table already present");
                Ok(())
            }
            Err(err) => Err(DeidentError::StoreUnavailable(format!(
                "audit table {}: {err}",
                self.table
            ))),
        }
    }

    pub async fn append(&self, record: &AuditRecord) -> Result<()> {
        let failed = |err: StoreError| {
            DeidentError::AuditWriteFailed(format!("{} in {}: {err}", record.audit_key, self.table))
        };

        if self.dedup {
            let written = self
                .backend
                .put_record_if_absent(&self.table, record)
                .await
                .map_err(failed)?;
            if !written {
                warn!(audit_key = %record.audit_key, "audit key already recorded, not duplicating");
            }
        } else {
            self.backend
                .put_record(&self.table, record)
                .await
                .map_err(failed)?;
        }
        Ok(())
    }
}
