//
// pipeline.rs
// dicom-deident
//
// Runs one de-identification end to end: fetch, parse, hash, transform, hash, write, audit.
//

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, info_span, Instrument};

use crate::anonymize;
use crate::audit::{derive_key, AuditStore};
use crate::codec;
use crate::config::load_config;
use crate::digest::digest;
use crate::error::{DeidentError, InvocationError, Result, Stage};
use crate::models::{AuditRecord, InvocationOutcome, InvocationStatus};
use crate::paths::{derive_output_key, DEFAULT_OUTPUT_STAGE};
use crate::stores::{ConfigStore, ObjectStore};

pub const DEFAULT_CONFIG_NAME: &str = "/dicom-deident/edits-00";

/// What to do with an object whose subject has no substitution entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnmatchedPolicy {
    /// Fail the invocation and write nothing.
    #[default]
    Abort,
    /// Copy the object unmodified to the output stage and audit it as unmatched.
    PassThrough,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub config_name: String,
    pub output_stage: String,
    pub unmatched: UnmatchedPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            config_name: DEFAULT_CONFIG_NAME.to_string(),
            output_stage: DEFAULT_OUTPUT_STAGE.to_string(),
            unmatched: UnmatchedPolicy::Abort,
        }
    }
}

/// The orchestrator. Holds only its collaborators, so one instance can serve concurrent invocations.
#[derive(Clone)]
pub struct Pipeline {
    objects: Arc<dyn ObjectStore>,
    configs: Arc<dyn ConfigStore>,
    audit: AuditStore,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        configs: Arc<dyn ConfigStore>,
        audit: AuditStore,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            objects,
            configs,
            audit,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn process(
        &self,
        bucket: &str,
        key: &str,
    ) -> std::result::Result<InvocationOutcome, InvocationError> {
        self.run(bucket, key, None).await
    }

    /// Like [`Pipeline::process`], but every store call and state entry is bounded by `deadline`.
    pub async fn process_with_deadline(
        &self,
        bucket: &str,
        key: &str,
        deadline: Instant,
    ) -> std::result::Result<InvocationOutcome, InvocationError> {
        self.run(bucket, key, Some(deadline)).await
    }

    async fn run(
        &self,
        bucket: &str,
        key: &str,
        deadline: Option<Instant>,
    ) -> std::result::Result<InvocationOutcome, InvocationError> {
        let span = info_span!("deident", bucket, key);
        let mut invocation = Invocation {
            stage: Stage::Fetching,
            deadline,
        };

        let result = self
            .execute(&mut invocation, bucket, key)
            .instrument(span)
            .await;

        result.map_err(|kind| {
            let err = InvocationError {
                bucket: bucket.to_string(),
                key: key.to_string(),
                stage: invocation.stage,
                kind,
            };
            tracing::error!(error = %err, "de-identification failed");
            err
        })
    }

    async fn execute(
        &self,
        inv: &mut Invocation,
        bucket: &str,
        key: &str,
    ) -> Result<InvocationOutcome> {
        inv.enter(Stage::Fetching)?;
        // Pure and cheap: reject unusable keys before touching any store.
        let output_key = derive_output_key(key, &self.settings.output_stage)?;
        inv.bounded(self.audit.ensure_schema()).await?;
        let config = inv
            .bounded(load_config(self.configs.as_ref(), &self.settings.config_name))
            .await?;
        let raw = inv
            .bounded(async { self.objects.get(bucket, key).await.map_err(DeidentError::from) })
            .await?;

        inv.enter(Stage::Parsing)?;
        let mut tree = codec::parse(&raw)?;

        inv.enter(Stage::HashingOriginal)?;
        let digest_before = digest(&codec::serialize(&tree)?);

        inv.enter(Stage::Transforming)?;
        let report = anonymize::apply(&mut tree, &config)?;
        let status = match (report.subject_unmatched, self.settings.unmatched) {
            (false, _) => InvocationStatus::Sanitized,
            (true, UnmatchedPolicy::PassThrough) => InvocationStatus::PassedThrough,
            (true, UnmatchedPolicy::Abort) => {
                return Err(DeidentError::SubjectUnmatched(report.subject_id));
            }
        };
        // Derived before anything is written, so an unauditable object never reaches the output stage.
        let audit_key = derive_key(&tree)?;

        inv.enter(Stage::HashingResult)?;
        let sanitized = codec::serialize(&tree)?;
        let digest_after = digest(&sanitized);

        inv.enter(Stage::Writing)?;
        inv.bounded(async {
            self.objects
                .put(bucket, &output_key, sanitized)
                .await
                .map_err(DeidentError::from)
        })
        .await?;

        inv.enter(Stage::Auditing)?;
        let record = AuditRecord {
            audit_key: audit_key.clone(),
            bucket: bucket.to_string(),
            source_key: key.to_string(),
            output_key: output_key.clone(),
            digest_before: digest_before.clone(),
            digest_after: digest_after.clone(),
            subject_matched: !report.subject_unmatched,
            replaced_tags: report.replaced.len(),
            transformed_at: Utc::now().to_rfc3339(),
        };
        inv.bounded(self.audit.append(&record)).await?;

        // Both writes are committed; a deadline passing now no longer fails the invocation.
        inv.stage = Stage::Done;
        info!(
            audit_key = %audit_key,
            output_key = %output_key,
            status = ?status,
            "object de-identified"
        );

        Ok(InvocationOutcome {
            status,
            processed_key: key.to_string(),
            output_key,
            audit_key,
            digest_before,
            digest_after,
            report,
        })
    }
}

/// Per-call state: the current stage and the optional deadline.
struct Invocation {
    stage: Stage,
    deadline: Option<Instant>,
}

impl Invocation {
    fn enter(&mut self, stage: Stage) -> Result<()> {
        self.stage = stage;
        debug!(%stage, "entering stage");
        match self.deadline {
            Some(at) if Instant::now() >= at => Err(DeidentError::DeadlineExceeded(stage)),
            _ => Ok(()),
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(at) => timeout_at(at, fut)
                .await
                .map_err(|_| DeidentError::DeadlineExceeded(self.stage))?,
            None => fut.await,
        }
    }
}
