//
// config.rs
// dicom-deident
//
// Loads and validates the three-level substitution table: anchor tag -> anchor value -> target tag -> replacement.
//

use std::collections::BTreeMap;

use dicom::core::Tag;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{DeidentError, Result};
use crate::stores::ConfigStore;
use crate::tag::parse_tag;

/// Replacements for one subject, ordered by tag.
pub type Substitutions = BTreeMap<Tag, String>;

/// Validated substitution table. Read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionConfig {
    anchors: BTreeMap<Tag, BTreeMap<String, Substitutions>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    pub anchors: usize,
    pub subjects: usize,
    pub replacements: usize,
}

impl SubstitutionConfig {
    /// Parse and validate a serialized configuration blob.
    pub fn from_slice(blob: &[u8]) -> Result<Self> {
        let root: Value = serde_json::from_slice(blob)
            .map_err(|e| DeidentError::ConfigMalformed(format!("not valid JSON: {e}")))?;

        let mut anchors = BTreeMap::new();
        for (anchor_key, subjects) in expect_object(&root, "configuration root")? {
            let anchor = parse_tag(anchor_key)?;
            let mut by_subject = BTreeMap::new();

            for (subject, targets) in expect_object(subjects, anchor_key)? {
                let mut substitutions = Substitutions::new();
                for (target_key, replacement) in expect_object(targets, subject)? {
                    let target = parse_tag(target_key)?;
                    substitutions.insert(target, replacement_text(target_key, replacement)?);
                }
                by_subject.insert(subject.clone(), substitutions);
            }
            anchors.insert(anchor, by_subject);
        }

        Ok(Self { anchors })
    }

    /// Substitutions configured for `value` of the `anchor` attribute.
    pub fn lookup(&self, anchor: Tag, value: &str) -> Option<&Substitutions> {
        self.anchors.get(&anchor)?.get(value)
    }

    pub fn summary(&self) -> ConfigSummary {
        let subjects = self.anchors.values().map(BTreeMap::len).sum();
        let replacements = self
            .anchors
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeMap::len)
            .sum();
        ConfigSummary {
            anchors: self.anchors.len(),
            subjects,
            replacements,
        }
    }
}

/// Fetch the named configuration from `store` and validate it.
pub async fn load_config(store: &dyn ConfigStore, name: &str) -> Result<SubstitutionConfig> {
    let blob = store
        .get(name)
        .await
        .map_err(|e| DeidentError::ConfigUnavailable(format!("{name}: {e}")))?;
    let config = SubstitutionConfig::from_slice(&blob)?;
    debug!(name, summary = ?config.summary(), "substitution config loaded");
    Ok(config)
}

fn expect_object<'a>(
    value: &'a Value,
    context: &str,
) -> Result<&'a serde_json::Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        DeidentError::ConfigMalformed(format!("expected an object under {context:?}"))
    })
}

fn replacement_text(target_key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(DeidentError::ConfigMalformed(format!(
            "replacement for {target_key:?} must be a string or number, found {other}"
        ))),
    }
}
