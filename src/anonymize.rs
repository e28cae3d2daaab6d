use dicom::core::DataElement;
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::InMemDicomObject;
use tracing::{debug, info, warn};

use crate::config::SubstitutionConfig;
use crate::dicom_access::ElementAccess;
use crate::error::{DeidentError, Result};
use crate::models::DeidentReport;
use crate::tag::SUBJECT_ANCHOR;
use crate::value_repr;

/// Rewrite the configured attributes of `tree` in place.
///
/// The subject identifier selects the substitution set. An unknown subject leaves the
/// tree untouched and is flagged in the report; whether that aborts is the caller's call.
/// Every replacement is validated before the first write, so an error leaves `tree` as it was.
pub fn apply(
    tree: &mut InMemDicomObject<StandardDataDictionary>,
    config: &SubstitutionConfig,
) -> Result<DeidentReport> {
    let subject_id = tree.element_str(SUBJECT_ANCHOR);
    let mut report = DeidentReport {
        subject_id: subject_id.clone(),
        ..DeidentReport::default()
    };

    let Some(substitutions) = subject_id
        .as_deref()
        .and_then(|id| config.lookup(SUBJECT_ANCHOR, id))
    else {
        warn!(subject = ?subject_id, "subject not present in substitution config");
        report.subject_unmatched = true;
        return Ok(report);
    };

    // 1. Validate every replacement against the VR already stored in the tree
    let mut planned = Vec::with_capacity(substitutions.len());
    for (&tag, replacement) in substitutions {
        let Some(vr) = tree.element_vr(tag) else {
            debug!(%tag, "configured attribute absent from object, skipping");
            report.skipped.push(tag);
            continue;
        };
        let value = value_repr::coerce(vr, replacement)
            .map_err(|reason| DeidentError::InvalidReplacementValue { tag, reason })?;
        planned.push(DataElement::new(tag, vr, value));
    }

    // 2. Only then overwrite; put() replaces the existing element with the same tag
    for element in planned {
        report.replaced.push(element.header().tag);
        tree.put(element);
    }

    info!(
        replaced = report.replaced.len(),
        skipped = report.skipped.len(),
        "substitutions applied"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::serialize;
    use crate::fixtures::sample_tree;
    use dicom::core::{Tag, VR};

    const CONFIG: &str = r#"{
        "0010,0020": {
            "111111": { "0010,0010": "Anon^100", "0010,0020": "100", "0010,1040": "Nowhere" },
            "333333": { "0010,0010": "Anon^300" },
            "444444": { "0010,0030": "Anon" }
        }
    }"#;

    fn config() -> SubstitutionConfig {
        SubstitutionConfig::from_slice(CONFIG.as_bytes()).unwrap()
    }

    #[test]
    fn replaces_configured_attributes_and_skips_absent_ones() {
        let mut tree = sample_tree("111111");
        let report = apply(&mut tree, &config()).unwrap();

        assert!(!report.subject_unmatched);
        assert_eq!(report.subject_id.as_deref(), Some("111111"));
        assert_eq!(report.replaced, vec![Tag(0x0010, 0x0010), Tag(0x0010, 0x0020)]);
        assert_eq!(report.skipped, vec![Tag(0x0010, 0x1040)]);

        assert_eq!(tree.element_str(Tag(0x0010, 0x0010)).as_deref(), Some("Anon^100"));
        assert_eq!(tree.element_str(Tag(0x0010, 0x0020)).as_deref(), Some("100"));
        // VR is preserved.
        assert_eq!(tree.element_vr(Tag(0x0010, 0x0010)), Some(VR::PN));
        assert!(!tree.has_element(Tag(0x0010, 0x1040)));
    }

    #[test]
    fn unknown_subject_is_flagged_and_untouched() {
        let mut tree = sample_tree("999999");
        let before = serialize(&tree).unwrap();

        let report = apply(&mut tree, &config()).unwrap();
        assert!(report.subject_unmatched);
        assert!(report.replaced.is_empty());
        assert_eq!(serialize(&tree).unwrap(), before);
    }

    #[test]
    fn absent_subject_counts_as_unmatched() {
        let mut tree = sample_tree("");
        let report = apply(&mut tree, &config()).unwrap();
        assert!(report.subject_unmatched);
        assert_eq!(report.subject_id, None);
    }

    #[test]
    fn malformed_replacement_fails_without_writing() {
        let mut tree = sample_tree("444444");
        let before = serialize(&tree).unwrap();

        let err = apply(&mut tree, &config()).unwrap_err();
        assert!(matches!(
            err,
            DeidentError::InvalidReplacementValue { tag, .. } if tag == Tag(0x0010, 0x0030)
        ));
        assert_eq!(serialize(&tree).unwrap(), before);
    }

    #[test]
    fn reapplying_with_stable_anchor_is_a_fixed_point() {
        // 333333 keeps its subject id, so a second pass re-applies the same values.
        let mut once = sample_tree("333333");
        apply(&mut once, &config()).unwrap();
        let after_once = serialize(&once).unwrap();

        apply(&mut once, &config()).unwrap();
        assert_eq!(serialize(&once).unwrap(), after_once);
    }

    #[test]
    fn reapplying_after_anchor_rewrite_is_a_no_op() {
        let mut tree = sample_tree("111111");
        apply(&mut tree, &config()).unwrap();
        let after_once = serialize(&tree).unwrap();

        let second = apply(&mut tree, &config()).unwrap();
        assert!(second.subject_unmatched);
        assert_eq!(serialize(&tree).unwrap(), after_once);
    }
}
