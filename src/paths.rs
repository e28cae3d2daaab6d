//
// paths.rs
// dicom-deident
//
// Maps an ingestion key such as dicom/input/f.dcm to its sibling output location dicom/output/f.dcm.
//

use crate::error::{DeidentError, Result};

pub const DEFAULT_OUTPUT_STAGE: &str = "output";

/// Replace the stage segment (the directory holding the file) with `output_stage`.
///
/// Needs at least two non-empty segments above the file name. A key already in the
/// output stage is rejected, since writing there would feed the pipeline its own output.
pub fn derive_output_key(source_key: &str, output_stage: &str) -> Result<String> {
    let unrecognized = |why: &str| DeidentError::UnrecognizedPathShape(format!("{source_key:?}: {why}"));

    let (parent, file_name) = source_key
        .rsplit_once('/')
        .ok_or_else(|| unrecognized("no directory above the file name"))?;
    if file_name.is_empty() {
        return Err(unrecognized("empty file name"));
    }

    let populated = parent.split('/').filter(|s| !s.is_empty()).count();
    if populated < 2 {
        return Err(unrecognized("needs an ancestor and a stage directory"));
    }

    let (ancestors, stage) = parent
        .trim_end_matches('/')
        .rsplit_once('/')
        .ok_or_else(|| unrecognized("needs an ancestor and a stage directory"))?;
    if stage == output_stage {
        return Err(unrecognized("already in the output stage"));
    }

    Ok(format!("{ancestors}/{output_stage}/{file_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_stage_and_keeps_ancestors() {
        assert_eq!(
            derive_output_key("a/b/input/f.ext", DEFAULT_OUTPUT_STAGE).unwrap(),
            "a/b/output/f.ext"
        );
        assert_eq!(
            derive_output_key("/dicom/input/f.dcm", DEFAULT_OUTPUT_STAGE).unwrap(),
            "/dicom/output/f.dcm"
        );
        assert_eq!(
            derive_output_key("dicom/incoming/f.dcm", "clean").unwrap(),
            "dicom/clean/f.dcm"
        );
    }

    #[test]
    fn rejects_shallow_or_odd_keys() {
        for key in ["f.ext", "input/f.ext", "/input/f.ext", "a/input/", "a//f.dcm", "a/output/f.dcm"] {
            assert!(
                matches!(
                    derive_output_key(key, DEFAULT_OUTPUT_STAGE),
                    Err(DeidentError::UnrecognizedPathShape(_))
                ),
                "{key} should be rejected"
            );
        }
    }
}
