use dicom::core::{Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{DefaultDicomObject, InMemDicomObject};

/// Small helper trait to pull trimmed text and VRs out of different DICOM object shapes.
pub trait ElementAccess {
    /// Text value with DICOM padding removed; `None` when absent, binary or empty.
    fn element_str(&self, tag: Tag) -> Option<String>;
    fn element_vr(&self, tag: Tag) -> Option<VR>;

    fn has_element(&self, tag: Tag) -> bool {
        self.element_vr(tag).is_some()
    }
}

impl ElementAccess for InMemDicomObject<StandardDataDictionary> {
    fn element_str(&self, tag: Tag) -> Option<String> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| trim_padding(&s).to_string())
            .filter(|s| !s.is_empty())
    }

    fn element_vr(&self, tag: Tag) -> Option<VR> {
        self.element(tag).ok().map(|e| e.vr())
    }
}

impl ElementAccess for DefaultDicomObject {
    fn element_str(&self, tag: Tag) -> Option<String> {
        (**self).element_str(tag)
    }

    fn element_vr(&self, tag: Tag) -> Option<VR> {
        (**self).element_vr(tag)
    }
}

/// Strip the space/NUL padding DICOM adds to reach an even length.
pub fn trim_padding(value: &str) -> &str {
    value.trim_matches(|c: char| c == ' ' || c == '\0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_tree;

    #[test]
    fn reads_trimmed_text_and_vr() {
        let tree = sample_tree("100 ");
        assert_eq!(tree.element_str(Tag(0x0010, 0x0020)).as_deref(), Some("100"));
        assert_eq!(tree.element_vr(Tag(0x0008, 0x0021)), Some(VR::DA));
        assert!(tree.has_element(Tag(0x0020, 0x0013)));
        assert!(!tree.has_element(Tag(0x0010, 0x1040)));
    }

    #[test]
    fn blank_values_read_as_absent() {
        let tree = sample_tree("   ");
        assert_eq!(tree.element_str(Tag(0x0010, 0x0020)), None);
        assert!(tree.has_element(Tag(0x0010, 0x0020)));
    }
}
