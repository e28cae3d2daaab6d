//
// tag.rs
// dicom-deident
//
// Parses the "GGGG,EEEE" tag keys used by the substitution configuration into typed DICOM tags.
//

use dicom::core::Tag;
use dicom_dictionary_std::tags;

use crate::error::{DeidentError, Result};

/// The attribute every substitution is anchored on (Patient ID).
pub const SUBJECT_ANCHOR: Tag = tags::PATIENT_ID;

/// Parse a configuration key such as `"0010,0020"` into a [`Tag`].
///
/// Exactly four hex digits on each side of the comma; surrounding whitespace is ignored.
pub fn parse_tag(raw: &str) -> Result<Tag> {
    let malformed = || DeidentError::ConfigMalformed(format!("{raw:?} is not a GGGG,EEEE tag"));

    let (group, element) = raw.trim().split_once(',').ok_or_else(malformed)?;
    let group = parse_half(group).ok_or_else(malformed)?;
    let element = parse_half(element).ok_or_else(malformed)?;
    Ok(Tag(group, element))
}

fn parse_half(half: &str) -> Option<u16> {
    // from_str_radix alone would also accept "+12" and short forms like "10".
    if half.len() != 4 || !half.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(half, 16).ok()
}

/// Render a tag the way configuration files spell it.
pub fn config_key(tag: Tag) -> String {
    format!("{:04X},{:04X}", tag.group(), tag.element())
}
