//
// codec.rs
// dicom-deident
//
// Part 10 byte streams to and from in-memory attribute trees, delegating the format itself to the dicom crates.
//

use dicom::object::{from_reader, DefaultDicomObject};

use crate::error::{DeidentError, Result};

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

/// Parse a DICOM file held in memory.
///
/// Accepts the usual preamble + `DICM` layout as well as a stream that starts directly at the magic code.
pub fn parse(bytes: &[u8]) -> Result<DefaultDicomObject> {
    let body = if bytes.len() >= PREAMBLE_LEN + MAGIC.len()
        && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC
    {
        &bytes[PREAMBLE_LEN..]
    } else if bytes.starts_with(MAGIC) {
        bytes
    } else {
        return Err(DeidentError::InvalidFormat(
            "missing DICM magic code".to_string(),
        ));
    };

    from_reader(body).map_err(|e| DeidentError::InvalidFormat(e.to_string()))
}

/// Write preamble, file meta group and data set.
pub fn serialize(tree: &DefaultDicomObject) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    tree.write_all(&mut out)
        .map_err(|e| DeidentError::InvalidFormat(e.to_string()))?;
    Ok(out)
}
