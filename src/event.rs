use serde::Deserialize;
use url::form_urlencoded;

use crate::error::{DeidentError, Result};

/// Bucket and key of the object a storage notification refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Notification {
    records: Vec<NotificationRecord>,
}

#[derive(Deserialize)]
struct NotificationRecord {
    s3: S3Entity,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: Named,
    object: ObjectKey,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
struct ObjectKey {
    key: String,
}

/// Extract the first record of an S3-style "object created" notification.
///
/// Keys arrive form-encoded (`+` for space, `%XX` escapes) and are decoded here.
pub fn object_from_notification(payload: &[u8]) -> Result<ObjectRef> {
    let notification: Notification = serde_json::from_slice(payload)
        .map_err(|e| DeidentError::InvalidEvent(e.to_string()))?;
    let record = notification
        .records
        .into_iter()
        .next()
        .ok_or_else(|| DeidentError::InvalidEvent("notification has no records".to_string()))?;

    Ok(ObjectRef {
        bucket: record.s3.bucket.name,
        key: decode_key(&record.s3.object.key)?,
    })
}

fn decode_key(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(DeidentError::InvalidEvent("empty object key".to_string()));
    }
    // Raw '&' and '=' are literal key characters, not form separators.
    let escaped = raw.replace('&', "%26").replace('=', "%3D");
    form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .ok_or_else(|| DeidentError::InvalidEvent(format!("undecodable object key {raw:?}")))
}
