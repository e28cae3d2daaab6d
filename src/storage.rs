//
// storage.rs
// dicom-deident
//
// Filesystem-backed object, config and audit stores with path sanitization, for local runs and tests.
//

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::AuditRecord;
use crate::stores::{AuditBackend, ConfigStore, ObjectStore, StoreResult};

/// Objects live at `<root>/<bucket>/<key>`.
#[derive(Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn resolve(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        let bucket = safe_relative(bucket)?;
        let key = safe_relative(key.trim_start_matches('/'))?;
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.resolve(bucket, key)?;
        fs::read(&path).await.map_err(StoreError::from)
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> StoreResult<()> {
        let path = self.resolve(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(unavailable)?;
        }

        // Write beside the target and rename so readers never see a partial object.
        let staging = staging_path(&path);
        let mut file = fs::File::create(&staging).await.map_err(unavailable)?;
        file.write_all(&bytes).await.map_err(unavailable)?;
        file.sync_all().await.map_err(unavailable)?;
        fs::rename(&staging, &path).await.map_err(unavailable)
    }
}

/// Parameter `/dicom-deident/edits-00` lives at `<root>/dicom-deident/edits-00.json`.
#[derive(Clone)]
pub struct FsConfigStore {
    root: PathBuf,
}

impl FsConfigStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ConfigStore for FsConfigStore {
    async fn get(&self, name: &str) -> StoreResult<Vec<u8>> {
        let relative = safe_relative(name.trim_start_matches('/'))?;
        let path = self.root.join(relative).with_extension("json");
        fs::read(&path).await.map_err(StoreError::from)
    }
}

/// One JSON-lines file per table: `<root>/<table>.jsonl`.
pub struct FsAuditBackend {
    root: PathBuf,
    // Serializes appends from this process so lines never interleave.
    writer: Mutex<()>,
}

impl FsAuditBackend {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            writer: Mutex::new(()),
        }
    }

    fn table_path(&self, table: &str) -> StoreResult<PathBuf> {
        let name = sanitize_table_name(table);
        if name.is_empty() {
            return Err(StoreError::Unavailable(format!("invalid table name {table:?}")));
        }
        Ok(self.root.join(format!("{name}.jsonl")))
    }

    /// Every record of `table`, in write order.
    pub async fn read_table(&self, table: &str) -> StoreResult<Vec<AuditRecord>> {
        let path = self.table_path(table)?;
        let text = fs::read_to_string(&path).await.map_err(StoreError::from)?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| StoreError::Unavailable(format!("corrupt audit line: {e}")))
            })
            .collect()
    }

    async fn append_line(&self, path: &Path, record: &AuditRecord) -> StoreResult<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| StoreError::Unavailable(format!("serialize audit record: {e}")))?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(path)
            .await
            .map_err(StoreError::from)?;
        file.write_all(line.as_bytes()).await.map_err(unavailable)?;
        file.sync_data().await.map_err(unavailable)
    }
}

#[async_trait]
impl AuditBackend for FsAuditBackend {
    async fn create_table(&self, table: &str) -> StoreResult<()> {
        let path = self.table_path(table)?;
        fs::create_dir_all(&self.root).await.map_err(unavailable)?;
        // create_new makes the filesystem arbitrate concurrent creators.
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map(|_| ())
            .map_err(StoreError::from)
    }

    async fn put_record(&self, table: &str, record: &AuditRecord) -> StoreResult<()> {
        let path = self.table_path(table)?;
        let _guard = self.writer.lock().await;
        self.append_line(&path, record).await
    }

    async fn put_record_if_absent(&self, table: &str, record: &AuditRecord) -> StoreResult<bool> {
        let path = self.table_path(table)?;
        let _guard = self.writer.lock().await;
        let existing = self.read_table(table).await?;
        if existing.iter().any(|row| row.audit_key == record.audit_key) {
            return Ok(false);
        }
        self.append_line(&path, record).await?;
        Ok(true)
    }
}

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// A sibling of `target` no other writer, in this process or another, will pick.
fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{name}.{}.{seq}.partial", std::process::id()))
}

fn unavailable(err: std::io::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// Accept only plain relative paths: no `..`, no roots, no prefixes.
fn safe_relative(raw: &str) -> StoreResult<PathBuf> {
    let path = Path::new(raw);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(StoreError::NotFound(format!(
                    "{raw:?} escapes the storage root"
                )))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(StoreError::NotFound(format!("{raw:?} is empty")));
    }
    Ok(clean)
}

fn sanitize_table_name(input: &str) -> String {
    // Keep only ASCII word characters and a few safe separators to avoid filesystem surprises.
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn record(key: &str) -> AuditRecord {
        AuditRecord {
            audit_key: key.to_string(),
            bucket: "scans".into(),
            source_key: "dicom/input/a.dcm".into(),
            output_key: "dicom/output/a.dcm".into(),
            digest_before: "aa".into(),
            digest_after: "bb".into(),
            subject_matched: true,
            replaced_tags: 1,
            transformed_at: "2024-01-02T10:15:00+00:00".into(),
        }
    }

    #[test]
    fn sanitize_strips_dangerous_characters() {
        assert_eq!(sanitize_table_name("../dicom edits"), "dicomedits");
        assert_eq!(sanitize_table_name("dicom-edits"), "dicom-edits");
    }

    #[tokio::test]
    async fn objects_round_trip_under_bucket_directories() {
        let root = tempdir().expect("tmpdir");
        let store = FsObjectStore::new(root.path());

        store
            .put("scans", "dicom/output/a.dcm", b"abc".to_vec())
            .await
            .expect("put");
        assert!(root.path().join("scans/dicom/output/a.dcm").exists());
        assert_eq!(
            std::fs::read_dir(root.path().join("scans/dicom/output"))
                .unwrap()
                .count(),
            1
        );
        assert_eq!(store.get("scans", "dicom/output/a.dcm").await.unwrap(), b"abc");
        assert!(matches!(
            store.get("scans", "dicom/output/missing.dcm").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_of_one_key_all_succeed() {
        let root = tempdir().expect("tmpdir");
        let store = Arc::new(FsObjectStore::new(root.path()));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..32u8 {
            let store = store.clone();
            tasks.spawn(async move {
                store
                    .put("scans", "dicom/output/a.dcm", vec![i; 256 * 1024])
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.expect("task").expect("put");
        }

        let stored = store.get("scans", "dicom/output/a.dcm").await.unwrap();
        assert_eq!(stored.len(), 256 * 1024);
        assert!(stored.iter().all(|b| *b == stored[0]));
        assert_eq!(
            std::fs::read_dir(root.path().join("scans/dicom/output"))
                .unwrap()
                .count(),
            1
        );
    }

    #[test]
    fn staging_names_differ_for_one_target_and_for_sibling_extensions() {
        let a = staging_path(Path::new("/r/scans/a.dcm"));
        let b = staging_path(Path::new("/r/scans/a.dcm"));
        let c = staging_path(Path::new("/r/scans/a.json"));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.parent(), Some(Path::new("/r/scans")));
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_root() {
        let root = tempdir().expect("tmpdir");
        let store = FsObjectStore::new(root.path().join("safe-area"));
        std::fs::write(root.path().join("escape.dcm"), b"attack").expect("write outside file");

        assert!(store.get("..", "escape.dcm").await.is_err());
        assert!(store.get("scans", "../../escape.dcm").await.is_err());
        assert!(store.put("scans", "a/../../x", vec![1]).await.is_err());
    }

    #[tokio::test]
    async fn config_names_map_to_json_files() {
        let root = tempdir().expect("tmpdir");
        std::fs::create_dir_all(root.path().join("dicom-deident")).unwrap();
        std::fs::write(root.path().join("dicom-deident/edits-00.json"), b"{}").unwrap();

        let store = FsConfigStore::new(root.path());
        assert_eq!(store.get("/dicom-deident/edits-00").await.unwrap(), b"{}");
        assert!(matches!(
            store.get("/dicom-deident/edits-01").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_table_creation_yields_one_table() {
        let root = tempdir().expect("tmpdir");
        let backend = Arc::new(FsAuditBackend::new(root.path()));

        let (a, b) = tokio::join!(
            backend.create_table("dicom-edits"),
            backend.create_table("dicom-edits")
        );
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(StoreError::AlreadyExists(_)))));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn records_append_as_json_lines() {
        let root = tempdir().expect("tmpdir");
        let backend = FsAuditBackend::new(root.path());
        backend.create_table("dicom-edits").await.unwrap();

        backend.put_record("dicom-edits", &record("k1")).await.unwrap();
        assert!(backend
            .put_record_if_absent("dicom-edits", &record("k2"))
            .await
            .unwrap());
        assert!(!backend
            .put_record_if_absent("dicom-edits", &record("k1"))
            .await
            .unwrap());

        let rows = backend.read_table("dicom-edits").await.unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.audit_key.as_str()).collect();
        assert_eq!(keys, ["k1", "k2"]);
    }

    #[tokio::test]
    async fn appending_to_a_missing_table_fails() {
        let root = tempdir().expect("tmpdir");
        let backend = FsAuditBackend::new(root.path());
        assert!(backend.put_record("dicom-edits", &record("k")).await.is_err());
    }
}
