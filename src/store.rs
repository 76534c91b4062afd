//! Blob storage for staged and validated objects.
//!
//! Both stages talk to storage only through [`BlobStore`]. Two backends
//! ship with the crate:
//! - [`FsBlobStore`]: one directory per bucket under a root path, used by
//!   the local runner.
//! - [`MemoryBlobStore`]: a process-local map, used by tests.
//!
//! [`EventRecordingStore`] wraps either one and records an
//! object-created event for every successful put, standing in for the
//! storage event wiring that triggers the validation stage.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use crate::model::{ObjectRef, StoreError};
use crate::trigger::ObjectCreatedEvent;

/// Suffix of the sidecar file holding an object's content type.
const CONTENT_TYPE_SUFFIX: &str = ".content-type";

/// Minimal get/put blob interface.
pub trait BlobStore: Send + Sync {
    fn put(&self, bucket: &str, key: &str, body: &[u8], content_type: &str) -> Result<(), StoreError>;

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// Stores `bucket/key` at `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves an object path, refusing anything that would escape the
    /// bucket directory.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        if !is_plain_segment(bucket) {
            return Err(StoreError::Rejected(format!("invalid bucket name {:?}", bucket)));
        }
        let relative = Path::new(key);
        let key_ok = !key.is_empty()
            && !key.ends_with(CONTENT_TYPE_SUFFIX)
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !key_ok {
            return Err(StoreError::Rejected(format!("invalid object key {:?}", key)));
        }
        Ok(self.root.join(bucket).join(relative))
    }

    /// Content type recorded for an object, if any.
    pub fn content_type(&self, bucket: &str, key: &str) -> Result<Option<String>, StoreError> {
        let path = sidecar_path(&self.object_path(bucket, key)?);
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, bucket: &str, key: &str, body: &[u8], content_type: &str) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, body)?;
        fs::write(sidecar_path(&path), content_type)?;
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_plain_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\\')
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(CONTENT_TYPE_SUFFIX);
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A stored object with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Process-local store. Puts to a bucket listed in `rejecting` fail,
/// which lets tests drive the write-failure branches.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<ObjectRef, StoredObject>>,
    rejecting: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent put to `bucket` fail with `Rejected`.
    pub fn reject_writes_to(&self, bucket: &str) {
        if let Ok(mut rejecting) = self.rejecting.lock() {
            rejecting.push(bucket.to_string());
        }
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(&ObjectRef::new(bucket, key)).cloned())
    }

    /// Sorted keys stored under `bucket`.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .map(|objects| {
                objects
                    .keys()
                    .filter(|r| r.bucket == bucket)
                    .map(|r| r.key.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, bucket: &str, key: &str, body: &[u8], content_type: &str) -> Result<(), StoreError> {
        let rejected = self
            .rejecting
            .lock()
            .map_err(|_| StoreError::Io("store lock poisoned".to_string()))?
            .iter()
            .any(|b| b == bucket);
        if rejected {
            return Err(StoreError::Rejected(format!("writes to bucket {} are disabled", bucket)));
        }
        self.objects
            .lock()
            .map_err(|_| StoreError::Io("store lock poisoned".to_string()))?
            .insert(
                ObjectRef::new(bucket, key),
                StoredObject {
                    body: body.to_vec(),
                    content_type: content_type.to_string(),
                },
            );
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .lock()
            .map_err(|_| StoreError::Io("store lock poisoned".to_string()))?
            .get(&ObjectRef::new(bucket, key))
            .map(|o| o.body.clone())
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Object-created event recording
// ---------------------------------------------------------------------------

/// Records an [`ObjectCreatedEvent`] for each successful put to one
/// watched bucket.
pub struct EventRecordingStore<S> {
    inner: S,
    watched_bucket: String,
    events: Mutex<Vec<ObjectCreatedEvent>>,
}

impl<S: BlobStore> EventRecordingStore<S> {
    pub fn new(inner: S, watched_bucket: impl Into<String>) -> Self {
        Self {
            inner,
            watched_bucket: watched_bucket.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Takes all events recorded so far, oldest first.
    pub fn drain_events(&self) -> Vec<ObjectCreatedEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl<S: BlobStore> BlobStore for EventRecordingStore<S> {
    fn put(&self, bucket: &str, key: &str, body: &[u8], content_type: &str) -> Result<(), StoreError> {
        self.inner.put(bucket, key, body, content_type)?;
        if bucket == self.watched_bucket {
            if let Ok(mut events) = self.events.lock() {
                events.push(ObjectCreatedEvent::new(bucket, key));
            }
        }
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get(bucket, key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
