//! Storage sink capability
//!
//! Implementations:
//! - MemorySink (tests, dry runs)
//! - OpendalSink (stream2parquet-storage: fs, s3, memory)

use crate::error::BoxError;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Durable destination for finished artifacts.
///
/// `put` must be safe to repeat with the same key and bytes; the exporter
/// itself never retries.
pub trait Sink: Send + Sync {
    fn put(&self, key: &str, bytes: Bytes) -> Result<(), BoxError>;
}

/// Read access to previously stored artifacts.
pub trait ArtifactReader: Send + Sync {
    fn get(&self, key: &str) -> Result<Bytes, BoxError>;
}

impl<T: Sink + ?Sized> Sink for &T {
    fn put(&self, key: &str, bytes: Bytes) -> Result<(), BoxError> {
        (**self).put(key, bytes)
    }
}

impl<T: Sink + ?Sized> Sink for Arc<T> {
    fn put(&self, key: &str, bytes: Bytes) -> Result<(), BoxError> {
        (**self).put(key, bytes)
    }
}

impl<T: ArtifactReader + ?Sized> ArtifactReader for Arc<T> {
    fn get(&self, key: &str) -> Result<Bytes, BoxError> {
        (**self).get(key)
    }
}

/// In-process sink keeping artifacts in a sorted map.
#[derive(Debug, Default)]
pub struct MemorySink {
    objects: Mutex<BTreeMap<String, Bytes>>,
    puts: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls received, including overwrites.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().get(key).cloned()
    }
}

impl Sink for MemorySink {
    fn put(&self, key: &str, bytes: Bytes) -> Result<(), BoxError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().insert(key.to_string(), bytes);
        Ok(())
    }
}

impl ArtifactReader for MemorySink {
    fn get(&self, key: &str) -> Result<Bytes, BoxError> {
        self.object(key)
            .ok_or_else(|| format!("object not found: {}", key).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_overwrites_and_counts() {
        let sink = MemorySink::new();
        sink.put("a", Bytes::from_static(b"one")).unwrap();
        sink.put("a", Bytes::from_static(b"two")).unwrap();
        sink.put("b", Bytes::from_static(b"three")).unwrap();

        assert_eq!(sink.put_count(), 3);
        assert_eq!(sink.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(sink.get("a").unwrap(), Bytes::from_static(b"two"));
        assert!(sink.get("missing").is_err());
    }
}
