//! In-memory object store for testing the harness itself.
//!
//! [`SimStore`] implements the [`ObjectStore`] contract over dashmaps and
//! fails every operation with a connection-class error while its fault
//! signal reports disruption. Paired with a simulated control plane whose
//! unsafe kills drive the same signal, it produces exactly the in-window
//! failures a real cluster would.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::trace;
use uuid::Uuid;

use faultline_core::checksum::sha256_hex;
use faultline_core::error::{Error, Result};
use faultline_core::signal::{FaultSignal, NoDisruption};
use faultline_core::types::ErrorClass;

use crate::object_store::{ObjectStore, PartRef};

#[derive(Debug, Default)]
struct SimUpload {
    bucket: String,
    key: String,
    parts: DashMap<i32, (String, Bytes)>,
}

/// In-memory S3-compatible store with a pluggable disruption signal.
pub struct SimStore {
    buckets: DashMap<String, DashMap<String, Bytes>>,
    uploads: DashMap<String, SimUpload>,
    signal: Arc<dyn FaultSignal>,
    op_latency: Duration,
}

impl SimStore {
    /// A store that never fails.
    #[must_use]
    pub fn new() -> Self {
        Self::with_signal(Arc::new(NoDisruption))
    }

    /// A store that fails operations while `signal` reports disruption.
    #[must_use]
    pub fn with_signal(signal: Arc<dyn FaultSignal>) -> Self {
        Self {
            buckets: DashMap::new(),
            uploads: DashMap::new(),
            signal,
            op_latency: Duration::ZERO,
        }
    }

    /// Adds fixed per-operation latency, so operations can straddle a fault
    /// window the way real network calls do.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.op_latency = latency;
        self
    }

    /// Models the blocking call: pay the latency, then fail if the serving
    /// path is disrupted at completion time.
    async fn serve(&self, op: &str) -> Result<()> {
        if !self.op_latency.is_zero() {
            tokio::time::sleep(self.op_latency).await;
        }
        if self.signal.is_disrupted() {
            trace!(op, "Simulated store refusing operation during disruption");
            return Err(Error::store(
                ErrorClass::Connection,
                format!("{op}: connection reset by peer"),
            ));
        }
        Ok(())
    }

    fn bucket(
        &self,
        name: &str,
    ) -> Result<dashmap::mapref::one::Ref<'_, String, DashMap<String, Bytes>>> {
        self.buckets
            .get(name)
            .ok_or_else(|| Error::store(ErrorClass::NotFound, format!("no such bucket: {name}")))
    }
}

impl Default for SimStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for SimStore {
    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.serve("create_bucket").await?;
        self.buckets.entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.serve("delete_bucket").await?;
        let occupied = !self.bucket(bucket)?.is_empty();
        if occupied {
            return Err(Error::store(
                ErrorClass::Service,
                format!("bucket not empty: {bucket}"),
            ));
        }
        self.buckets.remove(bucket);
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        self.serve("list_buckets").await?;
        let mut names: Vec<String> = self.buckets.iter().map(|b| b.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<String> {
        self.serve("put_object").await?;
        let etag = sha256_hex(&body);
        self.bucket(bucket)?.insert(key.to_string(), body);
        Ok(etag)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.serve("get_object").await?;
        self.bucket(bucket)?
            .get(key)
            .map(|o| o.clone())
            .ok_or_else(|| Error::store(ErrorClass::NotFound, format!("no such key: {key}")))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.serve("delete_object").await?;
        self.bucket(bucket)?.remove(key);
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        self.serve("list_objects").await?;
        let mut keys: Vec<String> = self.bucket(bucket)?.iter().map(|o| o.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        self.serve("create_multipart_upload").await?;
        self.bucket(bucket)?;
        let upload_id = Uuid::new_v4().to_string();
        self.uploads.insert(
            upload_id.clone(),
            SimUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: DashMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String> {
        self.serve("upload_part").await?;
        let upload = self.uploads.get(upload_id).ok_or_else(|| {
            Error::store(ErrorClass::NotFound, format!("no such upload: {upload_id}"))
        })?;
        if upload.bucket != bucket || upload.key != key {
            return Err(Error::store(
                ErrorClass::Service,
                format!("upload {upload_id} does not belong to {bucket}/{key}"),
            ));
        }
        let etag = sha256_hex(&body);
        upload.parts.insert(part_number, (etag.clone(), body));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartRef],
    ) -> Result<String> {
        self.serve("complete_multipart_upload").await?;
        let (_, upload) = self.uploads.remove(upload_id).ok_or_else(|| {
            Error::store(ErrorClass::NotFound, format!("no such upload: {upload_id}"))
        })?;

        let mut ordered: Vec<&PartRef> = parts.iter().collect();
        ordered.sort_by_key(|(number, _)| *number);

        let mut assembled = Vec::new();
        for (number, etag) in ordered {
            let part = upload.parts.get(number).ok_or_else(|| {
                Error::store(ErrorClass::Service, format!("invalid part: {number}"))
            })?;
            if part.0 != *etag {
                return Err(Error::store(
                    ErrorClass::Service,
                    format!("part {number} etag mismatch"),
                ));
            }
            assembled.extend_from_slice(&part.1);
        }

        let body = Bytes::from(assembled);
        let final_etag = sha256_hex(&body);
        self.bucket(bucket)?.insert(key.to_string(), body);
        Ok(final_etag)
    }

    async fn list_parts(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<Vec<PartRef>> {
        self.serve("list_parts").await?;
        let upload = self.uploads.get(upload_id).ok_or_else(|| {
            Error::store(ErrorClass::NotFound, format!("no such upload: {upload_id}"))
        })?;
        let mut parts: Vec<PartRef> = upload
            .parts
            .iter()
            .map(|p| (*p.key(), p.value().0.clone()))
            .collect();
        parts.sort_by_key(|(number, _)| *number);
        Ok(parts)
    }
}
