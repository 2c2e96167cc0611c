//! Resumable multipart uploads.
//!
//! A session tracks which parts already landed so a caller can push the rest
//! after a fault clears and still complete the upload; several scenarios
//! finish one upload across two separate fault windows.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use faultline_core::error::Result;

use crate::object_store::{ObjectStore, PartRef};

/// One in-progress multipart upload with resume state.
pub struct MultipartSession {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    upload_id: String,
    parts: Vec<Bytes>,
    completed: Vec<PartRef>,
}

impl MultipartSession {
    /// Starts an upload of `source` split into `part_size` chunks.
    ///
    /// # Errors
    ///
    /// Returns the store error if the upload cannot be created.
    pub async fn begin(
        store: Arc<dyn ObjectStore>,
        bucket: &str,
        key: &str,
        source: &Bytes,
        part_size: usize,
    ) -> Result<Self> {
        let upload_id = store.create_multipart_upload(bucket, key).await?;
        let parts = split_parts(source, part_size);
        debug!(bucket, key, upload_id = %upload_id, parts = parts.len(), "Multipart upload started");
        Ok(Self {
            store,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
            parts,
            completed: Vec::new(),
        })
    }

    /// Parts confirmed uploaded so far, in upload order.
    #[must_use]
    pub fn completed(&self) -> &[PartRef] {
        &self.completed
    }

    /// Number of parts still to upload.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.parts.len() - self.completed.len()
    }

    /// Uploads the next pending part. Returns `false` once every part has
    /// been confirmed.
    ///
    /// # Errors
    ///
    /// Returns the store error; the part stays pending and can be retried.
    pub async fn upload_next(&mut self) -> Result<bool> {
        let index = self.completed.len();
        if index == self.parts.len() {
            return Ok(false);
        }
        let number = (index + 1) as i32;
        let etag = self
            .store
            .upload_part(
                &self.bucket,
                &self.key,
                &self.upload_id,
                number,
                self.parts[index].clone(),
            )
            .await?;
        self.completed.push((number, etag));
        Ok(true)
    }

    /// Uploads every part not yet confirmed. On failure the parts uploaded
    /// so far stay recorded, so calling again resumes rather than restarts.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered; progress is kept.
    pub async fn upload_remaining(&mut self) -> Result<()> {
        while self.upload_next().await? {}
        Ok(())
    }

    /// Completes the upload from the accumulated part set and returns the
    /// final object's ETag.
    ///
    /// # Errors
    ///
    /// Returns the store error if completion is rejected, including when
    /// parts are still missing.
    pub async fn complete(self) -> Result<String> {
        debug!(
            bucket = %self.bucket,
            key = %self.key,
            parts = self.completed.len(),
            "Completing multipart upload"
        );
        self.store
            .complete_multipart_upload(&self.bucket, &self.key, &self.upload_id, &self.completed)
            .await
    }
}

fn split_parts(source: &Bytes, part_size: usize) -> Vec<Bytes> {
    let size = part_size.max(1);
    let mut parts = Vec::with_capacity(source.len().div_ceil(size));
    let mut offset = 0;
    while offset < source.len() {
        let end = (offset + size).min(source.len());
        parts.push(source.slice(offset..end));
        offset = end;
    }
    parts
}
