//! The S3 client seam.
//!
//! Workers consume the [`ObjectStore`] trait; any S3-compatible client
//! satisfies it. [`AwsS3Store`] adapts the AWS SDK, mapping SDK errors onto
//! the coarse [`ErrorClass`] taxonomy the classifier works with.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;

use faultline_core::error::{Error, Result};
use faultline_core::types::ErrorClass;

/// A completed part reference: part number and the ETag the store returned.
pub type PartRef = (i32, String);

/// Object-store operations the harness issues.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates a bucket.
    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Deletes an empty bucket.
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// Lists all bucket names.
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Writes an object, returning its ETag.
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<String>;

    /// Reads an object's full body.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Deletes an object.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Lists object keys in a bucket.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>>;

    /// Starts a multipart upload, returning the upload id.
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String>;

    /// Uploads one part, returning its ETag.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String>;

    /// Completes a multipart upload from the given part set, returning the
    /// final object's ETag.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartRef],
    ) -> Result<String>;

    /// Lists the parts uploaded so far for an in-progress upload.
    async fn list_parts(&self, bucket: &str, key: &str, upload_id: &str) -> Result<Vec<PartRef>>;
}

/// [`ObjectStore`] backed by the AWS SDK, pointed at any S3-compatible
/// endpoint.
#[derive(Debug, Clone)]
pub struct AwsS3Store {
    client: Client,
}

impl AwsS3Store {
    /// Connects to an S3-compatible endpoint with static credentials.
    /// Path-style addressing, since test endpoints rarely resolve
    /// virtual-hosted bucket names.
    pub async fn connect(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "faultline");
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .load()
            .await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();
        Self { client: Client::from_conf(config) }
    }

    /// Wraps an already-configured SDK client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Maps an SDK error onto the harness's coarse failure classes. The class
/// decides nothing by itself; classification against the fault window does.
fn classify<E, R>(err: &SdkError<E, R>) -> ErrorClass
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::TimeoutError(_) => ErrorClass::Timeout,
        SdkError::DispatchFailure(_) => ErrorClass::Connection,
        SdkError::ServiceError(_) => match err.code() {
            Some("NoSuchKey" | "NoSuchBucket" | "NoSuchUpload" | "NotFound") => {
                ErrorClass::NotFound
            }
            _ => ErrorClass::Service,
        },
        _ => ErrorClass::Other,
    }
}

fn store_err<E, R>(op: &str, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::fmt::Debug,
    R: std::fmt::Debug,
{
    let class = classify(&err);
    let detail = err
        .message()
        .map_or_else(|| format!("{err:?}"), ToOwned::to_owned);
    Error::store(class, format!("{op}: {detail}"))
}

#[async_trait]
impl ObjectStore for AwsS3Store {
    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| store_err("create_bucket", e))?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| store_err("delete_bucket", e))?;
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| store_err("list_buckets", e))?;
        Ok(resp
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(ToOwned::to_owned))
            .collect())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<String> {
        let resp = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| store_err("put_object", e))?;
        Ok(resp.e_tag().unwrap_or_default().to_string())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_err("get_object", e))?;
        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| Error::store(ErrorClass::Connection, format!("get_object body: {e}")))?;
        Ok(data.into_bytes())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_err("delete_object", e))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| store_err("list_objects", e))?;
        Ok(resp
            .contents()
            .iter()
            .filter_map(|o| o.key().map(ToOwned::to_owned))
            .collect())
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_err("create_multipart_upload", e))?;
        resp.upload_id()
            .map(ToOwned::to_owned)
            .ok_or_else(|| Error::store(ErrorClass::Service, "upload id missing from response"))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String> {
        let resp = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| store_err("upload_part", e))?;
        Ok(resp.e_tag().unwrap_or_default().to_string())
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartRef],
    ) -> Result<String> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|(number, etag)| {
                CompletedPart::builder()
                    .part_number(*number)
                    .e_tag(etag)
                    .build()
            })
            .collect();
        let resp = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| store_err("complete_multipart_upload", e))?;
        Ok(resp.e_tag().unwrap_or_default().to_string())
    }

    async fn list_parts(&self, bucket: &str, key: &str, upload_id: &str) -> Result<Vec<PartRef>> {
        let resp = self
            .client
            .list_parts()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| store_err("list_parts", e))?;
        Ok(resp
            .parts()
            .iter()
            .filter_map(|p| {
                let number = p.part_number()?;
                let etag = p.e_tag()?;
                Some((number, etag.to_owned()))
            })
            .collect())
    }
}
