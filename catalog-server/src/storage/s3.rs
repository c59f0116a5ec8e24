//! S3 object storage
//!
//! Objects are written under `{key_prefix}/{stem}-{uuid}.{ext}` and
//! referenced by `{public_base_url}/{key}`.

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;

use super::{DeleteOutcome, ImageStore, StorageError, StorageResult, UploadedImage};

#[derive(Debug, Clone)]
pub struct S3ImageStore {
    client: S3Client,
    bucket: String,
    key_prefix: String,
    public_base_url: String,
}

impl S3ImageStore {
    pub fn new(
        client: S3Client,
        bucket: String,
        key_prefix: String,
        public_base_url: String,
    ) -> Self {
        Self {
            client,
            bucket,
            key_prefix,
            public_base_url,
        }
    }

    /// Build a client from the default AWS credential chain
    ///
    /// A custom endpoint (MinIO, LocalStack) switches to path-style addressing.
    pub async fn from_env(
        bucket: String,
        key_prefix: String,
        public_base_url: String,
        endpoint_url: Option<&str>,
    ) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self::new(
            S3Client::from_conf(builder.build()),
            bucket,
            key_prefix,
            public_base_url,
        )
    }

    fn object_key(&self, image: &UploadedImage) -> String {
        format!(
            "{}/{}-{}.{}",
            self.key_prefix,
            image.sanitized_stem(),
            uuid::Uuid::new_v4(),
            image.kind.extension()
        )
    }

    fn key_for(&self, reference: &str) -> StorageResult<String> {
        key_from_reference(&self.public_base_url, &self.key_prefix, reference)
            .map(str::to_string)
            .ok_or_else(|| StorageError::InvalidReference(reference.to_string()))
    }

    /// HEAD the object; `Ok(false)` when S3 answers 404
    async fn head(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(StorageError::Backend(DisplayErrorContext(&e).to_string())),
        }
    }
}

/// Recover the object key from a stored reference
///
/// The configured public base URL and any query string or fragment are
/// stripped; the remainder must sit under `key_prefix/` and must not contain
/// `..` segments.
pub fn key_from_reference<'a>(
    public_base_url: &str,
    key_prefix: &str,
    reference: &'a str,
) -> Option<&'a str> {
    let path = reference
        .strip_prefix(public_base_url.trim_end_matches('/'))?
        .strip_prefix('/')?;
    let key = path.split(['?', '#']).next().unwrap_or(path);

    let under_prefix = key
        .strip_prefix(key_prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|name| !name.is_empty());
    let has_traversal = key.split('/').any(|seg| seg == ".." || seg == "." || seg.is_empty());

    (under_prefix && !has_traversal).then_some(key)
}

#[async_trait]
impl ImageStore for S3ImageStore {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn store(&self, image: &UploadedImage) -> StorageResult<String> {
        let key = self.object_key(image);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(image.data.clone()))
            .content_type(image.kind.mime_type())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(key = %key, error = %DisplayErrorContext(&e), "S3 upload failed");
                StorageError::Backend(DisplayErrorContext(&e).to_string())
            })?;

        tracing::debug!(key = %key, size = image.len(), "Image uploaded to S3");
        Ok(format!("{}/{}", self.public_base_url, key))
    }

    async fn delete(&self, reference: &str) -> StorageResult<DeleteOutcome> {
        let key = self.key_for(reference)?;

        // DeleteObject succeeds on missing keys, so ask first
        if !self.head(&key).await? {
            return Ok(DeleteOutcome::NotFound);
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))?;

        Ok(DeleteOutcome::Deleted)
    }

    async fn exists(&self, reference: &str) -> StorageResult<bool> {
        let key = self.key_for(reference)?;
        self.head(&key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://shop-assets.s3.amazonaws.com";
    const PREFIX: &str = "product_images";

    #[test]
    fn test_key_from_reference() {
        assert_eq!(
            key_from_reference(BASE, PREFIX, &format!("{BASE}/product_images/shoe-1.png")),
            Some("product_images/shoe-1.png")
        );
        // Signed or cache-busted URLs
        assert_eq!(
            key_from_reference(
                BASE,
                PREFIX,
                &format!("{BASE}/product_images/shoe-1.png?X-Amz-Expires=60#top")
            ),
            Some("product_images/shoe-1.png")
        );
        // Trailing slash on the configured base
        assert_eq!(
            key_from_reference(
                "https://cdn.example.com/",
                PREFIX,
                "https://cdn.example.com/product_images/a.jpg"
            ),
            Some("product_images/a.jpg")
        );
    }

    #[test]
    fn test_key_from_reference_rejects_foreign() {
        for reference in [
            "https://evil.example.com/product_images/a.png".to_string(),
            format!("{BASE}/other/a.png"),
            format!("{BASE}/product_images/"),
            format!("{BASE}/product_images/../secrets/a.png"),
            format!("{BASE}/product_imagesX/a.png"),
            "/uploads/a.png".to_string(),
        ] {
            assert_eq!(key_from_reference(BASE, PREFIX, &reference), None, "{reference}");
        }
    }
}
