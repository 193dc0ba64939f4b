//! Blob store backends for source documents.
//!
//! Attachments live in object storage addressed by `bucket/key`
//! locators. The S3 backend is the production path; the filesystem
//! backend maps buckets to directories and backs local runs and tests.

use std::path::PathBuf;

use async_trait::async_trait;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials, Region};
use tokio::fs;
use tracing::debug;

use consentry_core::{Error, Result, StorageLocator};

/// Read access to attachment blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the full contents of the object at `locator`.
    async fn fetch(&self, locator: &StorageLocator) -> Result<Vec<u8>>;

    /// List every object in a bucket.
    async fn list(&self, bucket: &str) -> Result<Vec<StorageLocator>>;
}

// ============================================================================
// Filesystem backend
// ============================================================================

/// Blob store over a local directory tree: `{base}/{bucket}/{key}`.
pub struct FsBlobStore {
    base_path: PathBuf,
}

impl FsBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, locator: &StorageLocator) -> PathBuf {
        self.base_path.join(&locator.bucket).join(&locator.key)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn fetch(&self, locator: &StorageLocator) -> Result<Vec<u8>> {
        let path = self.full_path(locator);
        debug!(
            subsystem = "pipeline",
            component = "blob",
            op = "fetch",
            bucket = %locator.bucket,
            object_key = %locator.key,
            "Fetching blob from filesystem"
        );
        fs::read(&path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read {}: {}", path.display(), e)))
    }

    async fn list(&self, bucket: &str) -> Result<Vec<StorageLocator>> {
        let dir = self.base_path.join(bucket);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| Error::Storage(format!("Failed to list {}: {}", dir.display(), e)))?;

        let mut locators = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Storage(format!("Failed to list {}: {}", dir.display(), e)))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::Storage(format!("Failed to stat entry: {}", e)))?;
            if file_type.is_file() {
                locators.push(StorageLocator {
                    bucket: bucket.to_string(),
                    key: entry.file_name().to_string_lossy().to_string(),
                });
            }
        }
        locators.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(locators)
    }
}

// ============================================================================
// S3 backend
// ============================================================================

/// S3 connection settings.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    /// Custom endpoint for S3-compatible stores; enables path-style
    /// addressing.
    pub endpoint: Option<String>,
    /// Static credentials. When absent the ambient AWS credential chain
    /// applies.
    pub credentials: Option<S3Credentials>,
}

#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl S3Config {
    /// Read S3 settings from the environment.
    ///
    /// `CONSENTRY_S3_REGION` is required when this backend is selected;
    /// `CONSENTRY_S3_ENDPOINT`, `CONSENTRY_S3_ACCESS_KEY_ID`, and
    /// `CONSENTRY_S3_SECRET_ACCESS_KEY` are optional.
    pub fn from_env() -> Result<Self> {
        let region = std::env::var("CONSENTRY_S3_REGION")
            .map_err(|_| Error::Config("CONSENTRY_S3_REGION is not set".to_string()))?;
        let endpoint = std::env::var("CONSENTRY_S3_ENDPOINT").ok();
        let credentials = match (
            std::env::var("CONSENTRY_S3_ACCESS_KEY_ID").ok(),
            std::env::var("CONSENTRY_S3_SECRET_ACCESS_KEY").ok(),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Some(S3Credentials {
                access_key_id,
                secret_access_key,
            }),
            _ => None,
        };
        Ok(Self {
            region,
            endpoint,
            credentials,
        })
    }
}

/// Blob store over an S3-compatible object store.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
}

impl S3BlobStore {
    pub async fn new(config: S3Config) -> Self {
        let shared_config = aws_config::load_from_env().await;
        let mut builder = S3ConfigBuilder::from(&shared_config);

        builder = builder.region(Region::new(config.region.clone()));
        if let Some(credentials) = &config.credentials {
            builder = builder.credentials_provider(Credentials::new(
                &credentials.access_key_id,
                &credentials.secret_access_key,
                None,
                None,
                "consentry",
            ));
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn fetch(&self, locator: &StorageLocator) -> Result<Vec<u8>> {
        debug!(
            subsystem = "pipeline",
            component = "blob",
            op = "fetch",
            bucket = %locator.bucket,
            object_key = %locator.key,
            "Fetching blob from object store"
        );
        let object = self
            .client
            .get_object()
            .bucket(&locator.bucket)
            .key(&locator.key)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Failed to fetch {}: {}", locator, e)))?;

        let data = object
            .body
            .collect()
            .await
            .map_err(|e| Error::Storage(format!("Failed to read body of {}: {}", locator, e)))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn list(&self, bucket: &str) -> Result<Vec<StorageLocator>> {
        let mut locators = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page =
                page.map_err(|e| Error::Storage(format!("Failed to list {}: {}", bucket, e)))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    locators.push(StorageLocator {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    });
                }
            }
        }
        Ok(locators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_fetches_bucket_key_layout() {
        let dir = tempfile::tempdir().unwrap();
        let bucket_dir = dir.path().join("consent-forms");
        std::fs::create_dir_all(&bucket_dir).unwrap();
        std::fs::write(bucket_dir.join("doc.pdf"), b"%PDF-1.4").unwrap();

        let store = FsBlobStore::new(dir.path());
        let locator = StorageLocator::parse("consent-forms/doc.pdf").unwrap();
        let data = store.fetch(&locator).await.unwrap();
        assert_eq!(data, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn fs_store_maps_missing_object_to_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let locator = StorageLocator::parse("consent-forms/missing.pdf").unwrap();
        assert!(matches!(
            store.fetch(&locator).await,
            Err(Error::Storage(_))
        ));
    }

    #[tokio::test]
    async fn fs_store_lists_files_in_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let bucket_dir = dir.path().join("consent-forms");
        std::fs::create_dir_all(bucket_dir.join("nested")).unwrap();
        std::fs::write(bucket_dir.join("b.pdf"), b"b").unwrap();
        std::fs::write(bucket_dir.join("a.pdf"), b"a").unwrap();

        let store = FsBlobStore::new(dir.path());
        let listed = store.list("consent-forms").await.unwrap();
        let keys: Vec<&str> = listed.iter().map(|l| l.key.as_str()).collect();
        // Directories are skipped; files come back sorted.
        assert_eq!(keys, vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn fs_store_list_of_missing_bucket_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(matches!(
            store.list("absent").await,
            Err(Error::Storage(_))
        ));
    }
}
