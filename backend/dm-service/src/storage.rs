//! Object storage for message attachments.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::S3Config;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` and return the public URL.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> AppResult<String>;

    async fn remove(&self, bucket: &str, paths: &[String]) -> AppResult<()>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

#[derive(Clone)]
pub struct S3ObjectStorage {
    client: Arc<Client>,
    config: S3Config,
}

impl S3ObjectStorage {
    pub fn new(client: Arc<Client>, config: S3Config) -> Self {
        Self { client, config }
    }

    pub async fn from_config(config: &S3Config) -> Self {
        use aws_sdk_s3::config::Region;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        // S3-compatible storage (MinIO, LocalStack)
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let shared = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.endpoint.is_some())
            .build();

        Self::new(Arc::new(Client::from_conf(s3_config)), config.clone())
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> AppResult<String> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(path)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("put_object {bucket}/{path}: {e}")))?;

        Ok(self.public_url(bucket, path))
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> AppResult<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let objects = paths
            .iter()
            .map(|key| {
                ObjectIdentifier::builder()
                    .key(key)
                    .build()
                    .map_err(|e| AppError::Storage(format!("object identifier: {e}")))
            })
            .collect::<AppResult<Vec<_>>>()?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| AppError::Storage(format!("delete request: {e}")))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("delete_objects {bucket}: {e}")))?;

        let errors = output.errors();
        if !errors.is_empty() {
            let keys: Vec<&str> = errors.iter().filter_map(|e| e.key()).collect();
            return Err(AppError::Storage(format!(
                "failed to delete {} object(s) from {bucket}: {keys:?}",
                errors.len()
            )));
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        if bucket == self.config.bucket {
            self.config.public_url(path)
        } else {
            format!("https://{}.s3.{}.amazonaws.com/{}", bucket, self.config.region, path)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-process object storage for tests and local development.
#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    unavailable: AtomicBool,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail as if the backend were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn get(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|o| o.get(&(bucket.to_owned(), path.to_owned())).cloned())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Storage("object storage unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> AppResult<String> {
        self.check_available()?;
        let mut objects = self.objects.lock().map_err(|_| AppError::Internal)?;
        objects.insert(
            (bucket.to_owned(), path.to_owned()),
            StoredObject {
                bytes,
                content_type: content_type.to_owned(),
            },
        );
        Ok(self.public_url(bucket, path))
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> AppResult<()> {
        self.check_available()?;
        let mut objects = self.objects.lock().map_err(|_| AppError::Internal)?;
        for path in paths {
            objects.remove(&(bucket.to_owned(), path.clone()));
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }
}
