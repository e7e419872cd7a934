use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    types::ObjectCannedAcl,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::debug;

use crate::config::S3Config;

/// Blob store holding uploaded image bodies.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Stores `body` under `key` as a publicly readable, uncached object.
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    timeout: Duration,
}

impl S3Storage {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        let mut loader = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ));
        if let Some(endpoint) = &cfg.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let mut builder = S3ConfigBuilder::from(&shared);
        if let Some(endpoint) = &cfg.endpoint {
            // MinIO-style endpoints do not resolve virtual-host bucket names
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: cfg.bucket.clone(),
            timeout: cfg.timeout(),
        })
    }
}

#[async_trait]
impl StorageClient for S3Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let size = body.len();
        let req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .acl(ObjectCannedAcl::PublicRead)
            .content_type(content_type)
            .cache_control("no-cache")
            .send();
        tokio::time::timeout(self.timeout, req)
            .await
            .with_context(|| format!("s3 put_object {} timed out", key))?
            .context("s3 put_object")?;
        debug!(key, size, "object stored");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let req = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send();
        tokio::time::timeout(self.timeout, req)
            .await
            .with_context(|| format!("s3 delete_object {} timed out", key))?
            .context("s3 delete_object")?;
        debug!(key, "object deleted");
        Ok(())
    }
}

#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Blob store kept in a map, with switches to inject failures.
    #[derive(Default)]
    pub struct MemoryStorage {
        objects: Mutex<HashMap<String, (Bytes, String)>>,
        put_delay: Mutex<Option<Duration>>,
        fail_puts_after: Mutex<Option<usize>>,
        fail_deletes: Mutex<bool>,
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
            keys.sort();
            keys
        }

        pub fn contains(&self, key: &str) -> bool {
            self.objects.lock().unwrap().contains_key(key)
        }

        pub fn content_type(&self, key: &str) -> Option<String> {
            self.objects.lock().unwrap().get(key).map(|(_, ct)| ct.clone())
        }

        /// Let `n` more puts succeed, then fail every following one.
        pub fn fail_puts_after(&self, n: usize) {
            *self.fail_puts_after.lock().unwrap() = Some(n);
        }

        /// Stores the object, then waits `delay` before acknowledging.
        pub fn delay_puts(&self, delay: Duration) {
            *self.put_delay.lock().unwrap() = Some(delay);
        }

        pub fn fail_deletes(&self, fail: bool) {
            *self.fail_deletes.lock().unwrap() = fail;
        }
    }

    #[async_trait]
    impl StorageClient for MemoryStorage {
        async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
            {
                let mut budget = self.fail_puts_after.lock().unwrap();
                match budget.as_mut() {
                    Some(0) => anyhow::bail!("injected put failure for {}", key),
                    Some(n) => *n -= 1,
                    None => {}
                }
            }
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), (body, content_type.to_string()));
            let delay = *self.put_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }

        async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
            if *self.fail_deletes.lock().unwrap() {
                anyhow::bail!("injected delete failure for {}", key);
            }
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }
    }
}
