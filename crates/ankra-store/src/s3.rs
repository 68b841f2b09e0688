use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use ankra_core::ContentHash;

use crate::error::StoreError;
use crate::tiers::{ObjectTier, SidecarMapping};

#[derive(Clone, Debug)]
pub struct S3Config {
    /// Custom endpoint for S3-compatible stores; `None` uses AWS proper.
    pub endpoint: Option<String>,
    pub bucket: String,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Durable object tier.
///
/// Bodies live under `events/{hash[0:2]}/{hash}.json`, sidecar mappings
/// under `mappings/{hash[0:2]}/{hash}.json`. Objects carry `event-hash`
/// and `stored-at` metadata.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub async fn connect(config: &S3Config) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let (Some(access), Some(secret)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access.clone(),
                secret.clone(),
                None,
                None,
                "ankra-config",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            // S3-compatible stores generally require path-style addressing.
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());
        Self { client, bucket: config.bucket.clone() }
    }

    fn event_key(hash: &ContentHash) -> String {
        format!("events/{}/{}.json", hash.prefix2(), hash)
    }

    fn mapping_key(hash: &ContentHash) -> String {
        format!("mappings/{}/{}.json", hash.prefix2(), hash)
    }

    async fn put_json(&self, key: &str, body: String, hash: &ContentHash) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .metadata("event-hash", hash.as_str())
            .metadata("stored-at", chrono::Utc::now().to_rfc3339())
            .body(ByteStream::from(body.into_bytes()))
            .send()
            .await
            .map_err(|e| StoreError::S3(format!("put {key}: {e}")))?;
        debug!(key, "object stored");
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Option<String>, StoreError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if not_found {
                    return Ok(None);
                }
                return Err(StoreError::S3(format!("get {key}: {e}")));
            }
        };
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::S3(format!("read {key}: {e}")))?
            .into_bytes();
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| StoreError::S3(format!("decode {key}: {e}")))?;
        Ok(Some(text))
    }
}

#[async_trait]
impl ObjectTier for S3Store {
    async fn put_event(&self, hash: &ContentHash, body: &str) -> Result<(), StoreError> {
        self.put_json(&Self::event_key(hash), body.to_string(), hash).await
    }

    async fn get_event(&self, hash: &ContentHash) -> Result<Option<String>, StoreError> {
        self.get_json(&Self::event_key(hash)).await
    }

    async fn put_mapping(&self, mapping: &SidecarMapping) -> Result<(), StoreError> {
        let body = serde_json::to_string(mapping)
            .map_err(|e| StoreError::S3(e.to_string()))?;
        self.put_json(&Self::mapping_key(&mapping.hash), body, &mapping.hash).await
    }

    async fn get_mapping(&self, hash: &ContentHash) -> Result<Option<SidecarMapping>, StoreError> {
        match self.get_json(&Self::mapping_key(hash)).await? {
            Some(text) => {
                let mapping = serde_json::from_str(&text)
                    .map_err(|e| StoreError::S3(format!("sidecar decode: {e}")))?;
                Ok(Some(mapping))
            }
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StoreError::S3(format!("head_bucket {}: {e}", self.bucket)))
    }
}
