use super::{ObjectInfo, ObjectStore, PutReceipt};
use crate::error::ObjectStoreError;
use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use logship_core::{ConfigError, RemoteConfig};
use std::collections::HashMap;

/// Connection settings for [`S3ObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    /// Target bucket
    pub bucket: String,
    /// Region
    pub region: String,
    /// Custom endpoint (MinIO etc.); enables path-style addressing
    pub endpoint: Option<String>,
    /// Static access key id; the default credential chain is used when absent
    pub access_key_id: Option<String>,
    /// Static secret access key
    pub secret_access_key: Option<String>,
}

impl S3Settings {
    /// Settings for `bucket` in `region` with default credentials.
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        S3Settings {
            bucket: bucket.into(),
            region: region.into(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }

    /// Use a custom endpoint (builder pattern).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Use static credentials (builder pattern).
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }
}

impl TryFrom<&RemoteConfig> for S3Settings {
    type Error = ConfigError;

    fn try_from(remote: &RemoteConfig) -> Result<Self, Self::Error> {
        Ok(S3Settings {
            bucket: remote.require_bucket()?.to_string(),
            region: remote.region.clone(),
            endpoint: remote.endpoint.clone(),
            access_key_id: remote.access_key_id.clone(),
            secret_access_key: remote.secret_access_key.clone(),
        })
    }
}

/// S3 (or S3-compatible) object store.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from `settings`.
    pub async fn connect(settings: S3Settings) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));
        if let (Some(id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                id.as_str(),
                secret.as_str(),
                None,
                None,
                "logship-static",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::info!(
            target: "logship::shipper",
            bucket = %settings.bucket,
            region = %settings.region,
            endpoint = settings.endpoint.as_deref().unwrap_or("default"),
            "Object store configured"
        );
        S3ObjectStore {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket,
        }
    }

    /// Target bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn classify<E, R>(err: SdkError<E, R>) -> ObjectStoreError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let detail = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::ServiceError(_) => ObjectStoreError::Remote(detail),
        _ => ObjectStoreError::Network(detail),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<PutReceipt, ObjectStoreError> {
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/zstd")
            .set_metadata(Some(metadata))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(classify)?;
        Ok(PutReceipt {
            key: key.to_string(),
            etag: output.e_tag().map(str::to_string),
        })
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>, ObjectStoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectInfo {
                size: output.content_length().unwrap_or(0).max(0) as u64,
                metadata: output.metadata().cloned().unwrap_or_default(),
            })),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => Err(classify(err)),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(err) => return Err(classify(err)),
        };
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Network(e.to_string()))?;
        Ok(body.into_bytes())
    }

    fn location(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logship_core::LogshipConfig;

    #[test]
    fn test_settings_require_bucket() {
        let config = LogshipConfig::default();
        assert_eq!(
            S3Settings::try_from(&config.remote),
            Err(ConfigError::Missing("LOG_BUCKET_NAME"))
        );

        let mut remote = config.remote.clone();
        remote.bucket = Some("app-logs".into());
        remote.endpoint = Some("http://localhost:9000".into());
        let settings = S3Settings::try_from(&remote).unwrap();
        assert_eq!(settings.bucket, "app-logs");
        assert_eq!(settings.region, "ap-southeast-1");
        assert_eq!(settings.endpoint.as_deref(), Some("http://localhost:9000"));
    }

    #[tokio::test]
    async fn test_connect_with_static_credentials() {
        let settings = S3Settings::new("app-logs", "us-east-1")
            .with_endpoint("http://localhost:9000")
            .with_credentials("minioadmin", "minioadmin");
        let store = S3ObjectStore::connect(settings).await;
        assert_eq!(store.bucket(), "app-logs");
        assert_eq!(store.location(), "s3://app-logs");
    }

    #[tokio::test]
    #[ignore] // needs a running MinIO at localhost:9000 with bucket `logship-test`
    async fn test_minio_round_trip() {
        let settings = S3Settings::new("logship-test", "us-east-1")
            .with_endpoint("http://localhost:9000")
            .with_credentials("minioadmin", "minioadmin");
        let store = S3ObjectStore::connect(settings).await;

        let meta = HashMap::from([("content-xxh3".to_string(), "abc".to_string())]);
        store
            .put("it/object.log.zst", Bytes::from_static(b"data"), meta)
            .await
            .unwrap();
        let info = store.head("it/object.log.zst").await.unwrap().unwrap();
        assert_eq!(info.size, 4);
        assert_eq!(info.metadata["content-xxh3"], "abc");
        assert!(store.head("it/missing").await.unwrap().is_none());
    }
}
