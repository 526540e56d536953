use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cstore_core::{ByteStream, StorageError, StorageResult};
use futures::TryStreamExt;
use reqwest::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use rusty_s3::actions::{ListObjectsV2, ObjectIdentifier};
use rusty_s3::{Bucket, Credentials, S3Action, UrlStyle};
use tokio_util::io::StreamReader;

use crate::client::{ObjectHead, ObjectListing, ObjectStoreClient};
use crate::config::S3Config;

const PRESIGNED_URL_DURATION: Duration = Duration::from_secs(60 * 60);

/// [`ObjectStoreClient`] speaking the S3 REST protocol.
///
/// Requests are presigned with `rusty-s3` and sent with `reqwest`.
pub struct S3Client {
    bucket: Bucket,
    credentials: Credentials,
    client: Client,
}

impl S3Client {
    pub fn new(config: &S3Config) -> StorageResult<Self> {
        let endpoint: Url = config
            .endpoint
            .parse()
            .map_err(|e| StorageError::Config(format!("invalid endpoint {:?}: {e}", config.endpoint)))?;
        let style = url_style(&endpoint)?;
        let bucket = Bucket::new(endpoint, style, config.bucket.clone(), config.region.clone())
            .map_err(|e| StorageError::Config(format!("invalid bucket: {e}")))?;

        Ok(Self {
            bucket,
            credentials: Credentials::new(config.access_key.clone(), config.secret_key.clone()),
            client: Client::new(),
        })
    }

    async fn send(&self, request: RequestBuilder) -> StorageResult<Response> {
        request
            .send()
            .await
            .map_err(|e| StorageError::ObjectStore(e.to_string()))
    }
}

/// A `localhost` endpoint (MinIO and friends) needs path-style URLs of the
/// form `http://localhost:<port>/<bucket>`.
fn url_style(endpoint: &Url) -> StorageResult<UrlStyle> {
    match endpoint.host_str() {
        Some("localhost") => Ok(UrlStyle::Path),
        Some(_) => Ok(UrlStyle::VirtualHost),
        None => Err(StorageError::Config(format!("endpoint {endpoint} has no host"))),
    }
}

/// Map a response status to success, "not found" or an error.
fn check_status(status: StatusCode) -> StorageResult<Option<()>> {
    match status {
        StatusCode::OK | StatusCode::NO_CONTENT => Ok(Some(())),
        StatusCode::NOT_FOUND => Ok(None),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StorageError::NotAuthorized(
            format!("received {status} from S3-compatible API"),
        )),
        _ => Err(StorageError::ObjectStore(format!(
            "received {status} from S3-compatible API"
        ))),
    }
}

/// Like [`check_status`], for requests where a 404 is an error too.
fn require_success(status: StatusCode) -> StorageResult<()> {
    check_status(status)?.ok_or_else(|| {
        StorageError::ObjectStore(format!("received {status} from S3-compatible API"))
    })
}

fn header_str(response: &Response, name: reqwest::header::HeaderName) -> Option<&str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl ObjectStoreClient for S3Client {
    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectHead>> {
        let action = self.bucket.head_object(Some(&self.credentials), key);
        let url = action.sign(PRESIGNED_URL_DURATION);
        let response = self.send(self.client.head(url)).await?;
        if check_status(response.status())?.is_none() {
            return Ok(None);
        }
        Ok(Some(ObjectHead {
            content_length: header_str(&response, CONTENT_LENGTH).and_then(|v| v.parse().ok()),
            content_encoding: header_str(&response, CONTENT_ENCODING).map(str::to_owned),
        }))
    }

    async fn get_object(&self, key: &str) -> StorageResult<Option<ByteStream>> {
        let action = self.bucket.get_object(Some(&self.credentials), key);
        let url = action.sign(PRESIGNED_URL_DURATION);
        let response = self.send(self.client.get(url)).await?;
        if check_status(response.status())?.is_none() {
            return Ok(None);
        }
        let body = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        Ok(Some(Box::pin(StreamReader::new(body))))
    }

    async fn put_object(&self, key: &str, body: Bytes) -> StorageResult<()> {
        let action = self.bucket.put_object(Some(&self.credentials), key);
        let url = action.sign(PRESIGNED_URL_DURATION);
        let response = self.send(self.client.put(url).body(body)).await?;
        require_success(response.status())
    }

    async fn delete_objects(&self, keys: &[String]) -> StorageResult<()> {
        let objects: Vec<ObjectIdentifier> = keys.iter().cloned().map(ObjectIdentifier::new).collect();
        let action = self.bucket.delete_objects(Some(&self.credentials), objects.iter());
        let url = action.sign(PRESIGNED_URL_DURATION);
        let (body, content_md5) = action.body_with_md5();
        let request = self.client.post(url).header("Content-MD5", content_md5).body(body);
        let response = self.send(request).await?;
        require_success(response.status())
    }

    async fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
    ) -> StorageResult<ObjectListing> {
        let mut action = self.bucket.list_objects_v2(Some(&self.credentials));
        if let Some(prefix) = prefix {
            action.query_mut().insert("prefix", prefix.to_owned());
        }
        if let Some(token) = continuation_token {
            action.query_mut().insert("continuation-token", token.to_owned());
        }
        let url = action.sign(PRESIGNED_URL_DURATION);
        let response = self.send(self.client.get(url)).await?;
        require_success(response.status())?;

        let text = response
            .text()
            .await
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;
        let parsed = ListObjectsV2::parse_response(text.as_str())
            .map_err(|e| StorageError::ObjectStore(format!("malformed listing: {e}")))?;

        Ok(ObjectListing {
            keys: parsed.contents.into_iter().map(|object| object.key).collect(),
            next_continuation_token: parsed.next_continuation_token,
        })
    }
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("bucket", &self.bucket.name())
            .field("base_url", &self.bucket.base_url().as_str())
            .finish()
    }
}
