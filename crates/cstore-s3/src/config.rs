use serde::{Deserialize, Serialize};

/// Connection settings for an S3-compatible bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Endpoint URL, e.g. `https://s3.eu-west-1.amazonaws.com` or
    /// `http://localhost:9000`. A `localhost` endpoint is addressed
    /// path-style, anything else virtual-host style.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Prepended to every id as `<key_prefix>/<id>`.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: "https://s3.amazonaws.com".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            key_prefix: None,
        }
    }
}
