//! S3-compatible object store backend for cstore.
//!
//! [`S3ContentStorage`] maps each record to one object and talks to the
//! bucket through an [`ObjectStoreClient`]:
//!
//! - [`S3Client`] -- presigned REST requests (`rusty-s3` + `reqwest`)
//! - [`InMemoryObjectStoreClient`] -- in-process fake for tests

pub mod client;
pub mod config;
pub mod memory;
pub mod s3;
pub mod storage;

pub use client::{ObjectHead, ObjectListing, ObjectStoreClient};
pub use config::S3Config;
pub use memory::InMemoryObjectStoreClient;
pub use s3::S3Client;
pub use storage::S3ContentStorage;
