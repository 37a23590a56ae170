//! Durable shipper: closed log files to remote object storage
//!
//! Each closed file moves through `pending → uploading → uploaded` (with
//! `failed` and backoff in between), persisted in the state directory so a
//! restart resumes where the last process stopped.
//!
//! - [`Shipper`]: upload cycles, daemon loop, status
//! - [`ObjectStore`]: remote storage seam ([`S3ObjectStore`], [`MemoryObjectStore`])
//! - [`Backoff`] / [`RampController`]: retry delay and upload concurrency
//! - [`remote_key`]: content-addressed object naming
//!
//! Uploads are idempotent: a file whose object already exists with the same
//! content digest is marked uploaded without a second put.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod config;
pub mod error;
pub mod key;
pub mod object_store;
pub mod ramp;
pub mod shipper;
pub mod status;

pub use backoff::Backoff;
pub use config::{ShipperConfig, ShipperConfigError};
pub use error::{ObjectStoreError, ShipError, ShipResult};
pub use key::{content_digest, object_metadata, remote_key, sanitize_hostname, ObjectMetadataKey};
pub use object_store::{
    MemoryObjectStore, ObjectInfo, ObjectStore, PutReceipt, S3ObjectStore, S3Settings,
};
pub use ramp::RampController;
pub use shipper::{unshipped_files, Shipper};
pub use status::{CycleReport, FileFailure, ShipperStatus};
