//! Client library for the Vectorly video platform.
//!
//! [`VectorlyClient`] bundles three pieces that can also be used on their own:
//!
//! - [`TusUploader`]: resumable chunked uploads keyed by a session key.
//! - [`TokenSigner`]: HS256-signed, time-limited playback tokens.
//! - [`RequestExecutor`]: authenticated JSON calls against the REST API.
//!
//! ```no_run
//! # async fn run() -> vectorly::Result<()> {
//! use vectorly::{ChunkSize, VectorlyClient};
//!
//! let client = VectorlyClient::new("my-api-key")?;
//! let uploaded = client
//!     .upload("talk.mp4", None, Some("talk-upload"), ChunkSize::Bytes(8 * 1024 * 1024))
//!     .await?;
//! let link = client.secure("video-id", 30)?;
//! # Ok(())
//! # }
//! ```

pub mod chunk_reader;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod rest_types;
pub mod serde_utils;
pub mod signer;
pub mod upload;

pub use chunk_reader::{ChunkReader, ChunkSize};
pub use client::VectorlyClient;
pub use config::{ApiCredential, ClientConfig, read_config};
pub use error::{Error, Result};
pub use executor::{ApiResponse, RequestExecutor};
pub use signer::{SecureLinkClaims, SignedToken, TokenSigner, verify_token};
pub use upload::{TusUploader, UploadEvent, UploadOptions, UploadProgress, UploadSession};
