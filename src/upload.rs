use std::path::Path;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use futures::{StreamExt, stream::BoxStream};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, LOCATION};
use reqwest::{Body, Client, StatusCode};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::chunk_reader::{ChunkReader, ChunkSize};
use crate::config::ApiCredential;
use crate::error::{Error, Result};
use crate::executor::encode_segment;

pub const TUS_VERSION: &str = "1.0.0";
pub const UPLOAD_API_PATH: &str = "files/";

const TUS_RESUMABLE: &str = "Tus-Resumable";
const UPLOAD_OFFSET: &str = "Upload-Offset";
const UPLOAD_LENGTH: &str = "Upload-Length";
const UPLOAD_METADATA: &str = "Upload-Metadata";
const UPLOAD_KEY: &str = "Upload-Key";
const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

/// A fresh session key: a UUIDv7, i.e. a millisecond timestamp followed by
/// bits from the OS random number generator.
pub fn generate_key() -> String {
    Uuid::now_v7().simple().to_string()
}

#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    /// File name reported to the remote. Defaults to the source's file name.
    pub custom_name: Option<String>,
    /// Session key. Reuse a key to resume an interrupted upload.
    pub key: Option<String>,
    pub chunk_size: ChunkSize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadProgress {
    pub key: String,
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadEvent {
    Progress(UploadProgress),
    Complete(UploadProgress),
}

/// What the remote reports for an existing upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteUpload {
    pub offset: u64,
    pub length: Option<u64>,
}

/// Client-side cursor of one resumable upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSession {
    key: String,
    upload_url: Url,
    total_size: u64,
    acknowledged_offset: u64,
    chunk_size: ChunkSize,
}

impl UploadSession {
    pub fn new(key: String, upload_url: Url, total_size: u64, chunk_size: ChunkSize) -> Self {
        Self {
            key,
            upload_url,
            total_size,
            acknowledged_offset: 0,
            chunk_size,
        }
    }

    /// Continue from an offset the remote already holds.
    pub fn resume_from(mut self, offset: u64) -> Result<Self> {
        if offset > self.total_size {
            return Err(Error::Protocol(format!(
                "remote offset {offset} exceeds file size {}",
                self.total_size
            )));
        }
        self.acknowledged_offset = offset;
        Ok(self)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn upload_url(&self) -> &Url {
        &self.upload_url
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn acknowledged_offset(&self) -> u64 {
        self.acknowledged_offset
    }

    pub fn chunk_size(&self) -> ChunkSize {
        self.chunk_size
    }

    pub fn is_complete(&self) -> bool {
        self.acknowledged_offset == self.total_size
    }

    /// Record the offset confirmed after sending `sent` bytes from the
    /// current offset. The remote may keep fewer bytes than were sent but
    /// must make progress.
    pub fn acknowledge(&mut self, confirmed: u64, sent: u64) -> Result<()> {
        let start = self.acknowledged_offset;
        if confirmed <= start || confirmed > start + sent || confirmed > self.total_size {
            return Err(Error::Protocol(format!(
                "remote acknowledged offset {confirmed} after sending {sent} bytes from {start}"
            )));
        }
        self.acknowledged_offset = confirmed;
        Ok(())
    }

    pub fn progress(&self) -> UploadProgress {
        UploadProgress {
            key: self.key.clone(),
            bytes_uploaded: self.acknowledged_offset,
            total_bytes: self.total_size,
        }
    }
}

#[derive(Clone)]
pub struct TusUploader {
    http: Client,
    files_url: Url,
    credential: Arc<ApiCredential>,
}

impl TusUploader {
    pub fn new(http: Client, upload_base_url: &Url, credential: Arc<ApiCredential>) -> Result<Self> {
        let files_url = upload_base_url
            .join(UPLOAD_API_PATH)
            .map_err(|e| Error::Configuration(format!("invalid upload URL: {e}")))?;
        Ok(Self {
            http,
            files_url,
            credential,
        })
    }

    pub fn files_url(&self) -> &Url {
        &self.files_url
    }

    /// Where the remote keeps the upload for `key`.
    pub fn upload_url(&self, key: &str) -> Result<Url> {
        self.files_url
            .join(&encode_segment(key))
            .map_err(|e| Error::Configuration(format!("invalid session key '{key}': {e}")))
    }

    fn metadata(&self, file_name: &str) -> String {
        format!(
            "filename {},api_key {}",
            STANDARD.encode(file_name),
            STANDARD.encode(self.credential.api_key())
        )
    }

    /// Ask the remote how much of the upload for `key` it holds.
    pub async fn remote_upload(&self, key: &str) -> Result<Option<RemoteUpload>> {
        let url = self.upload_url(key)?;
        let response = self
            .http
            .head(url)
            .header(TUS_RESUMABLE, TUS_VERSION)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::status(status, ""));
        }

        let headers = response.headers();
        let offset = header_u64(headers, UPLOAD_OFFSET)?
            .ok_or_else(|| Error::Protocol(format!("{UPLOAD_OFFSET} missing from HEAD response")))?;
        let length = header_u64(headers, UPLOAD_LENGTH)?;
        Ok(Some(RemoteUpload { offset, length }))
    }

    async fn create(&self, key: &str, total_size: u64, file_name: &str) -> Result<Url> {
        let response = self
            .http
            .post(self.files_url.clone())
            .header(TUS_RESUMABLE, TUS_VERSION)
            .header(UPLOAD_LENGTH, total_size)
            .header(UPLOAD_KEY, key)
            .header(UPLOAD_METADATA, self.metadata(file_name))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::status(status, &body));
        }

        match response.headers().get(LOCATION) {
            Some(location) => {
                let location = location
                    .to_str()
                    .map_err(|_| Error::Protocol("Location header is not valid text".to_string()))?;
                self.files_url
                    .join(location)
                    .map_err(|e| Error::Protocol(format!("invalid Location '{location}': {e}")))
            }
            None => self.upload_url(key),
        }
    }

    async fn patch(&self, url: &Url, offset: u64, body: Body, len: u64) -> Result<u64> {
        let response = self
            .http
            .patch(url.clone())
            .header(TUS_RESUMABLE, TUS_VERSION)
            .header(UPLOAD_OFFSET, offset)
            .header(CONTENT_TYPE, OFFSET_OCTET_STREAM)
            .header(CONTENT_LENGTH, len)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::status(status, &body));
        }

        header_u64(response.headers(), UPLOAD_OFFSET)?
            .ok_or_else(|| Error::Protocol(format!("{UPLOAD_OFFSET} missing from PATCH response")))
    }

    /// Terminate the upload for `key`. An upload the remote no longer knows
    /// about counts as terminated.
    pub async fn abort(&self, key: &str) -> Result<()> {
        let url = self.upload_url(key)?;
        let response = self
            .http
            .delete(url)
            .header(TUS_RESUMABLE, TUS_VERSION)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            info!(key, "Upload terminated");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::status(status, &body))
    }

    /// Open the source and either resume the remote upload for the session key
    /// or create a new one.
    pub async fn start(&self, path: &Path, options: UploadOptions) -> Result<(UploadSession, ChunkReader)> {
        let reader = ChunkReader::open(path, options.chunk_size).await?;
        let total_size = reader.total_size();
        let key = options
            .key
            .filter(|key| !key.is_empty())
            .unwrap_or_else(generate_key);

        let session = match self.remote_upload(&key).await? {
            Some(remote) => {
                if let Some(length) = remote.length.filter(|&length| length != total_size) {
                    return Err(Error::Protocol(format!(
                        "remote upload for '{key}' expects {length} bytes, file has {total_size}"
                    )));
                }
                info!(key = %key, offset = remote.offset, total_size, "Resuming upload");
                let url = self.upload_url(&key)?;
                UploadSession::new(key, url, total_size, reader.chunk_size()).resume_from(remote.offset)?
            }
            None => {
                let file_name = options.custom_name.unwrap_or_else(|| {
                    path.file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default()
                });
                let url = self.create(&key, total_size, &file_name).await?;
                info!(key = %key, total_size, %url, "Created upload");
                UploadSession::new(key, url, total_size, reader.chunk_size())
            }
        };

        Ok((session, reader))
    }

    /// Upload `path` one chunk at a time, yielding progress after each
    /// acknowledged chunk. The first event reports the resume point.
    pub fn upload_stream<'a, P: AsRef<Path> + Send + 'a>(
        &'a self,
        path: P,
        options: UploadOptions,
    ) -> BoxStream<'a, Result<UploadEvent>> {
        let stream = async_stream::try_stream! {
            let (mut session, mut reader) = self.start(path.as_ref(), options).await?;
            yield UploadEvent::Progress(session.progress());

            while !session.is_complete() {
                let offset = session.acknowledged_offset();
                // Bounded chunks are buffered; the unbounded remainder streams from disk.
                let (body, sent) = match reader.chunk_size() {
                    ChunkSize::Bytes(_) => {
                        let chunk = reader.read_at(offset).await?;
                        let sent = chunk.len() as u64;
                        (Body::from(chunk), sent)
                    }
                    ChunkSize::Unbounded => {
                        let (len, stream) = reader.stream_at(offset).await?;
                        (Body::wrap_stream(stream), len)
                    }
                };

                let confirmed = self.patch(session.upload_url(), offset, body, sent).await?;
                session.acknowledge(confirmed, sent)?;
                debug!(key = session.key(), offset = confirmed, total = session.total_size(), "Chunk acknowledged");

                if !session.is_complete() {
                    yield UploadEvent::Progress(session.progress());
                }
            }

            info!(key = session.key(), bytes = session.total_size(), "Upload complete");
            yield UploadEvent::Complete(session.progress());
        };

        Box::pin(stream)
    }

    /// Upload `path` and return the acknowledged byte count, which equals the
    /// file size on success.
    pub async fn upload<P: AsRef<Path> + Send>(&self, path: P, options: UploadOptions) -> Result<u64> {
        let mut events = self.upload_stream(path, options);
        let mut acknowledged = 0;
        while let Some(event) = events.next().await {
            if let UploadEvent::Complete(progress) = event? {
                acknowledged = progress.bytes_uploaded;
            }
        }
        Ok(acknowledged)
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Result<Option<u64>> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or_else(|| Error::Protocol(format!("invalid {name} header")))
        })
        .transpose()
}
