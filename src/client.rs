use std::path::Path;

use futures::stream::BoxStream;
use reqwest::Client;
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::chunk_reader::ChunkSize;
use crate::config::{self, ClientConfig};
use crate::error::{Error, Result};
use crate::executor::{ApiResponse, RequestExecutor, encode_segment};
use crate::rest_types::{ListVideosResponse, PrivacyRequest, TagChanges, TagRequest, VideoRequest};
use crate::signer::{SignedToken, TokenSigner};
use crate::upload::{TusUploader, UploadEvent, UploadOptions};

const LIST_VIDEOS_ROUTE: &str = "videos/list";
const VIDEO_DETAILS_ROUTE: &str = "videos/get";
const SEARCH_VIDEOS_ROUTE: &str = "videos/search";
const DOWNLOAD_VIDEO_ROUTE: &str = "videos/download";
const TAG_VIDEO_ROUTE: &str = "videos/tag";
const ARCHIVE_VIDEO_ROUTE: &str = "videos/archive";
const VIDEO_PRIVACY_ROUTE: &str = "videos/privacy";
const ANALYTICS_SUMMARY_ROUTE: &str = "analytics/summary";
const VIDEO_EVENTS_ROUTE: &str = "analytics/events/video";
const ACCOUNT_USAGE_ROUTE: &str = "account/usage";

fn route(prefix: &str, segment: &str) -> String {
    format!("{prefix}/{}", encode_segment(segment))
}

pub struct VectorlyClient {
    executor: RequestExecutor,
    uploader: TusUploader,
    signer: TokenSigner,
    stream_base_url: Url,
}

impl VectorlyClient {
    /// A client against the production endpoints.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(ClientConfig::new(api_key)?)
    }

    /// A client configured from the environment and the user's config file.
    pub fn from_env() -> Result<Self> {
        Self::with_config(config::read_config()?)
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            executor: RequestExecutor::new(
                http.clone(),
                config.api_base_url,
                config.credential.clone(),
            ),
            uploader: TusUploader::new(http, &config.upload_base_url, config.credential.clone())?,
            signer: TokenSigner::new(config.credential),
            stream_base_url: config.stream_base_url,
        })
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn uploader(&self) -> &TusUploader {
        &self.uploader
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Upload a file and return the number of bytes the remote acknowledged.
    ///
    /// Passing the key of an interrupted upload resumes it from the last
    /// acknowledged offset. Without a key a new one is generated.
    pub async fn upload<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
        custom_name: Option<&str>,
        key: Option<&str>,
        chunk_size: ChunkSize,
    ) -> Result<u64> {
        let options = UploadOptions {
            custom_name: custom_name.map(str::to_string),
            key: key.map(str::to_string),
            chunk_size,
        };
        self.uploader.upload(file_path, options).await
    }

    pub fn upload_with_progress<'a, P: AsRef<Path> + Send + 'a>(
        &'a self,
        file_path: P,
        options: UploadOptions,
    ) -> BoxStream<'a, Result<UploadEvent>> {
        self.uploader.upload_stream(file_path, options)
    }

    /// Bytes the remote holds for the upload `key`, if it knows the key.
    pub async fn upload_offset(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.uploader.remote_upload(key).await?.map(|remote| remote.offset))
    }

    pub async fn abort_upload(&self, key: &str) -> Result<()> {
        self.uploader.abort(key).await
    }

    pub async fn list(&self) -> Result<Vec<Value>> {
        let text = self
            .executor
            .execute_text::<Value>(reqwest::Method::GET, LIST_VIDEOS_ROUTE, None)
            .await?;
        serde_json::from_str::<ListVideosResponse>(&text)
            .map(ListVideosResponse::into_videos)
            .map_err(|_| {
                warn!("Video list response has no videos array");
                Error::decode(&text)
            })
    }

    pub async fn details(&self, video_id: &str) -> Result<ApiResponse> {
        self.executor
            .get(&route(VIDEO_DETAILS_ROUTE, video_id))
            .await
    }

    pub async fn search(&self, term: &str) -> Result<ApiResponse> {
        self.executor.get(&route(SEARCH_VIDEOS_ROUTE, term)).await
    }

    /// Stream the video's file into `output_path`, returning its size.
    pub async fn download<P: AsRef<Path>>(&self, video_id: &str, output_path: P) -> Result<u64> {
        self.executor
            .download(&route(DOWNLOAD_VIDEO_ROUTE, video_id), output_path.as_ref())
            .await
    }

    pub async fn tags<S: AsRef<str>>(
        &self,
        video_id: &str,
        tags_to_add: &[S],
        tags_to_remove: &[S],
    ) -> Result<ApiResponse> {
        let request = TagRequest {
            video_id,
            tags: TagChanges {
                add: tags_to_add.iter().map(|t| t.as_ref().to_string()).collect(),
                remove: tags_to_remove.iter().map(|t| t.as_ref().to_string()).collect(),
            },
        };
        self.executor.post(TAG_VIDEO_ROUTE, &request).await
    }

    pub async fn archive(&self, video_id: &str) -> Result<ApiResponse> {
        self.executor
            .post(ARCHIVE_VIDEO_ROUTE, &VideoRequest { video_id })
            .await
    }

    pub async fn privacy(&self, video_id: &str, is_private: bool) -> Result<ApiResponse> {
        let request = PrivacyRequest {
            video_id,
            is_private,
        };
        self.executor.post(VIDEO_PRIVACY_ROUTE, &request).await
    }

    pub async fn analytics(&self) -> Result<ApiResponse> {
        self.executor.get(ANALYTICS_SUMMARY_ROUTE).await
    }

    pub async fn events(&self, video_id: &str) -> Result<ApiResponse> {
        self.executor.get(&route(VIDEO_EVENTS_ROUTE, video_id)).await
    }

    pub async fn account(&self) -> Result<ApiResponse> {
        self.executor.get(ACCOUNT_USAGE_ROUTE).await
    }

    pub fn secure_token(&self, video_id: &str, duration_minutes: u32) -> Result<SignedToken> {
        self.signer.sign(video_id, duration_minutes)
    }

    /// A playback URL for `video_id` that stops working after
    /// `duration_minutes`.
    pub fn secure(&self, video_id: &str, duration_minutes: u32) -> Result<String> {
        let token = self.secure_token(video_id, duration_minutes)?;
        self.secure_link(&token)
    }

    pub fn secure_link(&self, token: &SignedToken) -> Result<String> {
        let mut url = self.stream_base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Configuration("stream URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["embed", "video", token.video_id.as_str(), "token", token.as_str()]);
        Ok(url.into())
    }
}
