use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct VideoRequest<'a> {
    pub video_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagChanges {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagRequest<'a> {
    pub video_id: &'a str,
    pub tags: TagChanges,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivacyRequest<'a> {
    pub video_id: &'a str,
    pub is_private: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListVideosResponse {
    Wrapped { videos: Vec<Value> },
    Bare(Vec<Value>),
}

impl ListVideosResponse {
    pub fn into_videos(self) -> Vec<Value> {
        match self {
            ListVideosResponse::Wrapped { videos } => videos,
            ListVideosResponse::Bare(videos) => videos,
        }
    }
}
