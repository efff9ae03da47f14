#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;
use url::Url;
use vectorly::{ClientConfig, VectorlyClient};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const API_KEY: &str = "test-api-key";

pub fn client(server: &MockServer) -> VectorlyClient {
    let base = Url::parse(&server.uri()).unwrap();
    let config = ClientConfig::new(API_KEY)
        .unwrap()
        .with_api_base_url(base.clone())
        .with_upload_base_url(base.clone())
        .with_stream_base_url(base);
    VectorlyClient::with_config(config).unwrap()
}

pub fn source_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub length: u64,
    pub data: Vec<u8>,
    pub metadata: String,
}

#[derive(Debug, Default)]
pub struct TusState {
    uploads: HashMap<String, StoredUpload>,
    accepted_patches: Vec<usize>,
    /// Patches to accept before failing the next one with a 500.
    fail_countdown: Option<usize>,
    /// Most bytes kept from a single PATCH body.
    max_accept: Option<usize>,
}

/// An in-memory tus server keyed by `Upload-Key`.
#[derive(Clone, Default)]
pub struct FakeTus {
    state: Arc<Mutex<TusState>>,
}

impl FakeTus {
    pub async fn mount(server: &MockServer) -> Self {
        let fake = FakeTus::default();

        Mock::given(method("POST"))
            .and(path("/files/"))
            .respond_with(CreateUpload(fake.state.clone()))
            .mount(server)
            .await;
        Mock::given(method("HEAD"))
            .and(path_regex("^/files/.+$"))
            .respond_with(UploadOffset(fake.state.clone()))
            .mount(server)
            .await;
        Mock::given(method("PATCH"))
            .and(path_regex("^/files/.+$"))
            .respond_with(AppendChunk(fake.state.clone()))
            .mount(server)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex("^/files/.+$"))
            .respond_with(TerminateUpload(fake.state.clone()))
            .mount(server)
            .await;

        fake
    }

    pub fn upload(&self, key: &str) -> Option<StoredUpload> {
        self.state.lock().unwrap().uploads.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.keys().cloned().collect()
    }

    /// Body sizes of every PATCH the server accepted, in order.
    pub fn accepted_patches(&self) -> Vec<usize> {
        self.state.lock().unwrap().accepted_patches.clone()
    }

    pub fn fail_after(&self, patches: usize) {
        self.state.lock().unwrap().fail_countdown = Some(patches);
    }

    pub fn limit_accepted_bytes(&self, max: usize) {
        self.state.lock().unwrap().max_accept = Some(max);
    }

    pub fn seed(&self, key: &str, length: u64, data: &[u8]) {
        self.state.lock().unwrap().uploads.insert(
            key.to_string(),
            StoredUpload {
                length,
                data: data.to_vec(),
                metadata: String::new(),
            },
        );
    }
}

fn header(request: &Request, name: &str) -> Option<String> {
    request
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn key_of(request: &Request) -> String {
    request.url.path().trim_start_matches("/files/").to_string()
}

struct CreateUpload(Arc<Mutex<TusState>>);

impl Respond for CreateUpload {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let (Some(key), Some(length)) = (
            header(request, "upload-key"),
            header(request, "upload-length").and_then(|v| v.parse::<u64>().ok()),
        ) else {
            return ResponseTemplate::new(400);
        };
        if header(request, "tus-resumable").as_deref() != Some("1.0.0") {
            return ResponseTemplate::new(412);
        }

        let metadata = header(request, "upload-metadata").unwrap_or_default();
        self.0.lock().unwrap().uploads.insert(
            key.clone(),
            StoredUpload {
                length,
                data: Vec::new(),
                metadata,
            },
        );
        ResponseTemplate::new(201).insert_header("Location", format!("/files/{key}"))
    }
}

struct UploadOffset(Arc<Mutex<TusState>>);

impl Respond for UploadOffset {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let state = self.0.lock().unwrap();
        match state.uploads.get(&key_of(request)) {
            Some(upload) => ResponseTemplate::new(200)
                .insert_header("Upload-Offset", upload.data.len().to_string())
                .insert_header("Upload-Length", upload.length.to_string()),
            None => ResponseTemplate::new(404),
        }
    }
}

struct AppendChunk(Arc<Mutex<TusState>>);

impl Respond for AppendChunk {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.0.lock().unwrap();

        match state.fail_countdown {
            Some(0) => {
                state.fail_countdown = None;
                return ResponseTemplate::new(500).set_body_string("storage offline");
            }
            Some(remaining) => state.fail_countdown = Some(remaining - 1),
            None => {}
        }

        if header(request, "content-type").as_deref() != Some("application/offset+octet-stream") {
            return ResponseTemplate::new(415);
        }
        let declared = header(request, "content-length").and_then(|v| v.parse::<usize>().ok());
        if declared != Some(request.body.len()) {
            return ResponseTemplate::new(411);
        }
        let Some(offset) = header(request, "upload-offset").and_then(|v| v.parse::<usize>().ok())
        else {
            return ResponseTemplate::new(400);
        };

        let max_accept = state.max_accept;
        let key = key_of(request);
        let Some(upload) = state.uploads.get_mut(&key) else {
            return ResponseTemplate::new(404);
        };
        if offset != upload.data.len() {
            return ResponseTemplate::new(409);
        }

        let accepted = max_accept.map_or(request.body.len(), |max| max.min(request.body.len()));
        upload.data.extend_from_slice(&request.body[..accepted]);
        let new_offset = upload.data.len();
        state.accepted_patches.push(accepted);

        ResponseTemplate::new(204).insert_header("Upload-Offset", new_offset.to_string())
    }
}

struct TerminateUpload(Arc<Mutex<TusState>>);

impl Respond for TerminateUpload {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        match self.0.lock().unwrap().uploads.remove(&key_of(request)) {
            Some(_) => ResponseTemplate::new(204),
            None => ResponseTemplate::new(404),
        }
    }
}
