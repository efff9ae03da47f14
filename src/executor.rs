use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiCredential;
use crate::error::{Error, Result};

pub const API_KEY_HEADER: &str = "X-Api-Key";

/// A decoded API response body.
pub type ApiResponse = Map<String, Value>;

/// Decode a response body into a JSON value.
///
/// A body of literal `null` is reported as [`Error::ResponseDecode`], exactly
/// like a body that is not JSON at all. Whether the API ever answers `null` on
/// purpose is not known from the client side, so the two cases are left
/// indistinguishable rather than guessed apart.
pub fn decode_value(body: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Null) | Err(_) => Err(Error::decode(body)),
        Ok(value) => Ok(value),
    }
}

/// Decode a response body that must be a JSON object.
pub fn decode_response(body: &str) -> Result<ApiResponse> {
    match decode_value(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::decode(body)),
    }
}

/// Form-urlencode a value for use as a single path segment.
pub fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

#[derive(Clone)]
pub struct RequestExecutor {
    http: Client,
    base_url: Url,
    credential: Arc<ApiCredential>,
}

impl RequestExecutor {
    pub fn new(http: Client, base_url: Url, credential: Arc<ApiCredential>) -> Self {
        Self {
            http,
            base_url,
            credential,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Configuration(format!("invalid API path '{path}': {e}")))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.endpoint(path)?;
        debug!(%method, %url, "Sending API request");
        Ok(self
            .http
            .request(method, url)
            .header(API_KEY_HEADER, self.credential.api_key()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "API request failed");
            return Err(Error::status(status, &body));
        }
        Ok(response)
    }

    /// Send a request and return the raw response body of a 2xx reply.
    pub async fn execute_text<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self.request(method, path)?;
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = self.send(request).await?;
        Ok(response.text().await?)
    }

    /// Send a request and decode any non-null JSON body.
    pub async fn execute_value<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        let text = self.execute_text(method, path, body).await?;
        decode_value(&text).inspect_err(|_| warn!(path, "Could not decode API response"))
    }

    /// Send a request and decode a JSON object body. Any other body is a
    /// decode error carrying the text as received.
    pub async fn execute<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        let text = self.execute_text(method, path, body).await?;
        decode_response(&text).inspect_err(|_| warn!(path, "Could not decode API response"))
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.execute::<Value>(Method::GET, path, None).await
    }

    pub async fn post<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
    where
        B: Serialize + ?Sized,
    {
        self.execute(Method::POST, path, Some(body)).await
    }

    /// Stream a GET response body into `destination`, returning the number of
    /// bytes written. The file is flushed and closed on every path; a
    /// partially written file is removed when the transfer fails.
    pub async fn download(&self, path: &str, destination: &Path) -> Result<u64> {
        let request = self.request(Method::GET, path)?;
        let response = self.send(request).await?;

        let mut file = File::create(destination)
            .await
            .map_err(|e| Error::io(destination, e))?;
        let copied = copy_body(response, &mut file, destination).await;
        let flushed = file.flush().await.map_err(|e| Error::io(destination, e));
        drop(file);

        match copied.and_then(|written| flushed.map(|_| written)) {
            Ok(written) => {
                debug!(bytes = written, destination = %destination.display(), "Download complete");
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(destination).await;
                Err(e)
            }
        }
    }
}

async fn copy_body(response: Response, file: &mut File, destination: &Path) -> Result<u64> {
    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::io(destination, e))?;
        written += chunk.len() as u64;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_object() {
        let response = decode_response(r#"{"videos": []}"#).unwrap();
        assert_eq!(response.get("videos"), Some(&json!([])));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        match decode_response("not json") {
            Err(Error::ResponseDecode { body }) => assert_eq!(body, "not json"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_treats_null_as_error() {
        assert!(matches!(
            decode_response("null"),
            Err(Error::ResponseDecode { .. })
        ));
        assert!(matches!(decode_value("null"), Err(Error::ResponseDecode { .. })));
    }

    #[test]
    fn test_decode_response_requires_object() {
        assert!(decode_value("[1, 2]").is_ok());
        assert!(matches!(
            decode_response("[1, 2]"),
            Err(Error::ResponseDecode { .. })
        ));
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("cats & dogs"), "cats+%26+dogs");
        assert_eq!(encode_segment("a/b"), "a%2Fb");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let executor = RequestExecutor::new(
            Client::new(),
            Url::parse("http://localhost/api/").unwrap(),
            Arc::new(ApiCredential::new("key").unwrap()),
        );
        assert_eq!(
            executor.endpoint("videos/list").unwrap().as_str(),
            "http://localhost/api/videos/list"
        );
    }
}
