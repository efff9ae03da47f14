use std::{fmt, fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};

use dotenvy::dotenv;
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.vectorly.io/";
pub const DEFAULT_UPLOAD_URL: &str = "https://tus.vectorly.io/";
pub const DEFAULT_STREAM_URL: &str = "http://stream.vectorly.io/";

/// The shared API secret. Sent as a header on API calls, attached to upload
/// metadata and used as the HMAC key for playback tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential {
    api_key: String,
}

impl ApiCredential {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Configuration("API key must not be empty".to_string()));
        }
        Ok(Self { api_key })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    api_key: Option<String>,
    api_url: Option<Url>,
    upload_url: Option<Url>,
    stream_url: Option<Url>,
    timeout: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigEnv {
    vectorly_api_key: Option<String>,
    vectorly_api_url: Option<Url>,
    vectorly_upload_url: Option<Url>,
    vectorly_stream_url: Option<Url>,
    vectorly_timeout: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub credential: Arc<ApiCredential>,
    pub api_base_url: Url,
    pub upload_base_url: Url,
    pub stream_base_url: Url,
    /// Per-request timeout. `None` lets long chunk transfers run unbounded.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            credential: Arc::new(ApiCredential::new(api_key)?),
            api_base_url: parse_base_url(DEFAULT_API_URL)?,
            upload_base_url: parse_base_url(DEFAULT_UPLOAD_URL)?,
            stream_base_url: parse_base_url(DEFAULT_STREAM_URL)?,
            timeout: None,
        })
    }

    pub fn with_api_base_url(mut self, url: Url) -> Self {
        self.api_base_url = with_trailing_slash(url);
        self
    }

    pub fn with_upload_base_url(mut self, url: Url) -> Self {
        self.upload_base_url = with_trailing_slash(url);
        self
    }

    pub fn with_stream_base_url(mut self, url: Url) -> Self {
        self.stream_base_url = with_trailing_slash(url);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| Error::Configuration(format!("invalid base URL '{raw}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::Configuration(format!("'{raw}' cannot be used as a base URL")));
    }
    Ok(with_trailing_slash(url))
}

/// `Url::join` drops the last path segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw)
        .map_err(|e| Error::Configuration(format!("invalid timeout '{raw}': {e}")))
}

fn merge_config(base: ConfigFile, override_config: ConfigEnv) -> Result<ClientConfig> {
    let api_key = override_config
        .vectorly_api_key
        .or(base.api_key)
        .ok_or_else(|| {
            Error::Configuration(
                "API key not specified via VECTORLY_API_KEY nor the config file".to_string(),
            )
        })?;

    let mut config = ClientConfig::new(api_key)?;
    if let Some(url) = override_config.vectorly_api_url.or(base.api_url) {
        config = config.with_api_base_url(url);
    }
    if let Some(url) = override_config.vectorly_upload_url.or(base.upload_url) {
        config = config.with_upload_base_url(url);
    }
    if let Some(url) = override_config.vectorly_stream_url.or(base.stream_url) {
        config = config.with_stream_base_url(url);
    }
    if let Some(timeout) = override_config.vectorly_timeout.or(base.timeout) {
        config = config.with_timeout(parse_timeout(&timeout)?);
    }

    Ok(config)
}

fn parse_env<I>(vars: I) -> Result<ConfigEnv>
where
    I: IntoIterator<Item = (String, String)>,
{
    envy::from_iter(vars).map_err(|e| Error::Configuration(format!("invalid environment: {e}")))
}

/// A missing file is an empty config; any other failure to read or parse it
/// is reported.
fn read_config_file(path: &Path) -> Result<ConfigFile> {
    match fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents)
            .map_err(|e| Error::Configuration(format!("invalid {}: {e}", path.display()))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Load configuration from `.env`, the environment and
/// `<config dir>/vectorly/config.toml`, environment taking precedence.
pub fn read_config() -> Result<ClientConfig> {
    match dotenv() {
        Ok(_) => {}
        Err(e) if e.not_found() => {}
        Err(e) => return Err(Error::Configuration(format!("invalid .env file: {e}"))),
    }
    let env_config = parse_env(std::env::vars())?;

    let file_config = match directories::ProjectDirs::from("io", "vectorly", "vectorly") {
        Some(project_dirs) => read_config_file(&project_dirs.config_dir().join("config.toml"))?,
        None => ConfigFile::default(),
    };

    merge_config(file_config, env_config)
}
