use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

/// Key-value blob source: returns the object bytes or a typed failure.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blob store reached over HTTP: objects live under a base URL and are
/// fetched with a plain GET, optionally bearer-authenticated.
pub struct HttpBlobStore {
    base_url: Url,
    bearer_token: Option<String>,
    client: Client,
}

impl HttpBlobStore {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        // A trailing slash keeps Url::join from eating the last path
        // segment when keys contain slashes.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        Ok(Self {
            base_url: Url::parse(&normalized)?,
            bearer_token: None,
            client: Client::new(),
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.base_url.join(key)?;
        let mut request = self.client.get(url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(FetchError::NotFound(key.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(FetchError::Unauthorized(key.to_string()))
            }
            _ => {
                let response = response.error_for_status()?;
                Ok(response.bytes().await?.to_vec())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub attempt_timeout: Duration,
    pub scratch_dir: PathBuf,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(30),
            scratch_dir: std::env::temp_dir().join("pdf-rag-scratch"),
        }
    }
}

/// Local copy of a fetched object. Removing the file (and the scratch
/// directory once it empties) happens on drop, so every pipeline exit
/// path releases it.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), %error, "failed to remove scratch file");
            }
        }
        if let Some(dir) = self.path.parent() {
            // Succeeds only when no other run still has a file here.
            let _ = std::fs::remove_dir(dir);
        }
    }
}

/// Downloads a blob into a uniquely named scratch file, retrying
/// transient failures with exponential backoff.
pub struct Fetcher<S> {
    store: S,
    options: FetchOptions,
}

impl<S: BlobStore> Fetcher<S> {
    pub fn new(store: S, options: FetchOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// `fetch(key) -> local path`. Not-found and auth failures
    /// propagate immediately; timeouts and transport errors are
    /// retried up to `max_attempts` with backoff doubling per attempt.
    /// A partially written scratch file is removed before retrying.
    pub async fn fetch(&self, key: &str) -> Result<ScratchFile, FetchError> {
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..self.options.max_attempts {
            if attempt > 0 {
                let delay = self.options.base_backoff * 2u32.pow(attempt - 1);
                debug!(key, attempt, ?delay, "retrying fetch after backoff");
                tokio::time::sleep(delay).await;
            }

            let path = self
                .options
                .scratch_dir
                .join(format!("{}.pdf", Uuid::new_v4()));

            match timeout(self.options.attempt_timeout, self.transfer(key, &path)).await {
                Ok(Ok(())) => return Ok(ScratchFile { path }),
                Ok(Err(error)) if error.is_transient() => {
                    warn!(key, attempt, %error, "transient fetch failure");
                    let _ = tokio::fs::remove_file(&path).await;
                    last_error = Some(error);
                }
                Ok(Err(error)) => {
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(error);
                }
                Err(_elapsed) => {
                    warn!(key, attempt, "fetch attempt timed out");
                    let _ = tokio::fs::remove_file(&path).await;
                    last_error = Some(FetchError::Timeout(self.options.attempt_timeout));
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            attempts: self.options.max_attempts,
            last: last_error
                .map(|error| error.to_string())
                .unwrap_or_else(|| "no attempt recorded".to_string()),
        })
    }

    async fn transfer(&self, key: &str, path: &Path) -> Result<(), FetchError> {
        let bytes = self.store.get(key).await?;
        tokio::fs::create_dir_all(&self.options.scratch_dir).await?;
        tokio::fs::write(path, &bytes).await?;
        Ok(())
    }
}
