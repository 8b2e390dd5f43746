//! YouTube upload through the Data API v3 resumable protocol.

pub mod auth;

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{header, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

pub use auth::{AuthError, Authenticator, StoredCredentials};

use crate::config::{PrivacyStatus, YouTubeSettings};
use crate::interrupt::{ctrlc_received, sleep_unless_interrupted};
use crate::retry::{is_retryable_status, is_transient_network_error, RetryPolicy};

/// Resumable chunks must be multiples of this, except the last one.
pub const CHUNK_GRANULARITY: usize = 256 * 1024;

/// Per-request timeout; a single chunk PUT must finish within it.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP 308 "Resume Incomplete".
const RESUME_INCOMPLETE: u16 = 308;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Video file not found: {}", .0.display())]
    VideoNotFound(PathBuf),

    #[error("Thumbnail file not found: {}", .0.display())]
    ThumbnailNotFound(PathBuf),

    #[error("Video file is empty: {}", .0.display())]
    EmptyVideo(PathBuf),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("YouTube API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Upload session response had no Location header")]
    MissingLocation,

    #[error("Upload failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("Unexpected YouTube response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload interrupted")]
    Interrupted,
}

/// What to upload and how to label it.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub video_path: PathBuf,
    pub title: String,
    pub description: String,
    /// Falls back to `youtube.default_tags` when empty.
    pub tags: Vec<String>,
    pub category_id: Option<String>,
    pub privacy: Option<PrivacyStatus>,
    pub thumbnail: Option<PathBuf>,
}

impl UploadRequest {
    pub fn new(video_path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            video_path: video_path.into(),
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            category_id: None,
            privacy: None,
            thumbnail: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedVideo {
    pub id: String,
    pub url: String,
}

/// Processing state reported by `videos.list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoStatus {
    pub upload_status: Option<String>,
    pub privacy_status: Option<String>,
    pub processing_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoListItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoListItem {
    #[serde(default)]
    status: Option<StatusPart>,
    #[serde(default)]
    processing_details: Option<ProcessingDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPart {
    upload_status: Option<String>,
    privacy_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessingDetails {
    processing_status: Option<String>,
}

/// Watch URL for a video id.
pub fn video_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Next byte to send after a 308, from its `Range: bytes=0-N` header.
/// No header means nothing was committed.
pub fn next_offset(range: Option<&str>) -> u64 {
    range
        .and_then(|r| r.trim().strip_prefix("bytes="))
        .and_then(|r| r.split('-').nth(1))
        .and_then(|end| end.trim().parse::<u64>().ok())
        .map(|end| end + 1)
        .unwrap_or(0)
}

/// Chunk size rounded down to the required granularity.
pub fn effective_chunk_size(configured: usize) -> usize {
    (configured / CHUNK_GRANULARITY).max(1) * CHUNK_GRANULARITY
}

/// Outcome of one PUT to the upload session.
enum ChunkOutcome {
    Done(UploadedVideo),
    Committed(u64),
}

enum ChunkFailure {
    Retryable(String),
    Fatal(UploadError),
}

pub struct YouTubeService {
    settings: YouTubeSettings,
    access_token: String,
    http_client: reqwest::Client,
    retry: RetryPolicy,
}

impl YouTubeService {
    pub fn new(settings: YouTubeSettings, access_token: impl Into<String>) -> Result<Self, UploadError> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            // 308 means "resume incomplete" here, not a redirect
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let retry = RetryPolicy::default().with_max_retries(settings.max_retries);
        Ok(Self {
            settings,
            access_token: access_token.into(),
            http_client,
            retry,
        })
    }

    /// Authorize through `authenticator`, then build the service.
    pub async fn connect(
        settings: YouTubeSettings,
        authenticator: &Authenticator,
    ) -> Result<Self, UploadError> {
        let token = authenticator.access_token().await?;
        Self::new(settings, token)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn settings(&self) -> &YouTubeSettings {
        &self.settings
    }

    fn upload_url(&self, path: &str) -> String {
        format!("{}{}", self.settings.upload_base_url.trim_end_matches('/'), path)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.settings.api_base_url.trim_end_matches('/'), path)
    }

    async fn api_error(response: reqwest::Response) -> UploadError {
        let status = response.status();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if status == StatusCode::UNAUTHORIZED {
            return UploadError::Auth(AuthError::Unauthorized(message));
        }
        UploadError::Api {
            status: status.as_u16(),
            message,
        }
    }

    fn metadata(&self, request: &UploadRequest) -> serde_json::Value {
        let tags = if request.tags.is_empty() {
            &self.settings.default_tags
        } else {
            &request.tags
        };
        json!({
            "snippet": {
                "title": request.title,
                "description": request.description,
                "tags": tags,
                "categoryId": request
                    .category_id
                    .as_deref()
                    .unwrap_or(&self.settings.category_id),
            },
            "status": {
                "privacyStatus": request.privacy.unwrap_or(self.settings.privacy_status).as_str(),
                "selfDeclaredMadeForKids": false,
            },
        })
    }

    /// Upload a video, then its thumbnail if one was given.
    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadedVideo, UploadError> {
        let path = &request.video_path;
        if !path.is_file() {
            return Err(UploadError::VideoNotFound(path.clone()));
        }
        if let Some(thumb) = &request.thumbnail {
            if !thumb.is_file() {
                return Err(UploadError::ThumbnailNotFound(thumb.clone()));
            }
        }
        let size = tokio::fs::metadata(path).await?.len();
        if size == 0 {
            return Err(UploadError::EmptyVideo(path.clone()));
        }

        log::info!("Uploading {} ({} bytes) as \"{}\"", path.display(), size, request.title);

        let session = self.start_session(request, size).await?;
        let video = self.upload_file(&session, path, size).await?;

        println!("Video uploaded successfully: {}", video.url);

        if let Some(thumb) = &request.thumbnail {
            self.set_thumbnail(&video.id, thumb).await?;
        }
        Ok(video)
    }

    /// Open a resumable session and return its URL.
    async fn start_session(&self, request: &UploadRequest, size: u64) -> Result<String, UploadError> {
        let url = self.upload_url("/upload/youtube/v3/videos");
        let body = self.metadata(request);
        let mut attempt = 0u32;

        loop {
            let result = self
                .http_client
                .post(&url)
                .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
                .bearer_auth(&self.access_token)
                .header("X-Upload-Content-Type", "video/mp4")
                .header("X-Upload-Content-Length", size.to_string())
                .json(&body)
                .send()
                .await;

            let message = match result {
                Ok(response) if response.status().is_success() => {
                    return response
                        .headers()
                        .get(header::LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                        .ok_or(UploadError::MissingLocation);
                }
                Ok(response) if is_retryable_status(response.status()) => {
                    format!("session request returned {}", response.status())
                }
                Ok(response) => return Err(Self::api_error(response).await),
                Err(e) if is_transient_network_error(&e) => e.to_string(),
                Err(e) => return Err(e.into()),
            };

            attempt = self.backoff(attempt, &message).await?;
        }
    }

    /// Sleep before the next retry, or give up.
    async fn backoff(&self, attempt: u32, message: &str) -> Result<u32, UploadError> {
        if attempt >= self.retry.max_retries {
            log::error!("Giving up after {} attempts: {}", attempt + 1, message);
            return Err(UploadError::RetriesExhausted {
                attempts: attempt + 1,
                message: message.to_string(),
            });
        }
        let delay = self.retry.delay(attempt, None);
        log::warn!(
            "Upload request failed (attempt {}/{}): {}. Retrying in {:?}...",
            attempt + 1,
            self.retry.max_retries + 1,
            message,
            delay
        );
        if !sleep_unless_interrupted(delay).await {
            return Err(UploadError::Interrupted);
        }
        Ok(attempt + 1)
    }

    async fn upload_file(
        &self,
        session: &str,
        path: &Path,
        size: u64,
    ) -> Result<UploadedVideo, UploadError> {
        let chunk_size = effective_chunk_size(self.settings.chunk_size) as u64;
        let mut file = tokio::fs::File::open(path).await?;
        let mut offset = 0u64;
        let mut attempt = 0u32;
        let mut last_percent = None;

        loop {
            if ctrlc_received() {
                return Err(UploadError::Interrupted);
            }
            if offset >= size {
                // every byte is committed but the final response never came
                match self.query_offset(session, size).await? {
                    ChunkOutcome::Done(video) => return Ok(video),
                    ChunkOutcome::Committed(next) if next < size => {
                        log::info!("Resuming upload at byte {}", next);
                        offset = next;
                        continue;
                    }
                    ChunkOutcome::Committed(next) => {
                        return Err(UploadError::InvalidResponse(format!(
                            "server holds {} of {} bytes but did not finish the upload",
                            next, size
                        )));
                    }
                }
            }

            let len = chunk_size.min(size - offset);
            let mut chunk = vec![0u8; len as usize];
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut chunk).await?;

            let result = self
                .http_client
                .put(session)
                .bearer_auth(&self.access_token)
                .header(header::CONTENT_LENGTH, len)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", offset, offset + len - 1, size),
                )
                .body(chunk)
                .send()
                .await;

            let message = match result {
                Ok(response) => match Self::chunk_outcome(response).await {
                    Ok(ChunkOutcome::Done(video)) => return Ok(video),
                    Ok(ChunkOutcome::Committed(next)) => {
                        offset = next;
                        attempt = 0;
                        let percent = offset * 100 / size;
                        if last_percent != Some(percent) {
                            println!("Upload progress: {}%", percent);
                            last_percent = Some(percent);
                        }
                        continue;
                    }
                    Err(ChunkFailure::Retryable(message)) => message,
                    Err(ChunkFailure::Fatal(e)) => return Err(e),
                },
                Err(e) if is_transient_network_error(&e) => e.to_string(),
                Err(e) => return Err(e.into()),
            };

            attempt = self.backoff(attempt, &message).await?;

            match self.query_offset(session, size).await {
                Ok(ChunkOutcome::Done(video)) => return Ok(video),
                Ok(ChunkOutcome::Committed(next)) => {
                    log::info!("Resuming upload at byte {}", next);
                    offset = next;
                }
                Err(e) => log::warn!("Could not query upload offset: {}", e),
            }
        }
    }

    async fn chunk_outcome(response: reqwest::Response) -> Result<ChunkOutcome, ChunkFailure> {
        let status = response.status();
        if status.as_u16() == RESUME_INCOMPLETE {
            let range = response
                .headers()
                .get(header::RANGE)
                .and_then(|v| v.to_str().ok());
            return Ok(ChunkOutcome::Committed(next_offset(range)));
        }
        if status.is_success() {
            return match response.json::<VideoResource>().await {
                Ok(resource) => Ok(ChunkOutcome::Done(UploadedVideo {
                    url: video_url(&resource.id),
                    id: resource.id,
                })),
                Err(e) => Err(ChunkFailure::Fatal(UploadError::InvalidResponse(e.to_string()))),
            };
        }
        if is_retryable_status(status) {
            return Err(ChunkFailure::Retryable(format!("upload returned {}", status)));
        }
        Err(ChunkFailure::Fatal(Self::api_error(response).await))
    }

    /// Ask the server how much of the file it has.
    async fn query_offset(&self, session: &str, size: u64) -> Result<ChunkOutcome, UploadError> {
        let response = self
            .http_client
            .put(session)
            .bearer_auth(&self.access_token)
            .header(header::CONTENT_LENGTH, 0)
            .header(header::CONTENT_RANGE, format!("bytes */{}", size))
            .send()
            .await?;

        Self::chunk_outcome(response).await.map_err(|failure| match failure {
            ChunkFailure::Retryable(message) => UploadError::InvalidResponse(message),
            ChunkFailure::Fatal(e) => e,
        })
    }

    /// Set a custom thumbnail (PNG or JPEG).
    pub async fn set_thumbnail(&self, video_id: &str, path: &Path) -> Result<(), UploadError> {
        if !path.is_file() {
            return Err(UploadError::ThumbnailNotFound(path.to_path_buf()));
        }
        let content_type = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => {
                "image/jpeg"
            }
            _ => "image/png",
        };
        let data = tokio::fs::read(path).await?;

        let response = self
            .http_client
            .post(self.upload_url("/upload/youtube/v3/thumbnails/set"))
            .query(&[("videoId", video_id), ("uploadType", "media")])
            .bearer_auth(&self.access_token)
            .header(header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        println!("Thumbnail set for video: {}", video_id);
        Ok(())
    }

    /// `None` when the video does not exist or is not visible to this account.
    pub async fn check_upload_status(&self, video_id: &str) -> Result<Option<VideoStatus>, UploadError> {
        let response = self
            .http_client
            .get(self.api_url("/youtube/v3/videos"))
            .query(&[("part", "status,processingDetails"), ("id", video_id)])
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let list: VideoListResponse = response.json().await?;
        Ok(list.items.into_iter().next().map(|item| {
            let (upload_status, privacy_status) = item
                .status
                .map(|s| (s.upload_status, s.privacy_status))
                .unwrap_or_default();
            VideoStatus {
                upload_status,
                privacy_status,
                processing_status: item.processing_details.and_then(|p| p.processing_status),
            }
        }))
    }
}
