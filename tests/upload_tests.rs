//! Mock HTTP tests for YouTube auth and resumable upload.

use std::path::{Path, PathBuf};

use contents_autouploader::config::{ApiKeys, PrivacyStatus, YouTubeSettings};
use contents_autouploader::retry::RetryPolicy;
use contents_autouploader::youtube::auth::{AuthError, Authenticator, StoredCredentials};
use contents_autouploader::youtube::{UploadError, UploadRequest, YouTubeService};

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VIDEO_SIZE: usize = 300 * 1024;
const FIRST_CHUNK: &str = "bytes 0-262143/307200";
const SECOND_CHUNK: &str = "bytes 262144-307199/307200";
const QUERY_OFFSET: &str = "bytes */307200";

fn settings(server: &MockServer) -> YouTubeSettings {
    YouTubeSettings {
        token_uri: format!("{}/token", server.uri()),
        upload_base_url: server.uri(),
        api_base_url: server.uri(),
        chunk_size: 256 * 1024,
        ..YouTubeSettings::default()
    }
}

fn keys() -> ApiKeys {
    ApiKeys {
        youtube_client_id: Some("client-id".into()),
        youtube_client_secret: Some("client-secret".into()),
        ..ApiKeys::default()
    }
}

fn video_file(dir: &Path) -> PathBuf {
    let path = dir.join("lecture.mp4");
    std::fs::write(&path, vec![7u8; VIDEO_SIZE]).unwrap();
    path
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .and(query_param("uploadType", "resumable"))
        .and(query_param("part", "snippet,status"))
        .and(header("authorization", "Bearer access-token"))
        .and(body_partial_json(json!({
            "snippet": { "title": "시간 관리의 중요성", "categoryId": "27" },
            "status": { "privacyStatus": "unlisted" }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Location", format!("{}/session/abc", server.uri()).as_str()),
        )
        .expect(1)
        .mount(server)
        .await;
}

fn request(video: PathBuf) -> UploadRequest {
    let mut request = UploadRequest::new(video, "시간 관리의 중요성");
    request.privacy = Some(PrivacyStatus::Unlisted);
    request
}

// === Auth ===

#[tokio::test]
async fn test_expired_token_is_refreshed_and_saved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=stored-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let creds_path = dir.path().join("youtube_credentials.json");
    StoredCredentials {
        access_token: "stale".into(),
        refresh_token: Some("stored-refresh".into()),
        expires_at: Some(0),
        scopes: vec![],
    }
    .save(&creds_path)
    .unwrap();

    let auth = Authenticator::new(&settings(&server), &keys())
        .unwrap()
        .with_credentials_path(creds_path.clone());
    assert_eq!(auth.access_token().await.unwrap(), "fresh-token");

    let saved = StoredCredentials::load(&creds_path).unwrap().unwrap();
    assert_eq!(saved.access_token, "fresh-token");
    assert_eq!(saved.refresh_token.as_deref(), Some("stored-refresh"));
    assert!(saved.is_valid());
}

#[tokio::test]
async fn test_valid_token_is_reused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let creds_path = dir.path().join("youtube_credentials.json");
    StoredCredentials {
        access_token: "still-good".into(),
        refresh_token: None,
        expires_at: Some(u64::MAX / 2),
        scopes: vec![],
    }
    .save(&creds_path)
    .unwrap();

    let auth = Authenticator::new(&settings(&server), &keys())
        .unwrap()
        .with_credentials_path(creds_path);
    assert_eq!(auth.access_token().await.unwrap(), "still-good");
}

#[test]
fn test_missing_client_credentials() {
    let result = Authenticator::new(&YouTubeSettings::default(), &ApiKeys::default());
    assert!(matches!(result, Err(AuthError::MissingClientCredentials)));
}

// === Upload ===

#[tokio::test]
async fn test_resumable_upload_in_chunks() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", FIRST_CHUNK))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-262143"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", SECOND_CHUNK))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "vid123" })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = YouTubeService::new(settings(&server), "access-token")
        .unwrap()
        .with_retry_policy(RetryPolicy::immediate(3));
    let uploaded = service.upload(&request(video_file(dir.path()))).await.unwrap();

    assert_eq!(uploaded.id, "vid123");
    assert_eq!(uploaded.url, "https://www.youtube.com/watch?v=vid123");
}

#[tokio::test]
async fn test_server_error_resumes_from_committed_offset() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", FIRST_CHUNK))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", QUERY_OFFSET))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-262143"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", SECOND_CHUNK))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "vid456" })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = YouTubeService::new(settings(&server), "access-token")
        .unwrap()
        .with_retry_policy(RetryPolicy::immediate(3));
    let uploaded = service.upload(&request(video_file(dir.path()))).await.unwrap();
    assert_eq!(uploaded.id, "vid456");
}

#[tokio::test]
async fn test_fully_committed_upload_fetches_final_response() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    // the server takes the whole file from the first chunk
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", FIRST_CHUNK))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-307199"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", SECOND_CHUNK))
        .respond_with(ResponseTemplate::new(400))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", QUERY_OFFSET))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "vid789" })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = YouTubeService::new(settings(&server), "access-token")
        .unwrap()
        .with_retry_policy(RetryPolicy::immediate(3));
    let uploaded = service.upload(&request(video_file(dir.path()))).await.unwrap();
    assert_eq!(uploaded.id, "vid789");
}

#[tokio::test]
async fn test_committed_past_end_without_result_is_an_error() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", FIRST_CHUNK))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-307199"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("content-range", QUERY_OFFSET))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-307199"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = YouTubeService::new(settings(&server), "access-token")
        .unwrap()
        .with_retry_policy(RetryPolicy::immediate(3));
    let err = service
        .upload(&request(video_file(dir.path())))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_retries_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = YouTubeService::new(settings(&server), "access-token")
        .unwrap()
        .with_retry_policy(RetryPolicy::immediate(2));
    let err = service
        .upload(&request(video_file(dir.path())))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::RetriesExhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid Credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = YouTubeService::new(settings(&server), "access-token").unwrap();
    let err = service
        .upload(&request(video_file(dir.path())))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Auth(AuthError::Unauthorized(_))));
}

#[tokio::test]
async fn test_forbidden_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = YouTubeService::new(settings(&server), "access-token").unwrap();
    let err = service
        .upload(&request(video_file(dir.path())))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Api { status: 403, .. }));
}

#[tokio::test]
async fn test_thumbnail_and_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/thumbnails/set"))
        .and(query_param("videoId", "vid123"))
        .and(header("content-type", "image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/videos"))
        .and(query_param("id", "vid123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "vid123",
                "status": { "uploadStatus": "processed", "privacyStatus": "unlisted" },
                "processingDetails": { "processingStatus": "succeeded" }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/videos"))
        .and(query_param("id", "missing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let thumb = dir.path().join("thumb.png");
    std::fs::write(&thumb, b"\x89PNG fake").unwrap();

    let service = YouTubeService::new(settings(&server), "access-token").unwrap();
    service.set_thumbnail("vid123", &thumb).await.unwrap();

    let status = service.check_upload_status("vid123").await.unwrap().unwrap();
    assert_eq!(status.upload_status.as_deref(), Some("processed"));
    assert_eq!(status.privacy_status.as_deref(), Some("unlisted"));
    assert_eq!(status.processing_status.as_deref(), Some("succeeded"));

    assert!(service.check_upload_status("missing").await.unwrap().is_none());
}
