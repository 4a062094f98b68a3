use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::progress::ProgressReport;

const API_PREFIX: &str = "/api/v1";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid backend url: {0}")]
    Url(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {detail}")]
    Status {
        status: reqwest::StatusCode,
        detail: String,
    },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// yt-dlp metadata often carries explicit `null`s; read them as the default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct VideoFormat {
    pub format_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ext: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resolution: String,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub note: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct VideoInfo {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub formats: Vec<VideoFormat>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subtitles: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub auto_subtitles: Vec<String>,
}

#[derive(Debug, Serialize)]
struct VideoRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct DownloadRequest<'a> {
    url: &'a str,
    format_id: &'a str,
    video_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    video_id: &'a str,
    question: &'a str,
}

/// `{status, video_id}` as returned by download and analyze.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct JobAck {
    pub status: String,
    #[serde(default)]
    pub video_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ChatAnswer {
    pub answer: String,
}

/// Anything able to fetch the current status of one job.
pub trait ProgressSource: Send + Sync {
    fn fetch_progress(
        &self,
        video_id: &str,
    ) -> impl Future<Output = Result<ProgressReport, ApiError>> + Send;
}

#[derive(Clone, Debug)]
pub struct BackendClient {
    http: Client,
    base: Url,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base = Url::parse(base_url).map_err(|e| ApiError::Url(format!("{base_url}: {e}")))?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let full = format!(
            "{}{}{}",
            self.base.as_str().trim_end_matches('/'),
            API_PREFIX,
            path
        );
        Url::parse(&full).map_err(|e| ApiError::Url(format!("{full}: {e}")))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let detail = serde_json::from_slice::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
            return Err(ApiError::Status { status, detail });
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let response = self.http.post(url).json(body).send().await?;
        Self::decode(response).await
    }

    pub async fn video_info(&self, url: &str) -> Result<VideoInfo, ApiError> {
        self.post("/info", &VideoRequest { url }).await
    }

    pub async fn start_download(
        &self,
        url: &str,
        format_id: &str,
        video_id: &str,
    ) -> Result<JobAck, ApiError> {
        self.post(
            "/download",
            &DownloadRequest {
                url,
                format_id,
                video_id,
            },
        )
        .await
    }

    pub async fn progress(&self, video_id: &str) -> Result<ProgressReport, ApiError> {
        let encoded = utf8_percent_encode(video_id, NON_ALPHANUMERIC).to_string();
        let url = self.endpoint(&format!("/progress/{}", encoded))?;
        let response = self.http.get(url).send().await?;
        Self::decode(response).await
    }

    pub async fn analyze(&self, url: &str) -> Result<JobAck, ApiError> {
        self.post("/analyze", &VideoRequest { url }).await
    }

    pub async fn chat(&self, video_id: &str, question: &str) -> Result<ChatAnswer, ApiError> {
        self.post(
            "/chat",
            &ChatRequest {
                video_id,
                question,
            },
        )
        .await
    }
}

impl ProgressSource for BackendClient {
    fn fetch_progress(
        &self,
        video_id: &str,
    ) -> impl Future<Output = Result<ProgressReport, ApiError>> + Send {
        self.progress(video_id)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::spawn_backend;
    use super::*;
    use axum::{
        Json, Router,
        extract::Path,
        http::StatusCode,
        routing::{get, post},
    };

    fn client(base: &str) -> BackendClient {
        BackendClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_video_info_decodes() {
        let app = Router::new().route(
            "/api/v1/info",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["url"], "https://youtu.be/abc");
                Json(serde_json::json!({
                    "id": "abc",
                    "title": "Demo",
                    "thumbnail": "https://img/abc.jpg",
                    "duration": 212,
                    "formats": [
                        {"format_id": "18", "ext": "mp4", "resolution": "640x360", "filesize": null, "note": "360p"}
                    ],
                    "subtitles": ["en"],
                    "auto_subtitles": []
                }))
            }),
        );
        let base = spawn_backend(app).await;

        let info = client(&base).video_info("https://youtu.be/abc").await.unwrap();
        assert_eq!(info.id, "abc");
        assert_eq!(info.duration, Some(212.0));
        assert_eq!(info.formats.len(), 1);
        assert_eq!(info.formats[0].filesize, None);
        assert_eq!(info.subtitles, vec!["en".to_string()]);
    }

    #[test]
    fn test_null_metadata_fields_decode_as_defaults() {
        let body = br#"{
            "id": "abc", "title": null, "thumbnail": null, "duration": null,
            "formats": [
                {"format_id": "sb0", "ext": "mhtml", "resolution": null, "filesize": null, "note": null},
                {"format_id": "18", "ext": "mp4", "resolution": "640x360", "note": "360p"}
            ],
            "subtitles": [], "auto_subtitles": null
        }"#;
        let info: VideoInfo = serde_json::from_slice(body).unwrap();
        assert_eq!(info.title, "");
        assert_eq!(info.formats.len(), 2);
        assert_eq!(info.formats[0].resolution, "");
        assert_eq!(info.formats[0].note, "");
        assert_eq!(info.formats[1].resolution, "640x360");
        assert!(info.auto_subtitles.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_carries_detail() {
        let app = Router::new().route(
            "/api/v1/info",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"detail": "Could not fetch video info"})),
                )
            }),
        );
        let base = spawn_backend(app).await;

        let err = client(&base).video_info("nope").await.unwrap_err();
        match err {
            ApiError::Status { status, detail } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(detail, "Could not fetch video info");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_progress_path_is_encoded() {
        let app = Router::new().route(
            "/api/v1/progress/{id}",
            get(|Path(id): Path<String>| async move {
                Json(serde_json::json!({"status": "downloading", "progress": 12, "note": id}))
            }),
        );
        let base = spawn_backend(app).await;

        let report = client(&base).progress("a/b c").await.unwrap();
        assert_eq!(report.status, "downloading");
        assert_eq!(report.percent(), Some(12));
    }

    #[tokio::test]
    async fn test_non_json_progress_is_decode_error() {
        let app = Router::new().route(
            "/api/v1/progress/{id}",
            get(|| async { "<html>gateway</html>" }),
        );
        let base = spawn_backend(app).await;

        let err = client(&base).progress("abc").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_download_and_chat_bodies() {
        let app = Router::new()
            .route(
                "/api/v1/download",
                post(|Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(body["format_id"], "22");
                    assert_eq!(body["video_id"], "abc");
                    Json(serde_json::json!({"status": "Download started", "video_id": "abc"}))
                }),
            )
            .route(
                "/api/v1/chat",
                post(|Json(body): Json<serde_json::Value>| async move {
                    let q = body["question"].as_str().unwrap_or_default().to_string();
                    Json(serde_json::json!({"answer": format!("re: {q}")}))
                }),
            );
        let base = spawn_backend(app).await;
        let c = client(&base);

        let ack = c.start_download("https://youtu.be/abc", "22", "abc").await.unwrap();
        assert_eq!(ack.status, "Download started");
        assert_eq!(ack.video_id.as_deref(), Some("abc"));

        let answer = c.chat("abc", "what?").await.unwrap();
        assert_eq!(answer.answer, "re: what?");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_http_error() {
        let err = client("http://127.0.0.1:1").progress("abc").await.unwrap_err();
        assert!(matches!(err, ApiError::Http(_)));
    }

    #[test]
    fn test_bad_base_url() {
        assert!(matches!(
            BackendClient::new("not a url", Duration::from_secs(1)),
            Err(ApiError::Url(_))
        ));
    }
}
