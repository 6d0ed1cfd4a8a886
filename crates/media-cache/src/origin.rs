//! Fetching media bytes from the remote origin

use crate::error::OriginError;
use crate::types::{MediaKey, Variant};
use async_trait::async_trait;
use media_blob_store::{Blob, DEFAULT_CONTENT_TYPE};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_FULL_PATH: &str = "/media/{key}";
pub const DEFAULT_THUMBNAIL_PATH: &str = "/media/{key}/thumbnail";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Source of media content on a cache miss.
///
/// Content for a given key and variant must be stable across fetches; the
/// cache tracks no versions.
#[async_trait]
pub trait MediaOrigin: Send + Sync {
    async fn fetch(&self, key: &MediaKey, variant: Variant) -> Result<Blob, OriginError>;
}

/// HTTP client for the media-serving endpoint
pub struct HttpMediaOrigin {
    client: Client,
    base_url: String,
    full_path: String,
    thumbnail_path: String,
    auth_token: Option<String>,
}

impl HttpMediaOrigin {
    /// Create an origin with a default client
    pub fn new(base_url: &str) -> Result<Self, OriginError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Self::with_client(client, base_url)
    }

    /// Create an origin that sends requests through a caller-configured client
    pub fn with_client(client: Client, base_url: &str) -> Result<Self, OriginError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| OriginError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(OriginError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            full_path: DEFAULT_FULL_PATH.to_string(),
            thumbnail_path: DEFAULT_THUMBNAIL_PATH.to_string(),
            auth_token: None,
        })
    }

    /// Override the per-variant path templates; `{key}` is replaced by the
    /// percent-encoded media key
    pub fn with_paths(mut self, full_path: &str, thumbnail_path: &str) -> Self {
        self.full_path = full_path.to_string();
        self.thumbnail_path = thumbnail_path.to_string();
        self
    }

    /// Send a bearer token with every request
    pub fn with_auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }

    /// URL media is retrieved from for `key` and `variant`
    pub fn url_for(&self, key: &MediaKey, variant: Variant) -> String {
        let template = match variant {
            Variant::Full => &self.full_path,
            Variant::Thumbnail => &self.thumbnail_path,
        };
        let path = template.replace("{key}", &urlencoding::encode(key.as_str()));
        let separator = if path.starts_with('/') { "" } else { "/" };
        format!("{}{}{}", self.base_url, separator, path)
    }
}

#[async_trait]
impl MediaOrigin for HttpMediaOrigin {
    async fn fetch(&self, key: &MediaKey, variant: Variant) -> Result<Blob, OriginError> {
        let url = self.url_for(key, variant);
        debug!(key = %key, variant = %variant, url = %url, "Fetching media from origin");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %url, "Origin rejected media request");
            return Err(OriginError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let data = response.bytes().await?;

        debug!(
            key = %key,
            variant = %variant,
            size = data.len(),
            content_type = %content_type,
            "Fetched media from origin"
        );

        Ok(Blob::new(data, content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;

    async fn full(Path(key): Path<String>) -> Response {
        ([(header::CONTENT_TYPE, "image/png")], format!("full:{}", key)).into_response()
    }

    async fn thumbnail(Path(key): Path<String>) -> Response {
        ([(header::CONTENT_TYPE, "image/jpeg")], format!("thumb:{}", key)).into_response()
    }

    async fn private(headers: HeaderMap) -> Response {
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            == Some("Bearer secret");
        if authorized {
            ([(header::CONTENT_TYPE, "image/webp")], "private").into_response()
        } else {
            StatusCode::UNAUTHORIZED.into_response()
        }
    }

    async fn spawn_origin() -> String {
        let router = Router::new()
            .route("/media/{key}", get(full))
            .route("/media/{key}/thumbnail", get(thumbnail))
            .route("/private/{key}", get(private));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn key(name: &str) -> MediaKey {
        MediaKey::new(name).unwrap()
    }

    #[test]
    fn test_url_for_variants() {
        let origin = HttpMediaOrigin::new("https://api.example.com/").unwrap();

        assert_eq!(
            origin.url_for(&key("m1"), Variant::Full),
            "https://api.example.com/media/m1"
        );
        assert_eq!(
            origin.url_for(&key("m1"), Variant::Thumbnail),
            "https://api.example.com/media/m1/thumbnail"
        );
    }

    #[test]
    fn test_url_for_encodes_key() {
        let origin = HttpMediaOrigin::new("https://api.example.com")
            .unwrap()
            .with_paths("images/{key}", "/thumbs/{key}?size=256");

        assert_eq!(
            origin.url_for(&key("a b/c"), Variant::Full),
            "https://api.example.com/images/a%20b%2Fc"
        );
        assert_eq!(
            origin.url_for(&key("m1"), Variant::Thumbnail),
            "https://api.example.com/thumbs/m1?size=256"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpMediaOrigin::new("not a url"),
            Err(OriginError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpMediaOrigin::new("ftp://example.com"),
            Err(OriginError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_full_and_thumbnail() {
        let base_url = spawn_origin().await;
        let origin = HttpMediaOrigin::new(&base_url).unwrap();

        let blob = origin.fetch(&key("m1"), Variant::Full).await.unwrap();
        assert_eq!(blob.data().as_ref(), b"full:m1");
        assert_eq!(blob.content_type(), "image/png");

        let blob = origin.fetch(&key("m1"), Variant::Thumbnail).await.unwrap();
        assert_eq!(blob.data().as_ref(), b"thumb:m1");
        assert_eq!(blob.content_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn test_fetch_decodes_to_original_key() {
        let base_url = spawn_origin().await;
        let origin = HttpMediaOrigin::new(&base_url).unwrap();

        let blob = origin.fetch(&key("a b"), Variant::Full).await.unwrap();
        assert_eq!(blob.data().as_ref(), b"full:a b");
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let base_url = spawn_origin().await;
        let origin = HttpMediaOrigin::new(&base_url)
            .unwrap()
            .with_paths("/missing/{key}", "/missing/{key}/thumbnail");

        let err = origin.fetch(&key("m1"), Variant::Full).await.unwrap_err();
        match err {
            OriginError::Status { status, url } => {
                assert_eq!(status, 404);
                assert!(url.ends_with("/missing/m1"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_sends_bearer_token() {
        let base_url = spawn_origin().await;
        let anonymous = HttpMediaOrigin::new(&base_url)
            .unwrap()
            .with_paths("/private/{key}", "/private/{key}");
        let authorized = HttpMediaOrigin::new(&base_url)
            .unwrap()
            .with_paths("/private/{key}", "/private/{key}")
            .with_auth_token("secret");

        assert!(matches!(
            anonymous.fetch(&key("m1"), Variant::Full).await,
            Err(OriginError::Status { status: 401, .. })
        ));
        let blob = authorized.fetch(&key("m1"), Variant::Full).await.unwrap();
        assert_eq!(blob.content_type(), "image/webp");
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let origin = HttpMediaOrigin::new(&format!("http://{}", addr)).unwrap();
        assert!(matches!(
            origin.fetch(&key("m1"), Variant::Full).await,
            Err(OriginError::Http(_))
        ));
    }
}
