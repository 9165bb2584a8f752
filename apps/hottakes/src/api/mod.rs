use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::COOKIE;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use hottakes_wire::{Comment, CommentsPage, SortMode, Take, TakesPage};

#[derive(Clone, Debug)]
pub struct ApiConfig {
    base_url: Url,
    session_token: Option<String>,
}

impl ApiConfig {
    pub fn new(api_base: impl AsRef<str>) -> Result<Self, ApiError> {
        let mut base = api_base.as_ref().trim().to_string();
        if base.is_empty() {
            return Err(ApiError::InvalidConfig(
                "api base url cannot be empty".into(),
            ));
        }
        if !base.contains("://") {
            base = format!("{}{base}", infer_scheme(&base));
        }
        let mut parsed = Url::parse(&base)
            .map_err(|err| ApiError::InvalidConfig(format!("invalid api base url: {err}")))?;
        // Joins below are relative; a trailing slash keeps the base path intact.
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        Ok(Self {
            base_url: parsed,
            session_token: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn with_session_token(mut self, token: Option<String>) -> Self {
        self.session_token = token;
        self
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

fn infer_scheme(base: &str) -> &'static str {
    let host = base.split('/').next().unwrap_or(base).to_ascii_lowercase();
    if host.starts_with("localhost") || host.starts_with("127.") || host == "0.0.0.0" {
        "http://"
    } else {
        "https://"
    }
}

#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ApiConfig>,
    backend: Arc<dyn ApiBackend>,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let backend = Arc::new(ReqwestApiBackend::new()?);
        Ok(Self {
            config: Arc::new(config),
            backend,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_backend(config: ApiConfig, backend: Arc<dyn ApiBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub async fn fetch_takes(
        &self,
        sort: SortMode,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<TakesPage, ApiError> {
        self.backend
            .fetch_takes(
                self.config.base_url(),
                self.config.session_token(),
                sort,
                limit,
                cursor,
            )
            .await
    }

    pub async fn fetch_take(&self, id: &str) -> Result<Take, ApiError> {
        self.backend
            .fetch_take(self.config.base_url(), self.config.session_token(), id)
            .await
    }

    pub async fn create_take(&self, content: &str) -> Result<Take, ApiError> {
        self.backend
            .create_take(self.config.base_url(), self.config.session_token(), content)
            .await
    }

    pub async fn delete_take(&self, id: &str) -> Result<(), ApiError> {
        self.backend
            .delete_take(self.config.base_url(), self.config.session_token(), id)
            .await
    }

    pub async fn set_like(&self, id: &str, liked: bool) -> Result<(), ApiError> {
        self.backend
            .set_like(self.config.base_url(), self.config.session_token(), id, liked)
            .await
    }

    pub async fn fetch_comments(&self, take_id: &str) -> Result<Vec<Comment>, ApiError> {
        let page = self
            .backend
            .fetch_comments(self.config.base_url(), self.config.session_token(), take_id)
            .await?;
        Ok(page.comments)
    }

    pub async fn create_comment(&self, take_id: &str, content: &str) -> Result<Comment, ApiError> {
        self.backend
            .create_comment(
                self.config.base_url(),
                self.config.session_token(),
                take_id,
                content,
            )
            .await
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid api configuration: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
    #[error("server rejected request: {0}")]
    Rejected(String),
}

#[async_trait]
pub(crate) trait ApiBackend: Send + Sync {
    async fn fetch_takes(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        sort: SortMode,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<TakesPage, ApiError>;

    async fn fetch_take(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        id: &str,
    ) -> Result<Take, ApiError>;

    async fn create_take(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        content: &str,
    ) -> Result<Take, ApiError>;

    async fn delete_take(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        id: &str,
    ) -> Result<(), ApiError>;

    async fn set_like(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        id: &str,
        liked: bool,
    ) -> Result<(), ApiError>;

    async fn fetch_comments(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        take_id: &str,
    ) -> Result<CommentsPage, ApiError>;

    async fn create_comment(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        take_id: &str,
        content: &str,
    ) -> Result<Comment, ApiError>;
}

struct ReqwestApiBackend {
    client: reqwest::Client,
}

impl ReqwestApiBackend {
    fn new() -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }

    fn request(
        &self,
        method: reqwest::Method,
        endpoint: Url,
        session_token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, endpoint);
        if let Some(token) = session_token {
            builder = builder.header(COOKIE, format!("session={token}"));
        }
        builder
    }
}

fn endpoint(base_url: &Url, path: &str) -> Result<Url, ApiError> {
    base_url
        .join(path)
        .map_err(|err| ApiError::InvalidConfig(format!("invalid endpoint {path}: {err}")))
}

/// Map a non-2xx response to an error, surfacing the server's
/// `{"detail": ...}` message when one is present.
async fn rejection(response: reqwest::Response) -> ApiError {
    let status = response.status();
    if let Ok(body) = response.json::<Value>().await {
        if let Some(detail) = body.get("detail").and_then(Value::as_str) {
            return ApiError::Rejected(detail.to_string());
        }
    }
    ApiError::HttpStatus(status)
}

#[derive(Debug, Serialize)]
struct CreateContentRequest<'a> {
    content: &'a str,
}

#[async_trait]
impl ApiBackend for ReqwestApiBackend {
    async fn fetch_takes(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        sort: SortMode,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<TakesPage, ApiError> {
        let mut endpoint = endpoint(base_url, "takes")?;
        {
            let mut query = endpoint.query_pairs_mut();
            query.append_pair("sort", sort.as_query());
            query.append_pair("limit", &limit.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        let response = self
            .request(reqwest::Method::GET, endpoint, session_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json::<TakesPage>().await?)
    }

    async fn fetch_take(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        id: &str,
    ) -> Result<Take, ApiError> {
        let endpoint = endpoint(base_url, &format!("takes/{id}"))?;
        let response = self
            .request(reqwest::Method::GET, endpoint, session_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json::<Take>().await?)
    }

    async fn create_take(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        content: &str,
    ) -> Result<Take, ApiError> {
        let endpoint = endpoint(base_url, "takes")?;
        let response = self
            .request(reqwest::Method::POST, endpoint, session_token)
            .json(&CreateContentRequest { content })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json::<Take>().await?)
    }

    async fn delete_take(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        id: &str,
    ) -> Result<(), ApiError> {
        let endpoint = endpoint(base_url, &format!("takes/{id}"))?;
        let response = self
            .request(reqwest::Method::DELETE, endpoint, session_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(())
    }

    async fn set_like(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        id: &str,
        liked: bool,
    ) -> Result<(), ApiError> {
        let endpoint = endpoint(base_url, &format!("takes/{id}/like"))?;
        let method = if liked {
            reqwest::Method::POST
        } else {
            reqwest::Method::DELETE
        };
        let response = self.request(method, endpoint, session_token).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(())
    }

    async fn fetch_comments(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        take_id: &str,
    ) -> Result<CommentsPage, ApiError> {
        let endpoint = endpoint(base_url, &format!("takes/{take_id}/comments"))?;
        let response = self
            .request(reqwest::Method::GET, endpoint, session_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json::<CommentsPage>().await?)
    }

    async fn create_comment(
        &self,
        base_url: &Url,
        session_token: Option<&str>,
        take_id: &str,
        content: &str,
    ) -> Result<Comment, ApiError> {
        let endpoint = endpoint(base_url, &format!("takes/{take_id}/comments"))?;
        let response = self
            .request(reqwest::Method::POST, endpoint, session_token)
            .json(&CreateContentRequest { content })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json::<Comment>().await?)
    }
}
