//! GitHub Gists backend for the remote document store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use super::{DocumentSummary, RemoteDocumentStore};
use crate::auth::TokenValidator;
use crate::error::{Error, Result};
use crate::util::{compact_text, is_http_url, normalize_text_option};

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = concat!("tasksync/", env!("CARGO_PKG_VERSION"));
const LIST_PAGE_SIZE: usize = 100;
const MAX_LIST_PAGES: usize = 10;

/// Client for the Gists REST API.
#[derive(Clone)]
pub struct GistClient {
    base_url: String,
    client: Client,
}

impl std::fmt::Debug for GistClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("GistClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GistClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Login name of the token's owner
    pub async fn current_user(&self, token: &str) -> Result<String> {
        let response = self
            .send(self.request(Method::GET, "/user", token), "fetch user")
            .await?;
        let user: GithubUser = decode(response, "fetch user").await?;
        Ok(user.login)
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> Result<Response> {
        let response = request.send().await.map_err(|error| {
            Error::RemoteUnavailable(format!("{context} request failed: {error}"))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let rate_limited = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|value| value.to_str().ok())
            == Some("0");
        let body = response.text().await.unwrap_or_default();
        let message = format!("{context}: {}", parse_api_error(status, &body));

        Err(match status {
            StatusCode::UNAUTHORIZED => Error::Auth(message),
            StatusCode::FORBIDDEN if !rate_limited => Error::Auth(message),
            _ => Error::RemoteUnavailable(message),
        })
    }

    async fn fetch_raw(&self, url: &str, token: &str) -> Result<String> {
        let request = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "text/plain");
        let response = self.send(request, "fetch raw file").await?;
        response.text().await.map_err(|error| {
            Error::RemoteUnavailable(format!("failed to read raw file body: {error}"))
        })
    }
}

#[async_trait]
impl RemoteDocumentStore for GistClient {
    async fn list_documents(&self, token: &str) -> Result<Vec<DocumentSummary>> {
        let mut documents = Vec::new();

        for page in 1..=MAX_LIST_PAGES {
            let request = self
                .request(Method::GET, "/gists", token)
                .query(&[("per_page", LIST_PAGE_SIZE), ("page", page)]);
            let response = self.send(request, "list gists").await?;
            let listings: Vec<GistListing> = decode(response, "list gists").await?;
            let count = listings.len();

            documents.extend(listings.into_iter().map(|listing| {
                let mut filenames = listing.files.into_keys().collect::<Vec<_>>();
                filenames.sort();
                DocumentSummary {
                    id: listing.id,
                    description: listing.description,
                    filenames,
                }
            }));

            if count < LIST_PAGE_SIZE {
                break;
            }
        }

        tracing::debug!("Listed {} gists", documents.len());
        Ok(documents)
    }

    async fn create_document(
        &self,
        token: &str,
        description: &str,
        filename: &str,
        content: &str,
    ) -> Result<String> {
        let payload = GistWrite {
            description: Some(description),
            public: Some(false),
            files: HashMap::from([(filename, GistFileContent { content })]),
        };
        let request = self.request(Method::POST, "/gists", token).json(&payload);
        let response = self.send(request, "create gist").await?;
        let created: GistCreated = decode(response, "create gist").await?;

        tracing::info!("Created backup gist {}", created.id);
        Ok(created.id)
    }

    async fn read_document(&self, token: &str, id: &str) -> Result<HashMap<String, String>> {
        let request = self.request(Method::GET, &format!("/gists/{id}"), token);
        let response = self.send(request, "read gist").await?;
        let details: GistDetails = decode(response, "read gist").await?;

        let mut files = HashMap::with_capacity(details.files.len());
        for (name, file) in details.files {
            let content = match (file.truncated, file.raw_url, file.content) {
                (true, Some(raw_url), _) => self.fetch_raw(&raw_url, token).await?,
                (_, _, Some(content)) => content,
                _ => continue,
            };
            files.insert(name, content);
        }
        Ok(files)
    }

    async fn replace_document_content(
        &self,
        token: &str,
        id: &str,
        filename: &str,
        content: &str,
    ) -> Result<()> {
        let payload = GistWrite {
            description: None,
            public: None,
            files: HashMap::from([(filename, GistFileContent { content })]),
        };
        let request = self
            .request(Method::PATCH, &format!("/gists/{id}"), token)
            .json(&payload);
        self.send(request, "update gist").await?;
        Ok(())
    }
}

#[async_trait]
impl TokenValidator for GistClient {
    async fn validate(&self, token: &str) -> Result<()> {
        let login = self.current_user(token).await?;
        tracing::debug!("Access token belongs to {}", login);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GistListing {
    id: String,
    description: Option<String>,
    #[serde(default)]
    files: HashMap<String, IgnoredAny>,
}

#[derive(Debug, Deserialize)]
struct GistDetails {
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    raw_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GistCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

#[derive(Debug, Serialize)]
struct GistWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public: Option<bool>,
    files: HashMap<&'a str, GistFileContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GistFileContent<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct GithubErrorBody {
    message: Option<String>,
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response, context: &str) -> Result<T> {
    response.json::<T>().await.map_err(|error| {
        Error::RemoteUnavailable(format!("{context}: unexpected response payload: {error}"))
    })
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<GithubErrorBody>(body) {
        if let Some(message) = payload.message {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::Config("API base URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}
