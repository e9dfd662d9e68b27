//! Supabase REST client implementing the backend actions.
//!
//! Talks to the PostgREST endpoint (`/rest/v1`) with the project API key
//! and the user's access token. Every mutation is scoped to the signed-in
//! user with an explicit `user_id` filter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::models::{Bookmark, BookmarkUpdate, Group, GroupData, Library};

use super::actions::{BackendActions, MetadataSource, NoMetadata};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const BOOKMARKS_TABLE: &str = "bookmarks";
const GROUPS_TABLE: &str = "groups";

/// Credentials for the Supabase project and the signed-in user.
#[derive(Debug, Clone)]
pub struct SupabaseCredentials {
    pub api_key: String,
    pub access_token: String,
    pub user_id: String,
}

impl SupabaseCredentials {
    /// Read credentials from `NISHAAN_SUPABASE_KEY`, `NISHAAN_ACCESS_TOKEN`
    /// and `NISHAAN_USER_ID`.
    pub fn from_env() -> Result<Self, ApiError> {
        let var = |name: &str| {
            std::env::var(name)
                .map_err(|_| ApiError::NotConfigured(format!("{} is not set", name)))
        };
        Ok(Self {
            api_key: var("NISHAAN_SUPABASE_KEY")?,
            access_token: var("NISHAAN_ACCESS_TOKEN")?,
            user_id: var("NISHAAN_USER_ID")?,
        })
    }
}

#[derive(Debug, Serialize)]
struct NewBookmark<'a> {
    user_id: &'a str,
    url: &'a str,
    group_id: Option<&'a str>,
    title: Option<String>,
    description: Option<String>,
    favicon_url: Option<String>,
    preview_image_url: Option<String>,
    site_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsRow {
    #[serde(default)]
    tags: Vec<String>,
}

/// Supabase backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SupabaseBackend<M = NoMetadata> {
    client: Client,
    rest_url: String,
    credentials: SupabaseCredentials,
    metadata: M,
}

impl SupabaseBackend<NoMetadata> {
    pub fn new(project_url: &str, credentials: SupabaseCredentials) -> Result<Self, ApiError> {
        Self::with_metadata(project_url, credentials, NoMetadata)
    }
}

impl<M: MetadataSource> SupabaseBackend<M> {
    pub fn with_metadata(
        project_url: &str,
        credentials: SupabaseCredentials,
        metadata: M,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", project_url.trim_end_matches('/')),
            credentials,
            metadata,
        })
    }

    fn request(&self, method: Method, table: &str, query: &str) -> RequestBuilder {
        let url = if query.is_empty() {
            format!("{}/{}", self.rest_url, table)
        } else {
            format!("{}/{}?{}", self.rest_url, table, query)
        };
        self.client
            .request(method, url)
            .header("apikey", &self.credentials.api_key)
            .bearer_auth(&self.credentials.access_token)
            .header(header::ACCEPT, "application/json")
    }

    /// Filter matching one row owned by the current user.
    fn owned_row(&self, id: &str) -> String {
        format!("id=eq.{}&user_id=eq.{}", id, self.credentials.user_id)
    }

    /// Active bookmarks, archived bookmarks, groups.
    fn library_queries(&self) -> [String; 3] {
        let owner = format!("user_id=eq.{}", self.credentials.user_id);
        [
            format!("select=*&{}&is_archived=eq.false&order=created_at.desc", owner),
            format!("select=*&{}&is_archived=eq.true&order=updated_at.desc", owner),
            format!("select=*&{}&order=sort_order.asc", owner),
        ]
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send with exponential backoff on 429.
    async fn send(
        &self,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &str) -> Result<T, ApiError> {
        let response = self
            .send(|| self.request(Method::GET, table, query))
            .await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", table, e)))
    }

    async fn insert<B: Serialize + Sync>(&self, table: &str, body: &B) -> Result<(), ApiError> {
        self.send(|| self.request(Method::POST, table, "").json(body))
            .await?;
        Ok(())
    }

    async fn update<B: Serialize + Sync>(
        &self,
        table: &str,
        id: &str,
        body: &B,
    ) -> Result<(), ApiError> {
        let filter = self.owned_row(id);
        self.send(|| self.request(Method::PATCH, table, &filter).json(body))
            .await?;
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), ApiError> {
        let filter = self.owned_row(id);
        self.send(|| self.request(Method::DELETE, table, &filter))
            .await?;
        Ok(())
    }

    async fn current_tags(&self, id: &str) -> Result<Vec<String>, ApiError> {
        let query = format!("select=tags&{}", self.owned_row(id));
        let rows: Vec<TagsRow> = self.select(BOOKMARKS_TABLE, &query).await?;
        rows.into_iter()
            .next()
            .map(|row| row.tags)
            .ok_or_else(|| ApiError::NotFound(format!("bookmark {}", id)))
    }
}

#[async_trait]
impl<M: MetadataSource> BackendActions for SupabaseBackend<M> {
    async fn create_bookmark(&self, url: &str, group_id: Option<&str>) -> Result<(), ApiError> {
        let metadata = self.metadata.fetch(url).await;
        debug!(url, has_title = metadata.title.is_some(), "Creating bookmark");

        let row = NewBookmark {
            user_id: &self.credentials.user_id,
            url,
            group_id,
            title: metadata.title,
            description: metadata.description,
            favicon_url: metadata.favicon_url,
            preview_image_url: metadata.preview_image_url,
            site_name: metadata.site_name,
        };
        self.insert(BOOKMARKS_TABLE, &row).await
    }

    async fn update_bookmark(&self, id: &str, data: &BookmarkUpdate) -> Result<(), ApiError> {
        self.update(BOOKMARKS_TABLE, id, data).await
    }

    async fn delete_bookmark(&self, id: &str) -> Result<(), ApiError> {
        self.delete(BOOKMARKS_TABLE, id).await
    }

    async fn toggle_favorite(&self, id: &str, is_favorite: bool) -> Result<(), ApiError> {
        self.update(BOOKMARKS_TABLE, id, &json!({ "is_favorite": is_favorite }))
            .await
    }

    async fn archive_bookmark(&self, id: &str) -> Result<(), ApiError> {
        self.update(BOOKMARKS_TABLE, id, &json!({ "is_archived": true }))
            .await
    }

    async fn restore_bookmark(&self, id: &str) -> Result<(), ApiError> {
        self.update(BOOKMARKS_TABLE, id, &json!({ "is_archived": false }))
            .await
    }

    async fn add_tag(&self, id: &str, tag: &str) -> Result<(), ApiError> {
        let mut tags = self.current_tags(id).await?;
        if tags.iter().any(|t| t == tag) {
            return Ok(());
        }
        tags.push(tag.to_string());
        self.update(BOOKMARKS_TABLE, id, &json!({ "tags": tags }))
            .await
    }

    async fn remove_tag(&self, id: &str, tag: &str) -> Result<(), ApiError> {
        let mut tags = self.current_tags(id).await?;
        tags.retain(|t| t != tag);
        self.update(BOOKMARKS_TABLE, id, &json!({ "tags": tags }))
            .await
    }

    async fn create_group(&self, data: &GroupData) -> Result<(), ApiError> {
        let row = json!({
            "user_id": self.credentials.user_id,
            "name": data.name,
            "color": data.color,
        });
        self.insert(GROUPS_TABLE, &row).await
    }

    async fn update_group(&self, id: &str, data: &GroupData) -> Result<(), ApiError> {
        self.update(GROUPS_TABLE, id, data).await
    }

    async fn delete_group(&self, id: &str) -> Result<(), ApiError> {
        self.delete(GROUPS_TABLE, id).await
    }

    async fn fetch_library(&self) -> Result<Library, ApiError> {
        let [active_query, archived_query, groups_query] = self.library_queries();

        let (bookmarks, archived, groups) = tokio::try_join!(
            self.select::<Vec<Bookmark>>(BOOKMARKS_TABLE, &active_query),
            self.select::<Vec<Bookmark>>(BOOKMARKS_TABLE, &archived_query),
            self.select::<Vec<Group>>(GROUPS_TABLE, &groups_query),
        )?;

        Ok(Library {
            bookmarks,
            archived,
            groups,
        })
    }
}
