// Official platform API client: v2 REST endpoints over HTTP.
//
// A thin reqwest wrapper with a generic JSON GET helper, plus the create-post
// call that carries the retry policy. Authenticates with a user-context
// bearer token. Every request is bounded by REQUEST_TIMEOUT; a timeout is a
// transient failure like any other network error.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::error::TransportError;
use super::retry::{post_policy, RetryPolicy};
use super::{Mention, MentionQuery, PostOutcome, Transport};

/// Default API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.twitter.com";

/// Upper bound for any single API request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Client for the platform's official API.
pub struct OfficialClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    policy: RetryPolicy<TransportError>,
    /// Authenticated account id, resolved on first mention fetch.
    user_id: Option<String>,
}

impl OfficialClient {
    /// Create a client pointing at the given base URL.
    ///
    /// Pass a different URL for testing against a mock server.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("bruh-bot/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            policy: post_policy(Duration::from_secs(1)),
            user_id: None,
        })
    }

    /// Scale the post backoff. One second per unit in production.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.policy = post_policy(unit);
        self
    }

    /// Create a post, retrying per the post policy. Returns the new id.
    pub async fn post_with_retry(&self, text: &str) -> Result<String, TransportError> {
        let body = CreatePostRequest { text, reply: None };

        self.policy
            .run(|attempt| {
                if attempt > 1 {
                    info!(
                        attempt,
                        max_attempts = self.policy.max_attempts(),
                        "Retrying post"
                    );
                }
                self.create_post(&body)
            })
            .await
    }

    /// Reply to `target_id`. One attempt; callers may re-invoke.
    pub async fn reply_once(&self, text: &str, target_id: &str) -> Result<String, TransportError> {
        let body = CreatePostRequest {
            text,
            reply: Some(ReplyTarget {
                in_reply_to_tweet_id: target_id,
            }),
        };
        self.create_post(&body).await
    }

    /// Fetch mentions of the authenticated account, optionally only those
    /// newer than `since_id`. Best-effort: any failure yields an empty list.
    pub async fn get_mentions(&mut self, since_id: Option<&str>) -> Vec<Mention> {
        match self.try_get_mentions(since_id).await {
            Ok(mentions) => {
                info!(count = mentions.len(), "Fetched mentions");
                mentions
            }
            Err(e) => {
                warn!(error = %e, "Mention fetch failed, treating as empty");
                Vec::new()
            }
        }
    }

    /// Fetch every post in a conversation, oldest first. Empty on failure.
    pub async fn get_thread(&self, conversation_id: &str) -> Vec<Mention> {
        let query = format!("conversation_id:{conversation_id}");
        let result: Result<PostList, TransportError> = self
            .get_json(
                "/2/tweets/search/recent",
                &[
                    ("query", query.as_str()),
                    ("tweet.fields", "created_at,conversation_id,in_reply_to_user_id"),
                ],
            )
            .await;

        match result {
            Ok(list) => {
                let mut thread: Vec<Mention> =
                    list.data.into_iter().map(RemotePost::into_mention).collect();
                thread.sort_by_key(|m| m.created_at);
                thread
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "Thread fetch failed");
                Vec::new()
            }
        }
    }

    async fn try_get_mentions(&mut self, since_id: Option<&str>) -> Result<Vec<Mention>, TransportError> {
        let user_id = self.resolve_user_id().await?;
        let path = format!("/2/users/{user_id}/mentions");

        let mut params = vec![("tweet.fields", "created_at,conversation_id")];
        if let Some(since) = since_id {
            params.push(("since_id", since));
        }

        let list: PostList = self.get_json(&path, &params).await?;
        Ok(list.data.into_iter().map(RemotePost::into_mention).collect())
    }

    async fn resolve_user_id(&mut self) -> Result<String, TransportError> {
        if let Some(id) = &self.user_id {
            return Ok(id.clone());
        }

        let me: UserResponse = self.get_json("/2/users/me", &[]).await?;
        let id = me
            .data
            .map(|u| u.id)
            .ok_or_else(|| TransportError::Validation("users/me response has no data.id".into()))?;

        debug!(user_id = %id, "Resolved authenticated account");
        self.user_id = Some(id.clone());
        Ok(id)
    }

    async fn create_post(&self, body: &CreatePostRequest<'_>) -> Result<String, TransportError> {
        let url = format!("{}/2/tweets", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status, &text));
        }

        let parsed: CreatePostResponse = response.json().await?;
        parsed.into_id()
    }

    /// GET a JSON endpoint and deserialize the response.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, TransportError> {
        let url = format!("{}{}", self.base_url, path);

        debug!(path, "API GET request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status, &text));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl Transport for OfficialClient {
    fn name(&self) -> &'static str {
        "official"
    }

    async fn post(&mut self, text: &str) -> PostOutcome {
        match self.post_with_retry(text).await {
            Ok(id) => {
                info!(remote_id = %id, "Post published");
                PostOutcome::posted(id)
            }
            Err(e) => outcome_for_error("post", e),
        }
    }

    async fn post_reply(&mut self, text: &str, target_id: &str) -> PostOutcome {
        match self.reply_once(text, target_id).await {
            Ok(id) => {
                info!(remote_id = %id, target_id, "Reply published");
                PostOutcome::posted(id)
            }
            Err(e) => outcome_for_error("reply", e),
        }
    }

    async fn mentions(&mut self, query: &MentionQuery) -> Vec<Mention> {
        self.get_mentions(query.since_id.as_deref()).await
    }

    async fn thread_context(&mut self, mention: &Mention) -> Option<String> {
        let conversation_id = mention.conversation_id.as_deref()?;
        self.get_thread(conversation_id)
            .await
            .into_iter()
            .next()
            .map(|root| root.text)
    }

    async fn close(&mut self) {
        // Nothing held beyond pooled connections, which drop with the client.
    }
}

/// Map a classified failure onto the scheduler's trinary outcome.
fn outcome_for_error(action: &str, err: TransportError) -> PostOutcome {
    match err {
        TransportError::PermanentRejection { duplicate: true, message } => {
            error!(action, %message, "Duplicate content rejected by platform");
            PostOutcome::Rejected
        }
        TransportError::PermanentRejection { message, .. } => {
            error!(action, %message, "Platform refused the request (permissions)");
            PostOutcome::Rejected
        }
        other => {
            error!(action, error = %other, "Giving up");
            PostOutcome::Failed
        }
    }
}

// -- Serde types for the v2 API --

#[derive(Serialize)]
struct CreatePostRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplyTarget<'a>>,
}

#[derive(Serialize)]
struct ReplyTarget<'a> {
    in_reply_to_tweet_id: &'a str,
}

/// Response from `POST /2/tweets`.
#[derive(Debug, Deserialize)]
pub struct CreatePostResponse {
    pub data: Option<CreatedPost>,
    /// Some gateways answer 200 with an error object instead of a status.
    pub error: Option<ApiErrorBody>,
    #[serde(default)]
    pub errors: Vec<ApiErrorBody>,
}

impl CreatePostResponse {
    /// Extract the new post id, or explain why the payload is unusable.
    pub fn into_id(self) -> Result<String, TransportError> {
        if let Some(err) = self.error {
            return Err(TransportError::Validation(format!(
                "API error: {}",
                err.describe()
            )));
        }
        match self.data {
            Some(post) => Ok(post.id),
            None => {
                let detail = self
                    .errors
                    .first()
                    .map(ApiErrorBody::describe)
                    .unwrap_or_else(|| "response has no data.id".to_string());
                Err(TransportError::Validation(detail))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatedPost {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub message: Option<String>,
    pub detail: Option<String>,
}

impl ApiErrorBody {
    fn describe(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.detail.clone())
            .unwrap_or_else(|| "unspecified error".to_string())
    }
}

/// A post as returned by mention and search endpoints.
#[derive(Debug, Deserialize)]
pub struct RemotePost {
    pub id: String,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub conversation_id: Option<String>,
}

impl RemotePost {
    fn into_mention(self) -> Mention {
        Mention {
            remote_id: self.id,
            text: self.text,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            conversation_id: self.conversation_id,
        }
    }
}

/// A page of posts. `data` is omitted entirely when there are no results.
#[derive(Debug, Deserialize)]
pub struct PostList {
    #[serde(default)]
    pub data: Vec<RemotePost>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: Option<UserData>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}
