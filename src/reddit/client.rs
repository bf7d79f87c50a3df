//! reqwest-backed [`RedditApi`] implementation.
//!
//! Script-app OAuth (password grant) with a cached bearer token, plus the
//! status-code classification that drives the stream loops' error handling:
//! 429 → rate limited, 401/403 → fatal, 5xx and network failures →
//! transient.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::RedditError;
use crate::reddit::{
    CommentRef, FlairTemplate, InboxMessage, ModLogEntry, Post, RedditApi, RemovalReasonEntry,
    WikiPage,
};
use crate::ruleset::PostFlairTemplate;
use crate::settings::Settings;

const OAUTH_BASE: &str = "https://oauth.reddit.com";
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Generic Reddit listing envelope.
#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    children: Vec<Child<T>>,
}

#[derive(Debug, Deserialize)]
struct Child<T> {
    data: T,
}

/// Envelope for `api_type=json` write endpoints.
#[derive(Debug, Deserialize)]
struct JsonEnvelope {
    json: JsonInner,
}

#[derive(Debug, Deserialize, Default)]
struct JsonInner {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Shared HTTP client for the Reddit API. All interior state is behind a
/// `Mutex`, so one instance serves all three stream loops.
pub struct RedditClient {
    http: Client,
    settings: Settings,
    token: Mutex<Option<CachedToken>>,
}

impl RedditClient {
    pub fn new(settings: Settings) -> Result<Self, RedditError> {
        let http = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            settings,
            token: Mutex::new(None),
        })
    }

    /// Return a valid bearer token, fetching a fresh one when the cached
    /// token is absent or within a minute of expiry.
    async fn bearer_token(&self) -> Result<String, RedditError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() + Duration::from_secs(60) {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Requesting new OAuth token");
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(
                &self.settings.client_id,
                Some(self.settings.client_secret.expose_secret()),
            )
            .form(&[
                ("grant_type", "password"),
                ("username", self.settings.username.as_str()),
                ("password", self.settings.password.expose_secret()),
            ])
            .send()
            .await
            .map_err(classify_transport)?;

        if response.status() == StatusCode::UNAUTHORIZED
            || response.status() == StatusCode::FORBIDDEN
        {
            return Err(RedditError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(RedditError::Server {
                status: response.status().as_u16(),
            });
        }

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| RedditError::UnexpectedResponse {
                    details: format!("token response: {e}"),
                })?;

        let access_token = token.access_token.clone();
        *guard = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(access_token)
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: Option<&[(&str, &str)]>,
        form: Option<&[(&str, &str)]>,
        body: Option<serde_json::Value>,
    ) -> Result<Response, RedditError> {
        let token = self.bearer_token().await?;
        let url = format!("{OAUTH_BASE}{endpoint}");

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&token)
            .query(&[("raw_json", "1")]);
        if let Some(query) = query {
            builder = builder.query(query);
        }
        if let Some(form) = form {
            builder = builder.form(form);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        debug!(%method, endpoint, "Reddit API request");
        let response = builder.send().await.map_err(classify_transport)?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            warn!(endpoint, retry_after, "Rate limited by the platform");
            return Err(RedditError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(RedditError::Unauthorized);
        }
        if status == StatusCode::FORBIDDEN {
            return Err(RedditError::Forbidden {
                resource: endpoint.to_string(),
            });
        }
        if status.is_server_error() {
            return Err(RedditError::Server {
                status: status.as_u16(),
            });
        }
        Err(RedditError::UnexpectedResponse {
            details: format!("HTTP {status} for {endpoint}"),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: Option<&[(&str, &str)]>,
    ) -> Result<T, RedditError> {
        let response = self.request(Method::GET, endpoint, query, None, None).await?;
        response
            .json()
            .await
            .map_err(|e| RedditError::UnexpectedResponse {
                details: format!("{endpoint}: {e}"),
            })
    }

    /// POST an `api_type=json` form endpoint and surface any JSON-level
    /// errors (RATELIMIT, TOO_LONG, ...) as [`RedditError::Api`].
    async fn post_api_json(
        &self,
        endpoint: &str,
        form: &[(&str, &str)],
    ) -> Result<JsonInner, RedditError> {
        let mut form = form.to_vec();
        form.push(("api_type", "json"));
        let response = self
            .request(Method::POST, endpoint, None, Some(&form), None)
            .await?;
        let envelope: JsonEnvelope =
            response
                .json()
                .await
                .map_err(|e| RedditError::UnexpectedResponse {
                    details: format!("{endpoint}: {e}"),
                })?;
        if let Some(error) = envelope.json.errors.first() {
            let error_type = error
                .first()
                .and_then(|v| v.as_str())
                .unwrap_or("UNKNOWN")
                .to_string();
            let message = error
                .get(1)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            return Err(RedditError::Api {
                error_type,
                message,
            });
        }
        Ok(envelope.json)
    }

    /// Simple form POST where the response body is uninteresting.
    async fn post_form(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<(), RedditError> {
        self.request(Method::POST, endpoint, None, Some(form), None)
            .await?;
        Ok(())
    }
}

fn classify_transport(e: reqwest::Error) -> RedditError {
    if e.is_timeout() {
        RedditError::Timeout
    } else {
        RedditError::Network(e)
    }
}

#[async_trait]
impl RedditApi for RedditClient {
    async fn wiki_page(&self, subreddit: &str, page: &str) -> Result<WikiPage, RedditError> {
        let value: serde_json::Value = self
            .get_json(&format!("/r/{subreddit}/wiki/{page}"), None)
            .await?;
        let data = &value["data"];
        let content = data["content_md"]
            .as_str()
            .ok_or_else(|| RedditError::UnexpectedResponse {
                details: format!("wiki page {page} has no content_md"),
            })?
            .to_string();
        let revised_by = data["revision_by"]["data"]["name"]
            .as_str()
            .map(str::to_string);
        Ok(WikiPage {
            content,
            revised_by,
        })
    }

    async fn modlog(
        &self,
        subreddit: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ModLogEntry>, RedditError> {
        let limit = limit.to_string();
        let mut query = vec![("limit", limit.as_str())];
        if let Some(before) = before {
            query.push(("before", before));
        }
        let listing: Listing<ModLogEntry> = self
            .get_json(&format!("/r/{subreddit}/about/log"), Some(&query))
            .await?;
        Ok(listing.data.children.into_iter().map(|c| c.data).collect())
    }

    async fn new_posts(
        &self,
        subreddit: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Post>, RedditError> {
        let limit = limit.to_string();
        let mut query = vec![("limit", limit.as_str())];
        if let Some(before) = before {
            query.push(("before", before));
        }
        let listing: Listing<Post> = self
            .get_json(&format!("/r/{subreddit}/new"), Some(&query))
            .await?;
        Ok(listing.data.children.into_iter().map(|c| c.data).collect())
    }

    async fn unread_messages(&self, limit: u32) -> Result<Vec<InboxMessage>, RedditError> {
        let limit = limit.to_string();
        let listing: Listing<InboxMessage> = self
            .get_json("/message/unread", Some(&[("limit", limit.as_str())]))
            .await?;
        Ok(listing.data.children.into_iter().map(|c| c.data).collect())
    }

    async fn submission(&self, id: &str) -> Result<Post, RedditError> {
        let fullname = format!("t3_{id}");
        let listing: Listing<Post> = self
            .get_json("/api/info", Some(&[("id", fullname.as_str())]))
            .await?;
        listing
            .data
            .children
            .into_iter()
            .next()
            .map(|c| c.data)
            .ok_or_else(|| RedditError::UnexpectedResponse {
                details: format!("submission {id} not found"),
            })
    }

    async fn item_info(
        &self,
        fullname: &str,
    ) -> Result<(Option<String>, String), RedditError> {
        let listing: Listing<serde_json::Value> = self
            .get_json("/api/info", Some(&[("id", fullname)]))
            .await?;
        let item = listing
            .data
            .children
            .into_iter()
            .next()
            .map(|c| c.data)
            .ok_or_else(|| RedditError::UnexpectedResponse {
                details: format!("item {fullname} not found"),
            })?;
        let author = item["author"].as_str().map(str::to_string);
        let permalink = item["permalink"].as_str().unwrap_or_default().to_string();
        Ok((author, permalink))
    }

    async fn moderators(&self, subreddit: &str) -> Result<Vec<String>, RedditError> {
        #[derive(Deserialize)]
        struct Moderator {
            name: String,
        }
        let listing: Listing<Moderator> = self
            .get_json(&format!("/r/{subreddit}/about/moderators"), None)
            .await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|c| c.data.name)
            .collect())
    }

    async fn reply(&self, parent_fullname: &str, body: &str) -> Result<CommentRef, RedditError> {
        let inner = self
            .post_api_json(
                "/api/comment",
                &[("thing_id", parent_fullname), ("text", body)],
            )
            .await?;
        let thing = inner
            .data
            .as_ref()
            .and_then(|d| d["things"].as_array())
            .and_then(|t| t.first())
            .map(|t| t["data"].clone())
            .ok_or_else(|| RedditError::UnexpectedResponse {
                details: "comment response carried no created thing".to_string(),
            })?;
        serde_json::from_value(thing).map_err(|e| RedditError::UnexpectedResponse {
            details: format!("comment response: {e}"),
        })
    }

    async fn distinguish(&self, comment_fullname: &str, sticky: bool) -> Result<(), RedditError> {
        self.post_api_json(
            "/api/distinguish",
            &[
                ("id", comment_fullname),
                ("how", "yes"),
                ("sticky", if sticky { "true" } else { "false" }),
            ],
        )
        .await?;
        Ok(())
    }

    async fn approve(&self, fullname: &str) -> Result<(), RedditError> {
        self.post_form("/api/approve", &[("id", fullname)]).await
    }

    async fn lock(&self, fullname: &str) -> Result<(), RedditError> {
        self.post_form("/api/lock", &[("id", fullname)]).await
    }

    async fn remove(&self, fullname: &str, reason_id: Option<&str>) -> Result<(), RedditError> {
        self.post_form("/api/remove", &[("id", fullname), ("spam", "false")])
            .await?;
        if let Some(reason_id) = reason_id {
            self.request(
                Method::POST,
                "/api/v1/modactions/removal_reasons",
                None,
                None,
                Some(json!({ "item_ids": [fullname], "reason_id": reason_id })),
            )
            .await?;
        }
        Ok(())
    }

    async fn send_removal_message(
        &self,
        fullname: &str,
        title: &str,
        message: &str,
    ) -> Result<(), RedditError> {
        self.request(
            Method::POST,
            "/api/v1/modactions/removal_link_message",
            None,
            None,
            Some(json!({
                "item_id": [fullname],
                "title": title,
                "message": message,
                "type": "private",
            })),
        )
        .await?;
        Ok(())
    }

    async fn ban_user(
        &self,
        subreddit: &str,
        user: &str,
        reason: &str,
        message: &str,
    ) -> Result<(), RedditError> {
        self.post_api_json(
            &format!("/r/{subreddit}/api/friend"),
            &[
                ("name", user),
                ("type", "banned"),
                ("ban_reason", reason),
                ("ban_message", message),
            ],
        )
        .await?;
        Ok(())
    }

    async fn send_private_message(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), RedditError> {
        self.post_api_json(
            "/api/compose",
            &[("to", recipient), ("subject", subject), ("text", body)],
        )
        .await?;
        Ok(())
    }

    async fn mark_read(&self, message_fullname: &str) -> Result<(), RedditError> {
        self.post_form("/api/read_message", &[("id", message_fullname)])
            .await
    }

    async fn flair_templates(&self, subreddit: &str) -> Result<Vec<FlairTemplate>, RedditError> {
        self.get_json(&format!("/r/{subreddit}/api/link_flair_v2"), None)
            .await
    }

    async fn create_flair_template(
        &self,
        subreddit: &str,
        text: &str,
        settings: &PostFlairTemplate,
    ) -> Result<(), RedditError> {
        self.post_api_json(
            &format!("/r/{subreddit}/api/flairtemplate_v2"),
            &[
                ("flair_type", "LINK_FLAIR"),
                ("text", text),
                ("css_class", &settings.css_class),
                ("background_color", &settings.background_color),
                ("text_color", &settings.text_color),
                ("mod_only", if settings.mod_only { "true" } else { "false" }),
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_flair_template(
        &self,
        subreddit: &str,
        template_id: &str,
        text: &str,
        settings: &PostFlairTemplate,
    ) -> Result<(), RedditError> {
        self.post_api_json(
            &format!("/r/{subreddit}/api/flairtemplate_v2"),
            &[
                ("flair_template_id", template_id),
                ("flair_type", "LINK_FLAIR"),
                ("text", text),
                ("css_class", &settings.css_class),
                ("background_color", &settings.background_color),
                ("text_color", &settings.text_color),
                ("mod_only", if settings.mod_only { "true" } else { "false" }),
            ],
        )
        .await?;
        Ok(())
    }

    async fn removal_reasons(
        &self,
        subreddit: &str,
    ) -> Result<Vec<RemovalReasonEntry>, RedditError> {
        #[derive(Deserialize)]
        struct ReasonsResponse {
            data: std::collections::HashMap<String, RemovalReasonEntry>,
            #[serde(default)]
            order: Vec<String>,
        }
        let mut response: ReasonsResponse = self
            .get_json(&format!("/api/v1/{subreddit}/removal_reasons.json"), None)
            .await?;
        let mut reasons = Vec::with_capacity(response.order.len());
        for id in &response.order {
            if let Some(reason) = response.data.remove(id) {
                reasons.push(reason);
            }
        }
        // Entries the order list missed still count.
        reasons.extend(response.data.into_values());
        Ok(reasons)
    }

    async fn create_removal_reason(
        &self,
        subreddit: &str,
        title: &str,
        message: &str,
    ) -> Result<(), RedditError> {
        self.request(
            Method::POST,
            &format!("/api/v1/{subreddit}/removal_reasons"),
            None,
            None,
            Some(json!({ "title": title, "message": message })),
        )
        .await?;
        Ok(())
    }

    async fn update_removal_reason(
        &self,
        subreddit: &str,
        reason_id: &str,
        title: &str,
        message: &str,
    ) -> Result<(), RedditError> {
        self.request(
            Method::PUT,
            &format!("/api/v1/{subreddit}/removal_reasons/{reason_id}"),
            None,
            None,
            Some(json!({ "title": title, "message": message })),
        )
        .await?;
        Ok(())
    }
}
