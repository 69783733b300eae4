//! Reddit client — OAuth2 script-app auth, text posts, crossposts, and
//! link flair discovery.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{ForumApi, PostRef};
use crate::error::{ConfigError, PublishError};

const DEFAULT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
const DEFAULT_API_BASE: &str = "https://oauth.reddit.com";

/// Tokens are refreshed this long before Reddit says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Credentials and endpoints for a Reddit script app.
#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub username: String,
    pub password: SecretString,
    pub user_agent: String,
    /// Token endpoint.
    pub auth_url: String,
    /// Base URL for authenticated API calls.
    pub api_base: String,
}

impl RedditConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` if `REDDIT_CLIENT_ID` is not set (publishing disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let Some(client_id) = lookup("REDDIT_CLIENT_ID").filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let required = |key: &str| {
            lookup(key)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let username = required("REDDIT_USERNAME")?;
        let user_agent = lookup("REDDIT_USER_AGENT").unwrap_or_else(|| {
            format!(
                "trade-mission/{} (by u/{username})",
                env!("CARGO_PKG_VERSION")
            )
        });

        Ok(Some(Self {
            client_id,
            client_secret: SecretString::from(required("REDDIT_CLIENT_SECRET")?),
            password: SecretString::from(required("REDDIT_PASSWORD")?),
            username,
            user_agent,
            auth_url: lookup("REDDIT_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            api_base: lookup("REDDIT_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }))
    }
}

struct CachedToken {
    access_token: SecretString,
    expires_at: Instant,
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitEnvelope {
    json: SubmitJson,
}

#[derive(Debug, Deserialize)]
struct SubmitJson {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
    data: Option<SubmitData>,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    name: String,
    url: String,
}

/// `POST /r/{sr}/api/flairselector` with `is_newlink=true`.
#[derive(Debug, Deserialize)]
struct FlairSelector {
    #[serde(default)]
    choices: Vec<FlairChoice>,
}

#[derive(Debug, Deserialize)]
struct FlairChoice {
    flair_template_id: String,
    #[serde(default)]
    flair_text: String,
}

// ── Client ──────────────────────────────────────────────────────────

/// Authenticated Reddit API client.
pub struct RedditClient {
    config: RedditConfig,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl RedditClient {
    pub fn new(config: RedditConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base.trim_end_matches('/'))
    }

    /// Return a valid access token, fetching a new one when the cached one
    /// is missing or about to expire.
    async fn access_token(&self) -> Result<String, PublishError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.expires_at
        {
            return Ok(token.access_token.expose_secret().to_string());
        }

        tracing::debug!(auth_url = %self.config.auth_url, "Requesting Reddit access token");
        let params = [
            ("grant_type", "password"),
            ("username", self.config.username.as_str()),
            ("password", self.config.password.expose_secret()),
        ];
        let resp = self
            .client
            .post(&self.config.auth_url)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .form(&params)
            .send()
            .await
            .map_err(|e| PublishError::Auth(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PublishError::Auth(format!(
                "token endpoint returned {}",
                resp.status()
            )));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(format!("token response: {e}")))?;

        let access_token = match (body.access_token, body.error) {
            (Some(token), None) => token,
            (_, Some(error)) => return Err(PublishError::Auth(error)),
            (None, None) => {
                return Err(PublishError::InvalidResponse(
                    "token response has no access_token".into(),
                ));
            }
        };

        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
        *cached = Some(CachedToken {
            access_token: SecretString::from(access_token.clone()),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        tracing::info!(expires_in_secs = lifetime.as_secs(), "Reddit access token acquired");
        Ok(access_token)
    }

    /// POST `/api/submit` and turn the envelope into a `PostRef`.
    async fn post_submit(
        &self,
        channel: &str,
        title: &str,
        form: &[(&str, &str)],
    ) -> Result<PostRef, PublishError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .post(self.api_url("/api/submit"))
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .form(form)
            .send()
            .await
            .map_err(|e| PublishError::RequestFailed {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PublishError::RequestFailed {
                channel: channel.to_string(),
                reason: format!("{status}: {body}"),
            });
        }

        let envelope: SubmitEnvelope = resp
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(format!("submit response: {e}")))?;

        if !envelope.json.errors.is_empty() {
            return Err(PublishError::Rejected {
                channel: channel.to_string(),
                reason: format_api_errors(&envelope.json.errors),
            });
        }

        let data = envelope.json.data.ok_or_else(|| {
            PublishError::InvalidResponse("submit response has no data".into())
        })?;

        Ok(PostRef {
            id: data.name,
            url: data.url,
            title: title.to_string(),
        })
    }

    /// List the link flairs a user may pick when posting to a subreddit,
    /// keyed by text.
    ///
    /// Uses the flair selector rather than `link_flair_v2`, which lists
    /// mod-only templates too and needs mod access on many subreddits.
    pub async fn list_link_flairs(
        &self,
        subreddit: &str,
    ) -> Result<BTreeMap<String, String>, PublishError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .post(self.api_url(&format!("/r/{subreddit}/api/flairselector")))
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .form(&[("is_newlink", "true")])
            .send()
            .await
            .map_err(|e| PublishError::RequestFailed {
                channel: subreddit.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(PublishError::RequestFailed {
                channel: subreddit.to_string(),
                reason: format!("flairselector returned {}", resp.status()),
            });
        }

        let selector: FlairSelector = resp
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(format!("link flairs: {e}")))?;

        Ok(selector
            .choices
            .into_iter()
            .map(|c| (c.flair_text, c.flair_template_id))
            .collect())
    }
}

#[async_trait]
impl ForumApi for RedditClient {
    async fn submit(
        &self,
        channel: &str,
        title: &str,
        body: &str,
        tag: &str,
    ) -> Result<PostRef, PublishError> {
        let form = [
            ("api_type", "json"),
            ("kind", "self"),
            ("sr", channel),
            ("title", title),
            ("text", body),
            ("flair_id", tag),
        ];
        self.post_submit(channel, title, &form).await
    }

    async fn crosspost(
        &self,
        post: &PostRef,
        channel: &str,
        tag: &str,
    ) -> Result<PostRef, PublishError> {
        let form = [
            ("api_type", "json"),
            ("kind", "crosspost"),
            ("sr", channel),
            ("title", post.title.as_str()),
            ("crosspost_fullname", post.id.as_str()),
            ("flair_id", tag),
        ];
        self.post_submit(channel, &post.title, &form).await
    }
}

/// Render Reddit's `[[code, message, field], ...]` error list.
fn format_api_errors(errors: &[Vec<serde_json::Value>]) -> String {
    errors
        .iter()
        .map(|e| {
            e.iter()
                .filter_map(serde_json::Value::as_str)
                .collect::<Vec<_>>()
                .join(": ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn test_config() -> RedditConfig {
        RedditConfig {
            client_id: "id".into(),
            client_secret: SecretString::from("secret"),
            username: "carrier_bot".into(),
            password: SecretString::from("hunter2"),
            user_agent: "test-agent".into(),
            auth_url: "http://127.0.0.1:1/api/v1/access_token".into(),
            api_base: "http://127.0.0.1:1/".into(),
        }
    }

    #[test]
    fn config_disabled_without_client_id() {
        assert!(RedditConfig::from_lookup(lookup_from(&[])).unwrap().is_none());
    }

    #[test]
    fn config_requires_secret_and_password() {
        let err = RedditConfig::from_lookup(lookup_from(&[
            ("REDDIT_CLIENT_ID", "id"),
            ("REDDIT_USERNAME", "bot"),
            ("REDDIT_PASSWORD", "pw"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "REDDIT_CLIENT_SECRET"));
    }

    #[test]
    fn config_defaults_endpoints_and_user_agent() {
        let config = RedditConfig::from_lookup(lookup_from(&[
            ("REDDIT_CLIENT_ID", "id"),
            ("REDDIT_CLIENT_SECRET", "secret"),
            ("REDDIT_USERNAME", "bot"),
            ("REDDIT_PASSWORD", "pw"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(config.auth_url, DEFAULT_AUTH_URL);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert!(config.user_agent.contains("u/bot"));
        assert_eq!(config.password.expose_secret(), "pw");
    }

    #[test]
    fn api_url_joins_without_double_slash() {
        let client = RedditClient::new(test_config());
        assert_eq!(
            client.api_url("/api/submit"),
            "http://127.0.0.1:1/api/submit"
        );
    }

    #[test]
    fn api_errors_are_flattened() {
        let errors = vec![
            vec![
                serde_json::json!("SUBREDDIT_NOTALLOWED"),
                serde_json::json!("you aren't allowed to post there."),
                serde_json::json!("sr"),
            ],
            vec![serde_json::json!("RATELIMIT"), serde_json::Value::Null],
        ];
        assert_eq!(
            format_api_errors(&errors),
            "SUBREDDIT_NOTALLOWED: you aren't allowed to post there.: sr; RATELIMIT"
        );
    }

    #[test]
    fn submit_envelope_parses() {
        let raw = r#"{"json":{"errors":[],"data":{"url":"https://www.reddit.com/r/x/comments/abc/t/","drafts_count":0,"id":"abc","name":"t3_abc"}}}"#;
        let envelope: SubmitEnvelope = serde_json::from_str(raw).unwrap();
        let data = envelope.json.data.unwrap();
        assert_eq!(data.name, "t3_abc");
        assert!(data.url.ends_with("/comments/abc/t/"));
    }

    #[test]
    fn flair_selector_parses_choices() {
        let raw = r#"{"current":{"flair_css_class":null,"flair_template_id":null,"flair_text":null,"flair_position":"right"},"choices":[{"flair_css_class":"","flair_template_id":"b6f1-buy","flair_text_editable":false,"flair_position":"right","flair_text":"Buying"},{"flair_template_id":"s9a2-sell","flair_text":"Selling"}]}"#;
        let selector: FlairSelector = serde_json::from_str(raw).unwrap();
        let flairs: BTreeMap<String, String> = selector
            .choices
            .into_iter()
            .map(|c| (c.flair_text, c.flair_template_id))
            .collect();
        assert_eq!(flairs["Buying"], "b6f1-buy");
        assert_eq!(flairs["Selling"], "s9a2-sell");

        // Subreddits without user flair send no choices
        let selector: FlairSelector = serde_json::from_str(r#"{"current":{}}"#).unwrap();
        assert!(selector.choices.is_empty());
    }

    #[tokio::test]
    async fn submit_fails_without_server() {
        let client = RedditClient::new(test_config());
        let result = client.submit("x", "title", "body", "flair").await;
        assert!(matches!(result, Err(PublishError::Auth(_))));
    }
}
