//! Publishing trade missions to a forum.
//!
//! `PublishGateway` is what the workflow talks to. `ForumPublisher` holds
//! the channel/tag selection rules and delegates the remote calls to a
//! `ForumApi` implementation (Reddit in production).

pub mod reddit;

pub use reddit::{RedditClient, RedditConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PublishConfig;
use crate::error::PublishError;
use crate::mission::model::MissionType;

/// Reference to a published post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    /// Forum-wide identifier (Reddit fullname, e.g. `t3_abc123`).
    pub id: String,
    /// Public URL of the post.
    pub url: String,
    /// Title the post was published under.
    pub title: String,
}

/// Remote forum operations.
#[async_trait]
pub trait ForumApi: Send + Sync {
    /// Submit a text post to `channel`, categorized with `tag`.
    async fn submit(
        &self,
        channel: &str,
        title: &str,
        body: &str,
        tag: &str,
    ) -> Result<PostRef, PublishError>;

    /// Replicate an existing post into `channel`, categorized with `tag`.
    async fn crosspost(
        &self,
        post: &PostRef,
        channel: &str,
        tag: &str,
    ) -> Result<PostRef, PublishError>;
}

/// Outbound publishing as seen by the workflow.
#[async_trait]
pub trait PublishGateway: Send + Sync {
    /// Post to the primary channel with the tag for `mission_type`.
    async fn create_post(
        &self,
        title: &str,
        body: &str,
        mission_type: MissionType,
    ) -> Result<PostRef, PublishError>;

    /// Crosspost to every configured secondary channel.
    ///
    /// Channels and tags are paired by position and the shorter list wins.
    /// A failed crosspost yields `None` in its slot; the rest still run.
    /// Returns an empty list when no secondary channels are configured.
    async fn crosspost(&self, post: &PostRef, mission_type: MissionType) -> Vec<Option<PostRef>>;
}

/// `PublishGateway` over any `ForumApi`, driven by `PublishConfig`.
pub struct ForumPublisher<A> {
    api: A,
    config: PublishConfig,
}

impl<A: ForumApi> ForumPublisher<A> {
    pub fn new(api: A, config: PublishConfig) -> Self {
        Self { api, config }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Primary-channel tag: the sell tag for unloading, the buy tag otherwise.
    fn primary_tag(&self, mission_type: MissionType) -> &str {
        match mission_type {
            MissionType::Unloading => &self.config.tag_sell,
            MissionType::Loading => &self.config.tag_buy,
        }
    }

    fn secondary_tags(&self, mission_type: MissionType) -> &[String] {
        match mission_type {
            MissionType::Unloading => &self.config.secondary_tags_sell,
            MissionType::Loading => &self.config.secondary_tags_buy,
        }
    }
}

#[async_trait]
impl<A: ForumApi> PublishGateway for ForumPublisher<A> {
    async fn create_post(
        &self,
        title: &str,
        body: &str,
        mission_type: MissionType,
    ) -> Result<PostRef, PublishError> {
        let channel = &self.config.primary_channel;
        let tag = self.primary_tag(mission_type);
        let post = self.api.submit(channel, title, body, tag).await?;
        tracing::info!(channel = %channel, post_id = %post.id, url = %post.url, "Trade mission published");
        Ok(post)
    }

    async fn crosspost(&self, post: &PostRef, mission_type: MissionType) -> Vec<Option<PostRef>> {
        let channels = &self.config.secondary_channels;
        if channels.is_empty() {
            return Vec::new();
        }

        let mut results = Vec::new();
        for (channel, tag) in channels.iter().zip(self.secondary_tags(mission_type)) {
            match self.api.crosspost(post, channel, tag).await {
                Ok(crossposted) => {
                    tracing::info!(channel = %channel, post_id = %crossposted.id, "Crossposted");
                    results.push(Some(crossposted));
                }
                Err(e) => {
                    tracing::warn!(channel = %channel, error = %e, "Crosspost failed");
                    results.push(None);
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records every call; crossposts to channels listed in `failing` fail.
    #[derive(Default)]
    struct StubForum {
        calls: Mutex<Vec<(String, String, String)>>,
        failing: Vec<String>,
        fail_submit: bool,
    }

    #[async_trait]
    impl ForumApi for StubForum {
        async fn submit(
            &self,
            channel: &str,
            title: &str,
            _body: &str,
            tag: &str,
        ) -> Result<PostRef, PublishError> {
            self.calls
                .lock()
                .unwrap()
                .push(("submit".into(), channel.into(), tag.into()));
            if self.fail_submit {
                return Err(PublishError::RequestFailed {
                    channel: channel.into(),
                    reason: "boom".into(),
                });
            }
            Ok(PostRef {
                id: "t3_main".into(),
                url: format!("https://forum.test/r/{channel}/main"),
                title: title.into(),
            })
        }

        async fn crosspost(
            &self,
            post: &PostRef,
            channel: &str,
            tag: &str,
        ) -> Result<PostRef, PublishError> {
            self.calls
                .lock()
                .unwrap()
                .push(("crosspost".into(), channel.into(), tag.into()));
            if self.failing.iter().any(|c| c == channel) {
                return Err(PublishError::Rejected {
                    channel: channel.into(),
                    reason: "crossposts disabled".into(),
                });
            }
            Ok(PostRef {
                id: format!("t3_{channel}"),
                url: format!("https://forum.test/r/{channel}/x"),
                title: post.title.clone(),
            })
        }
    }

    fn config(secondary: &[&str], sell: &[&str], buy: &[&str]) -> PublishConfig {
        let list = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        PublishConfig {
            primary_channel: "FleetCarrierTrade".into(),
            tag_sell: "flair-sell".into(),
            tag_buy: "flair-buy".into(),
            secondary_channels: list(secondary),
            secondary_tags_sell: list(sell),
            secondary_tags_buy: list(buy),
        }
    }

    fn main_post() -> PostRef {
        PostRef {
            id: "t3_main".into(),
            url: "https://forum.test/main".into(),
            title: "LOADING | XYZ-123".into(),
        }
    }

    #[tokio::test]
    async fn create_post_uses_sell_tag_for_unloading() {
        let publisher = ForumPublisher::new(StubForum::default(), config(&[], &[], &[]));
        publisher
            .create_post("t", "b", MissionType::Unloading)
            .await
            .unwrap();
        publisher
            .create_post("t", "b", MissionType::Loading)
            .await
            .unwrap();

        let calls = publisher.api().calls.lock().unwrap().clone();
        assert_eq!(calls[0].1, "FleetCarrierTrade");
        assert_eq!(calls[0].2, "flair-sell");
        assert_eq!(calls[1].2, "flair-buy");
    }

    #[tokio::test]
    async fn create_post_propagates_failure() {
        let api = StubForum {
            fail_submit: true,
            ..Default::default()
        };
        let publisher = ForumPublisher::new(api, config(&[], &[], &[]));
        let result = publisher.create_post("t", "b", MissionType::Loading).await;
        assert!(matches!(result, Err(PublishError::RequestFailed { .. })));
    }

    #[tokio::test]
    async fn crosspost_without_secondary_channels_is_empty() {
        let publisher = ForumPublisher::new(StubForum::default(), config(&[], &["a"], &["b"]));
        let results = publisher.crosspost(&main_post(), MissionType::Loading).await;
        assert!(results.is_empty());
        assert!(publisher.api().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn crosspost_partial_failure_yields_none() {
        let api = StubForum {
            failing: vec!["EliteTraders".into()],
            ..Default::default()
        };
        let publisher = ForumPublisher::new(
            api,
            config(
                &["EliteCarriers", "EliteTraders"],
                &["s1", "s2"],
                &["b1", "b2"],
            ),
        );

        let results = publisher.crosspost(&main_post(), MissionType::Loading).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().id, "t3_EliteCarriers");
        assert!(results[1].is_none());
    }

    #[tokio::test]
    async fn crosspost_pairs_tags_by_position_and_mission_type() {
        let publisher = ForumPublisher::new(
            StubForum::default(),
            config(&["one", "two"], &["s1", "s2"], &["b1", "b2"]),
        );
        publisher.crosspost(&main_post(), MissionType::Unloading).await;

        let calls = publisher.api().calls.lock().unwrap().clone();
        assert_eq!(calls[0], ("crosspost".into(), "one".into(), "s1".into()));
        assert_eq!(calls[1], ("crosspost".into(), "two".into(), "s2".into()));
    }

    #[tokio::test]
    async fn crosspost_bounded_by_shorter_list() {
        let publisher = ForumPublisher::new(
            StubForum::default(),
            config(&["one", "two", "three"], &["s1"], &["b1", "b2"]),
        );

        let sell = publisher.crosspost(&main_post(), MissionType::Unloading).await;
        assert_eq!(sell.len(), 1);

        let buy = publisher.crosspost(&main_post(), MissionType::Loading).await;
        assert_eq!(buy.len(), 2);
    }
}
