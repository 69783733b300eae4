//! Integration tests for the Reddit publishing path.
//!
//! Each test spins up an Axum server on a random port that speaks the parts
//! of the Reddit API the bot uses, and points a real `RedditClient` at it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use axum::{Form, Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use trade_mission::config::PublishConfig;
use trade_mission::error::PublishError;
use trade_mission::mission::{Action, MissionType, Render, SessionContext, TradeWorkflow};
use trade_mission::publish::{ForumPublisher, PublishGateway, RedditClient, RedditConfig};
use trade_mission::store::{LibSqlBackend, MissionStore};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const FAKE_TOKEN: &str = "fake-token";

/// Subreddit that rejects every submission with an API error.
const CLOSED_SR: &str = "NoCrossposts";

#[derive(Default)]
struct FakeReddit {
    token_requests: AtomicUsize,
    submissions: Mutex<Vec<HashMap<String, String>>>,
}

async fn access_token(
    State(reddit): State<Arc<FakeReddit>>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    reddit.token_requests.fetch_add(1, Ordering::SeqCst);
    let valid = form.get("grant_type").map(String::as_str) == Some("password")
        && form.get("password").map(String::as_str) == Some("hunter2");
    if valid {
        Json(json!({
            "access_token": FAKE_TOKEN,
            "token_type": "bearer",
            "expires_in": 86400,
            "scope": "*"
        }))
    } else {
        Json(json!({ "error": "invalid_grant" }))
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {FAKE_TOKEN}").as_str())
}

async fn submit(
    State(reddit): State<Arc<FakeReddit>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let sr = form.get("sr").cloned().unwrap_or_default();
    if sr == CLOSED_SR {
        return Ok(Json(json!({
            "json": {
                "errors": [["NO_CROSSPOSTS", "this community doesn't allow crossposts", "sr"]]
            }
        })));
    }

    let n = {
        let mut submissions = reddit.submissions.lock().unwrap();
        submissions.push(form);
        submissions.len()
    };
    Ok(Json(json!({
        "json": {
            "errors": [],
            "data": {
                "id": format!("{n}"),
                "name": format!("t3_{n}"),
                "url": format!("https://www.reddit.com/r/{sr}/comments/{n}/"),
                "drafts_count": 0
            }
        }
    })))
}

async fn flair_selector(
    headers: HeaderMap,
    Path(sr): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    // Without is_newlink the selector describes the user's own flair
    if form.get("is_newlink").map(String::as_str) != Some("true") {
        return Err(StatusCode::BAD_REQUEST);
    }
    if sr != "FleetCarrierTrade" {
        return Ok(Json(json!({ "current": {} })));
    }
    Ok(Json(json!({
        "current": { "flair_template_id": null, "flair_text": null },
        "choices": [
            { "flair_template_id": "flair-buy-id", "flair_text": "Buying", "flair_text_editable": false },
            { "flair_template_id": "flair-sell-id", "flair_text": "Selling", "flair_text_editable": false }
        ]
    })))
}

/// Start an Axum server on a random port, return (port, state).
async fn start_server() -> (u16, Arc<FakeReddit>) {
    let reddit = Arc::new(FakeReddit::default());
    let app = Router::new()
        .route("/api/v1/access_token", post(access_token))
        .route("/api/submit", post(submit))
        .route("/r/{sr}/api/flairselector", post(flair_selector))
        .with_state(Arc::clone(&reddit));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, reddit)
}

fn reddit_config(port: u16, password: &str) -> RedditConfig {
    let env: HashMap<&str, String> = HashMap::from([
        ("REDDIT_CLIENT_ID", "client-id".to_string()),
        ("REDDIT_CLIENT_SECRET", "client-secret".to_string()),
        ("REDDIT_USERNAME", "carrier_bot".to_string()),
        ("REDDIT_PASSWORD", password.to_string()),
        (
            "REDDIT_AUTH_URL",
            format!("http://127.0.0.1:{port}/api/v1/access_token"),
        ),
        ("REDDIT_API_BASE", format!("http://127.0.0.1:{port}")),
    ]);
    RedditConfig::from_lookup(|key| env.get(key).cloned())
        .unwrap()
        .unwrap()
}

fn publish_config(secondary: &[&str]) -> PublishConfig {
    let list = |prefix: &str| {
        secondary
            .iter()
            .map(|sr| format!("{prefix}-{sr}"))
            .collect::<Vec<_>>()
    };
    PublishConfig {
        primary_channel: "FleetCarrierTrade".into(),
        tag_sell: "flair-sell-id".into(),
        tag_buy: "flair-buy-id".into(),
        secondary_channels: secondary.iter().map(|s| s.to_string()).collect(),
        secondary_tags_sell: list("sell"),
        secondary_tags_buy: list("buy"),
    }
}

fn publisher(port: u16, secondary: &[&str]) -> ForumPublisher<RedditClient> {
    ForumPublisher::new(
        RedditClient::new(reddit_config(port, "hunter2")),
        publish_config(secondary),
    )
}

#[tokio::test]
async fn loading_mission_posts_with_buy_flair() {
    timeout(TEST_TIMEOUT, async {
        let (port, reddit) = start_server().await;
        let publisher = publisher(port, &[]);

        let post = publisher
            .create_post("Loading Gold", "body text", MissionType::Loading)
            .await
            .unwrap();
        assert_eq!(post.id, "t3_1");
        assert_eq!(post.title, "Loading Gold");
        assert!(post.url.contains("/r/FleetCarrierTrade/"));

        let submissions = reddit.submissions.lock().unwrap().clone();
        assert_eq!(submissions.len(), 1);
        let form = &submissions[0];
        assert_eq!(form["kind"], "self");
        assert_eq!(form["sr"], "FleetCarrierTrade");
        assert_eq!(form["flair_id"], "flair-buy-id");
        assert_eq!(form["text"], "body text");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn crosspost_failures_leave_empty_slots() {
    timeout(TEST_TIMEOUT, async {
        let (port, reddit) = start_server().await;
        let publisher = publisher(port, &["EliteTraders", CLOSED_SR]);

        let post = publisher
            .create_post("Unloading Gold", "body", MissionType::Unloading)
            .await
            .unwrap();
        let crossposts = publisher.crosspost(&post, MissionType::Unloading).await;

        assert_eq!(crossposts.len(), 2);
        let first = crossposts[0].as_ref().unwrap();
        assert!(first.url.contains("/r/EliteTraders/"));
        assert!(crossposts[1].is_none());

        let submissions = reddit.submissions.lock().unwrap().clone();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0]["flair_id"], "flair-sell-id");
        let crosspost = &submissions[1];
        assert_eq!(crosspost["kind"], "crosspost");
        assert_eq!(crosspost["crosspost_fullname"], post.id);
        assert_eq!(crosspost["flair_id"], "sell-EliteTraders");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn access_token_is_cached() {
    timeout(TEST_TIMEOUT, async {
        let (port, reddit) = start_server().await;
        let publisher = publisher(port, &["EliteTraders"]);

        let post = publisher
            .create_post("t", "b", MissionType::Loading)
            .await
            .unwrap();
        publisher.crosspost(&post, MissionType::Loading).await;
        publisher.api().list_link_flairs("FleetCarrierTrade").await.unwrap();

        assert_eq!(reddit.token_requests.load(Ordering::SeqCst), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn bad_password_is_an_auth_error() {
    timeout(TEST_TIMEOUT, async {
        let (port, reddit) = start_server().await;
        let publisher = ForumPublisher::new(
            RedditClient::new(reddit_config(port, "wrong")),
            publish_config(&[]),
        );

        let err = publisher
            .create_post("t", "b", MissionType::Loading)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Auth(ref reason) if reason == "invalid_grant"));
        assert!(reddit.submissions.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn link_flairs_are_keyed_by_text() {
    timeout(TEST_TIMEOUT, async {
        let (port, _reddit) = start_server().await;
        let client = RedditClient::new(reddit_config(port, "hunter2"));

        let flairs = client.list_link_flairs("FleetCarrierTrade").await.unwrap();
        assert_eq!(flairs.len(), 2);
        assert_eq!(flairs["Buying"], "flair-buy-id");
        assert_eq!(flairs["Selling"], "flair-sell-id");

        let none = client.list_link_flairs("Empty").await.unwrap();
        assert!(none.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn workflow_publishes_through_reddit() {
    timeout(TEST_TIMEOUT, async {
        let (port, reddit) = start_server().await;
        let store: Arc<dyn MissionStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let gateway: Arc<dyn PublishGateway> = Arc::new(publisher(port, &["EliteTraders"]));
        let mut wf = TradeWorkflow::new(Arc::clone(&store), Some(gateway));

        let ctx = SessionContext::new("555:1187", "cmdr_jameson");
        for action in [
            Action::SelectMissionType(MissionType::Loading),
            Action::SetLocation {
                system: "wally bei".into(),
                station: "malerba".into(),
                pad_size: "l".into(),
            },
            Action::SetTradeData {
                commodity: "gold".into(),
                carrier: "XYZ-123".into(),
                profit: "12k".into(),
                quantity: "21k".into(),
            },
            Action::Submit,
        ] {
            wf.apply(&ctx, action).await.unwrap();
        }

        let render = wf.apply(&ctx, Action::ConfirmPublish).await.unwrap();
        let Render::Published {
            post, crossposts, ..
        } = render
        else {
            panic!("expected published view");
        };
        assert_eq!(post.id, "t3_1");
        assert_eq!(crossposts.len(), 1);
        assert!(crossposts[0].is_some());

        let submissions = reddit.submissions.lock().unwrap().clone();
        assert_eq!(submissions[0]["title"], wf.formatted().unwrap().title);
        assert_eq!(submissions[0]["flair_id"], "flair-buy-id");
        assert!(store.get_mission("555:1187").await.unwrap().is_some());
    })
    .await
    .expect("test timed out");
}
