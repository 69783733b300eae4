use std::sync::Arc;

use anyhow::Context;

use trade_mission::bot::FormBot;
use trade_mission::channels::{Channel, CliChannel, TelegramChannel};
use trade_mission::config::{BotConfig, PublishConfig, TelegramConfig};
use trade_mission::mission::SessionRegistry;
use trade_mission::publish::{ForumPublisher, PublishGateway, RedditClient, RedditConfig};
use trade_mission::store::{LibSqlBackend, MissionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("flairs") => return list_flairs(args.get(1).map(String::as_str)).await,
        Some("help" | "--help" | "-h") => {
            eprintln!("Usage: trade-mission [flairs <subreddit>]");
            return Ok(());
        }
        Some(other) => anyhow::bail!("Unknown subcommand: {other}"),
        None => {}
    }

    eprintln!("🚀 Trade Mission v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────────────────
    let bot_config = BotConfig::from_env()?;
    let store: Arc<dyn MissionStore> = Arc::new(
        LibSqlBackend::new_local(&bot_config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    bot_config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", bot_config.db_path.display());

    // ── Publishing ───────────────────────────────────────────────────────
    let gateway = build_gateway()?;
    let registry = Arc::new(SessionRegistry::new(store, gateway));

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match TelegramConfig::from_env() {
        Some(telegram) => {
            eprintln!(
                "   Telegram: enabled (allowed: {})",
                telegram.allowed_display()
            );
            let channel = TelegramChannel::new(telegram.bot_token, telegram.allowed_users);
            channel
                .health_check()
                .await
                .context("Telegram bot token rejected")?;
            Arc::new(channel)
        }
        None => {
            eprintln!("   Channel: cli (type 'help' for commands)\n");
            Arc::new(CliChannel::new())
        }
    };

    FormBot::new(channel, registry)
        .with_session_idle_timeout(bot_config.session_idle_timeout)
        .run()
        .await?;

    Ok(())
}

/// Publishing needs both Reddit credentials and a target subreddit.
fn build_gateway() -> anyhow::Result<Option<Arc<dyn PublishGateway>>> {
    let reddit = RedditConfig::from_env()?;
    let publish = PublishConfig::from_env()?;

    match (reddit, publish) {
        (Some(reddit), Some(publish)) => {
            eprintln!(
                "   Reddit: r/{} as u/{} ({} crosspost targets)",
                publish.primary_channel,
                reddit.username,
                publish.secondary_channels.len()
            );
            let gateway: Arc<dyn PublishGateway> =
                Arc::new(ForumPublisher::new(RedditClient::new(reddit), publish));
            Ok(Some(gateway))
        }
        (Some(_), None) => {
            tracing::warn!("Reddit credentials set but REDDIT_MAIN_SR is not; publishing disabled");
            eprintln!("   Reddit: disabled (save only)");
            Ok(None)
        }
        (None, Some(_)) => {
            tracing::warn!("REDDIT_MAIN_SR set but REDDIT_CLIENT_ID is not; publishing disabled");
            eprintln!("   Reddit: disabled (save only)");
            Ok(None)
        }
        (None, None) => {
            eprintln!("   Reddit: disabled (save only)");
            Ok(None)
        }
    }
}

/// `trade-mission flairs <subreddit>`: print link flair ids for configuration.
async fn list_flairs(subreddit: Option<&str>) -> anyhow::Result<()> {
    let subreddit = subreddit.context("Usage: trade-mission flairs <subreddit>")?;
    let config = RedditConfig::from_env()?
        .context("REDDIT_CLIENT_ID must be set to look up flairs")?;

    let client = RedditClient::new(config);
    let flairs = client
        .list_link_flairs(subreddit)
        .await
        .with_context(|| format!("Failed to list flairs for r/{subreddit}"))?;

    if flairs.is_empty() {
        eprintln!("r/{subreddit} has no link flairs");
    }
    for (text, id) in &flairs {
        println!("{id}\t{text}");
    }
    Ok(())
}
