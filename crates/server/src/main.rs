//! bazaar entry point.
//!
//! ```text
//! bazaar [migrate]              apply pending migrations (default)
//! bazaar audit <post-id>        report counter drift of one post
//! bazaar repair <post-id>       rewrite drifted counters of one post
//! ```
//!
//! Logs go to stderr. Set `BAZAAR_LOG_FORMAT=json` for JSON lines.

use std::sync::Arc;

use anyhow::{Context, bail};
use bazaar_common::{
    CacheBackend, Config, MemoryFeedCache, NoOpFeedCache, ReadThroughCache, RedisFeedCache,
};
use bazaar_core::FeedEngine;
use fred::prelude::*;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

enum Command {
    Migrate,
    Audit { post_id: String, repair: bool },
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        match args.next().as_deref() {
            None | Some("migrate") => Ok(Self::Migrate),
            Some(cmd @ ("audit" | "repair")) => {
                let post_id = args
                    .next()
                    .with_context(|| format!("usage: bazaar {cmd} <post-id>"))?;
                Ok(Self::Audit {
                    post_id,
                    repair: cmd == "repair",
                })
            }
            Some(other) => bail!("unknown command `{other}` (expected migrate, audit or repair)"),
        }
    }
}

fn init_tracing() {
    let json = std::env::var("BAZAAR_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bazaar=info,bazaar_core=info,bazaar_db=info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

async fn build_cache(config: &Config) -> anyhow::Result<ReadThroughCache> {
    let ttl = config.cache.ttl();
    let cache = match config.cache.backend {
        CacheBackend::None => ReadThroughCache::new(Arc::new(NoOpFeedCache), ttl),
        CacheBackend::Memory => ReadThroughCache::new(
            Arc::new(MemoryFeedCache::new(config.cache.memory_capacity)),
            ttl,
        ),
        CacheBackend::Redis => {
            let redis = config
                .redis
                .as_ref()
                .context("cache.backend = \"redis\" needs a [redis] section")?;
            let fred_config = fred::types::config::Config::from_url(&redis.url)
                .context("invalid redis url")?;
            let client = fred::clients::Client::new(fred_config, None, None, None);
            client.connect();
            client
                .wait_for_connect()
                .await
                .context("failed to connect to Redis")?;
            info!("Connected to Redis feed cache");
            ReadThroughCache::new(
                Arc::new(RedisFeedCache::new(Arc::new(client), redis.prefix.clone())),
                ttl,
            )
        }
    };
    Ok(cache)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let command = Command::parse(std::env::args().skip(1))?;
    let config = Config::load().context("failed to load configuration")?;

    let db = bazaar_db::init(&config).await?;
    info!("Connected to database");

    bazaar_db::migrate(&db).await?;
    info!("Migrations completed");

    match command {
        Command::Migrate => {}
        Command::Audit { post_id, repair } => {
            let cache = build_cache(&config).await?;
            let engine = FeedEngine::new(Arc::new(db), config.feed.clone(), cache);
            let report = if repair {
                engine.audit_service.repair_post(&post_id).await?
            } else {
                engine.audit_service.audit_post(&post_id).await?
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !repair && !report.is_consistent() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Command> {
        Command::parse(args.iter().map(ToString::to_string))
    }

    #[test]
    fn test_no_command_migrates() {
        assert!(matches!(parse(&[]).unwrap(), Command::Migrate));
        assert!(matches!(parse(&["migrate"]).unwrap(), Command::Migrate));
    }

    #[test]
    fn test_audit_and_repair_take_a_post_id() {
        assert!(matches!(
            parse(&["audit", "p1"]).unwrap(),
            Command::Audit { ref post_id, repair: false } if post_id == "p1"
        ));
        assert!(matches!(
            parse(&["repair", "p1"]).unwrap(),
            Command::Audit { repair: true, .. }
        ));
        assert!(parse(&["audit"]).is_err());
        assert!(parse(&["serve"]).is_err());
    }
}
