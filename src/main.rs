use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use rivulet::config::Config;
use rivulet::content::{Rewriter, Scraper};
use rivulet::feed::{find_subscriptions, FeedHandler};
use rivulet::http::HttpClient;
use rivulet::scheduler::{run_feed_tick, Scheduler};
use rivulet::storage::Database;
use rivulet::worker::WorkerPool;

#[derive(Parser, Debug)]
#[command(name = "rivulet", about = "Background feed poller", version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", default_value = "rivulet.toml")]
    config: PathBuf,

    /// Print the feeds offered by a URL and exit
    #[arg(long, value_name = "URL", conflicts_with = "once")]
    discover: Option<String>,

    /// Refresh one batch of due feeds and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;
    config
        .apply_env()
        .context("Invalid environment override")?;

    let client = HttpClient::new(config.http_settings()).context("Failed to build HTTP client")?;

    if let Some(url) = args.discover {
        let subscriptions = find_subscriptions(&client, &url, "", None)
            .await
            .with_context(|| format!("Failed to analyze '{url}'"))?;
        if subscriptions.is_empty() {
            println!("No feeds found at {url}");
        }
        for sub in subscriptions {
            println!("{}\t{}\t{}", sub.kind, sub.url, sub.title);
        }
        return Ok(());
    }

    let db = Database::open(&config.database_path.to_string_lossy())
        .await
        .with_context(|| {
            format!(
                "Failed to open database '{}': check the path and permissions",
                config.database_path.display()
            )
        })?;

    let handler = Arc::new(FeedHandler::new(
        db.clone(),
        client.clone(),
        Rewriter::new(config.rewrite_domain_rules()),
        Scraper::new(client, config.scraper_domain_rules()),
        config.handler_settings(),
    ));
    let pool = WorkerPool::start(
        config.worker.pool_size,
        config.worker.queue_capacity,
        handler,
    );

    let settings = config.scheduler_settings();

    if args.once {
        let queued = run_feed_tick(
            &db,
            &pool.queue(),
            settings.batch_size,
            settings.error_limit,
            i64::try_from(config.scheduler.polling_frequency_minutes).unwrap_or(i64::MAX),
        )
        .await;
        pool.shutdown().await;
        println!("Refreshed {queued} feeds");
        return Ok(());
    }

    let scheduler = Scheduler::start(db, pool.queue(), settings);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");

    scheduler.shutdown().await;
    pool.shutdown().await;

    Ok(())
}
