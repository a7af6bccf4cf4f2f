use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

mod cache;
mod catalog;
mod config;
mod constants;
mod dispatcher;
mod enrichment;
mod error;
mod extract;
mod isbn;
mod logging;
mod resolver;
mod server;
mod staleness;
mod store;
mod webhook;

use crate::cache::{Cache, InMemoryCache};
use crate::catalog::{CatalogApi, CatalogClient};
use crate::config::Config;
use crate::dispatcher::{CrawlDispatcher, TaskRunnerApi, TaskRunnerClient};
use crate::enrichment::Enricher;
use crate::resolver::{ReqwestProbe, RetailerUrlResolver, UrlResolver};
use crate::server::AppState;
use crate::store::{BookStore, InMemoryBookStore};
use crate::webhook::WebhookContext;

#[derive(Parser)]
#[command(name = "kbooks_enricher")]
#[command(about = "Book metadata enrichment service")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (enrichment endpoints + crawler webhook)
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// One-shot enrichment for a single ISBN
    Enrich {
        /// ISBN-10 or ISBN-13 to enrich
        #[arg(long)]
        isbn: String,
        /// Also resolve a retailer URL and dispatch a category crawl
        #[arg(long)]
        category: bool,
    },
    /// Resolve and validate a retailer product URL without dispatching
    ResolveUrl {
        /// ISBN-10 or ISBN-13 to resolve
        #[arg(long)]
        isbn: String,
    },
}

fn build_state(config: &Config) -> error::Result<AppState> {
    let store: Arc<dyn BookStore> = Arc::new(InMemoryBookStore::new());
    let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());

    let catalog: Arc<dyn CatalogApi> = Arc::new(CatalogClient::new(
        &config.catalog_api_url,
        config.catalog_api_key.clone(),
        Duration::from_secs(constants::CATALOG_TIMEOUT_SECS),
    )?);

    let probe = ReqwestProbe::new(Duration::from_secs(constants::RESOLVE_TIMEOUT_SECS))?;
    let resolver: Arc<dyn UrlResolver> = Arc::new(RetailerUrlResolver::new(
        Box::new(probe),
        &config.autocomplete_url,
        &config.product_url_prefix,
        &config.search_detail_url_prefix,
    ));

    let task_runner = if config.crawl_configured() {
        Some(Arc::new(TaskRunnerClient::new(
            &config.crawler_api_url,
            config.crawler_token.clone(),
            config.crawler_task_id.clone(),
            config.webhook_secret.clone(),
            Duration::from_secs(constants::CATALOG_TIMEOUT_SECS),
        )?))
    } else {
        None
    };
    let dispatcher: Option<Arc<dyn CrawlDispatcher>> = task_runner
        .clone()
        .map(|c| c as Arc<dyn CrawlDispatcher>);
    let task_runner_api: Option<Arc<dyn TaskRunnerApi>> =
        task_runner.map(|c| c as Arc<dyn TaskRunnerApi>);

    let enricher = Enricher::new(
        store.clone(),
        cache.clone(),
        catalog,
        resolver,
        dispatcher,
    );

    let webhook = WebhookContext {
        secret: config.webhook_secret.clone(),
        store,
        cache,
        task_runner: task_runner_api,
    };

    Ok(AppState { enricher, webhook })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Serve { port } => {
            let state = Arc::new(build_state(&config)?);
            let port = port.unwrap_or(config.port);
            server::start_server(state, port).await?;
        }
        Commands::Enrich { isbn, category } => {
            let Some(isbn13) = isbn::normalize_to_isbn13(&isbn) else {
                eprintln!("❌ Not a valid ISBN: {isbn}");
                std::process::exit(1);
            };
            let state = build_state(&config)?;

            match state.enricher.enrich_catalog(&isbn13).await {
                Ok(outcome) => {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
                Err(e) => {
                    error!("Catalog enrichment failed: {}", e);
                    eprintln!("❌ Catalog enrichment failed: {e}");
                }
            }

            if category {
                match state.enricher.enrich_category(&isbn13).await {
                    Ok(outcome) => {
                        println!("{}", serde_json::to_string_pretty(&outcome)?);
                    }
                    Err(e) => {
                        error!("Category enrichment failed: {}", e);
                        eprintln!("❌ Category enrichment failed: {e}");
                    }
                }
            }
        }
        Commands::ResolveUrl { isbn } => {
            let Some(isbn13) = isbn::normalize_to_isbn13(&isbn) else {
                eprintln!("❌ Not a valid ISBN: {isbn}");
                std::process::exit(1);
            };
            let probe = ReqwestProbe::new(Duration::from_secs(constants::RESOLVE_TIMEOUT_SECS))?;
            let resolver = RetailerUrlResolver::new(
                Box::new(probe),
                &config.autocomplete_url,
                &config.product_url_prefix,
                &config.search_detail_url_prefix,
            );
            match resolver.resolve(&isbn13).await? {
                Some(url) => println!("✅ {url}"),
                None => println!("⚠️  No retailer URL resolvable for {isbn13}"),
            }
        }
    }
    Ok(())
}
