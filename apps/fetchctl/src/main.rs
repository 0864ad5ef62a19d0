use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use refetch::{
    fetch_fn, page_fn, FetchConfig, FetchEvent, FetchPhase, Fetcher, Page, PageConfig, PageEvent,
    PagePhase, Pager,
};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Exercise the refetch controllers against HTTP endpoints")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one URL, with optional retries and response caching.
    Get {
        url: String,
        #[arg(long, default_value_t = 0)]
        retries: u32,
        #[arg(long, default_value_t = 1000)]
        retry_delay_ms: u64,
        #[arg(long, default_value_t = 0)]
        cache_ms: u64,
        /// Issue the fetch this many times to observe cache hits.
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Pause between repeated fetches.
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
    /// Walk a paginated endpoint until no pages remain.
    Pages {
        /// Endpoint returning `{"items": [...], "total": n}`; receives
        /// `page` and `page_size` query parameters.
        url: String,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },
}

#[derive(Deserialize)]
struct PageResponse {
    items: Vec<serde_json::Value>,
    total: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Get {
            url,
            retries,
            retry_delay_ms,
            cache_ms,
            repeat,
            interval_ms,
        } => {
            run_get(url, retries, retry_delay_ms, cache_ms, repeat, interval_ms).await
        }
        Command::Pages { url, page_size } => run_pages(url, page_size).await,
    }
}

async fn run_get(
    url: String,
    retries: u32,
    retry_delay_ms: u64,
    cache_ms: u64,
    repeat: u32,
    interval_ms: u64,
) -> Result<()> {
    let http = reqwest::Client::new();
    let operation = fetch_fn(move || {
        let http = http.clone();
        let url = url.clone();
        async move {
            let response = http.get(&url).send().await?.error_for_status()?;
            Ok(response.text().await?)
        }
    });
    let fetcher = Fetcher::new(
        FetchConfig {
            retry_count: retries,
            retry_delay: Duration::from_millis(retry_delay_ms),
            cache_window: Duration::from_millis(cache_ms),
        },
        operation,
    );

    let mut updates = fetcher.subscribe();
    for round in 1..=repeat {
        fetcher.send(FetchEvent::Fetch).await;
        loop {
            updates
                .changed()
                .await
                .map_err(|_| anyhow!("controller dropped"))?;
            let snapshot = updates.borrow_and_update().clone();
            let bytes = snapshot.data.as_ref().map_or(0, |body| body.len());
            match snapshot.phase {
                FetchPhase::Success => {
                    println!("round {round}: fetched {bytes} bytes");
                    break;
                }
                FetchPhase::Cached => {
                    println!("round {round}: served {bytes} bytes from cache");
                    break;
                }
                FetchPhase::Error => {
                    let error = snapshot
                        .error
                        .map_or_else(|| "unknown failure".to_string(), |e| e.to_string());
                    return Err(anyhow!("round {round}: {error}"));
                }
                _ => {}
            }
        }
        if round < repeat && interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }
    Ok(())
}

async fn run_pages(url: String, page_size: u32) -> Result<()> {
    let http = reqwest::Client::new();
    let operation = page_fn(move |page, page_size| {
        let http = http.clone();
        let url = url.clone();
        async move {
            let response: PageResponse = http
                .get(&url)
                .query(&[("page", page), ("page_size", page_size)])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok(Page {
                items: response.items,
                total: response.total,
            })
        }
    });
    let pager = Pager::new(PageConfig { page_size }, operation);

    let mut updates = pager.subscribe();
    pager.send(PageEvent::LoadPage(1)).await;
    loop {
        updates
            .changed()
            .await
            .map_err(|_| anyhow!("controller dropped"))?;
        let snapshot = updates.borrow_and_update().clone();
        match snapshot.phase {
            PagePhase::Idle => {
                println!(
                    "page {}: {} of {} items",
                    snapshot.page,
                    snapshot.items.len(),
                    snapshot.total
                );
                if snapshot.has_more {
                    pager.send(PageEvent::LoadMore).await;
                } else {
                    break;
                }
            }
            PagePhase::Error => {
                let error = snapshot
                    .error
                    .map_or_else(|| "unknown failure".to_string(), |e| e.to_string());
                return Err(anyhow!("page {}: {error}", snapshot.page));
            }
            PagePhase::Loading => {}
        }
    }
    Ok(())
}
