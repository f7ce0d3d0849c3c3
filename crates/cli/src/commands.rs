use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::future::join_all;

use fetchonce_client::{FetchConfig, HttpFetcher};
use fetchonce_core::{AppConfig, BlobStore, Resolver, present, present_refresh};

use crate::cli::Command;
use crate::output::{TextRender, file_name_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    CacheFirst,
    Refresh,
}

/// Run a parsed command. Returns false when any URL failed.
pub async fn run(command: Command, config: &AppConfig) -> Result<bool> {
    match command {
        Command::Get { urls, out } => with_resolver(config, &urls, out.as_deref(), Mode::CacheFirst).await,
        Command::Refresh { urls, out } => with_resolver(config, &urls, out.as_deref(), Mode::Refresh).await,
        Command::List => {
            let store = BlobStore::shared(&config.db_path).await?;
            for line in list_lines(&store).await? {
                println!("{line}");
            }
            store.close().await?;
            Ok(true)
        }
    }
}

async fn with_resolver(config: &AppConfig, urls: &[String], out: Option<&Path>, mode: Mode) -> Result<bool> {
    let store = BlobStore::shared(&config.db_path).await?;
    let fetcher = HttpFetcher::new(FetchConfig::from(config))?;
    let resolver = Resolver::new(store, Arc::new(fetcher), config.resolver_options());

    let result = fetch_all(&resolver, urls, out, mode).await;

    tracing::info!(stats = ?resolver.stats(), "done");
    resolver.close().await?;
    result
}

/// Resolve every URL concurrently, printing progress and one summary line
/// per URL. Payloads are written into `out` when given.
pub async fn fetch_all(resolver: &Resolver, urls: &[String], out: Option<&Path>, mode: Mode) -> Result<bool> {
    if let Some(dir) = out {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let resolves = urls.iter().map(|url| async move {
        let render = TextRender::new(url);
        let result = match mode {
            Mode::CacheFirst => present(resolver, url, &render, |line| line.print()).await,
            Mode::Refresh => present_refresh(resolver, url, &render, |line| line.print()).await,
        };
        (url, result)
    });

    let mut all_ok = true;
    for (url, result) in join_all(resolves).await {
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(url = url.as_str(), code = e.code(), status = ?e.status(), "resolve failed");
                all_ok = false;
                continue;
            }
        };

        if let Some(dir) = out {
            let path = dir.join(file_name_for(url));
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::debug!(url = url.as_str(), path = %path.display(), "payload written");
        }
    }

    Ok(all_ok)
}

/// One tab-separated line per stored entry: key, size, fetched_at.
pub async fn list_lines(store: &BlobStore) -> Result<Vec<String>> {
    let entries = store.entries().await?;
    Ok(entries
        .into_iter()
        .map(|entry| format!("{}\t{}\t{}", entry.key, entry.size, entry.fetched_at))
        .collect())
}
