//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use nishaan_core::api::{BackendActions, SupabaseBackend, SupabaseCredentials};
use nishaan_core::connectivity::ConnectivityObserver;
use nishaan_core::intercept::{
    FsCacheStorage, OfflineWorker, ReqwestFetcher, Request, WorkerMessage, WorkerState,
};
use nishaan_core::models::{Bookmark, Library, Operation};
use nishaan_core::queue::{enqueue_into, QueueStore, SqliteQueueStore, SyncQueue};
use nishaan_core::sync::SyncCoordinator;
use nishaan_core::utils::pluralize;
use nishaan_core::Config;

fn open_store(config: &Config) -> Result<Arc<SqliteQueueStore>> {
    Ok(Arc::new(SqliteQueueStore::open_default(config)?))
}

fn supabase_url(config: &Config) -> Result<&str> {
    config
        .supabase_url
        .as_deref()
        .context("supabase_url is not set in the config file")
}

fn backend(config: &Config) -> Result<SupabaseBackend> {
    let project_url = supabase_url(config)?;
    Ok(SupabaseBackend::new(project_url, SupabaseCredentials::from_env()?)?)
}

fn enqueued_at(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

// ===== Queue =====

pub fn queue_status(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let operations = store.get_all_ordered_by_timestamp()?;

    if json {
        let status = nishaan_core::models::QueueStatus {
            size: operations.len(),
            operations,
        };
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if operations.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }

    println!("{} queued operation(s):", operations.len());
    for op in &operations {
        println!(
            "  {}  {:<16}  retries {}/{}  {}",
            enqueued_at(op.timestamp),
            op.op_type,
            op.retries,
            config.max_retries,
            op.id
        );
    }
    Ok(())
}

pub fn queue_clear(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let size = store.size()?;
    store.clear()?;
    println!("Removed {} queued operation(s)", size);
    Ok(())
}

pub fn queue_push(config: &Config, op_type: &str, payload: &str) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("Payload is not valid JSON")?;
    let operation = Operation::from_parts(op_type, &payload)?;

    let store = open_store(config)?;
    let queued = enqueue_into(store.as_ref(), &operation)?;
    println!("Queued {} ({} pending)", queued.id, store.size()?);
    Ok(())
}

pub async fn queue_replay(config: &Config) -> Result<()> {
    let project_url = supabase_url(config)?;
    let supabase = Arc::new(backend(config)?);
    let queue = SyncQueue::new(open_store(config)?, supabase).with_max_retries(config.max_retries);

    let observer = Arc::new(ConnectivityObserver::new(false));
    let fetcher = ReqwestFetcher::new()?;
    observer.probe(&fetcher, project_url).await;

    let coordinator = SyncCoordinator::new(queue, observer.clone());

    match coordinator.on_reconnect().await? {
        Some(summary) => println!(
            "Replayed: {} processed, {} failed, {} remaining",
            summary.processed, summary.failed, summary.remaining
        ),
        None => {
            if let Some(message) = observer.status_message() {
                println!("{}", message);
            }
            println!("{}", coordinator.status());
        }
    }
    Ok(())
}

// ===== Library =====

fn bookmark_line(library: &Library, bookmark: &Bookmark) -> String {
    let star = if bookmark.is_favorite { "*" } else { " " };
    let group = bookmark
        .group_id
        .as_deref()
        .and_then(|id| library.group(id))
        .map(|g| format!("  [{}]", g.name))
        .unwrap_or_default();
    format!("{} {}{}  {}", star, bookmark.display_title(), group, bookmark.url)
}

pub async fn library(config: &Config, tag: Option<&str>) -> Result<()> {
    let library = backend(config)?.fetch_library().await?;

    match tag {
        Some(tag) => {
            println!("{} tagged #{}", pluralize(library.tag_count(tag), "bookmark"), tag);
            for bookmark in library.bookmarks.iter().filter(|b| b.tags.iter().any(|t| t == tag)) {
                println!("{}", bookmark_line(&library, bookmark));
            }
        }
        None => {
            for bookmark in &library.bookmarks {
                println!("{}", bookmark_line(&library, bookmark));
            }
            println!(
                "{}, {} archived, {}",
                pluralize(library.bookmarks.len(), "bookmark"),
                library.archived.len(),
                pluralize(library.groups.len(), "group")
            );
        }
    }
    Ok(())
}

// ===== Config =====

pub fn config_init(path: Option<&Path>, force: bool) -> Result<()> {
    let target = match path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };
    if target.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", target.display());
    }

    let config = Config::default();
    match path {
        Some(path) => config.save_to(path)?,
        None => config.save()?,
    }
    println!("Wrote default config to {}", target.display());
    Ok(())
}

pub fn config_show(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

// ===== Worker =====

fn worker(config: &Config) -> Result<OfflineWorker> {
    let cache = Arc::new(FsCacheStorage::new(config.cache_dir()?)?);
    let fetcher = Arc::new(ReqwestFetcher::new()?);
    Ok(OfflineWorker::new(config, cache, fetcher)?)
}

pub async fn worker_install(config: &Config) -> Result<()> {
    let worker = worker(config)?;
    worker.install().await?;
    println!(
        "Installed {} ({})",
        config.static_cache_name(),
        worker.state()
    );
    Ok(())
}

pub fn worker_activate(config: &Config) -> Result<()> {
    let worker = worker(config)?;
    match worker.resume()? {
        WorkerState::Installed => {}
        WorkerState::Uninstalled => bail!("Worker is not installed; run `nishaan worker install`"),
        state => bail!("Cannot activate a worker that is {}", state),
    }

    let deleted = worker.activate()?;
    if deleted.is_empty() {
        println!("Active; no stale caches");
    } else {
        println!("Active; deleted {}", deleted.join(", "));
    }
    Ok(())
}

pub async fn worker_cache_urls(config: &Config, urls: Vec<String>) -> Result<()> {
    let worker = worker(config)?;
    let count = urls.len();
    worker.handle_message(WorkerMessage::CacheUrls { urls }).await?;
    println!("Cached {} URL(s) into {}", count, config.dynamic_cache_name());
    Ok(())
}

// ===== Fetch =====

pub async fn fetch(config: &Config, url: &str, html: bool) -> Result<()> {
    let worker = worker(config)?;
    if worker.resume()? == WorkerState::Installed && config.skip_waiting_on_install {
        worker.activate()?;
    }
    debug!(state = %worker.state(), "Worker ready");

    let mut request = Request::get(url)?;
    if html {
        request = request.with_header("accept", "text/html");
    }

    let route = worker.router().classify(&request);
    let response = worker.handle_fetch(&request).await?;

    eprintln!(
        "{} via {} ({})",
        response.status,
        route.strategy_name(),
        worker.state()
    );
    print!("{}", response.text());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nishaan_core::models::Group;

    #[test]
    fn test_bookmark_line_shows_group_and_falls_back_to_url() {
        let mut bookmark = Bookmark::provisional("b1".into(), "https://a.test".into(), Some("g1".into()));
        bookmark.is_favorite = true;
        let library = Library {
            bookmarks: vec![bookmark.clone()],
            archived: Vec::new(),
            groups: vec![Group {
                id: "g1".into(),
                name: "Work".into(),
                color: "#000".into(),
                sort_order: 0,
                created_at: None,
                updated_at: None,
            }],
        };

        assert_eq!(
            bookmark_line(&library, &bookmark),
            "* https://a.test  [Work]  https://a.test"
        );

        bookmark.title = Some("A".into());
        bookmark.group_id = None;
        bookmark.is_favorite = false;
        assert_eq!(bookmark_line(&library, &bookmark), "  A  https://a.test");
    }
}
