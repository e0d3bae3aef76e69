//! Progress and notification listing.

use console::style;

use crate::cache;
use crate::cli::helpers::print_notification;
use crate::config::Settings;
use crate::import::{progress_key, ProgressSnapshot};
use crate::notify::NotificationSink;
use crate::repository::{AsyncSqlitePool, DieselNotificationRepository};

/// Cache URL shared with the importing process.
///
/// Progress lives in the transient store of the process running the import,
/// so an in-process memory store would always come back empty.
fn shared_cache_url(settings: &Settings) -> anyhow::Result<&str> {
    match settings.cache_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() && url != "memory" => Ok(url),
        _ => anyhow::bail!(
            "Progress needs a shared cache: set DOCIMPORT_CACHE_URL (or cache_url) to a redis:// URL \
             and build with the redis-backend feature"
        ),
    }
}

pub async fn cmd_progress(settings: &Settings, user: &str) -> anyhow::Result<()> {
    let cache = cache::connect(Some(shared_cache_url(settings)?)).await?;

    match cache.get(&progress_key(user)).await? {
        Some(json) => {
            let snapshot: ProgressSnapshot = serde_json::from_str(&json)?;
            println!("{}", style(format!("Import progress for {}", user)).bold());
            println!("  Imported: {}", style(snapshot.imported).green());
            println!("  Skipped:  {}", style(snapshot.skipped).yellow());
            println!(
                "  Updated:  {}",
                snapshot.updated_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        None => println!("{} No import in progress for {}", style("!").yellow(), user),
    }

    Ok(())
}

pub async fn cmd_notifications(settings: &Settings, user: &str, limit: usize) -> anyhow::Result<()> {
    let pool = AsyncSqlitePool::new(&settings.database_url());
    pool.init_schema().await?;
    let repo = DieselNotificationRepository::new(pool);

    let notifications = repo.list_for_user(user, limit).await?;
    if notifications.is_empty() {
        println!("No notifications for {}", user);
        return Ok(());
    }

    for notification in &notifications {
        print_notification(notification);
    }

    Ok(())
}
