//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::repository::AsyncSqlitePool;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let pool = AsyncSqlitePool::new(&settings.database_url());
    pool.init_schema().await?;

    println!(
        "{} Initialized docimport in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!("  Database: {}", style(pool.database_url()).dim());

    Ok(())
}
