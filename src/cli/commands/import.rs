//! CSV import command.

use std::path::Path;

use console::style;

use crate::cli::helpers::{print_notification, stage_upload, Services};
use crate::config::Settings;
use crate::import::{ImportContext, ImportVariant};
use crate::models::Permissions;
use crate::notify::NotificationSink;
use crate::work_queue::runner::execute;
use crate::work_queue::{ImportFileTask, QueuedTask, Task, TaskQueue};

/// Import one file and wait until every job it spawned has finished.
#[allow(clippy::too_many_arguments)]
pub async fn cmd_import(
    settings: &Settings,
    file: &Path,
    user: &str,
    read_groups: &[String],
    write_groups: &[String],
    variant: ImportVariant,
    sync: bool,
) -> anyhow::Result<()> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }

    let services = Services::open(settings).await?;
    let staged = stage_upload(settings, file).await?;
    let task = Task::ImportFile(ImportFileTask {
        file_path: staged,
        context: ImportContext::new(user, Permissions::new(read_groups, write_groups)),
        variant,
    });

    println!(
        "{} Importing {} ({:?})",
        style("→").cyan(),
        file.display(),
        variant
    );

    let workers = services.start_workers().await?;
    let import_queue = &settings.import.import_queue;

    if sync {
        execute(
            services.runner.as_ref(),
            QueuedTask::new(import_queue, task),
            settings.import.tries,
        )
        .await;
    } else {
        let id = services.queue.enqueue(import_queue, task).await?;
        println!("  Queued as {}", style(id).dim());
    }

    services.queue.wait_idle().await;
    workers.abort();

    // Newest notification is the run's terminal report.
    let latest = services.notifications.list_for_user(user, 1).await?;
    match latest.first() {
        Some(notification) => print_notification(notification),
        None => println!("{} No report was produced", style("!").yellow()),
    }

    Ok(())
}
