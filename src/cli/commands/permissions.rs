//! Batch permission update command.

use console::style;

use crate::cli::helpers::{print_notification, Services};
use crate::config::Settings;
use crate::models::Permissions;
use crate::notify::NotificationSink;
use crate::work_queue::{PermissionsTask, Task, TaskQueue};

pub async fn cmd_permissions(
    settings: &Settings,
    user: &str,
    documents: Vec<String>,
    read_groups: &[String],
    write_groups: &[String],
) -> anyhow::Result<()> {
    let services = Services::open(settings).await?;
    let workers = services.start_workers().await?;

    println!(
        "{} Updating permissions of {} document(s)",
        style("→").cyan(),
        documents.len()
    );

    services
        .queue
        .enqueue(
            &settings.import.import_queue,
            Task::UpdatePermissions(PermissionsTask {
                user_id: user.to_string(),
                document_ids: documents,
                permissions: Permissions::new(read_groups, write_groups),
            }),
        )
        .await?;

    services.queue.wait_idle().await;
    workers.abort();

    if let Some(notification) = services.notifications.list_for_user(user, 1).await?.first() {
        print_notification(notification);
    }

    Ok(())
}
