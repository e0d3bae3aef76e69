//! Diesel-based notification repository for SQLite.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::diesel_models::{NewNotificationRecord, NotificationRecord};
use super::diesel_pool::AsyncSqlitePool;
use super::{parse_datetime, parse_datetime_opt};
use crate::models::{NewNotification, Notification, NotificationType, Priority};
use crate::notify::{NotificationSink, NotifyError};
use crate::schema::notifications;

impl From<NotificationRecord> for Notification {
    fn from(record: NotificationRecord) -> Self {
        Notification {
            id: record.id,
            user_id: record.user_id,
            title: record.title,
            message: record.message,
            kind: NotificationType::from_str(&record.kind).unwrap_or(NotificationType::Info),
            category: record.category,
            data: serde_json::from_str(&record.data).unwrap_or_default(),
            priority: Priority::from_str(&record.priority),
            read_at: parse_datetime_opt(record.read_at),
            expires_at: parse_datetime(&record.expires_at),
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Stores notifications in the `notifications` table.
#[derive(Clone)]
pub struct DieselNotificationRepository {
    pool: AsyncSqlitePool,
}

impl DieselNotificationRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for DieselNotificationRepository {
    async fn create(&self, notification: NewNotification) -> Result<Notification, NotifyError> {
        let mut conn = self.pool.get().await?;
        let stored = Notification::from_new(notification, Utc::now());

        diesel::insert_into(notifications::table)
            .values(&NewNotificationRecord {
                id: &stored.id,
                user_id: &stored.user_id,
                title: &stored.title,
                message: &stored.message,
                kind: stored.kind.as_str(),
                category: &stored.category,
                data: serde_json::to_string(&stored.data)?,
                priority: stored.priority.as_str(),
                read_at: None,
                expires_at: stored.expires_at.to_rfc3339(),
                created_at: stored.created_at.to_rfc3339(),
            })
            .execute(&mut conn)
            .await?;

        Ok(stored)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, NotifyError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        let records = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::expires_at.gt(now))
            .order(notifications::created_at.desc())
            .limit(limit as i64)
            .select(NotificationRecord::as_select())
            .load::<NotificationRecord>(&mut conn)
            .await?;

        Ok(records.into_iter().map(Notification::from).collect())
    }
}
