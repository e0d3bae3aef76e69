//! Domain models.

mod document;
mod notification;

pub use document::{
    CanonicalDocument, DocumentMetadata, DocumentStatus, FileLocation, Permissions,
    DEFAULT_STORAGE_TYPE,
};
pub use notification::{
    category, NewNotification, Notification, NotificationType, Priority, DEFAULT_EXPIRY_DAYS,
};
