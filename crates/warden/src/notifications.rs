//! Notification bus: a bounded, newest-first ring persisted as a single
//! store record (`warden_types::RESERVED_KEY_NOTIFICATIONS`).

use warden_types::Notification;

use crate::error::{Result, WardenError};
use crate::store::Store;

/// Append `notification` to the front of the ring, stamping a fresh id and
/// timezone-local receipt time, then truncate to `store_max`.
pub fn put(store: &Store, timezone: &str, store_max: u64, mut notification: Notification) -> Result<()> {
    notification.id = uuid::Uuid::new_v4();
    notification.notification_received = received_at(timezone);

    let mut notifications = store.get_notifications()?;
    notifications.insert(0, notification);
    let cap = store_max as usize;
    if notifications.len() > cap {
        notifications.truncate(cap);
    }
    store.put_notifications(&notifications).map_err(WardenError::Store)
}

fn received_at(timezone: &str) -> chrono::DateTime<chrono::Utc> {
    match timezone.parse::<chrono_tz::Tz>() {
        Ok(zone) => chrono::Utc::now().with_timezone(&zone).with_timezone(&chrono::Utc),
        Err(_) => chrono::Utc::now(),
    }
}

/// List notifications newest-first, optionally filtered to a single group.
pub fn list(store: &Store, group: Option<&str>) -> Result<Vec<Notification>> {
    let notifications = store.get_notifications()?;
    Ok(match group {
        Some(group) => notifications.into_iter().filter(|n| n.group == group).collect(),
        None => notifications,
    })
}

pub fn delete_all(store: &Store) -> Result<()> {
    store.delete_notifications().map_err(WardenError::Store)
}

pub fn delete_by_id(store: &Store, id: uuid::Uuid) -> Result<()> {
    let mut notifications = store.get_notifications()?;
    let before = notifications.len();
    notifications.retain(|n| n.id != id);
    if notifications.len() == before {
        return Err(WardenError::NotFound(format!("notification {id} not found")));
    }
    store.put_notifications(&notifications).map_err(WardenError::Store)
}
