//! Slow-changing reference data: the current academic year and the lesson
//! type catalog.
//!
//! A single refresher task owns the [`SnapshotPublisher`] and replaces the
//! whole [`ConfigSnapshot`] on every refresh; request handlers hold a
//! [`SnapshotReader`] and take one `Arc` per request, so a request never
//! mixes a year from one refresh with lesson types from the next.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::LessonType;
use crate::store::{keys, KeyValueStore};

pub const MIN_ACCEPTED_YEAR: i32 = 2022;
pub const NOT_READY_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
pub const READY_REFRESH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSnapshot {
    pub year: i32,
    pub lesson_types: HashMap<i64, LessonType>,
}

impl ConfigSnapshot {
    pub fn is_ready(&self) -> bool {
        self.year != 0 && !self.lesson_types.is_empty()
    }

    pub fn refresh_interval(&self) -> Duration {
        if self.is_ready() {
            READY_REFRESH_INTERVAL
        } else {
            NOT_READY_REFRESH_INTERVAL
        }
    }
}

pub struct SnapshotPublisher {
    tx: watch::Sender<Arc<ConfigSnapshot>>,
}

#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Arc<ConfigSnapshot>>,
}

impl SnapshotReader {
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.rx.borrow())
    }
}

pub fn channel(initial: ConfigSnapshot) -> (SnapshotPublisher, SnapshotReader) {
    let (tx, rx) = watch::channel(Arc::new(initial));
    (SnapshotPublisher { tx }, SnapshotReader { rx })
}

impl SnapshotPublisher {
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn publish(&self, snapshot: ConfigSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }
}

/// Build the next snapshot from the store, keeping any field of `previous`
/// whose stored value is missing, malformed or unreadable.
pub async fn load_snapshot(
    store: &dyn KeyValueStore,
    previous: &ConfigSnapshot,
) -> ConfigSnapshot {
    let mut next = previous.clone();

    match store.get(keys::CURRENT_YEAR).await {
        Ok(raw) => {
            if let Some(year) = raw.and_then(|v| v.trim().parse::<i32>().ok()) {
                if year >= MIN_ACCEPTED_YEAR {
                    next.year = year;
                }
            }
        }
        Err(err) => warn!(error = %err, "failed to read current year"),
    }

    match store.get(keys::LESSON_TYPES).await {
        Ok(Some(raw)) if raw.len() > 1 => match serde_json::from_str::<Vec<LessonType>>(&raw) {
            Ok(types) => {
                next.lesson_types = types.into_iter().map(|t| (t.id, t)).collect();
            }
            Err(err) => warn!(error = %err, "ignoring malformed lesson type catalog"),
        },
        Ok(_) => {}
        Err(err) => warn!(error = %err, "failed to read lesson type catalog"),
    }

    next
}

/// Refresh until every [`SnapshotReader`] has been dropped.
pub fn spawn_refresher(
    store: Arc<dyn KeyValueStore>,
    publisher: SnapshotPublisher,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let previous = publisher.current();
            let next = load_snapshot(store.as_ref(), &previous).await;
            let interval = next.refresh_interval();

            if next != *previous {
                info!(
                    year = next.year,
                    lesson_types = next.lesson_types.len(),
                    "config snapshot refreshed"
                );
                publisher.publish(next);
            } else {
                debug!("config snapshot unchanged");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = publisher.tx.closed() => {
                    debug!("all snapshot readers dropped, stopping refresher");
                    break;
                }
            }
        }
    })
}
