use crate::entities::{Download, DownloadStatus};
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Event type fired on the host bus for every download state change
pub const EVENT_DOWNLOAD_STATE_CHANGED: &str = "aria2_download_state_changed";

const EVENT_BUS_CAPACITY: usize = 64;

/// A download moved to a new status
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DownloadStateChanged {
    pub gid: String,
    pub name: String,
    pub status: DownloadStatus,
    /// `None` when the download was not known at the previous poll
    pub previous: Option<DownloadStatus>,
    pub fired_at: DateTime<Utc>,
}

impl DownloadStateChanged {
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        EVENT_DOWNLOAD_STATE_CHANGED
    }

    /// The aria2 notification equivalent to this change, if there is one
    #[must_use]
    pub fn notification(&self) -> Option<&'static str> {
        match self.status {
            DownloadStatus::Active => Some("aria2.onDownloadStart"),
            DownloadStatus::Paused => Some("aria2.onDownloadPause"),
            DownloadStatus::Removed => Some("aria2.onDownloadStop"),
            DownloadStatus::Complete => Some("aria2.onDownloadComplete"),
            DownloadStatus::Error => Some("aria2.onDownloadError"),
            DownloadStatus::Waiting => None,
        }
    }
}

/// Remembers the last polled status of every download and reports the differences
#[derive(Default, Debug)]
pub struct StatusTracker {
    known: HashMap<String, DownloadStatus>,
    primed: bool,
}

impl StatusTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Compares `downloads` with the previous snapshot.
    ///
    /// The first snapshot only primes the tracker. Downloads without a status are ignored.
    pub fn diff(&mut self, downloads: &[Download]) -> Vec<DownloadStateChanged> {
        let now = Utc::now();
        let mut current = HashMap::with_capacity(downloads.len());
        let mut changes = Vec::new();

        for download in downloads {
            let Some(status) = download.status else {
                continue;
            };
            current.insert(download.gid.clone(), status);

            let previous = self.known.get(&download.gid).copied();
            if self.primed && previous != Some(status) {
                changes.push(DownloadStateChanged {
                    gid: download.gid.clone(),
                    name: download.name(),
                    status,
                    previous,
                    fired_at: now,
                });
            }
        }

        if !self.primed {
            debug!("Status tracker primed with {} downloads", current.len());
        }

        self.known = current;
        self.primed = true;
        changes.sort_by(|a, b| a.gid.cmp(&b.gid));
        changes
    }
}

/// Fan-out of state change events to any number of listeners
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DownloadStateChanged>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadStateChanged> {
        self.sender.subscribe()
    }

    /// Returns how many listeners received the event
    pub fn publish(&self, event: DownloadStateChanged) -> usize {
        debug!(
            "Firing {} for {}: {:?} -> {}",
            EVENT_DOWNLOAD_STATE_CHANGED, event.gid, event.previous, event.status
        );
        // No listener is not an error
        self.sender.send(event).unwrap_or(0)
    }
}
