//! One configured aria2 daemon: its sensors, the polling loop, the
//! `start_download` service and the download list view.

use crate::DOMAIN;
use crate::client::Aria2Error::InvalidInput;
use crate::client::{Aria2, Aria2Error};
use crate::config::EntryConfig;
use crate::coordinator::{Coordinator, FAST_UPDATE_INTERVAL, RETRY_DELAY};
use crate::entities::{Download, DownloadKey, DownloadOptions, DownloadStatus, RpcCall};
use crate::events::{DownloadStateChanged, EventBus, StatusTracker};
use crate::sensor::{DeviceInfo, GidListSensor, SensorState, StatSensor};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Name of the service that queues a new download
pub const SERVICE_START_DOWNLOAD: &str = "start_download";
/// Path the download list view is served under
pub const DOWNLOAD_LIST_URL: &str = "/api/aria_download_list";

const LIST_PAGE_SIZE: u32 = 1000;
const TRACKED_KEYS: [DownloadKey; 4] = [
    DownloadKey::Gid,
    DownloadKey::Status,
    DownloadKey::Files,
    DownloadKey::Bittorrent,
];
const LISTED_KEYS: [DownloadKey; 7] = [
    DownloadKey::Gid,
    DownloadKey::Status,
    DownloadKey::TotalLength,
    DownloadKey::CompletedLength,
    DownloadKey::DownloadSpeed,
    DownloadKey::Files,
    DownloadKey::Bittorrent,
];

/// Data of a `start_download` service call
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StartDownload {
    pub url: String,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub out: Option<String>,
}

/// One row of the download list view
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DownloadSummary {
    pub name: String,
    pub gid: String,
    pub status: Option<DownloadStatus>,
    pub total_length: u64,
    pub completed_length: u64,
    /// Total length in human readable form, e.g. `1.23 GB`
    pub size: String,
    /// Completion in percent
    pub progress: f64,
    /// Download speed while active, e.g. `(98.77 KB/s)`, empty otherwise
    pub speed: String,
}

impl From<&Download> for DownloadSummary {
    fn from(download: &Download) -> Self {
        Self {
            name: download.name(),
            gid: download.gid.clone(),
            status: download.status,
            total_length: download.total_length,
            completed_length: download.completed_length,
            size: download.calculate_size(),
            progress: download.calculate_progress(),
            speed: download.calculate_speed(),
        }
    }
}

pub struct Aria2Integration {
    entry: EntryConfig,
    client: Arc<Aria2>,
    device: DeviceInfo,
    coordinator: Coordinator,
    stat_sensors: Vec<StatSensor>,
    gid_sensors: Mutex<Vec<GidListSensor>>,
    tracker: Mutex<StatusTracker>,
    events: EventBus,
}

impl Aria2Integration {
    /// Connects to the daemon described by `entry` and builds its entities.
    ///
    /// A daemon that does not answer yet is not fatal: sensors start empty
    /// and fill in once polling succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if no client can be built for the entry
    pub async fn setup(entry: EntryConfig) -> Result<Arc<Self>> {
        let client = Arc::new(entry.client().context("Failed to create aria2 client")?);
        info!("Setting up aria2 at {}", client.url());

        let sw_version = match client.get_version().await {
            Ok(version) => Some(version.version),
            Err(error) => {
                warn!("Failed to read aria2 version: {error:#}");
                None
            }
        };
        let device = DeviceInfo::new(&entry.host, sw_version);

        let mut gid_sensors = GidListSensor::all(&entry.host, &device);
        for sensor in &mut gid_sensors {
            match client.execute::<Vec<Download>>(&sensor.seed_call()).await {
                Ok(downloads) => sensor.seed(&downloads),
                Err(error) => warn!("Failed to seed {}: {error:#}", sensor.name()),
            }
        }

        let integration = Self {
            stat_sensors: StatSensor::all(&entry.host, &device),
            coordinator: Coordinator::new(Arc::clone(&client)),
            gid_sensors: Mutex::new(gid_sensors),
            tracker: Mutex::new(StatusTracker::new()),
            events: EventBus::new(),
            entry,
            client,
            device,
        };

        if let Err(error) = integration.poll_downloads().await {
            warn!("Failed to read initial download states: {error:#}");
        }

        Ok(Arc::new(integration))
    }

    #[must_use]
    pub fn entry(&self) -> &EntryConfig {
        &self.entry
    }

    #[must_use]
    pub fn client(&self) -> &Aria2 {
        &self.client
    }

    #[must_use]
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    #[must_use]
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Receives every `aria2_download_state_changed` event fired from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadStateChanged> {
        self.events.subscribe()
    }

    /// Refreshes statistics and download states once, firing events for changes.
    ///
    /// # Errors
    ///
    /// Returns an error if either the statistics or the download states could not be fetched
    pub async fn poll(&self) -> Result<Vec<DownloadStateChanged>> {
        let stats = self.coordinator.refresh().await;
        let changes = self.poll_downloads().await?;
        stats?;
        Ok(changes)
    }

    /// Polls every [`FAST_UPDATE_INTERVAL`] until the returned handle is aborted
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        self.spawn_every(FAST_UPDATE_INTERVAL)
    }

    pub fn spawn_every(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let integration = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(error) = integration.poll().await {
                    warn!("Polling aria2 failed: {error:#}. Retrying in {RETRY_DELAY:?}");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        })
    }

    /// Dispatches a service call registered under the `aria2` domain
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The service is unknown
    /// - The call data is missing required fields
    /// - The daemon rejects the call
    pub async fn call_service(&self, service: &str, data: &Value) -> Result<String> {
        match service {
            SERVICE_START_DOWNLOAD => {
                let request = serde_json::from_value::<StartDownload>(data.clone())
                    .map_err(|error| InvalidInput(format!("Invalid {service} data: {error}")))?;
                self.start_download(&request).await
            }
            other => Err(InvalidInput(format!("Unknown service: {DOMAIN}.{other}")).into()),
        }
    }

    /// Queues `request.url` on the daemon and returns the new GID
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is rejected locally or by the daemon
    pub async fn start_download(&self, request: &StartDownload) -> Result<String> {
        info!("Starting download of {}", request.url);
        let options = DownloadOptions {
            dir: request.dir.clone(),
            out: request.out.clone(),
            ..Default::default()
        };
        self.client
            .add_uri(std::slice::from_ref(&request.url), &options)
            .await
    }

    /// Payload of the [`DOWNLOAD_LIST_URL`] view: every active, waiting and stopped download
    ///
    /// # Errors
    ///
    /// Returns an error if the downloads could not be listed
    pub async fn download_list(&self) -> Result<Vec<DownloadSummary>> {
        let downloads = self.fetch_downloads(&LISTED_KEYS).await?;
        Ok(downloads.iter().map(DownloadSummary::from).collect())
    }

    /// Current state of every sensor
    pub async fn states(&self) -> Vec<SensorState> {
        let snapshot = self.coordinator.snapshot().await;
        let mut states = self
            .stat_sensors
            .iter()
            .map(|sensor| sensor.state(snapshot.data.as_ref(), snapshot.last_update_success))
            .collect::<Vec<_>>();
        states.extend(self.gid_sensors.lock().await.iter().map(GidListSensor::state));
        states
    }

    /// Lists active, waiting and stopped downloads in one round trip
    async fn fetch_downloads(&self, keys: &[DownloadKey]) -> Result<Vec<Download>> {
        let calls = [
            RpcCall::tell_active(keys),
            RpcCall::tell_waiting(0, LIST_PAGE_SIZE, keys),
            RpcCall::tell_stopped(0, LIST_PAGE_SIZE, keys),
        ];

        let mut downloads = Vec::new();
        for (call, result) in calls.iter().zip(self.client.multicall(&calls).await?) {
            let value = result.map_err(Aria2Error::from)?;
            let mut batch = serde_json::from_value::<Vec<Download>>(value)
                .with_context(|| format!("Failed to parse {} result", call.method))?;
            downloads.append(&mut batch);
        }
        debug!("Fetched {} downloads", downloads.len());
        Ok(downloads)
    }

    async fn poll_downloads(&self) -> Result<Vec<DownloadStateChanged>> {
        let downloads = self.fetch_downloads(&TRACKED_KEYS).await?;
        let (changes, priming) = {
            let mut tracker = self.tracker.lock().await;
            let priming = !tracker.is_primed();
            (tracker.diff(&downloads), priming)
        };

        let mut sensors = self.gid_sensors.lock().await;
        for sensor in sensors.iter_mut() {
            if priming {
                sensor.seed(&downloads);
                continue;
            }
            for change in &changes {
                sensor.on_download_state_updated(&change.gid, change.status);
            }
            sensor.forget_missing(&downloads);
        }
        drop(sensors);

        for change in &changes {
            self.events.publish(change.clone());
        }
        Ok(changes)
    }
}
