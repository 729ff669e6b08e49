//! Sensor entities published to the host platform.
//!
//! Statistic sensors read the [`Coordinator`](crate::coordinator::Coordinator)
//! data. GID list sensors are pushed: they are seeded from the first download
//! snapshot and then follow download state change events.

use crate::DOMAIN;
use crate::entities::{Download, DownloadKey, DownloadStatus, GlobalStat, RpcCall};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

const BYTES_PER_MEGABYTE: f64 = 1_000_000.0;
const MEGABYTES_PER_SECOND: &str = "MB/s";

/// Device the sensors are grouped under
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: Option<String>,
}

impl DeviceInfo {
    #[must_use]
    pub fn new(host: &str, sw_version: Option<String>) -> Self {
        Self {
            identifiers: vec![(DOMAIN.to_string(), host.to_string())],
            name: aria_name(host),
            manufacturer: "aria2".to_string(),
            model: "aria2 JSON-RPC".to_string(),
            sw_version,
        }
    }
}

/// Prefix shared by every entity of one daemon
#[must_use]
pub fn aria_name(host: &str) -> String {
    format!("aria {host}")
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    DataRate,
}

/// Which global statistic a sensor shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    DownloadSpeed,
    UploadSpeed,
    NumActive,
    NumWaiting,
    NumStopped,
}

impl StatKind {
    pub const ALL: [StatKind; 5] = [
        StatKind::DownloadSpeed,
        StatKind::UploadSpeed,
        StatKind::NumActive,
        StatKind::NumWaiting,
        StatKind::NumStopped,
    ];

    #[must_use]
    pub fn sensor_name(self) -> &'static str {
        match self {
            StatKind::DownloadSpeed => "download speed",
            StatKind::UploadSpeed => "upload speed",
            StatKind::NumActive => "number of active download",
            StatKind::NumWaiting => "number of waiting download",
            StatKind::NumStopped => "number of stopped download",
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn value(self, stat: &GlobalStat) -> f64 {
        match self {
            StatKind::DownloadSpeed => stat.download_speed as f64 / BYTES_PER_MEGABYTE,
            StatKind::UploadSpeed => stat.upload_speed as f64 / BYTES_PER_MEGABYTE,
            StatKind::NumActive => stat.num_active as f64,
            StatKind::NumWaiting => stat.num_waiting as f64,
            StatKind::NumStopped => stat.num_stopped_total as f64,
        }
    }
}

/// Sensor backed by `aria2.getGlobalStat`
#[derive(Debug, Clone)]
pub struct StatSensor {
    kind: StatKind,
    name: String,
    device: DeviceInfo,
}

impl StatSensor {
    #[must_use]
    pub fn new(kind: StatKind, host: &str, device: DeviceInfo) -> Self {
        Self {
            kind,
            name: format!("{}-{}", aria_name(host), kind.sensor_name()),
            device,
        }
    }

    /// The five statistic sensors of one daemon
    #[must_use]
    pub fn all(host: &str, device: &DeviceInfo) -> Vec<StatSensor> {
        StatKind::ALL
            .into_iter()
            .map(|kind| StatSensor::new(kind, host, device.clone()))
            .collect()
    }

    #[must_use]
    pub fn kind(&self) -> StatKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn unit(&self) -> Option<&'static str> {
        match self.kind {
            StatKind::DownloadSpeed | StatKind::UploadSpeed => Some(MEGABYTES_PER_SECOND),
            _ => None,
        }
    }

    #[must_use]
    pub fn device_class(&self) -> Option<DeviceClass> {
        self.unit().map(|_| DeviceClass::DataRate)
    }

    #[must_use]
    pub fn state_class(&self) -> StateClass {
        StateClass::Measurement
    }

    /// Value rounded to two decimals, `None` while nothing was fetched yet
    #[must_use]
    pub fn native_value(&self, data: Option<&GlobalStat>) -> Option<f64> {
        data.map(|stat| (self.kind.value(stat) * 100.0).round() / 100.0)
    }

    #[must_use]
    pub fn state(&self, data: Option<&GlobalStat>, available: bool) -> SensorState {
        SensorState {
            name: self.name.clone(),
            unique_id: self.name.clone(),
            state: self
                .native_value(data)
                .map(|value| value.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            unit_of_measurement: self.unit(),
            device_class: self.device_class(),
            state_class: Some(self.state_class()),
            available,
            device: self.device.clone(),
        }
    }
}

/// Where a GID list sensor takes its initial content from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GidSource {
    Active,
    Waiting,
}

/// Sensor listing the GIDs currently in a set of states
#[derive(Debug, Clone)]
pub struct GidListSensor {
    name: String,
    states: Vec<DownloadStatus>,
    source: GidSource,
    gids: BTreeSet<String>,
    device: DeviceInfo,
}

impl GidListSensor {
    #[must_use]
    pub fn new(
        host: &str,
        sensor_name: &str,
        states: Vec<DownloadStatus>,
        source: GidSource,
        device: DeviceInfo,
    ) -> Self {
        Self {
            name: format!("{}-{sensor_name}", aria_name(host)),
            states,
            source,
            gids: BTreeSet::new(),
            device,
        }
    }

    /// The `active gids` and `waiting gids` sensors
    #[must_use]
    pub fn all(host: &str, device: &DeviceInfo) -> Vec<GidListSensor> {
        vec![
            GidListSensor::new(
                host,
                "active gids",
                vec![DownloadStatus::Active],
                GidSource::Active,
                device.clone(),
            ),
            GidListSensor::new(
                host,
                "waiting gids",
                vec![DownloadStatus::Waiting, DownloadStatus::Paused],
                GidSource::Waiting,
                device.clone(),
            ),
        ]
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call listing the downloads this sensor starts with
    #[must_use]
    pub fn seed_call(&self) -> RpcCall {
        let keys = [DownloadKey::Gid, DownloadKey::Status];
        match self.source {
            GidSource::Active => RpcCall::tell_active(&keys),
            GidSource::Waiting => RpcCall::tell_waiting(0, 1000, &keys),
        }
    }

    /// Replaces the tracked GIDs with the matching downloads
    pub fn seed(&mut self, downloads: &[Download]) {
        self.gids = downloads
            .iter()
            .filter(|download| download.status.is_some_and(|status| self.tracks(status)))
            .map(|download| download.gid.clone())
            .collect();
    }

    /// Adds the GID when its new status is tracked, drops it otherwise
    pub fn on_download_state_updated(&mut self, gid: &str, status: DownloadStatus) {
        if self.tracks(status) {
            self.gids.insert(gid.to_string());
        } else {
            self.gids.remove(gid);
        }
    }

    /// Drops GIDs aria2 no longer lists, e.g. purged download results
    pub fn forget_missing(&mut self, downloads: &[Download]) {
        let listed = downloads
            .iter()
            .map(|download| download.gid.as_str())
            .collect::<HashSet<_>>();
        self.gids.retain(|gid| listed.contains(gid.as_str()));
    }

    #[must_use]
    pub fn tracks(&self, status: DownloadStatus) -> bool {
        self.states.contains(&status)
    }

    /// Sorted GIDs, one per line
    #[must_use]
    pub fn native_value(&self) -> String {
        self.gids.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    #[must_use]
    pub fn state(&self) -> SensorState {
        SensorState {
            name: self.name.clone(),
            unique_id: self.name.clone(),
            state: self.native_value(),
            unit_of_measurement: None,
            device_class: None,
            state_class: None,
            available: true,
            device: self.device.clone(),
        }
    }
}

/// Snapshot of one entity, ready to be written to the host's state machine
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SensorState {
    pub name: String,
    pub unique_id: String,
    pub state: String,
    pub unit_of_measurement: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub available: bool,
    pub device: DeviceInfo,
}
