use crate::client::Aria2;
use crate::client::Aria2Error::Timeout;
use crate::entities::GlobalStat;
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// How often statistics and download states are polled
pub const FAST_UPDATE_INTERVAL: Duration = Duration::from_secs(3);
/// Pause after a failed poll before trying again
pub const RETRY_DELAY: Duration = Duration::from_secs(3);
/// Upper bound for a single statistics refresh
pub const UPDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Last known statistics and the health of the last refresh
#[derive(Default, Debug, Clone)]
pub struct CoordinatorState {
    pub data: Option<GlobalStat>,
    pub last_update_success: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Polls `aria2.getGlobalStat` on behalf of every statistic sensor
pub struct Coordinator {
    client: Arc<Aria2>,
    timeout: Duration,
    state: RwLock<CoordinatorState>,
}

impl Coordinator {
    #[must_use]
    pub fn new(client: Arc<Aria2>) -> Self {
        Self {
            client,
            timeout: UPDATE_TIMEOUT,
            state: RwLock::new(CoordinatorState::default()),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetches fresh statistics. On failure the previous data is kept but the
    /// coordinator reports itself unavailable until the next success.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or does not finish within the timeout
    pub async fn refresh(&self) -> Result<GlobalStat> {
        let fetch = tokio::time::timeout(self.timeout, self.client.get_global_stat());
        let result = match fetch.await {
            Ok(result) => result,
            Err(_) => {
                let millis = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                Err(Timeout(millis).into())
            }
        };

        let mut state = self.state.write().await;
        match &result {
            Ok(stat) => {
                debug!("Fetched aria2 global stat: {stat:?}");
                if !state.last_update_success && state.last_updated.is_some() {
                    info!("Connection to aria2 at {} restored", self.client.url());
                }
                state.data = Some(stat.clone());
                state.last_update_success = true;
                state.last_updated = Some(Utc::now());
            }
            Err(error) => {
                if state.last_update_success {
                    warn!("Error fetching aria2 stats from {}: {error:#}", self.client.url());
                } else {
                    debug!("aria2 at {} still unavailable: {error:#}", self.client.url());
                }
                state.last_update_success = false;
            }
        }

        result
    }

    pub async fn data(&self) -> Option<GlobalStat> {
        self.state.read().await.data.clone()
    }

    pub async fn available(&self) -> bool {
        self.state.read().await.last_update_success
    }

    pub async fn snapshot(&self) -> CoordinatorState {
        self.state.read().await.clone()
    }
}
