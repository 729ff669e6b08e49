use crate::entities::Download;
use crate::entities::DownloadStatus::{Active, Complete};
use byte_unit::{Byte, UnitType};

/// Port aria2 listens on for RPC unless `--rpc-listen-port` says otherwise
pub const ARIA2_DEFAULT_PORT: u16 = 6800;

const RPC_PATH: &str = "/jsonrpc";

/// Default port for a host: the scheme's port when one is given, aria2's otherwise
#[must_use]
pub fn default_port(host: &str) -> u16 {
    if host.starts_with("https://") {
        443
    } else if host.starts_with("http://") {
        80
    } else {
        ARIA2_DEFAULT_PORT
    }
}

/// Builds the JSON-RPC endpoint from a host that may or may not carry a scheme.
///
/// An explicit `http://` or `https://` wins over `secure`.
#[must_use]
pub fn rpc_url(host: &str, port: u16, secure: bool) -> String {
    let (scheme, bare) = if let Some(bare) = host.strip_prefix("https://") {
        ("https", bare)
    } else if let Some(bare) = host.strip_prefix("http://") {
        ("http", bare)
    } else if secure {
        ("https", host)
    } else {
        ("http", host)
    };
    let bare = bare.trim_end_matches('/');
    format!("{scheme}://{bare}:{port}{RPC_PATH}")
}

/// Formats bytes/sec for the download list, e.g. `98.77 KB/s`
#[must_use]
pub fn format_speed(bytes_per_second: u64) -> String {
    format!(
        "{:#.2}/s",
        Byte::from(bytes_per_second).get_appropriate_unit(UnitType::Decimal)
    )
}

impl Download {
    #[must_use]
    pub fn calculate_size(&self) -> String {
        let size = Byte::from(self.total_length);
        format!("{:#.2}", size.get_appropriate_unit(UnitType::Decimal))
    }

    /// Completion in percent, 0 while the total length is still unknown
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn calculate_progress(&self) -> f64 {
        if matches!(self.status, Some(Complete)) {
            return 100.0;
        }
        Some(self.completed_length as f64 / self.total_length as f64 * 100.0)
            .map(f64::round)
            .take_if(|x| x.is_finite())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn calculate_speed(&self) -> String {
        if !matches!(self.status, Some(Active)) {
            return String::new();
        }

        Some(self.download_speed)
            .take_if(|speed| *speed > 0u64)
            .map(|speed| format!("({})", format_speed(speed)))
            .unwrap_or_default()
    }
}
