//!# aria2 Bridge
//!
//! Exposes a running [aria2](https://aria2.github.io/) daemon's JSON-RPC interface
//! to a home automation host: statistic sensors, download GID lists, a
//! `start_download` service and download state change events.
//!
//! aria2 does all the downloading. This crate only polls its RPC endpoint,
//! maps the responses onto entities and events, and forwards new downloads.
//!
//! ## Features
//!
//! - Typed JSON-RPC client (`aria2.getGlobalStat`, `aria2.tell*`, `aria2.addUri`, `system.multicall`, ...)
//! - RPC secret support
//! - Config flow validating host, port and secret against the daemon
//! - Download/upload speed and download count sensors
//! - Active and waiting GID list sensors
//! - `aria2_download_state_changed` events derived from polled statuses
//! - Download list payload for the `/api/aria_download_list` view
//!
//! ## Usage example
//!
//! ```rust,no_run
//! use anyhow::Result;
//! use aria2_bridge::config::EntryConfig;
//! use aria2_bridge::integration::Aria2Integration;
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<()> {
//!     let entry = EntryConfig::from_env()?;
//!     let integration = Aria2Integration::setup(entry).await?;
//!
//!     let mut events = integration.subscribe();
//!     let poller = integration.spawn();
//!
//!     let gid = integration
//!         .call_service("start_download", &json!({"url": "https://example.com/file.iso"}))
//!         .await?;
//!     println!("queued {gid}");
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{} is now {}", event.name, event.status);
//!     }
//!
//!     poller.abort();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod coordinator;
pub mod entities;
pub mod events;
pub mod integration;
pub mod sensor;
pub mod utils;

/// Domain services and device identifiers are registered under
pub const DOMAIN: &str = "aria2";
