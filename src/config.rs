//! Connection settings and the user-facing flow that validates them.

use crate::client::Aria2Error::{Configuration, Environment};
use crate::client::{Aria2, DEFAULT_TIMEOUT_MS};
use crate::utils::default_port;
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env::{self, VarError};

/// A stored, validated connection to one aria2 daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EntryConfig {
    pub host: String,
    pub port: u16,
    pub access_token: Option<String>,
    #[serde(default)]
    pub secure: bool,
}

impl EntryConfig {
    #[must_use]
    pub fn title(&self) -> String {
        format!("aria2 {}", self.host)
    }

    /// Reads `ARIA2_HOST`, `ARIA2_PORT`, `ARIA2_SECRET` and `ARIA2_SECURE`
    ///
    /// # Errors
    ///
    /// Returns an error if `ARIA2_HOST` is missing or `ARIA2_PORT` is not a port number
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key))
    }

    /// Same as [`EntryConfig::from_env`], reading variables through `var`
    ///
    /// # Errors
    ///
    /// Returns an error if `ARIA2_HOST` is missing or `ARIA2_PORT` is not a port number
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let host = var("ARIA2_HOST")
            .map_err(Environment)
            .context("ARIA2_HOST must be set")?;
        let port = match var("ARIA2_PORT") {
            Ok(port) => port
                .parse()
                .map_err(|_| Configuration(format!("ARIA2_PORT is not a port: {port}")))?,
            Err(_) => default_port(&host),
        };
        let access_token = var("ARIA2_SECRET").ok().filter(|s| !s.is_empty());
        let secure = var("ARIA2_SECURE")
            .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            host,
            port,
            access_token,
            secure,
        })
    }

    /// Builds a client for this entry
    ///
    /// # Errors
    ///
    /// Returns an error if the host is empty
    pub fn client(&self) -> Result<Aria2> {
        self.client_with_timeout(DEFAULT_TIMEOUT_MS)
    }

    /// Builds a client for this entry with a custom request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the host is empty
    pub fn client_with_timeout(&self, timeout_ms: u64) -> Result<Aria2> {
        let mut builder = Aria2::builder()
            .host(self.host.clone())
            .port(self.port)
            .secure(self.secure)
            .timeout(timeout_ms);
        if let Some(token) = &self.access_token {
            builder = builder.secret(token.clone());
        }
        builder.build()
    }
}

/// What the user typed into the setup form
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct UserInput {
    pub host: String,
    pub port: Option<u16>,
    pub access_token: Option<String>,
    #[serde(default)]
    pub secure: bool,
}

/// Outcome of a flow step
#[derive(Debug, PartialEq)]
pub enum FlowResult {
    /// Show the form, prefilled with `defaults`, along with any field errors
    Form {
        defaults: UserInput,
        errors: HashMap<String, String>,
    },
    /// Input is valid and the daemon answered
    CreateEntry { title: String, data: EntryConfig },
}

/// Single step setup flow: ask for host, port and secret, then check the daemon answers
#[derive(Default)]
pub struct ConfigFlow {
    timeout_ms: Option<u64>,
}

impl ConfigFlow {
    pub const VERSION: u32 = 1;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout for the connection check, in milliseconds
    #[must_use]
    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub async fn step_user(&self, input: Option<UserInput>) -> FlowResult {
        let Some(input) = input else {
            return FlowResult::Form {
                defaults: UserInput::default(),
                errors: HashMap::new(),
            };
        };

        let mut errors = HashMap::new();
        let host = input.host.trim().to_string();
        if host.is_empty() {
            errors.insert("host".to_string(), "required".to_string());
            return FlowResult::Form {
                defaults: input,
                errors,
            };
        }

        let entry = EntryConfig {
            port: input.port.unwrap_or_else(|| default_port(&host)),
            access_token: input.access_token.clone().filter(|s| !s.is_empty()),
            secure: input.secure,
            host,
        };

        match self.check_connection(&entry).await {
            Ok(()) => FlowResult::CreateEntry {
                title: entry.title(),
                data: entry,
            },
            Err(error) => {
                warn!("Cannot connect to aria2 at {}: {error:#}", entry.host);
                errors.insert("base".to_string(), "cannot_connect".to_string());
                FlowResult::Form {
                    defaults: UserInput {
                        port: Some(entry.port),
                        ..input
                    },
                    errors,
                }
            }
        }
    }

    async fn check_connection(&self, entry: &EntryConfig) -> Result<()> {
        let client = entry.client_with_timeout(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))?;
        let options = client.get_global_option().await?;
        debug!("aria2 answered with {} global options", options.len());
        Ok(())
    }
}
