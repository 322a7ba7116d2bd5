use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dashboard_engine::ClientSettings;
use dashboard_logging::LogDestination;
use log::LevelFilter;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_ASSET_URL: &str = "http://localhost:3000";

/// Runtime configuration read from the environment (and `.env`, if present).
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub api_url: Url,
    pub asset_url: Url,
    /// `None` when `DASHBOARD_REQUEST_TIMEOUT_SECS=0`.
    pub request_timeout: Option<Duration>,
    pub log_destination: LogDestination,
    pub log_level: LevelFilter,
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = parse_url(
            "DASHBOARD_API_URL",
            lookup("DASHBOARD_API_URL").as_deref().unwrap_or(DEFAULT_API_URL),
        )?;
        let asset_url = parse_url(
            "DASHBOARD_ASSET_URL",
            lookup("DASHBOARD_ASSET_URL")
                .as_deref()
                .unwrap_or(DEFAULT_ASSET_URL),
        )?;

        let defaults = ClientSettings::new(api_url.clone(), asset_url.clone());
        let request_timeout = match lookup("DASHBOARD_REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("DASHBOARD_REQUEST_TIMEOUT_SECS={raw:?}"))?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => defaults.request_timeout,
        };

        let log_destination = match lookup("DASHBOARD_LOG") {
            Some(raw) => raw
                .parse()
                .map_err(|err: String| anyhow!("DASHBOARD_LOG: {err}"))?,
            None => LogDestination::default(),
        };
        let log_level = match lookup("DASHBOARD_LOG_LEVEL") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("DASHBOARD_LOG_LEVEL={raw:?}"))?,
            None => LevelFilter::Info,
        };

        Ok(Self {
            api_url,
            asset_url,
            request_timeout,
            log_destination,
            log_level,
        })
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: self.request_timeout,
            ..ClientSettings::new(self.api_url.clone(), self.asset_url.clone())
        }
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).with_context(|| format!("{key}={raw:?} is not a valid URL"))
}
