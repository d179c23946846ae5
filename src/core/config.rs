//! Environment-driven configuration
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Calendar import interval
//! - 1.0.0: Initial configuration for transport, storage, scheduler and calendar export

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_path: String,
    pub log_level: String,
    /// User identifiers that receive the admin role when onboarded
    pub admin_users: Vec<String>,
    /// Onboard unknown users who open a direct conversation
    pub allow_new_users: bool,
    /// Prefix for calendar links handed out to users
    pub base_url: String,
    /// Calendar export listener, disabled when unset
    pub calendar_bind_addr: Option<SocketAddr>,
    pub scheduler_tick: Duration,
    pub max_concurrent_sends: usize,
    /// Time between two refreshes of subscribed calendars
    pub import_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let discord_token = env::var("DISCORD_TOKEN").context("DISCORD_TOKEN must be set")?;

        let calendar_bind_addr = match env::var("CALENDAR_BIND_ADDR") {
            Ok(addr) if !addr.trim().is_empty() => Some(
                addr.trim()
                    .parse()
                    .with_context(|| format!("Invalid CALENDAR_BIND_ADDR: {addr}"))?,
            ),
            _ => None,
        };

        Ok(Config {
            discord_token,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "remindme.db".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            admin_users: parse_list(&env::var("ADMIN_USERS").unwrap_or_default()),
            allow_new_users: parse_bool("ALLOW_NEW_USERS", false)?,
            base_url: env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            calendar_bind_addr,
            scheduler_tick: Duration::from_secs(parse_number("SCHEDULER_TICK_SECS", 5)?),
            max_concurrent_sends: parse_number("MAX_CONCURRENT_SENDS", 16)? as usize,
            import_interval: Duration::from_secs(parse_number("ICAL_IMPORT_INTERVAL_SECS", 1800)?),
        })
    }

    pub fn is_admin(&self, user_identifier: &str) -> bool {
        self.admin_users.iter().any(|u| u == user_identifier)
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(anyhow::anyhow!("Invalid boolean for {key}: {other}")),
        },
        Err(_) => Ok(default),
    }
}

fn parse_number(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid number for {key}: {value}")),
        Err(_) => Ok(default),
    }
}
