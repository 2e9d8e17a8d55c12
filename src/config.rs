use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::model::Capacities;

pub const DEFAULT_ALLOWED_ORIGIN: &str = "https://iismitty.github.io";

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub allowed_origin: String,
    pub capacities: Capacities,
    pub require_password: bool,
    pub enforce_open_days: bool,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub legacy_import: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8888,
            data_dir: PathBuf::from("./data"),
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.into(),
            capacities: Capacities::default(),
            require_password: true,
            enforce_open_days: true,
            compact_threshold: 1000,
            metrics_port: None,
            legacy_import: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys keep their default; unparsable
    /// values are logged and also keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let c = &d.capacities;
        Self {
            bind: lookup("RANGEBOOK_BIND").unwrap_or_else(|| d.bind.clone()),
            port: parse_or(&lookup, "RANGEBOOK_PORT", d.port),
            data_dir: lookup("RANGEBOOK_DATA_DIR").map_or_else(|| d.data_dir.clone(), PathBuf::from),
            allowed_origin: lookup("RANGEBOOK_ALLOWED_ORIGIN")
                .unwrap_or_else(|| d.allowed_origin.clone()),
            capacities: Capacities {
                twenty_two: parse_or(&lookup, "RANGEBOOK_CAPACITY_22", c.twenty_two),
                rifle: parse_or(&lookup, "RANGEBOOK_CAPACITY_RIFLE", c.rifle),
            },
            require_password: parse_or(&lookup, "RANGEBOOK_REQUIRE_PASSWORD", d.require_password),
            enforce_open_days: parse_or(&lookup, "RANGEBOOK_ENFORCE_OPEN_DAYS", d.enforce_open_days),
            compact_threshold: parse_or(&lookup, "RANGEBOOK_COMPACT_THRESHOLD", d.compact_threshold),
            metrics_port: lookup("RANGEBOOK_METRICS_PORT").and_then(|s| match s.parse() {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!("ignoring RANGEBOOK_METRICS_PORT={s:?}: {e}");
                    None
                }
            }),
            legacy_import: lookup("RANGEBOOK_LEGACY_IMPORT").map(PathBuf::from),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => default,
        Some(s) => match s.trim().parse() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("ignoring {key}={s:?}: {e}");
                default
            }
        },
    }
}
