//! INI configuration for the daemon.
//!
//! ```ini
//! [connection]
//! listen = 0.0.0.0:6633
//!
//! [openflow]
//! read_timeout = 5
//! write_timeout = 5
//!
//! [log]
//! level = info
//! ```
//!
//! Every key is optional; defaults match the values above with the listener
//! on localhost.

use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use log::LevelFilter;
use thiserror::Error;

use crate::session::SessionConfig;

const CONN_SECTION: &str = "connection";
const LISTEN_KEY: &str = "listen";
const OPENFLOW_SECTION: &str = "openflow";
const READ_TIMEOUT_KEY: &str = "read_timeout";
const WRITE_TIMEOUT_KEY: &str = "write_timeout";
const LOG_SECTION: &str = "log";
const LEVEL_KEY: &str = "level";

pub const DEFAULT_LISTEN: &str = "127.0.0.1:6633";

#[derive(Debug, Error)]
pub enum ConfError {
    #[error("failed to load the configuration file: {0}")]
    Ini(#[from] ini::Error),
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub listen: SocketAddr,
    pub session: SessionConfig,
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            listen: DEFAULT_LISTEN.parse().expect("default listen address"),
            session: SessionConfig::default(),
            log_level: LevelFilter::Info,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfError> {
        let ini = Ini::load_from_file(path)?;
        let mut conf = Config::default();

        if let Some(section) = ini.section(Some(CONN_SECTION)) {
            if let Some(listen) = section.get(LISTEN_KEY) {
                conf.listen = parse_key(LISTEN_KEY, listen)?;
            }
        }
        if let Some(section) = ini.section(Some(OPENFLOW_SECTION)) {
            if let Some(secs) = section.get(READ_TIMEOUT_KEY) {
                conf.session.read_timeout = Duration::from_secs(parse_key(READ_TIMEOUT_KEY, secs)?);
            }
            if let Some(secs) = section.get(WRITE_TIMEOUT_KEY) {
                conf.session.write_timeout =
                    Duration::from_secs(parse_key(WRITE_TIMEOUT_KEY, secs)?);
            }
        }
        if let Some(section) = ini.section(Some(LOG_SECTION)) {
            if let Some(level) = section.get(LEVEL_KEY) {
                conf.log_level = parse_key(LEVEL_KEY, level)?;
            }
        }
        Ok(conf)
    }
}

fn parse_key<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfError> {
    value.parse().map_err(|_| ConfError::Invalid {
        key,
        value: value.to_string(),
    })
}
