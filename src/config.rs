use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

use crate::error::StartupError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 7860;
const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub artifacts_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, StartupError> {
        let _ = dotenv().is_ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StartupError> {
        let host = lookup("HOST")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                StartupError::Config(format!("PORT must be a valid u16 number, got {raw:?}"))
            })?,
            None => DEFAULT_PORT,
        };

        let artifacts_dir = lookup("ARTIFACTS_DIR")
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ARTIFACTS_DIR.to_string())
            .into();

        Ok(Self {
            host,
            port,
            artifacts_dir,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
