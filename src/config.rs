use crate::storage::resolve_data_path;
use std::{env, path::PathBuf};
use tracing::warn;

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    /// Base url of the CRM backend; error reports are refused without it.
    pub crm_api_url: Option<String>,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let port = match env::var("PORT") {
            Ok(value) => value.parse::<u16>().unwrap_or_else(|_| {
                warn!("ignoring invalid PORT '{value}'");
                DEFAULT_PORT
            }),
            Err(_) => DEFAULT_PORT,
        };
        let crm_api_url = env::var("CRM_API_URL")
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        Self {
            port,
            data_path: resolve_data_path(),
            crm_api_url,
        }
    }
}
