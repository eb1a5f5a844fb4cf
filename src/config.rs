//! Configuration for the tracker service
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;

/// iEndorse endorsement period tracker
#[derive(Parser, Debug, Clone)]
#[command(name = "iendorse-tracker")]
#[command(about = "Endorsement period tracking service for iEndorse")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "iendorse")]
    pub mongodb_db: String,

    /// Enable development mode (in-memory storage fallback, admin auth disabled)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// API key for admin endpoints (required in production)
    #[arg(long, env = "API_KEY_ADMIN")]
    pub api_key_admin: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Check whether a presented admin key is acceptable
    ///
    /// Dev mode skips the check entirely.
    pub fn admin_key_matches(&self, presented: Option<&str>) -> bool {
        if self.dev_mode {
            return true;
        }
        match (&self.api_key_admin, presented) {
            (Some(expected), Some(key)) => expected == key,
            _ => false,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.api_key_admin.is_none() {
            return Err("API_KEY_ADMIN is required in production mode".to_string());
        }
        Ok(())
    }
}
