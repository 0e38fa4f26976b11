// src/config/mod.rs
// All tunables come from the environment, with .env support via dotenvy.

use once_cell::sync::Lazy;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct TryonConfig {
    // ── Server Configuration
    pub host: String,
    pub port: u16,

    // ── Upload Storage
    pub uploads_dir: String,
    pub max_upload_mb: usize,

    // ── Generation Vendors
    pub gemini_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,

    // ── Logging Configuration
    pub log_level: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            // Trim whitespace and strip inline comments before parsing
            let clean_val = val.split('#').next().unwrap_or("").trim();
            clean_val.parse::<T>().unwrap_or(default)
        }
        Err(_) => default,
    }
}

fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryonConfig {
    pub fn from_env() -> Self {
        // Load from .env file first if it exists
        let _ = dotenvy::dotenv();

        Self {
            host: env_var_or("TRYON_HOST", "0.0.0.0".to_string()),
            port: env_var_or("TRYON_PORT", 3000),
            uploads_dir: env_var_or("TRYON_UPLOADS_DIR", "./uploads".to_string()),
            max_upload_mb: env_var_or("TRYON_MAX_UPLOAD_MB", 10),
            gemini_api_key: env_var_opt("GEMINI_API_KEY"),
            anthropic_api_key: env_var_opt("ANTHROPIC_API_KEY"),
            log_level: env_var_or("TRYON_LOG_LEVEL", "info".to_string()),
        }
    }

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Upload body ceiling in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    /// True when at least one generation vendor key is configured
    pub fn generation_enabled(&self) -> bool {
        self.gemini_api_key.is_some() || self.anthropic_api_key.is_some()
    }
}

// Global config instance - loaded once at startup
pub static CONFIG: Lazy<TryonConfig> = Lazy::new(TryonConfig::from_env);
