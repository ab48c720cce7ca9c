use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub public_rps: u32,
    pub font_path: PathBuf,
    pub model_timeout: Duration,
    pub relevance_threshold: f32,
    pub vector_candidates: usize,
    pub vector_limit: usize,
    pub repair_interval: Duration,
    pub log_format: LogFormat,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);
        Ok(Self {
            server_address: vars.required("SERVER_ADDRESS")?,
            database_url: vars.required("DATABASE_URL")?,
            openai_api_key: vars.required("OPENAI_API_KEY")?,
            public_rps: vars.parse_required("PUBLIC_RPS")?,
            openai_base_url: vars.or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            chat_model: vars.or("CHAT_MODEL", "gpt-4o"),
            embedding_model: vars.or("EMBEDDING_MODEL", "text-embedding-ada-002"),
            font_path: PathBuf::from(vars.or("FONT_PATH", "assets/fonts/DejaVuSans.ttf")),
            model_timeout: Duration::from_secs(vars.parse_or("MODEL_TIMEOUT_SECS", 30)?),
            relevance_threshold: vars.parse_or("RELEVANCE_THRESHOLD", 0.85)?,
            vector_candidates: vars.parse_or("VECTOR_CANDIDATES", 200)?,
            vector_limit: vars.parse_or("VECTOR_LIMIT", 10)?,
            repair_interval: Duration::from_secs(vars.parse_or("REPAIR_INTERVAL_SECS", 300)?),
            log_format: match vars.or("LOG_FORMAT", "pretty").to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        })
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, name: &str) -> Result<String> {
        (self.0)(name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("Missing environment variable: {}", name)))
    }

    fn or(&self, name: &str, default: &str) -> String {
        (self.0)(name)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse_required<T>(&self, name: &str) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        parse_value(name, &self.required(name)?)
    }

    fn parse_or<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.0)(name).filter(|v| !v.trim().is_empty()) {
            Some(raw) => parse_value(name, &raw),
            None => Ok(default),
        }
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e)))
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}
