// src/config.rs - Configuration loading (defaults -> TOML file -> environment)
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub keep_alive: u64,
    pub client_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiration_hours: i64,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub require_https: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

// Dummy defaults for tests and local runs (no ENV read here)
impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev_only_secret_at_least_32_chars!".to_string(),
            token_expiration_hours: 24,
            bcrypt_cost: 10,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
            keep_alive: 30,
            client_timeout: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:bloodlink.db".to_string(),
            max_connections: 10,
            connect_timeout: 30,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            require_https: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!("JWT secret must be at least 32 characters");
        }
        if !(4..=14).contains(&self.auth.bcrypt_cost) {
            anyhow::bail!("bcrypt cost must be between 4 and 14");
        }
        if self.auth.token_expiration_hours < 1 {
            anyhow::bail!("Token expiration must be at least 1 hour");
        }
        Ok(())
    }
}

fn load_env_file() {
    // Missing .env is fine; explicit ENV_FILE that fails to load is not fatal
    // either but worth a warning.
    let path = env::var("ENV_FILE").unwrap_or_else(|_| ".env".to_string());
    if Path::new(&path).exists() {
        if let Err(e) = dotenvy::from_filename(&path) {
            log::warn!("Failed to load env file {}: {}", path, e);
        }
    }
}

pub fn load_config() -> Result<Config> {
    load_env_file();

    let mut config = if let Ok(config_file) = env::var("CONFIG_FILE") {
        let config_str = fs::read_to_string(&config_file)
            .with_context(|| format!("Failed to read config file: {}", config_file))?;
        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_file))?
    } else {
        Config::default()
    };

    override_with_env(&mut config);

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

fn override_with_env(config: &mut Config) {
    if let Ok(host) = env::var("BIND_ADDRESS") {
        config.server.host = host;
    }
    if let Ok(port) = env::var("BLOODLINK_PORT") {
        if let Ok(port) = port.parse::<u16>() {
            config.server.port = port;
        }
    }
    if let Ok(workers) = env::var("BLOODLINK_WORKERS") {
        if let Ok(workers) = workers.parse::<usize>() {
            config.server.workers = Some(workers);
        }
    }
    if let Ok(jwt_secret) = env::var("JWT_SECRET") {
        config.auth.jwt_secret = jwt_secret;
    }
    if let Ok(url) = env::var("DATABASE_URL") {
        config.database.url = url;
    }
    if let Ok(origins) = env::var("ALLOWED_ORIGINS") {
        config.security.allowed_origins = origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(level) = env::var("LOG_LEVEL") {
        config.logging.level = level;
    }
}

pub fn is_production() -> bool {
    env::var("BLOODLINK_ENV").as_deref() == Ok("production")
}

pub fn validate_production_config(config: &Config) -> Result<()> {
    if config.auth.jwt_secret == AuthConfig::default().jwt_secret {
        anyhow::bail!("Default JWT secret is not allowed in production");
    }
    if config.security.allowed_origins.contains(&"*".to_string()) {
        anyhow::bail!("Wildcard CORS origins not allowed in production!");
    }
    Ok(())
}
