use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub rest_addr: SocketAddr,
    /// When unset the engine runs purely in memory.
    pub database_url: Option<String>,
    /// Optional engine tuning file (YAML).
    pub engine_config_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: "0.0.0.0:8080".parse().unwrap(),
            database_url: None,
            engine_config_path: None,
        }
    }
}

#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "config: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Ok(addr) = std::env::var("LUMIWATCH_REST_ADDR") {
            cfg.rest_addr = addr
                .parse()
                .map_err(|_| ConfigError(format!("invalid LUMIWATCH_REST_ADDR: {addr}")))?;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                cfg.database_url = Some(url);
            }
        }
        if let Ok(path) = std::env::var("LUMIWATCH_ENGINE_CONFIG") {
            if !path.is_empty() {
                cfg.engine_config_path = Some(PathBuf::from(path));
            }
        }
        Ok(cfg)
    }
}
