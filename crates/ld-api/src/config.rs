use std::env;
use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is not a valid socket address: {value}")]
    InvalidAddr { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub control_plane_api_key: String,
}

impl AppConfig {
    /// `LISTEN_ADDR` (default `0.0.0.0:8080`) and `CONTROL_PLANE_API_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen = env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
        let listen_addr = listen.parse().map_err(|_| ConfigError::InvalidAddr {
            var: "LISTEN_ADDR",
            value: listen.clone(),
        })?;

        let control_plane_api_key = env::var("CONTROL_PLANE_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("CONTROL_PLANE_API_KEY"))?;

        Ok(Self {
            listen_addr,
            control_plane_api_key,
        })
    }
}
