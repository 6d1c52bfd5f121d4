use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `production` hides panic details from error responses.
    pub env: String,
    pub bind_addr: SocketAddr,
    pub addons_dir: PathBuf,
    /// Bearer token for the module management API. Unset means open.
    pub admin_token: Option<String>,
    /// Install and activate `auto_install` modules at startup.
    pub auto_install: bool,
    pub cors_origins: Vec<String>,
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let bind_addr = match get("ERP_BIND_ADDR") {
            Some(v) => v.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %v, "invalid ERP_BIND_ADDR, using {DEFAULT_BIND_ADDR}");
                default_bind_addr()
            }),
            None => default_bind_addr(),
        };

        Self {
            env: get("ERP_ENV").unwrap_or_else(|| "development".to_string()),
            bind_addr,
            addons_dir: get("ADDONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("addons")),
            admin_token: get("ERP_ADMIN_TOKEN").filter(|t| !t.trim().is_empty()),
            auto_install: get("ERP_AUTO_INSTALL")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
            cors_origins: get("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
