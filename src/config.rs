use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for CatalogBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("unknown CATALOG_BACKEND {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// How long a query waits for a connection before giving up.
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: CatalogBackend,
    /// Only present for the postgres backend.
    pub database: Option<DatabaseConfig>,
    pub snapshot_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = std::env::var("CATALOG_BACKEND")
            .unwrap_or_else(|_| "postgres".into())
            .parse::<CatalogBackend>()?;

        let database = match backend {
            CatalogBackend::Postgres => Some(DatabaseConfig {
                url: std::env::var("DATABASE_URL")?,
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(10),
                acquire_timeout_secs: std::env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(5),
            }),
            CatalogBackend::Memory => None,
        };

        let snapshot_path = std::env::var("SNAPSHOT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("product-storage.json"));

        Ok(Self {
            backend,
            database,
            snapshot_path,
        })
    }
}
