use thiserror::Error;

use std::path::Path;
use tokio::fs;

use crate::interfaces::{InventoryEntry, StaticInventory};
use crate::routing::{self, Family};

mod v1;

pub const DEFAULT_PATH: &str = "/etc/eni-routing/config.toml";
pub const ENV_VAR: &str = "ENI_ROUTING_CONFIG_PATH";

#[derive(Debug, PartialEq)]
pub struct Config {
    pub families: Vec<Family>,
    pub interfaces: Vec<InventoryEntry>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration file not found")]
    NoFile,
    #[error("Unable to determine configuration version")]
    VersionNotFound,
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Deserialization error: {0}")]
    TomlDeserialization(#[from] toml::de::Error),
    #[error("Unsupported config version: {0}")]
    VersionMismatch(i64),
    #[error("No address families to migrate")]
    NoFamilies,
    #[error("Address family listed twice: {0}")]
    DuplicateFamily(Family),
    #[error("Invalid interface entry: {0}")]
    Inventory(#[from] routing::Error),
}

impl Config {
    /// Interface inventory used to resolve interface numbers.
    pub fn inventory(&self) -> Result<StaticInventory, Error> {
        let inventory = StaticInventory::new(self.interfaces.iter().cloned())?;
        Ok(inventory)
    }
}

pub async fn read(path: &Path) -> Result<Config, Error> {
    let content = fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NoFile
        } else {
            Error::IO(e)
        }
    })?;
    parse(&content)
}

fn parse(content: &str) -> Result<Config, Error> {
    let table = content.parse::<toml::Table>()?;
    let version = table
        .get("version")
        .and_then(|v| v.as_integer())
        .ok_or(Error::VersionNotFound)?;

    match version {
        1 => {
            let res = toml::from_str::<v1::Config>(content)?;
            let wrong_keys = v1::wrong_keys(&table);
            for key in wrong_keys.iter() {
                tracing::warn!(%key, "ignoring unsupported key in configuration file");
            }
            let config: Config = res.try_into()?;
            // surface duplicate entries at load time
            config.inventory()?;
            Ok(config)
        }
        _ => Err(Error::VersionMismatch(version)),
    }
}
