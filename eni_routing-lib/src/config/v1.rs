use serde::{Deserialize, Serialize};

use crate::config;
use crate::interfaces::InventoryEntry;
use crate::routing::{Family, HardwareAddr};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: u8,
    pub(super) migration: Option<Migration>,
    pub(super) interfaces: Option<Vec<Interface>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(super) struct Migration {
    families: Option<Vec<Family>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(super) struct Interface {
    mac: String,
    number: u32,
}

pub fn wrong_keys(table: &toml::Table) -> Vec<String> {
    let mut wrong_keys = Vec::new();
    for (key, value) in table.iter() {
        if key == "version" {
            continue;
        }
        if key == "migration" {
            if let Some(migration) = value.as_table() {
                for (k, _v) in migration.iter() {
                    if k == "families" {
                        continue;
                    }
                    wrong_keys.push(format!("migration.{k}"));
                }
            }
            continue;
        }
        if key == "interfaces" {
            if let Some(interfaces) = value.as_array() {
                for (i, entry) in interfaces.iter().enumerate() {
                    if let Some(entry) = entry.as_table() {
                        for (k, _v) in entry.iter() {
                            if k == "mac" || k == "number" {
                                continue;
                            }
                            wrong_keys.push(format!("interfaces[{i}].{k}"));
                        }
                    }
                }
            }
            continue;
        }
        wrong_keys.push(key.clone());
    }
    wrong_keys
}

impl TryFrom<Config> for config::Config {
    type Error = config::Error;

    fn try_from(value: Config) -> Result<Self, Self::Error> {
        let families = convert_families(value.migration)?;
        let interfaces = value
            .interfaces
            .unwrap_or_default()
            .into_iter()
            .map(|iface| -> Result<InventoryEntry, config::Error> {
                let mac = iface.mac.parse::<HardwareAddr>()?;
                Ok(InventoryEntry {
                    mac,
                    number: iface.number,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(config::Config { families, interfaces })
    }
}

fn convert_families(value: Option<Migration>) -> Result<Vec<Family>, config::Error> {
    match value.and_then(|m| m.families) {
        None => Ok(vec![Family::V4]),
        Some(families) if families.is_empty() => Err(config::Error::NoFamilies),
        Some(families) => {
            for (i, family) in families.iter().enumerate() {
                if families[..i].contains(family) {
                    return Err(config::Error::DuplicateFamily(*family));
                }
            }
            Ok(families)
        }
    }
}
