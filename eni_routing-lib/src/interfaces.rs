//! Lookup between hardware addresses and logical interface numbers.

use async_trait::async_trait;

use std::collections::HashMap;

use crate::routing::{Error, HardwareAddr};

/// Bidirectional lookup backed by the node's interface inventory.
///
/// Callers do not cache answers; every call is a fresh query.
#[async_trait]
pub trait InterfaceResolver: Send + Sync {
    async fn interface_number_by_mac(&self, mac: &HardwareAddr) -> Result<u32, Error>;
    async fn mac_by_interface_number(&self, number: u32) -> Result<HardwareAddr, Error>;
}

/// One attached interface as recorded in the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub mac: HardwareAddr,
    pub number: u32,
}

/// Resolver over a fixed inventory, loaded from the configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    by_mac: HashMap<HardwareAddr, u32>,
    by_number: HashMap<u32, HardwareAddr>,
}

impl StaticInventory {
    /// Builds the lookup tables. A MAC or number listed twice is rejected.
    pub fn new(entries: impl IntoIterator<Item = InventoryEntry>) -> Result<Self, Error> {
        let mut inventory = Self::default();
        for entry in entries {
            if inventory.by_mac.contains_key(&entry.mac) {
                return Err(Error::General(format!("duplicate inventory entry for {}", entry.mac)));
            }
            if inventory.by_number.contains_key(&entry.number) {
                return Err(Error::General(format!(
                    "duplicate inventory entry for interface number {}",
                    entry.number
                )));
            }
            inventory.by_mac.insert(entry.mac.clone(), entry.number);
            inventory.by_number.insert(entry.number, entry.mac);
        }
        Ok(inventory)
    }

    pub fn len(&self) -> usize {
        self.by_mac.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mac.is_empty()
    }
}

#[async_trait]
impl InterfaceResolver for StaticInventory {
    async fn interface_number_by_mac(&self, mac: &HardwareAddr) -> Result<u32, Error> {
        self.by_mac
            .get(mac)
            .copied()
            .ok_or_else(|| Error::UnknownHardwareAddr(mac.clone()))
    }

    async fn mac_by_interface_number(&self, number: u32) -> Result<HardwareAddr, Error> {
        self.by_number
            .get(&number)
            .cloned()
            .ok_or(Error::UnknownInterfaceNumber(number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mac: &str, number: u32) -> InventoryEntry {
        InventoryEntry {
            mac: mac.parse().expect("valid mac"),
            number,
        }
    }

    #[tokio::test]
    async fn resolves_both_directions() -> anyhow::Result<()> {
        let inventory = StaticInventory::new([entry("02:00:00:00:00:01", 1), entry("02:00:00:00:00:02", 2)])?;
        assert_eq!(inventory.len(), 2);

        let mac: HardwareAddr = "02:00:00:00:00:02".parse()?;
        assert_eq!(inventory.interface_number_by_mac(&mac).await?, 2);
        assert_eq!(inventory.mac_by_interface_number(2).await?, mac);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_entries_fail() -> anyhow::Result<()> {
        let inventory = StaticInventory::new([entry("02:00:00:00:00:01", 1)])?;

        let mac: HardwareAddr = "02:00:00:00:00:09".parse()?;
        assert!(matches!(
            inventory.interface_number_by_mac(&mac).await,
            Err(Error::UnknownHardwareAddr(_))
        ));
        assert!(matches!(
            inventory.mac_by_interface_number(9).await,
            Err(Error::UnknownInterfaceNumber(9))
        ));
        Ok(())
    }

    #[test]
    fn duplicates_are_rejected() {
        assert!(StaticInventory::new([entry("02:00:00:00:00:01", 1), entry("02:00:00:00:00:01", 2)]).is_err());
        assert!(StaticInventory::new([entry("02:00:00:00:00:01", 1), entry("02:00:00:00:00:02", 1)]).is_err());
        assert!(StaticInventory::new(Vec::new()).map(|inv| inv.is_empty()).unwrap_or(false));
    }
}
