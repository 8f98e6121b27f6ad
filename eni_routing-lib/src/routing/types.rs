//! Domain types decoupled from the raw netlink wire format.

use cidr::{IpCidr, IpInet};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use super::Error;

/// Address family a rule or route listing is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    #[serde(rename = "ipv4")]
    V4,
    #[serde(rename = "ipv6")]
    V6,
}

impl Family {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => write!(f, "ipv4"),
            Family::V6 => write!(f, "ipv6"),
        }
    }
}

/// Link-layer address of an interface.
///
/// Printed as lowercase colon separated hex, the same format the node
/// inventory uses.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HardwareAddr(Vec<u8>);

impl HardwareAddr {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for HardwareAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for byte in &self.0 {
            if !first {
                write!(f, ":")?;
            }
            write!(f, "{byte:02x}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for HardwareAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HardwareAddr({self})")
    }
}

impl FromStr for HardwareAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::InvalidHardwareAddr(s.to_string()));
        }
        s.split(':')
            .map(|octet| {
                if octet.len() != 2 {
                    return Err(Error::InvalidHardwareAddr(s.to_string()));
                }
                u8::from_str_radix(octet, 16).map_err(|_| Error::InvalidHardwareAddr(s.to_string()))
            })
            .collect::<Result<Vec<u8>, Error>>()
            .map(HardwareAddr)
    }
}

/// One row of the policy routing database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleSpec {
    pub family: Family,
    /// `from` selector; `None` matches all sources. Host bits are kept as
    /// the kernel reports them.
    pub source: Option<IpInet>,
    /// `to` selector; `None` matches all destinations.
    pub destination: Option<IpInet>,
    pub priority: u32,
    pub table_id: u32,
}

impl RuleSpec {
    /// Same selectors, moved to another priority and table.
    pub fn moved_to(&self, priority: u32, table_id: u32) -> Self {
        Self {
            priority,
            table_id,
            ..self.clone()
        }
    }

    /// Whether `other` denotes the same kernel rule.
    pub fn matches(&self, other: &RuleSpec) -> bool {
        self.family == other.family
            && self.priority == other.priority
            && self.table_id == other.table_id
            && self.source == other.source
            && self.destination == other.destination
    }
}

impl fmt::Display for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: from ", self.priority)?;
        match &self.source {
            Some(src) => write!(f, "{src}")?,
            None => write!(f, "all")?,
        }
        if let Some(dst) = &self.destination {
            write!(f, " to {dst}")?;
        }
        write!(f, " lookup {}", self.table_id)
    }
}

/// Route specification decoupled from rtnetlink wire format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteSpec {
    pub destination: IpCidr,
    pub gateway: Option<IpAddr>,
    pub if_index: u32,
    pub table_id: u32,
}

impl RouteSpec {
    pub fn family(&self) -> Family {
        Family::of(&self.destination.first_address())
    }

    /// Same route, placed in another table.
    pub fn in_table(&self, table_id: u32) -> Self {
        Self {
            table_id,
            ..self.clone()
        }
    }

    /// Kernel route identity: destination, table and output link.
    pub fn matches(&self, other: &RouteSpec) -> bool {
        self.destination == other.destination && self.table_id == other.table_id && self.if_index == other.if_index
    }
}

impl fmt::Display for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.destination.network_length() == 0 {
            write!(f, "default")?;
        } else {
            write!(f, "{}", self.destination)?;
        }
        if let Some(gw) = self.gateway {
            write!(f, " via {gw}")?;
        }
        write!(f, " dev {} table {}", self.if_index, self.table_id)
    }
}

/// Network link (interface) information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub index: u32,
    pub name: String,
    pub hardware_addr: Option<HardwareAddr>,
}
