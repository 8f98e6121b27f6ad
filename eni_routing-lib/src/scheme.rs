//! Addressing schemes for interface-scoped policy routing.
//!
//! A scheme pairs the priority of the per-interface `from <subnet> lookup
//! <table>` rule with the rule used to derive `<table>`:
//!
//! | scheme    | priority | table                          |
//! |-----------|----------|--------------------------------|
//! | `Legacy`  | 110      | kernel link index              |
//! | `Current` | 111      | interface number + 10          |

use std::fmt;

use crate::routing::Error;

/// Rule priority of the legacy scheme.
pub const PRIORITY_LEGACY: u32 = 110;

/// Rule priority of the current scheme.
pub const PRIORITY_CURRENT: u32 = 111;

/// Offset added to the interface number to form a current-scheme table ID.
pub const TABLE_INTERFACES_OFFSET: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingScheme {
    Legacy,
    Current,
}

/// Identity of an attached interface as seen by both schemes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub link_index: u32,
    pub number: u32,
}

/// The part of an interface identity a table ID encodes under a scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKey {
    LinkIndex(u32),
    InterfaceNumber(u32),
}

impl AddressingScheme {
    pub fn priority(&self) -> u32 {
        match self {
            AddressingScheme::Legacy => PRIORITY_LEGACY,
            AddressingScheme::Current => PRIORITY_CURRENT,
        }
    }

    /// Routing table that holds the routes of `interface` under this scheme.
    pub fn table_id(&self, interface: &Interface) -> u32 {
        match self {
            AddressingScheme::Legacy => interface.link_index,
            AddressingScheme::Current => interface.number + TABLE_INTERFACES_OFFSET,
        }
    }

    /// Recovers what a table ID says about its interface under this scheme.
    pub fn table_key(&self, table_id: u32) -> Result<TableKey, Error> {
        match self {
            AddressingScheme::Legacy => Ok(TableKey::LinkIndex(table_id)),
            AddressingScheme::Current => table_id
                .checked_sub(TABLE_INTERFACES_OFFSET)
                .map(TableKey::InterfaceNumber)
                .ok_or(Error::TableBelowOffset {
                    table: table_id,
                    offset: TABLE_INTERFACES_OFFSET,
                }),
        }
    }
}

impl fmt::Display for AddressingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressingScheme::Legacy => write!(f, "legacy"),
            AddressingScheme::Current => write!(f, "current"),
        }
    }
}

/// Which way a migration run moves interfaces between schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upgrade,
    Downgrade,
}

impl Direction {
    pub fn from_downgrade(downgrade: bool) -> Self {
        if downgrade { Direction::Downgrade } else { Direction::Upgrade }
    }

    /// `(source, target)` schemes of this direction.
    pub fn schemes(&self) -> (AddressingScheme, AddressingScheme) {
        match self {
            Direction::Upgrade => (AddressingScheme::Legacy, AddressingScheme::Current),
            Direction::Downgrade => (AddressingScheme::Current, AddressingScheme::Legacy),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upgrade => write!(f, "upgrade"),
            Direction::Downgrade => write!(f, "downgrade"),
        }
    }
}
