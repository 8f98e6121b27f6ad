//! Kernel routing policy database access.
//!
//! [`NetlinkOps`](netlink_ops::NetlinkOps) is the narrow capability the
//! migration engine is allowed to use. Production code talks to the kernel
//! through [`RealNetlinkOps`](netlink_ops::RealNetlinkOps); tests use the
//! stateful fakes in `mocks`.

use thiserror::Error;

pub mod netlink_ops;
pub mod types;

#[cfg(test)]
pub(crate) mod mocks;

pub use netlink_ops::NetlinkOps;
pub use types::{Family, HardwareAddr, LinkInfo, RouteSpec, RuleSpec};

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod netlink_ops_linux;
        pub use netlink_ops::RealNetlinkOps;
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    General(String),
    #[error("link with index {0} not found")]
    LinkNotFound(u32),
    #[error("link with index {0} has no hardware address")]
    NoHardwareAddr(u32),
    #[error("no link with hardware address {0}")]
    NoLinkWithAddr(HardwareAddr),
    #[error("hardware address {0} is not in the interface inventory")]
    UnknownHardwareAddr(HardwareAddr),
    #[error("interface number {0} is not in the interface inventory")]
    UnknownInterfaceNumber(u32),
    #[error("table {table} is below the interface table offset {offset}")]
    TableBelowOffset { table: u32, offset: u32 },
    #[error("table {table} already holds routes of link {if_index}")]
    TargetTableInUse { table: u32, if_index: u32 },
    #[error("invalid hardware address: {0}")]
    InvalidHardwareAddr(String),
    #[cfg(target_os = "linux")]
    #[error(transparent)]
    Netlink(#[from] rtnetlink::Error),
    #[error(transparent)]
    IO(#[from] std::io::Error),
}
