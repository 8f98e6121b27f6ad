pub mod config;
pub mod interfaces;
pub mod logging;
pub mod migrate;
pub mod routing;
pub mod scheme;

pub mod prelude {
    pub use crate::interfaces::{InterfaceResolver, StaticInventory};
    pub use crate::migrate::{MigrationOutcome, Migrator};
    pub use crate::routing::{Family, NetlinkOps};
}
