//! Abstraction over rtnetlink operations for testability.
//!
//! Defines the [`NetlinkOps`] trait, the only way the migration engine
//! reads or mutates the routing policy database. Every call either succeeds
//! or fails as a whole; callers never observe partially applied requests.
//!
//! Production code uses [`RealNetlinkOps`] which wraps `rtnetlink::Handle`.
//! Tests use stateful mocks (see `mocks` module).

use async_trait::async_trait;

use super::Error;
use super::types::{Family, LinkInfo, RouteSpec, RuleSpec};

#[cfg(target_os = "linux")]
pub use super::netlink_ops_linux::RealNetlinkOps;

/// Abstraction over netlink rule/route/link operations.
///
/// Implementors must be cheaply cloneable (e.g. via `Arc` or because the
/// underlying handle is already reference-counted).
#[async_trait]
pub trait NetlinkOps: Send + Sync + Clone {
    /// List all policy rules of one address family.
    async fn rule_list(&self, family: Family) -> Result<Vec<RuleSpec>, Error>;
    async fn rule_add(&self, rule: &RuleSpec) -> Result<(), Error>;
    /// Delete the rule matching priority, table and selectors.
    async fn rule_del(&self, rule: &RuleSpec) -> Result<(), Error>;

    /// List routes of one address family held in `table_id`.
    async fn route_list(&self, family: Family, table_id: u32) -> Result<Vec<RouteSpec>, Error>;
    async fn route_add(&self, route: &RouteSpec) -> Result<(), Error>;
    async fn route_del(&self, route: &RouteSpec) -> Result<(), Error>;
    /// Add the route, overwriting an existing one with the same identity.
    async fn route_replace(&self, route: &RouteSpec) -> Result<(), Error>;

    async fn link_list(&self) -> Result<Vec<LinkInfo>, Error>;
    async fn link_by_index(&self, index: u32) -> Result<LinkInfo, Error>;
}
