//! Stateful mocks for the routing and inventory abstractions.
//!
//! These mocks track actual state (rules, routes and links that exist) rather
//! than just verifying call sequences. This lets tests assert on the kernel
//! _state_ after a migration run, not just which calls happened.
//!
//! All mocks use `Arc<Mutex<_>>` for interior mutability in async contexts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::Error;
use super::netlink_ops::NetlinkOps;
use super::types::{Family, HardwareAddr, LinkInfo, RouteSpec, RuleSpec};
use crate::interfaces::InterfaceResolver;

// ============================================================================
// MockNetlinkOps
// ============================================================================

#[derive(Debug, Default)]
pub struct NetlinkState {
    pub rules: Vec<RuleSpec>,
    pub routes: Vec<RouteSpec>,
    pub links: Vec<LinkInfo>,
    /// Map of operation name -> error message. If set, every call fails.
    pub fail_on: HashMap<String, String>,
    /// Map of operation name -> 1-based call number that fails once.
    pub fail_on_call: HashMap<String, usize>,
    /// Number of calls seen per operation, failed ones included.
    pub calls: HashMap<String, usize>,
}

impl NetlinkState {
    fn check_fail(&mut self, op: &str) -> Result<(), Error> {
        let count = self.calls.entry(op.to_string()).or_default();
        *count += 1;
        let count = *count;

        if let Some(msg) = self.fail_on.get(op) {
            return Err(Error::General(msg.clone()));
        }
        if self.fail_on_call.get(op) == Some(&count) {
            return Err(Error::General(format!("injected failure on {op} call {count}")));
        }
        Ok(())
    }

    pub fn calls_to(&self, op: &str) -> usize {
        self.calls.get(op).copied().unwrap_or(0)
    }

    /// Calls that would have changed kernel state.
    pub fn mutating_calls(&self) -> usize {
        ["rule_add", "rule_del", "route_add", "route_del", "route_replace"]
            .iter()
            .map(|op| self.calls_to(op))
            .sum()
    }

    pub fn rules_at(&self, priority: u32) -> Vec<RuleSpec> {
        self.rules.iter().filter(|r| r.priority == priority).cloned().collect()
    }

    pub fn routes_in(&self, table_id: u32) -> Vec<RouteSpec> {
        self.routes.iter().filter(|r| r.table_id == table_id).cloned().collect()
    }
}

#[derive(Clone)]
pub struct MockNetlinkOps {
    pub state: Arc<Mutex<NetlinkState>>,
}

impl MockNetlinkOps {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(NetlinkState::default())),
        }
    }

    pub fn with_state(state: NetlinkState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

#[async_trait]
impl NetlinkOps for MockNetlinkOps {
    async fn rule_list(&self, family: Family) -> Result<Vec<RuleSpec>, Error> {
        let mut s = self.state.lock().unwrap();
        s.check_fail("rule_list")?;
        Ok(s.rules.iter().filter(|r| r.family == family).cloned().collect())
    }

    async fn rule_add(&self, rule: &RuleSpec) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.check_fail("rule_add")?;

        if s.rules.iter().any(|r| r.matches(rule)) {
            return Err(Error::General(format!("rule already exists: {rule}")));
        }
        s.rules.push(rule.clone());
        Ok(())
    }

    async fn rule_del(&self, rule: &RuleSpec) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.check_fail("rule_del")?;

        let before = s.rules.len();
        s.rules.retain(|r| !r.matches(rule));
        if s.rules.len() == before {
            return Err(Error::General(format!("rule not found: {rule}")));
        }
        Ok(())
    }

    async fn route_list(&self, family: Family, table_id: u32) -> Result<Vec<RouteSpec>, Error> {
        let mut s = self.state.lock().unwrap();
        s.check_fail("route_list")?;
        Ok(s.routes
            .iter()
            .filter(|r| r.family() == family && r.table_id == table_id)
            .cloned()
            .collect())
    }

    async fn route_add(&self, route: &RouteSpec) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.check_fail("route_add")?;

        // Check for duplicate (same dest+table+link)
        if s.routes.iter().any(|r| r.matches(route)) {
            return Err(Error::General(format!("route already exists: {route}")));
        }
        s.routes.push(route.clone());
        Ok(())
    }

    async fn route_del(&self, route: &RouteSpec) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.check_fail("route_del")?;

        let before = s.routes.len();
        s.routes.retain(|r| !r.matches(route));
        if s.routes.len() == before {
            return Err(Error::General(format!("route not found: {route}")));
        }
        Ok(())
    }

    async fn route_replace(&self, route: &RouteSpec) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.check_fail("route_replace")?;

        s.routes.retain(|r| !r.matches(route));
        s.routes.push(route.clone());
        Ok(())
    }

    async fn link_list(&self) -> Result<Vec<LinkInfo>, Error> {
        let mut s = self.state.lock().unwrap();
        s.check_fail("link_list")?;
        Ok(s.links.clone())
    }

    async fn link_by_index(&self, index: u32) -> Result<LinkInfo, Error> {
        let mut s = self.state.lock().unwrap();
        s.check_fail("link_by_index")?;
        s.links
            .iter()
            .find(|l| l.index == index)
            .cloned()
            .ok_or(Error::LinkNotFound(index))
    }
}

// ============================================================================
// MockResolver
// ============================================================================

#[derive(Debug, Default)]
pub struct ResolverState {
    pub numbers: HashMap<HardwareAddr, u32>,
    pub fail_on: HashMap<String, String>,
}

impl ResolverState {
    fn check_fail(&self, op: &str) -> Result<(), Error> {
        if let Some(msg) = self.fail_on.get(op) {
            Err(Error::General(msg.clone()))
        } else {
            Ok(())
        }
    }
}

#[derive(Clone)]
pub struct MockResolver {
    pub state: Arc<Mutex<ResolverState>>,
}

impl MockResolver {
    pub fn with_state(state: ResolverState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

#[async_trait]
impl InterfaceResolver for MockResolver {
    async fn interface_number_by_mac(&self, mac: &HardwareAddr) -> Result<u32, Error> {
        let s = self.state.lock().unwrap();
        s.check_fail("interface_number_by_mac")?;
        s.numbers
            .get(mac)
            .copied()
            .ok_or_else(|| Error::UnknownHardwareAddr(mac.clone()))
    }

    async fn mac_by_interface_number(&self, number: u32) -> Result<HardwareAddr, Error> {
        let s = self.state.lock().unwrap();
        s.check_fail("mac_by_interface_number")?;
        s.numbers
            .iter()
            .find_map(|(mac, n)| (*n == number).then(|| mac.clone()))
            .ok_or(Error::UnknownInterfaceNumber(number))
    }
}
