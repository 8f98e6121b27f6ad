use async_trait::async_trait;

use std::sync::{Arc, Mutex};

use eni_routing_lib::routing::{Error, Family, LinkInfo, NetlinkOps, RouteSpec, RuleSpec};

/// In-memory routing policy database.
#[derive(Debug, Default)]
pub struct Kernel {
    pub rules: Vec<RuleSpec>,
    pub routes: Vec<RouteSpec>,
    pub links: Vec<LinkInfo>,
}

#[derive(Clone, Default)]
pub struct FakeNetlink {
    pub kernel: Arc<Mutex<Kernel>>,
}

impl FakeNetlink {
    pub fn new(kernel: Kernel) -> Self {
        Self {
            kernel: Arc::new(Mutex::new(kernel)),
        }
    }
}

#[async_trait]
impl NetlinkOps for FakeNetlink {
    async fn rule_list(&self, family: Family) -> Result<Vec<RuleSpec>, Error> {
        let k = self.kernel.lock().unwrap();
        Ok(k.rules.iter().filter(|r| r.family == family).cloned().collect())
    }

    async fn rule_add(&self, rule: &RuleSpec) -> Result<(), Error> {
        let mut k = self.kernel.lock().unwrap();
        if k.rules.iter().any(|r| r.matches(rule)) {
            return Err(Error::General(format!("rule already exists: {rule}")));
        }
        k.rules.push(rule.clone());
        Ok(())
    }

    async fn rule_del(&self, rule: &RuleSpec) -> Result<(), Error> {
        let mut k = self.kernel.lock().unwrap();
        let before = k.rules.len();
        k.rules.retain(|r| !r.matches(rule));
        if k.rules.len() == before {
            return Err(Error::General(format!("rule not found: {rule}")));
        }
        Ok(())
    }

    async fn route_list(&self, family: Family, table_id: u32) -> Result<Vec<RouteSpec>, Error> {
        let k = self.kernel.lock().unwrap();
        Ok(k.routes
            .iter()
            .filter(|r| r.family() == family && r.table_id == table_id)
            .cloned()
            .collect())
    }

    async fn route_add(&self, route: &RouteSpec) -> Result<(), Error> {
        let mut k = self.kernel.lock().unwrap();
        if k.routes.iter().any(|r| r.matches(route)) {
            return Err(Error::General(format!("route already exists: {route}")));
        }
        k.routes.push(route.clone());
        Ok(())
    }

    async fn route_del(&self, route: &RouteSpec) -> Result<(), Error> {
        let mut k = self.kernel.lock().unwrap();
        let before = k.routes.len();
        k.routes.retain(|r| !r.matches(route));
        if k.routes.len() == before {
            return Err(Error::General(format!("route not found: {route}")));
        }
        Ok(())
    }

    async fn route_replace(&self, route: &RouteSpec) -> Result<(), Error> {
        let mut k = self.kernel.lock().unwrap();
        k.routes.retain(|r| !r.matches(route));
        k.routes.push(route.clone());
        Ok(())
    }

    async fn link_list(&self) -> Result<Vec<LinkInfo>, Error> {
        Ok(self.kernel.lock().unwrap().links.clone())
    }

    async fn link_by_index(&self, index: u32) -> Result<LinkInfo, Error> {
        let k = self.kernel.lock().unwrap();
        k.links
            .iter()
            .find(|l| l.index == index)
            .cloned()
            .ok_or(Error::LinkNotFound(index))
    }
}
