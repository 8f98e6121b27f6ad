//! In-place migration of interface-scoped policy routing between schemes.
//!
//! Every attached interface owns one rule `from <subnet> lookup <table>` at
//! the scheme priority and the routes held in `<table>`. A run moves every
//! interface found at the source scheme priority to the target scheme:
//!
//! 1. Resolve the interface identity from the rule's table ID
//!    (link index → MAC → interface number, or the reverse)
//! 2. Copy each route of the interface from the source table into the
//!    target table (replace)
//! 3. Add the rule at the target priority pointing at the target table
//! 4. Delete the source rule
//! 5. Delete the source routes
//!
//! Only routes whose output link is the interface's own link move with the
//! rule. A target table that still holds routes of another link belongs to
//! an interface that has not moved yet; the entry fails untouched and a later
//! run picks it up.
//!
//! There is always at least one complete rule/route pair routing the
//! interface's traffic. Each completed step records its compensating action
//! in a per-interface [`Journal`]; any failure replays the journal newest
//! first and the run continues with the next interface.
//!
//! Only rules at the source priority are candidates, so interfaces already
//! at the target priority (e.g. from an interrupted earlier run) are never
//! touched and re-running is safe.

use serde::Serialize;

use crate::interfaces::InterfaceResolver;
use crate::routing::{Error, Family, NetlinkOps, RouteSpec, RuleSpec};
use crate::scheme::{AddressingScheme, Direction, Interface, TableKey};

/// Result of one migration run, summed over all address families.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    /// Interfaces moved to the target scheme.
    pub migrated: usize,
    /// Interfaces that could not be moved. Their changes were reverted.
    pub failed: usize,
    /// Failed interfaces whose revert did not complete either.
    pub unreconciled: Vec<Unreconciled>,
}

/// An interface that may be left with rules or routes under both schemes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unreconciled {
    pub family: Family,
    pub priority: u32,
    pub table_id: u32,
}

impl MigrationOutcome {
    fn merge(&mut self, other: MigrationOutcome) {
        self.migrated += other.migrated;
        self.failed += other.failed;
        self.unreconciled.extend(other.unreconciled);
    }
}

struct Failure {
    error: Error,
    reverted: bool,
}

impl Failure {
    /// Failure before any kernel state was changed.
    fn unmodified(error: Error) -> Self {
        Self { error, reverted: true }
    }
}

#[derive(Debug)]
enum Compensation {
    DeleteRoute(RouteSpec),
    RestoreRoute(RouteSpec),
    DeleteRule(RuleSpec),
    RestoreRule(RuleSpec),
}

/// Undo log of one interface's migration.
#[derive(Debug, Default)]
struct Journal {
    steps: Vec<Compensation>,
}

impl Journal {
    fn record(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    /// Runs every compensation newest first. Returns whether all succeeded.
    async fn rollback<N: NetlinkOps>(self, netlink: &N) -> bool {
        let mut clean = true;
        for step in self.steps.into_iter().rev() {
            let res = match &step {
                Compensation::DeleteRoute(route) => netlink.route_del(route).await,
                Compensation::RestoreRoute(route) => netlink.route_replace(route).await,
                Compensation::DeleteRule(rule) => netlink.rule_del(rule).await,
                Compensation::RestoreRule(rule) => netlink.rule_add(rule).await,
            };
            match res {
                Ok(()) => tracing::debug!(?step, "reverted"),
                Err(error) => {
                    tracing::error!(%error, ?step, "revert step failed");
                    clean = false;
                }
            }
        }
        clean
    }
}

/// Moves interface rules and routes between [`AddressingScheme`]s.
///
/// Generic over `N: NetlinkOps` and `R: InterfaceResolver` so tests can
/// inject fakes. Runs must not overlap within one network namespace.
pub struct Migrator<N, R> {
    netlink: N,
    resolver: R,
    families: Vec<Family>,
}

impl<N: NetlinkOps, R: InterfaceResolver> Migrator<N, R> {
    /// Creates a migrator handling IPv4 only.
    pub fn new(netlink: N, resolver: R) -> Self {
        Self {
            netlink,
            resolver,
            families: vec![Family::V4],
        }
    }

    /// Address families to migrate, as independent passes in this order.
    pub fn with_families(mut self, families: Vec<Family>) -> Self {
        self.families = families;
        self
    }

    /// Moves every interface from the legacy to the current scheme, or the
    /// reverse when `downgrade` is set.
    ///
    /// Never fails as a whole; per-interface failures are counted and logged.
    pub async fn migrate_datapath(&self, downgrade: bool) -> MigrationOutcome {
        let direction = Direction::from_downgrade(downgrade);
        let (source, target) = direction.schemes();
        tracing::info!(%direction, %source, %target, families = ?self.families, "migrating interface routing");

        let mut outcome = MigrationOutcome::default();
        for family in &self.families {
            outcome.merge(self.migrate_family(*family, source, target).await);
        }

        for entry in &outcome.unreconciled {
            tracing::error!(
                family = %entry.family,
                priority = entry.priority,
                table = entry.table_id,
                "interface may be left with rules under both schemes"
            );
        }
        tracing::info!(
            migrated = outcome.migrated,
            failed = outcome.failed,
            "interface routing migration finished"
        );
        outcome
    }

    async fn migrate_family(
        &self,
        family: Family,
        source: AddressingScheme,
        target: AddressingScheme,
    ) -> MigrationOutcome {
        let mut outcome = MigrationOutcome::default();

        let rules = match self.netlink.rule_list(family).await {
            Ok(rules) => rules,
            Err(error) => {
                tracing::error!(%error, %family, "unable to list rules, skipping address family");
                return outcome;
            }
        };
        let candidates: Vec<RuleSpec> = rules
            .into_iter()
            .filter(|rule| rule.priority == source.priority())
            .collect();
        tracing::debug!(%family, count = candidates.len(), priority = source.priority(), "found source rules");

        for rule in candidates {
            match self.migrate_rule(&rule, source, target).await {
                Ok(()) => outcome.migrated += 1,
                Err(Failure { error, reverted }) => {
                    tracing::warn!(%error, %rule, reverted, "failed to migrate rule");
                    outcome.failed += 1;
                    if !reverted {
                        outcome.unreconciled.push(Unreconciled {
                            family,
                            priority: rule.priority,
                            table_id: rule.table_id,
                        });
                    }
                }
            }
        }
        outcome
    }

    async fn migrate_rule(
        &self,
        rule: &RuleSpec,
        source: AddressingScheme,
        target: AddressingScheme,
    ) -> Result<(), Failure> {
        let interface = self
            .resolve_interface(source, rule.table_id)
            .await
            .map_err(Failure::unmodified)?;
        let target_table = target.table_id(&interface);

        let (routes, foreign): (Vec<RouteSpec>, Vec<RouteSpec>) = self
            .netlink
            .route_list(rule.family, rule.table_id)
            .await
            .map_err(Failure::unmodified)?
            .into_iter()
            .partition(|route| route.if_index == interface.link_index);
        if !foreign.is_empty() {
            tracing::warn!(%rule, count = foreign.len(), "source table holds routes of other links, leaving them");
        }
        if target_table != rule.table_id {
            self.ensure_target_table_free(rule.family, target_table, interface.link_index)
                .await
                .map_err(Failure::unmodified)?;
        }
        if routes.is_empty() {
            tracing::debug!(%rule, "no routes of the interface in source table, moving rule only");
        }

        let mut journal = Journal::default();
        match self
            .apply(rule, &routes, target.priority(), target_table, &mut journal)
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    %rule,
                    link = interface.link_index,
                    number = interface.number,
                    table = target_table,
                    priority = target.priority(),
                    "migrated rule"
                );
                Ok(())
            }
            Err(error) => {
                tracing::debug!(%error, %rule, steps = journal.steps.len(), "reverting partial migration");
                let reverted = journal.rollback(&self.netlink).await;
                Err(Failure { error, reverted })
            }
        }
    }

    async fn apply(
        &self,
        rule: &RuleSpec,
        routes: &[RouteSpec],
        priority: u32,
        table_id: u32,
        journal: &mut Journal,
    ) -> Result<(), Error> {
        // Both schemes can map an interface to the same table number.
        let move_routes = table_id != rule.table_id;

        if move_routes {
            for route in routes {
                let copy = route.in_table(table_id);
                self.netlink.route_replace(&copy).await?;
                journal.record(Compensation::DeleteRoute(copy));
            }
        }

        let new_rule = rule.moved_to(priority, table_id);
        self.netlink.rule_add(&new_rule).await?;
        journal.record(Compensation::DeleteRule(new_rule));

        self.netlink.rule_del(rule).await?;
        journal.record(Compensation::RestoreRule(rule.clone()));

        if move_routes {
            for route in routes {
                self.netlink.route_del(route).await?;
                journal.record(Compensation::RestoreRoute(route.clone()));
            }
        }
        Ok(())
    }

    /// Fails if `table_id` holds routes of any link but `link_index`.
    async fn ensure_target_table_free(&self, family: Family, table_id: u32, link_index: u32) -> Result<(), Error> {
        let occupant = self
            .netlink
            .route_list(family, table_id)
            .await?
            .into_iter()
            .find(|route| route.if_index != link_index);
        match occupant {
            Some(route) => Err(Error::TargetTableInUse {
                table: table_id,
                if_index: route.if_index,
            }),
            None => Ok(()),
        }
    }

    async fn resolve_interface(&self, source: AddressingScheme, table_id: u32) -> Result<Interface, Error> {
        match source.table_key(table_id)? {
            TableKey::LinkIndex(link_index) => {
                let link = self.netlink.link_by_index(link_index).await?;
                let mac = link.hardware_addr.ok_or(Error::NoHardwareAddr(link_index))?;
                let number = self.resolver.interface_number_by_mac(&mac).await?;
                Ok(Interface { link_index, number })
            }
            TableKey::InterfaceNumber(number) => {
                let mac = self.resolver.mac_by_interface_number(number).await?;
                let link = self
                    .netlink
                    .link_list()
                    .await?
                    .into_iter()
                    .find(|link| link.hardware_addr.as_ref() == Some(&mac))
                    .ok_or(Error::NoLinkWithAddr(mac))?;
                Ok(Interface {
                    link_index: link.index,
                    number,
                })
            }
        }
    }
}
