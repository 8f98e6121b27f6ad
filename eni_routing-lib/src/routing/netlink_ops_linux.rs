//! Linux routing policy database access using rtnetlink.
//!
//! [`RealNetlinkOps`] implements [`NetlinkOps`] by converting domain specs into
//! typed netlink messages via `rtnetlink::Handle`.

use async_trait::async_trait;
use cidr::{IpCidr, IpInet};
use futures::TryStreamExt;
use rtnetlink::IpVersion;
use rtnetlink::packet_route::link::{LinkAttribute, LinkMessage};
use rtnetlink::packet_route::route::{RouteAddress, RouteAttribute, RouteMessage};
use rtnetlink::packet_route::rule::{RuleAction, RuleAttribute, RuleMessage};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::Error;
use super::netlink_ops::NetlinkOps;
use super::types::{Family, HardwareAddr, LinkInfo, RouteSpec, RuleSpec};

/// Production [`NetlinkOps`] backed by an `rtnetlink::Handle`.
#[derive(Clone)]
pub struct RealNetlinkOps {
    handle: rtnetlink::Handle,
}

impl RealNetlinkOps {
    pub fn new(handle: rtnetlink::Handle) -> Self {
        Self { handle }
    }

    /// Opens a netlink socket in the current network namespace and spawns
    /// its connection task. The task terminates once every handle is dropped.
    pub fn connect() -> Result<Self, Error> {
        let (conn, handle, _) = rtnetlink::new_connection()?;
        tokio::task::spawn(conn);
        Ok(Self::new(handle))
    }

    fn ip_version(family: Family) -> IpVersion {
        match family {
            Family::V4 => IpVersion::V4,
            Family::V6 => IpVersion::V6,
        }
    }

    fn build_route_message(spec: &RouteSpec) -> Result<RouteMessage, Error> {
        let prefix_len = spec.destination.network_length();
        match spec.destination.first_address() {
            IpAddr::V4(dest) => {
                let mut builder = rtnetlink::RouteMessageBuilder::<Ipv4Addr>::default()
                    .destination_prefix(dest, prefix_len)
                    .output_interface(spec.if_index)
                    .table_id(spec.table_id);
                if let Some(gw) = spec.gateway {
                    builder = builder.gateway(v4(gw)?);
                }
                Ok(builder.build())
            }
            IpAddr::V6(dest) => {
                let mut builder = rtnetlink::RouteMessageBuilder::<Ipv6Addr>::default()
                    .destination_prefix(dest, prefix_len)
                    .output_interface(spec.if_index)
                    .table_id(spec.table_id);
                if let Some(gw) = spec.gateway {
                    builder = builder.gateway(v6(gw)?);
                }
                Ok(builder.build())
            }
        }
    }

    fn dump_request(family: Family, table_id: u32) -> RouteMessage {
        match family {
            Family::V4 => rtnetlink::RouteMessageBuilder::<Ipv4Addr>::default()
                .table_id(table_id)
                .build(),
            Family::V6 => rtnetlink::RouteMessageBuilder::<Ipv6Addr>::default()
                .table_id(table_id)
                .build(),
        }
    }

    fn route_table(msg: &RouteMessage) -> u32 {
        msg.attributes
            .iter()
            .find_map(|a| match a {
                RouteAttribute::Table(id) => Some(*id),
                _ => None,
            })
            .unwrap_or(msg.header.table as u32)
    }

    fn route_message_to_spec(msg: &RouteMessage, family: Family) -> Option<RouteSpec> {
        let table_id = Self::route_table(msg);

        let Some(if_index) = msg.attributes.iter().find_map(|a| match a {
            RouteAttribute::Oif(idx) => Some(*idx),
            _ => None,
        }) else {
            // multipath, blackhole and unreachable routes stay where they are
            tracing::warn!(
                table = table_id,
                kind = ?msg.header.kind,
                "ignoring route without output interface"
            );
            return None;
        };

        let destination = msg
            .attributes
            .iter()
            .find_map(|a| match a {
                RouteAttribute::Destination(addr) => route_address(addr),
                _ => None,
            })
            .unwrap_or(match family {
                Family::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                Family::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            });

        let gateway = msg.attributes.iter().find_map(|a| match a {
            RouteAttribute::Gateway(addr) => route_address(addr),
            _ => None,
        });

        let destination = match IpCidr::new(destination, msg.header.destination_prefix_length) {
            Ok(cidr) => cidr,
            Err(error) => {
                tracing::warn!(%error, %destination, "ignoring route with invalid destination prefix");
                return None;
            }
        };

        Some(RouteSpec {
            destination,
            gateway,
            if_index,
            table_id,
        })
    }

    fn rule_message_to_spec(msg: &RuleMessage, family: Family) -> Option<RuleSpec> {
        let priority = msg
            .attributes
            .iter()
            .find_map(|a| match a {
                RuleAttribute::Priority(p) => Some(*p),
                _ => None,
            })
            .unwrap_or(0);

        let table_id = msg
            .attributes
            .iter()
            .find_map(|a| match a {
                RuleAttribute::Table(t) => Some(*t),
                _ => None,
            })
            .unwrap_or(msg.header.table as u32);

        let source = msg.attributes.iter().find_map(|a| match a {
            RuleAttribute::Source(ip) => Some(*ip),
            _ => None,
        });
        let destination = msg.attributes.iter().find_map(|a| match a {
            RuleAttribute::Destination(ip) => Some(*ip),
            _ => None,
        });

        let source = match source.map(|ip| IpInet::new(ip, msg.header.src_len)).transpose() {
            Ok(cidr) => cidr,
            Err(error) => {
                tracing::warn!(%error, priority, table_id, "ignoring rule with invalid source prefix");
                return None;
            }
        };
        let destination = match destination.map(|ip| IpInet::new(ip, msg.header.dst_len)).transpose() {
            Ok(cidr) => cidr,
            Err(error) => {
                tracing::warn!(%error, priority, table_id, "ignoring rule with invalid destination prefix");
                return None;
            }
        };

        Some(RuleSpec {
            family,
            source,
            destination,
            priority,
            table_id,
        })
    }

    fn link_message_to_info(msg: &LinkMessage) -> LinkInfo {
        let name = msg
            .attributes
            .iter()
            .find_map(|a| match a {
                LinkAttribute::IfName(n) => Some(n.clone()),
                _ => None,
            })
            .unwrap_or_default();
        let hardware_addr = msg.attributes.iter().find_map(|a| match a {
            LinkAttribute::Address(bytes) if !bytes.is_empty() => Some(HardwareAddr::new(bytes.clone())),
            _ => None,
        });
        LinkInfo {
            index: msg.header.index,
            name,
            hardware_addr,
        }
    }

    async fn rule_messages(&self, family: Family) -> Result<Vec<RuleMessage>, Error> {
        let rules: Vec<_> = self
            .handle
            .rule()
            .get(Self::ip_version(family))
            .execute()
            .try_collect()
            .await?;
        Ok(rules)
    }
}

fn route_address(addr: &RouteAddress) -> Option<IpAddr> {
    match addr {
        RouteAddress::Inet(ip) => Some(IpAddr::V4(*ip)),
        RouteAddress::Inet6(ip) => Some(IpAddr::V6(*ip)),
        _ => None,
    }
}

fn v4(addr: IpAddr) -> Result<Ipv4Addr, Error> {
    match addr {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(ip) => Err(Error::General(format!("expected an IPv4 address, got {ip}"))),
    }
}

fn v6(addr: IpAddr) -> Result<Ipv6Addr, Error> {
    match addr {
        IpAddr::V6(ip) => Ok(ip),
        IpAddr::V4(ip) => Err(Error::General(format!("expected an IPv6 address, got {ip}"))),
    }
}

#[async_trait]
impl NetlinkOps for RealNetlinkOps {
    async fn rule_list(&self, family: Family) -> Result<Vec<RuleSpec>, Error> {
        let rules = self.rule_messages(family).await?;
        Ok(rules
            .iter()
            .filter_map(|msg| Self::rule_message_to_spec(msg, family))
            .collect())
    }

    async fn rule_add(&self, rule: &RuleSpec) -> Result<(), Error> {
        match rule.family {
            Family::V4 => {
                let mut req = self
                    .handle
                    .rule()
                    .add()
                    .v4()
                    .priority(rule.priority)
                    .table_id(rule.table_id)
                    .action(RuleAction::ToTable);
                if let Some(src) = rule.source {
                    req = req.source_prefix(v4(src.address())?, src.network_length());
                }
                if let Some(dst) = rule.destination {
                    req = req.destination_prefix(v4(dst.address())?, dst.network_length());
                }
                req.execute().await?;
            }
            Family::V6 => {
                let mut req = self
                    .handle
                    .rule()
                    .add()
                    .v6()
                    .priority(rule.priority)
                    .table_id(rule.table_id)
                    .action(RuleAction::ToTable);
                if let Some(src) = rule.source {
                    req = req.source_prefix(v6(src.address())?, src.network_length());
                }
                if let Some(dst) = rule.destination {
                    req = req.destination_prefix(v6(dst.address())?, dst.network_length());
                }
                req.execute().await?;
            }
        }
        Ok(())
    }

    async fn rule_del(&self, rule: &RuleSpec) -> Result<(), Error> {
        // Find the matching rule message and delete it
        for msg in self.rule_messages(rule.family).await? {
            let matches = Self::rule_message_to_spec(&msg, rule.family)
                .map(|spec| spec.matches(rule))
                .unwrap_or(false);
            if matches {
                self.handle.rule().del(msg).execute().await?;
                return Ok(());
            }
        }

        Err(Error::General(format!("rule not found: {rule}")))
    }

    async fn route_list(&self, family: Family, table_id: u32) -> Result<Vec<RouteSpec>, Error> {
        let routes: Vec<_> = self
            .handle
            .route()
            .get(Self::dump_request(family, table_id))
            .execute()
            .try_collect()
            .await?;

        // the kernel may ignore the table filter on dumps
        Ok(routes
            .iter()
            .filter(|msg| Self::route_table(msg) == table_id)
            .filter_map(|msg| Self::route_message_to_spec(msg, family))
            .collect())
    }

    async fn route_add(&self, route: &RouteSpec) -> Result<(), Error> {
        let msg = Self::build_route_message(route)?;
        self.handle.route().add(msg).execute().await?;
        Ok(())
    }

    async fn route_del(&self, route: &RouteSpec) -> Result<(), Error> {
        let msg = Self::build_route_message(route)?;
        self.handle.route().del(msg).execute().await?;
        Ok(())
    }

    async fn route_replace(&self, route: &RouteSpec) -> Result<(), Error> {
        let msg = Self::build_route_message(route)?;
        self.handle.route().add(msg).replace().execute().await?;
        Ok(())
    }

    async fn link_list(&self) -> Result<Vec<LinkInfo>, Error> {
        let links: Vec<_> = self.handle.link().get().execute().try_collect().await?;
        Ok(links.iter().map(Self::link_message_to_info).collect())
    }

    async fn link_by_index(&self, index: u32) -> Result<LinkInfo, Error> {
        let link = self
            .handle
            .link()
            .get()
            .match_index(index)
            .execute()
            .try_next()
            .await?
            .ok_or(Error::LinkNotFound(index))?;
        Ok(Self::link_message_to_info(&link))
    }
}
