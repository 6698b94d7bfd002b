//! Client-side view of an address assignment offered or acknowledged by a
//! DHCP server, with the timing parameters derived from the reply options.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, TimeDelta, Utc};

use crate::options::OptionCode;
use crate::packet::DhcpPacket;

#[derive(Debug, Clone)]
pub struct Lease {
    pub server_id: Option<Ipv4Addr>,
    /// The address being offered or acknowledged (yiaddr).
    pub fixed_address: Ipv4Addr,
    pub netmask: Option<Ipv4Addr>,
    pub broadcast: Option<Ipv4Addr>,
    /// Next-server address from the BOOTP header (siaddr).
    pub next_server: Option<Ipv4Addr>,
    pub routers: Vec<Ipv4Addr>,
    pub dns: Vec<Ipv4Addr>,
    pub time_servers: Vec<Ipv4Addr>,
    pub domain_name: Option<String>,
    pub mtu: Option<u16>,

    pub bound: DateTime<Utc>,
    pub renew: DateTime<Utc>,
    pub rebind: DateTime<Utc>,
    pub expire: DateTime<Utc>,
}

impl Lease {
    /// Derives a lease from a decoded server reply.
    ///
    /// `bound` is the moment of the call; `expire` comes from option 51,
    /// and `renew`/`rebind` from options 58/59 when present. A reply that
    /// omits T1 or T2 gets them synthesized at 0.5x and 0.875x of the lease
    /// duration, measured from `bound`.
    pub fn from_reply(packet: &DhcpPacket) -> Self {
        let bound = Utc::now();
        let mut lease = Self {
            server_id: None,
            fixed_address: packet.yiaddr,
            netmask: None,
            broadcast: None,
            next_server: (packet.siaddr != Ipv4Addr::UNSPECIFIED).then_some(packet.siaddr),
            routers: Vec::new(),
            dns: Vec::new(),
            time_servers: Vec::new(),
            domain_name: None,
            mtu: None,
            bound,
            renew: bound,
            rebind: bound,
            expire: bound,
        };

        let mut t1 = None;
        let mut t2 = None;

        for option in &packet.options {
            match OptionCode::try_from(option.code) {
                Ok(OptionCode::SubnetMask) => lease.netmask = option.as_ipv4(),
                Ok(OptionCode::BroadcastAddress) => lease.broadcast = option.as_ipv4(),
                Ok(OptionCode::ServerIdentifier) => lease.server_id = option.as_ipv4(),
                Ok(OptionCode::Router) => lease.routers = option.as_ipv4_list(),
                Ok(OptionCode::DnsServer) => lease.dns = option.as_ipv4_list(),
                Ok(OptionCode::TimeServer) => lease.time_servers = option.as_ipv4_list(),
                Ok(OptionCode::DomainName) => lease.domain_name = Some(option.as_str()),
                Ok(OptionCode::InterfaceMtu) => lease.mtu = option.as_u16(),
                Ok(OptionCode::LeaseTime) => {
                    if let Some(seconds) = option.as_u32() {
                        lease.expire = bound + TimeDelta::seconds(seconds as i64);
                    }
                }
                Ok(OptionCode::RenewalTime) => t1 = option.as_u32(),
                Ok(OptionCode::RebindingTime) => t2 = option.as_u32(),
                _ => {}
            }
        }

        let duration_seconds = (lease.expire - bound).num_seconds();
        lease.renew = match t1 {
            Some(seconds) => bound + TimeDelta::seconds(seconds as i64),
            None => bound + TimeDelta::seconds(duration_seconds / 2),
        };
        lease.rebind = match t2 {
            Some(seconds) => bound + TimeDelta::seconds(seconds as i64),
            None => bound + TimeDelta::seconds(duration_seconds * 875 / 1000),
        };

        lease
    }

    /// Seconds remaining until expiration, or 0 once expired.
    pub fn remaining_seconds(&self) -> i64 {
        (self.expire - Utc::now()).num_seconds().max(0)
    }
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lease {}", self.fixed_address)?;
        if let Some(server) = self.server_id {
            write!(f, " from {}", server)?;
        }
        if let Some(mask) = self.netmask {
            write!(f, " netmask {}", mask)?;
        }
        if !self.routers.is_empty() {
            let routers: Vec<String> = self.routers.iter().map(|ip| ip.to_string()).collect();
            write!(f, " routers {}", routers.join(","))?;
        }
        if !self.dns.is_empty() {
            let dns: Vec<String> = self.dns.iter().map(|ip| ip.to_string()).collect();
            write!(f, " dns {}", dns.join(","))?;
        }
        write!(f, " expires in {}s", self.remaining_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::MessageType;
    use crate::packet::BOOTREPLY;

    fn test_ack(extra: &[(u8, Vec<u8>)]) -> DhcpPacket {
        let mut packet = DhcpPacket::request(&[]);
        packet.op = BOOTREPLY;
        packet.xid = 42;
        packet.yiaddr = Ipv4Addr::new(10, 0, 0, 2);
        packet.siaddr = Ipv4Addr::new(10, 0, 0, 1);
        packet.add_option(53, vec![MessageType::Ack as u8]);
        packet.add_option(54, vec![10, 0, 0, 1]);
        packet.add_option(1, vec![255, 255, 255, 0]);
        packet.add_option(51, 3600u32.to_be_bytes().to_vec());
        for (code, data) in extra {
            packet.add_option(*code, data.clone());
        }
        packet
    }

    #[test]
    fn test_lease_fields() {
        let lease = Lease::from_reply(&test_ack(&[
            (3, vec![10, 0, 0, 1]),
            (6, vec![8, 8, 8, 8, 1, 1, 1, 1]),
            (15, b"example.local".to_vec()),
            (26, 1500u16.to_be_bytes().to_vec()),
        ]));

        assert_eq!(lease.fixed_address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(lease.server_id, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(lease.next_server, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(lease.netmask, Some(Ipv4Addr::new(255, 255, 255, 0)));
        assert_eq!(lease.routers, vec![Ipv4Addr::new(10, 0, 0, 1)]);
        assert_eq!(lease.dns.len(), 2);
        assert_eq!(lease.domain_name.as_deref(), Some("example.local"));
        assert_eq!(lease.mtu, Some(1500));
        assert_eq!((lease.expire - lease.bound).num_seconds(), 3600);
    }

    #[test]
    fn test_t1_t2_synthesized() {
        let lease = Lease::from_reply(&test_ack(&[]));
        assert_eq!((lease.renew - lease.bound).num_seconds(), 1800);
        assert_eq!((lease.rebind - lease.bound).num_seconds(), 3150);
    }

    #[test]
    fn test_explicit_t1_t2() {
        let lease = Lease::from_reply(&test_ack(&[
            (58, 600u32.to_be_bytes().to_vec()),
            (59, 900u32.to_be_bytes().to_vec()),
        ]));
        assert_eq!((lease.renew - lease.bound).num_seconds(), 600);
        assert_eq!((lease.rebind - lease.bound).num_seconds(), 900);
    }

    #[test]
    fn test_missing_lease_time() {
        let mut packet = DhcpPacket::request(&[]);
        packet.op = BOOTREPLY;
        packet.yiaddr = Ipv4Addr::new(10, 0, 0, 2);
        let lease = Lease::from_reply(&packet);
        assert_eq!(lease.expire, lease.bound);
        assert_eq!(lease.remaining_seconds(), 0);
        assert_eq!(lease.next_server, None);
    }
}
