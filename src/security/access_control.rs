//! Client address filtering.
//!
//! # Responsibilities
//! - Parse single addresses and CIDR blocks (IPv4 and IPv6)
//! - Decide whether a client address may reach the gateway
//!
//! # Design Decisions
//! - Block list wins over allow list
//! - An empty allow list admits everything not blocked
//! - IPv4-mapped IPv6 addresses are compared as IPv4

use std::net::IpAddr;
use std::str::FromStr;

use crate::config::IpFilterConfig;

/// Error parsing a network entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address or CIDR block: {0}")]
pub struct IpNetParseError(String);

/// An address block: base address plus prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNet {
    addr: IpAddr,
    prefix: u8,
}

impl IpNet {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for IpNet {
    type Err = IpNetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || IpNetParseError(s.to_string());
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let addr = IpAddr::from_str(addr.trim()).map_err(|_| err())?.to_canonical();
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.trim().parse::<u8>().map_err(|_| err())?,
            None => max,
        };
        if prefix > max {
            return Err(err());
        }

        Ok(Self { addr, prefix })
    }
}

/// Allow/block decision for client addresses.
#[derive(Debug, Default)]
pub struct IpFilter {
    allow: Vec<IpNet>,
    block: Vec<IpNet>,
}

impl IpFilter {
    pub fn from_config(config: &IpFilterConfig) -> Result<Self, IpNetParseError> {
        let parse = |entries: &[String]| -> Result<Vec<IpNet>, IpNetParseError> {
            entries.iter().map(|e| e.parse()).collect()
        };
        Ok(Self {
            allow: parse(&config.allow)?,
            block: parse(&config.block)?,
        })
    }

    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        if self.block.iter().any(|net| net.contains(ip)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|net| net.contains(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_cidr_v4() {
        let net: IpNet = "10.1.0.0/16".parse().unwrap();
        assert!(net.contains(ip("10.1.200.3")));
        assert!(!net.contains(ip("10.2.0.1")));
        assert!(net.contains(ip("::ffff:10.1.0.9")));

        let any: IpNet = "0.0.0.0/0".parse().unwrap();
        assert!(any.contains(ip("8.8.8.8")));
    }

    #[test]
    fn test_cidr_v6_and_single() {
        let net: IpNet = "2001:db8::/32".parse().unwrap();
        assert!(net.contains(ip("2001:db8:1::1")));
        assert!(!net.contains(ip("2001:db9::1")));
        assert!(!net.contains(ip("10.0.0.1")));

        let single: IpNet = "192.168.1.7".parse().unwrap();
        assert!(single.contains(ip("192.168.1.7")));
        assert!(!single.contains(ip("192.168.1.8")));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("10.0.0.0/33".parse::<IpNet>().is_err());
        assert!("not-an-ip".parse::<IpNet>().is_err());
        assert!("::/129".parse::<IpNet>().is_err());
    }

    #[test]
    fn test_block_wins() {
        let filter = IpFilter::from_config(&IpFilterConfig {
            enabled: true,
            allow: vec!["10.0.0.0/8".into()],
            block: vec!["10.0.0.66".into()],
            trust_forwarded_headers: false,
        })
        .unwrap();

        assert!(filter.is_allowed(ip("10.4.4.4")));
        assert!(!filter.is_allowed(ip("10.0.0.66")));
        assert!(!filter.is_allowed(ip("192.168.0.1")));
    }

    #[test]
    fn test_empty_allow_list_admits_unblocked() {
        let filter = IpFilter::from_config(&IpFilterConfig {
            block: vec!["1.2.3.4".into()],
            ..IpFilterConfig::default()
        })
        .unwrap();
        assert!(filter.is_allowed(ip("5.6.7.8")));
        assert!(!filter.is_allowed(ip("1.2.3.4")));
    }
}
