//! Trusted subnet (CIDR) matching for the `X-Real-IP` guard.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use tally_domain::{Result, TallyError};

/// An IPv4 or IPv6 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedSubnet {
    network: IpAddr,
    prefix_len: u8,
}

impl TrustedSubnet {
    /// Parse `addr/prefix`; host bits in `addr` are masked off.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| TallyError::Config(format!("invalid trusted subnet '{raw}': {reason}"));

        let (addr, prefix) = raw.trim().split_once('/').ok_or_else(|| invalid("missing prefix length"))?;
        let addr: IpAddr = addr.parse().map_err(|_| invalid("bad address"))?;
        let prefix_len: u8 = prefix.parse().map_err(|_| invalid("bad prefix length"))?;

        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > max {
            return Err(invalid("prefix length out of range"));
        }

        Ok(Self { network: mask(addr, prefix_len), prefix_len })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = match (self.network, ip) {
            (IpAddr::V4(_), IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => return false,
            },
            (_, ip) => ip,
        };
        match (self.network, ip) {
            (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)) => {
                mask(ip, self.prefix_len) == self.network
            }
            _ => false,
        }
    }

    /// Whether a request claiming `real_ip` may submit metrics.
    ///
    /// Loopback is always allowed; a missing or unparsable address never is.
    pub fn admits(&self, real_ip: Option<&str>) -> bool {
        match real_ip.and_then(|raw| raw.trim().parse::<IpAddr>().ok()) {
            Some(ip) => ip.is_loopback() || self.contains(ip),
            None => false,
        }
    }
}

impl FromStr for TrustedSubnet {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TrustedSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

fn mask(addr: IpAddr, prefix_len: u8) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0);
            IpAddr::V4((bits & mask).into())
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix_len)).unwrap_or(0);
            IpAddr::V6((bits & mask).into())
        }
    }
}
