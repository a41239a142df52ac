//! CIDR containment checks for container networks.

use std::net::IpAddr;

use crate::error::SubnetError;

/// Network derived from a gateway address and a prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: IpAddr,
    prefix_len: u8,
}

/// Mask with the top `prefix_len` bits of a `width`-bit address set.
fn mask(prefix_len: u8, width: u32) -> u128 {
    if prefix_len == 0 {
        return 0;
    }
    let all = if width == 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    };
    let host_bits = width - prefix_len as u32;
    (all >> host_bits) << host_bits
}

fn bits(addr: &IpAddr) -> (u128, u32) {
    match addr {
        IpAddr::V4(v4) => (u32::from(*v4) as u128, 32),
        IpAddr::V6(v6) => (u128::from(*v6), 128),
    }
}

impl Subnet {
    /// Parse `gateway`/`prefix_len` as reported by the container runtime.
    pub fn from_gateway(gateway: &str, prefix_len: i64) -> Result<Self, SubnetError> {
        let gateway_ip: IpAddr = gateway
            .trim()
            .parse()
            .map_err(|source| SubnetError::Gateway {
                gateway: gateway.to_string(),
                source,
            })?;
        Self::new(gateway_ip, prefix_len)
    }

    /// Build the subnet containing `addr` with the given prefix length.
    pub fn new(addr: IpAddr, prefix_len: i64) -> Result<Self, SubnetError> {
        let addr = addr.to_canonical();
        let max = match addr {
            IpAddr::V4(_) => 32u8,
            IpAddr::V6(_) => 128u8,
        };
        if prefix_len < 0 || prefix_len > max as i64 {
            return Err(SubnetError::PrefixLen { prefix_len, max });
        }
        let prefix_len = prefix_len as u8;

        let (value, width) = bits(&addr);
        let masked = value & mask(prefix_len, width);
        let network = match addr {
            IpAddr::V4(_) => IpAddr::V4((masked as u32).into()),
            IpAddr::V6(_) => IpAddr::V6(masked.into()),
        };

        Ok(Self {
            network,
            prefix_len,
        })
    }

    /// First address of the subnet.
    pub fn network(&self) -> IpAddr {
        self.network
    }

    /// Prefix length.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Whether `ip` lies inside this subnet. Addresses of the other family never match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        if ip.is_ipv4() != self.network.is_ipv4() {
            return false;
        }
        let (value, width) = bits(&ip);
        let (network, _) = bits(&self.network);
        value & mask(self.prefix_len, width) == network
    }
}

impl std::fmt::Display for Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}
