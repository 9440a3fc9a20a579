//! Deterministic subnet planning
//!
//! Every link segment gets its own /24 carved out of the base prefix, in
//! segment creation order. Addressing therefore depends only on the
//! caller-provided order: repeated runs over the same topology yield the
//! same addresses.

use crate::topology::LinkSegment;
use anyhow::{Context, anyhow, bail};
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ipv4Cidr {
    pub address: Ipv4Addr,
    pub network_prefix: u8,
}

impl Ipv4Cidr {
    /// The network address with host bits cleared
    pub fn network(&self) -> Ipv4Addr {
        let mask: u32 = u32::MAX << (32 - self.network_prefix);
        Ipv4Addr::from_bits(self.address.to_bits() & mask)
    }
}

impl Display for Ipv4Cidr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.network_prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let address: Ipv4Addr = parts
            .next()
            .ok_or(anyhow!("empty string"))?
            .parse()
            .context("invalid ip address in cidr")?;

        let network_prefix: u8 = parts
            .next()
            .ok_or(anyhow!("missing network prefix in cidr"))?
            .parse()
            .context("the provided network prefix is not a valid unsigned integer")?;
        if network_prefix == 0 {
            bail!("network prefix cannot be 0");
        }
        if network_prefix > 32 {
            bail!("network prefix cannot be higher than 32");
        }

        if parts.next().is_some() {
            bail!("cidr contains trailing characters");
        }

        Ok(Self {
            address,
            network_prefix,
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AddressError {
    #[error("base prefix /{0} leaves no room to carve /24 subnets")]
    BasePrefixTooLong(u8),
    #[error(
        "address space exhausted: {base} holds {subnets} /24 subnets, {segments} segments need addressing"
    )]
    SpaceExhausted {
        base: Ipv4Cidr,
        subnets: u64,
        segments: usize,
    },
}

/// A subnet bound to one link segment, with the concrete address given to
/// each endpoint interface
#[derive(Clone, Debug, PartialEq)]
pub struct SubnetAssignment {
    pub segment: Arc<str>,
    pub network: Ipv4Addr,
    pub network_prefix: u8,
    /// Address of the segment's first endpoint (`.1`)
    pub addr_a: Ipv4Addr,
    /// Address of the segment's second endpoint (`.2`)
    pub addr_b: Ipv4Addr,
}

/// Allocates pairwise-disjoint /24 subnets to segments in input order
#[derive(Debug)]
pub struct AddressPlanner {
    base: Ipv4Cidr,
}

impl AddressPlanner {
    pub fn new(base: Ipv4Cidr) -> Result<Self, AddressError> {
        if base.network_prefix > 24 {
            return Err(AddressError::BasePrefixTooLong(base.network_prefix));
        }
        Ok(Self { base })
    }

    /// Walks `segments` once, carving the next /24 for each. The input
    /// order is the contract: no sorting happens here.
    pub fn assign(&self, segments: &[LinkSegment]) -> Result<Vec<SubnetAssignment>, AddressError> {
        let subnets = 1u64 << (24 - self.base.network_prefix);
        let base_bits = self.base.network().to_bits();

        let mut assignments = Vec::with_capacity(segments.len());
        for (index, segment) in segments.iter().enumerate() {
            if index as u64 >= subnets {
                return Err(AddressError::SpaceExhausted {
                    base: self.base.clone(),
                    subnets,
                    segments: segments.len(),
                });
            }

            let network = base_bits + ((index as u32) << 8);
            assignments.push(SubnetAssignment {
                segment: segment.id.clone(),
                network: Ipv4Addr::from_bits(network),
                network_prefix: 24,
                addr_a: Ipv4Addr::from_bits(network | 1),
                addr_b: Ipv4Addr::from_bits(network | 2),
            });
        }

        Ok(assignments)
    }
}
