//! Network address generators: IPv4/IPv6 addresses inside a configured
//! network, and MAC addresses.

use std::net::{Ipv4Addr, Ipv6Addr};

use rand::rngs::StdRng;
use rand::Rng;

use crate::directive::DirectiveMap;
use crate::error::{Result, RowforgeError};
use crate::generate::context::{rng_from_seed, GenerationContext};
use crate::generate::int::IntDraw;
use crate::generate::value::Value;
use crate::schema::types::Attribute;

/// Host ranges wider than this are clamped so the permutation arithmetic
/// stays within i64/i128.
const MAX_RANGE: u128 = 1 << 62;

/// Addresses inside a network. A leading `,` includes the network address, a
/// leading `.` the broadcast address, `;` both.
pub struct InetGen {
    v6: bool,
    net: u128,
    pub draw: IntDraw,
}

impl InetGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<InetGen> {
        let had_offset = dirs.contains("offset");
        let spec = dirs.take_text("inet").unwrap_or_default();
        let mut draw = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;

        let (include_net, include_bcast, network) = if spec.is_empty() {
            (true, true, "0.0.0.0/0".to_string())
        } else {
            let first = spec.chars().next().unwrap();
            let include_net = first == ',' || first == ';';
            let include_bcast = first == '.' || first == ';';
            let network = if include_net || include_bcast {
                spec[1..].to_string()
            } else {
                spec.clone()
            };
            (include_net, include_bcast, network)
        };

        let bad = |msg: String| RowforgeError::directive(owner, "inet", msg);
        let v6 = network.contains(':');
        let (net, hostmask) = if v6 {
            let full = if network.contains('/') {
                network.clone()
            } else {
                format!("{}/64", network)
            };
            let (addr, bits) = full
                .split_once('/')
                .ok_or_else(|| bad(format!("invalid ipv6 {}", network)))?;
            let ip: Ipv6Addr = addr
                .parse()
                .map_err(|_| bad(format!("invalid ipv6 {}", network)))?;
            let bits: u32 = bits
                .parse()
                .map_err(|_| bad(format!("invalid ipv6 mask in {}", network)))?;
            if bits > 128 {
                return Err(bad(format!("ipv6 mask {} not in 0..128", bits)));
            }
            let hostmask = if bits == 0 {
                u128::MAX
            } else {
                (1u128 << (128 - bits)) - 1
            };
            let n = u128::from(ip) & !hostmask;
            (n, hostmask)
        } else {
            let full = if network.contains('/') {
                network.clone()
            } else {
                format!("{}/24", network)
            };
            let (addr, bits) = full
                .split_once('/')
                .ok_or_else(|| bad(format!("invalid ipv4 {}", network)))?;
            let ip: Ipv4Addr = addr
                .parse()
                .map_err(|_| bad(format!("invalid ipv4 {}", network)))?;
            let bits: u32 = bits
                .parse()
                .map_err(|_| bad(format!("invalid ipv4 mask in {}", network)))?;
            if bits > 32 {
                return Err(bad(format!("ipv4 mask {} not in 0..32", bits)));
            }
            let hostmask = if bits == 32 {
                0u128
            } else {
                (1u128 << (32 - bits)) - 1
            };
            let n = u128::from(u32::from(ip)) & !hostmask;
            (n, hostmask)
        };

        // usable hosts, plus the optional network/broadcast endpoints
        let range =
            hostmask.saturating_sub(1) + u128::from(include_net) + u128::from(include_bcast);
        let range_capped = range.min(MAX_RANGE) as i64;
        match draw.size() {
            None => {
                if range_capped <= 0 {
                    return Err(bad(format!("empty address range {}", network)));
                }
                draw.set_size(range_capped, &mut ctx.build_rng, owner)?;
            }
            Some(size) if size > range_capped => {
                draw.set_size(range_capped.max(1), &mut ctx.build_rng, owner)?;
            }
            _ => {}
        }
        if !had_offset {
            draw.offset = i64::from(!include_net);
        }
        Ok(InetGen { v6, net, draw })
    }

    pub fn produce(&mut self, rng: &mut StdRng, owner: &str) -> Result<Value> {
        let n = self.draw.produce(rng, owner)?;
        let address = self.net + n as u128;
        let text = if self.v6 {
            Ipv6Addr::from(address).to_string()
        } else {
            Ipv4Addr::from(address as u32).to_string()
        };
        Ok(Value::Text(text))
    }
}

/// MAC addresses: six random bytes per draw from a dedicated stream.
pub struct MacGen {
    pub draw: IntDraw,
}

impl MacGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<MacGen> {
        let mut draw = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        if draw.size().is_none() {
            draw.set_size(ctx.config.resolved_size(), &mut ctx.build_rng, owner)?;
        }
        Ok(MacGen { draw })
    }

    pub fn produce(&mut self, seed: &str, rng: &mut StdRng, owner: &str) -> Result<Value> {
        let n = self.draw.produce(rng, owner)?;
        let mut rng2 = rng_from_seed(&format!("{}{}", seed, n));
        let parts: Vec<String> = (0..6)
            .map(|_| format!("{:02X}", rng2.random::<u8>()))
            .collect();
        Ok(Value::Text(parts.join(":")))
    }
}
