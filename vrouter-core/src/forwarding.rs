//! Validation and forwarding of IPv4 datagrams.
//!
//! Every frame handed to [`Forwarding::on_receive`] ends in exactly one
//! [`Disposition`]. Nothing here is an error: a router drops what it cannot
//! deliver and moves on, so drops are reported as values and logged at trace
//! level.

use crate::{
    arp_cache::ArpCache,
    logging::{drop_event, forward_event},
    network::{Mac, Slot, Transport},
    protocols::{
        ethernet::{self, EthernetHeader},
        ipv4::{self, rewrite_time_to_live, Ipv4Address, Ipv4Header, ProtocolNumber},
        rip::RIP_PORT,
    },
    route_table::RouteTable,
    Frame,
};
use std::sync::Arc;

/// What became of a received frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Sent out of `slot` toward `next_hop`.
    Forwarded { slot: Slot, next_hop: Ipv4Address },
    /// A routing protocol datagram addressed to this router.
    Local(LocalDatagram),
    /// Addressed to this router but not for any service it runs.
    Absorbed,
    Dropped(DropReason),
}

/// Why a frame was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The frame does not carry IPv4.
    NotIpv4,
    /// The frame or IPv4 header is truncated or inconsistent.
    Malformed,
    /// The IPv4 header checksum does not match its contents.
    Checksum,
    /// The time to live ran out.
    TtlExpired,
    /// No route covers the destination.
    NoRoute,
    /// The best route leads back out of the receiving interface.
    Loopback,
    /// The best route has been withdrawn.
    Unreachable,
    /// The next hop has no known link-layer address.
    ArpMiss,
    /// The transport refused the frame.
    Transmit,
}

/// An IPv4 datagram addressed to the router itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDatagram {
    /// The interface it arrived on
    pub slot: Slot,
    /// The link-layer address of the neighbor that sent it
    pub source_mac: Mac,
    /// Its header, after the time to live was decremented
    pub header: Ipv4Header,
    /// The bytes following the IPv4 header
    pub payload: Vec<u8>,
}

/// The forwarding half of a router: checks, decrements, and either delivers
/// locally or sends each datagram on toward its destination.
pub struct Forwarding {
    table: Arc<RouteTable>,
    arp: Arc<ArpCache>,
    transport: Arc<dyn Transport>,
}

impl Forwarding {
    pub fn new(table: Arc<RouteTable>, arp: Arc<ArpCache>, transport: Arc<dyn Transport>) -> Self {
        Self {
            table,
            arp,
            transport,
        }
    }

    /// Processes a frame that arrived on `slot`.
    pub fn on_receive(&self, frame: Frame, slot: Slot) -> Disposition {
        let disposition = match self.process(frame, slot) {
            Ok(disposition) => disposition,
            Err(reason) => Disposition::Dropped(reason),
        };
        if let Disposition::Dropped(reason) = disposition {
            drop_event(slot, reason);
        }
        disposition
    }

    fn process(&self, mut frame: Frame, slot: Slot) -> Result<Disposition, DropReason> {
        let ethernet = EthernetHeader::from_bytes(frame.iter().cloned())
            .map_err(|_| DropReason::Malformed)?;
        if ethernet.ether_type != ipv4::ETHER_TYPE {
            Err(DropReason::NotIpv4)?
        }

        let header = Ipv4Header::from_bytes(frame[ethernet::HEADER_OCTETS..].iter().cloned())
            .map_err(|e| match e {
                ipv4::ipv4_parsing::ParseError::Checksum { .. } => DropReason::Checksum,
                _ => DropReason::Malformed,
            })?;
        let datagram_end = ethernet::HEADER_OCTETS + header.total_length as usize;
        if frame.len() < datagram_end {
            Err(DropReason::Malformed)?
        }

        let time_to_live = header.time_to_live.saturating_sub(1);
        if time_to_live == 0 {
            Err(DropReason::TtlExpired)?
        }
        let header_end = ethernet::HEADER_OCTETS + header.header_len();
        rewrite_time_to_live(
            &mut frame[ethernet::HEADER_OCTETS..header_end],
            time_to_live,
        );

        if self.is_local(header.destination) {
            let payload = &frame[header_end..datagram_end];
            if !is_rip(&header, payload) {
                return Ok(Disposition::Absorbed);
            }
            return Ok(Disposition::Local(LocalDatagram {
                slot,
                source_mac: ethernet.source,
                header: Ipv4Header {
                    time_to_live,
                    ..header
                },
                payload: payload.to_vec(),
            }));
        }

        let route = self
            .table
            .lookup(header.destination)
            .ok_or(DropReason::NoRoute)?;
        if route.interface == slot {
            Err(DropReason::Loopback)?
        }
        if !route.is_reachable() {
            Err(DropReason::Unreachable)?
        }
        let next_hop = if route.is_direct() {
            header.destination
        } else {
            route.gateway
        };
        let mac = self.arp.lookup(next_hop).ok_or(DropReason::ArpMiss)?;
        let out = self
            .transport
            .interfaces()
            .get(route.interface)
            .ok_or(DropReason::Transmit)?;
        ethernet::rewrite_addresses(&mut frame, mac, out.mac);

        self.transport
            .send(frame, route.interface)
            .map_err(|_| DropReason::Transmit)?;
        forward_event(slot, header.destination, next_hop, route.interface);
        Ok(Disposition::Forwarded {
            slot: route.interface,
            next_hop,
        })
    }

    fn is_local(&self, destination: Ipv4Address) -> bool {
        destination == Ipv4Address::RIP_ROUTERS
            || destination == Ipv4Address::SUBNET
            || self.transport.interfaces().is_local_address(destination)
    }
}

/// Whether a datagram is UDP addressed to the routing protocol's port.
fn is_rip(header: &Ipv4Header, payload: &[u8]) -> bool {
    ProtocolNumber::from(header.protocol) == ProtocolNumber::Udp
        && payload.len() >= 4
        && u16::from_be_bytes([payload[2], payload[3]]) == RIP_PORT
}
