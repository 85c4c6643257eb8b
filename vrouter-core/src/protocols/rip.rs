//! A RIPv2 distance-vector routing engine.
//!
//! The engine keeps the connected and learned routes of a [`RouteTable`] up
//! to date by exchanging advertisements with directly attached neighbors. It
//! never forwards anything itself: the router hands it datagrams addressed to
//! [`RIP_PORT`] and drives its timers.

pub mod rip_parsing;
pub use rip_parsing::{Command, RipEntry, RipPacket};

use crate::{
    forwarding::LocalDatagram,
    logging::rip_event,
    network::{Interface, Mac, SendError, Slot, Transport, BROADCAST_MAC},
    protocols::{
        ethernet::EthernetHeader,
        ipv4::{
            self, ipv4_parsing::HeaderBuildError, Ipv4Address, Ipv4HeaderBuilder, ProtocolNumber,
        },
        udp::{self, build_udp_header, udp_parsing::BuildHeaderError, UdpHeader},
    },
    route_table::{Origin, RouteEntry, RouteTable, INFINITY},
    Frame,
};
use std::{sync::Arc, time::Duration};
use thiserror::Error as ThisError;
use tokio::time::Instant;

/// The UDP port RIP speaks on, both ends.
pub const RIP_PORT: u16 = 520;
/// How often the whole table is advertised unsolicited.
pub const UPDATE_PERIOD: Duration = Duration::from_secs(10);
/// How long a learned route survives without being refreshed.
pub const ROUTE_TIMEOUT: Duration = Duration::from_secs(30);
/// How often the table is checked for expired routes.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(1);
/// Advertisements only need to survive the decrement on the neighbor.
const TIME_TO_LIVE: u8 = 2;

/// What an accepted advertisement entry did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Insert,
    Replace,
    Withdraw,
    Ignore,
}

/// The routing protocol half of a router.
pub struct Rip {
    table: Arc<RouteTable>,
    transport: Arc<dyn Transport>,
}

impl Rip {
    pub fn new(table: Arc<RouteTable>, transport: Arc<dyn Transport>) -> Self {
        Self { table, transport }
    }

    /// Installs the connected routes and asks every neighbor for its table.
    pub fn start(&self) {
        self.table.insert_connected();
        let request = RipPacket::new_full_table_request();
        for iface in self.transport.interfaces().iter() {
            self.send_logged(&request, iface, Ipv4Address::RIP_ROUTERS, BROADCAST_MAC);
        }
    }

    /// Sends the whole table out of every interface. Called every
    /// [`UPDATE_PERIOD`].
    pub fn advertise(&self) {
        let packets = RipPacket::new_responses(self.advertised_entries());
        for iface in self.transport.interfaces().iter() {
            for packet in packets.iter() {
                self.send_logged(packet, iface, Ipv4Address::RIP_ROUTERS, BROADCAST_MAC);
            }
        }
    }

    /// Handles a RIP datagram addressed to this router.
    pub fn on_receive(&self, datagram: &LocalDatagram) -> Result<(), RipError> {
        let header = &datagram.header;
        let udp = UdpHeader::from_bytes_ipv4(
            datagram.payload.iter().cloned(),
            datagram.payload.len(),
            header.source,
            header.destination,
        )?;
        if udp.destination != RIP_PORT {
            Err(RipError::Port(udp.destination))?
        }
        let body = &datagram.payload[udp::udp_parsing::HEADER_OCTETS as usize..];
        let packet = RipPacket::from_bytes(body)?;
        rip_event(
            "received",
            datagram.slot,
            header.source,
            packet.command,
            packet.entries.len(),
        );

        match packet.command {
            Command::Request => {
                let iface = self
                    .transport
                    .interfaces()
                    .get(datagram.slot)
                    .ok_or(SendError::UnknownSlot(datagram.slot))?;
                for response in RipPacket::new_responses(self.advertised_entries()) {
                    self.send(&response, iface, header.source, datagram.source_mac)?;
                }
            }
            Command::Response => {
                let now = Instant::now();
                for entry in packet.entries.iter() {
                    self.process_entry(entry, header.source, datagram.slot, now);
                }
            }
        }
        Ok(())
    }

    /// Applies one advertised route from `sender`, heard on `slot`.
    fn process_entry(
        &self,
        advertised: &RipEntry,
        sender: Ipv4Address,
        slot: Slot,
        now: Instant,
    ) -> Decision {
        let interfaces = self.transport.interfaces();
        // A route through ourselves is no route at all
        if interfaces.is_local_address(advertised.next_hop) {
            return Decision::Ignore;
        }
        // A hint off the receiving link is treated as no hint
        let on_link = interfaces
            .get(slot)
            .map_or(false, |iface| iface.network().contains(advertised.next_hop));
        let next_hop = if advertised.next_hop.is_unspecified() || !on_link {
            sender
        } else {
            advertised.next_hop
        };
        // Anything advertised below infinity counts, even if the extra hop
        // makes it unreachable here
        let reachable = advertised.metric < INFINITY as u32;
        let candidate = advertised.metric.saturating_add(1).min(INFINITY as u32) as u8;

        let mut decision = Decision::Ignore;
        self.table.modify(
            advertised.address,
            advertised.subnet_mask,
            |existing| {
                let learned = || RouteEntry {
                    last_refreshed: now,
                    ..RouteEntry::new(
                        advertised.address,
                        next_hop,
                        advertised.subnet_mask,
                        slot,
                        candidate,
                        Origin::Learned,
                    )
                };
                decision = decide(existing, sender, slot, candidate, reachable);
                match decision {
                    Decision::Insert | Decision::Replace => Some(learned()),
                    Decision::Withdraw => existing.map(|entry| RouteEntry {
                        metric: INFINITY,
                        ..*entry
                    }),
                    Decision::Ignore => None,
                }
            },
        );
        decision
    }

    /// The table as it is advertised: every route with its own metric and
    /// its gateway as the next hop hint.
    fn advertised_entries(&self) -> Vec<RipEntry> {
        self.table
            .entries()
            .into_iter()
            .map(|entry| {
                RipEntry::new(
                    entry.destination,
                    entry.mask,
                    entry.gateway,
                    entry.metric as u32,
                )
            })
            .collect()
    }

    fn send_logged(
        &self,
        packet: &RipPacket,
        iface: &Interface,
        destination: Ipv4Address,
        mac: Mac,
    ) {
        if let Err(e) = self.send(packet, iface, destination, mac) {
            tracing::warn!(interface = %iface.name, "Failed to send RIP message: {}", e);
        }
    }

    fn send(
        &self,
        packet: &RipPacket,
        iface: &Interface,
        destination: Ipv4Address,
        mac: Mac,
    ) -> Result<(), RipError> {
        let frame = build_frame(packet, iface, destination, mac)?;
        self.transport.send(frame, iface.slot)?;
        rip_event("sent", iface.slot, destination, packet.command, packet.entries.len());
        Ok(())
    }
}

/// The distance-vector update rule for one advertised route.
fn decide(
    existing: Option<&RouteEntry>,
    sender: Ipv4Address,
    slot: Slot,
    candidate: u8,
    reachable: bool,
) -> Decision {
    match existing {
        None if reachable => Decision::Insert,
        None => Decision::Ignore,
        // Local knowledge always wins
        Some(existing) if existing.origin != Origin::Learned => Decision::Ignore,
        // The current next hop is trusted even when the route got worse
        Some(existing) if existing.gateway == sender && existing.interface == slot => {
            if reachable {
                Decision::Replace
            } else if existing.is_reachable() {
                Decision::Withdraw
            } else {
                Decision::Ignore
            }
        }
        Some(existing) if reachable && candidate < existing.metric && !existing.is_direct() => {
            Decision::Replace
        }
        Some(_) => Decision::Ignore,
    }
}

/// Wraps a RIP message in UDP, IPv4, and Ethernet headers addressed from
/// `iface`.
fn build_frame(
    packet: &RipPacket,
    iface: &Interface,
    destination: Ipv4Address,
    mac: Mac,
) -> Result<Frame, RipError> {
    let body = packet.build();
    let udp = build_udp_header(
        iface.address,
        RIP_PORT,
        destination,
        RIP_PORT,
        body.iter().cloned(),
        body.len(),
    )?;
    let ip = Ipv4HeaderBuilder::new(
        iface.address,
        destination,
        ProtocolNumber::Udp as u8,
        (udp.len() + body.len()) as u16,
    )
    .time_to_live(TIME_TO_LIVE)
    .build()?;
    let mut frame = EthernetHeader::new(mac, iface.mac, ipv4::ETHER_TYPE).build();
    frame.reserve(ip.len() + udp.len() + body.len());
    frame.extend(ip);
    frame.extend(udp);
    frame.extend(body);
    Ok(frame)
}

/// Why a RIP datagram was rejected or could not be answered.
#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum RipError {
    #[error("Malformed UDP header: {0}")]
    Udp(#[from] udp::udp_parsing::ParseError),
    #[error("Datagram is for UDP port {0}, not RIP")]
    Port(u16),
    #[error("Malformed RIP message: {0}")]
    Parse(#[from] rip_parsing::ParseError),
    #[error("Could not build a UDP header: {0}")]
    UdpBuild(#[from] BuildHeaderError),
    #[error("Could not build an IPv4 header: {0}")]
    Ipv4Build(#[from] HeaderBuildError),
    #[error("Could not send a reply: {0}")]
    Send(#[from] SendError),
}

impl RipError {
    /// Whether the sender broke the protocol, as opposed to sending
    /// something damaged in transit.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, RipError::Parse(rip_parsing::ParseError::UnknownCommand(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        network::{Interface, Interfaces},
        networks::Capture,
        protocols::{
            ethernet,
            ipv4::{Ipv4Header, Ipv4Mask},
        },
    };

    const ETH0: Slot = 0;
    const ETH1: Slot = 1;
    const N1: [u8; 4] = [192, 168, 1, 2];
    const N2: [u8; 4] = [192, 168, 1, 3];
    const N3: [u8; 4] = [192, 168, 1, 4];
    const N1_MAC: Mac = 0x0200_0000_00aa;

    fn interfaces() -> Interfaces {
        Interfaces::new([
            Interface {
                slot: 0,
                name: "eth0".into(),
                address: [192, 168, 1, 1].into(),
                mask: Ipv4Mask::from_bitcount(24),
                mac: 0x0200_0000_0001,
            },
            Interface {
                slot: 0,
                name: "eth1".into(),
                address: [10, 0, 0, 1].into(),
                mask: Ipv4Mask::from_bitcount(24),
                mac: 0x0200_0000_0002,
            },
        ])
    }

    fn engine() -> (Rip, Arc<RouteTable>, Arc<Capture>) {
        let interfaces = interfaces();
        let table = Arc::new(RouteTable::new(interfaces.clone()));
        let capture = Arc::new(Capture::new(interfaces));
        (Rip::new(table.clone(), capture.clone()), table, capture)
    }

    fn net(a: u8, b: u8, c: u8, len: u32) -> (Ipv4Address, Ipv4Mask) {
        (Ipv4Address::new([a, b, c, 0]), Ipv4Mask::from_bitcount(len))
    }

    /// A datagram as the forwarding pipeline would hand it over.
    fn datagram(sender: [u8; 4], slot: Slot, packet: &RipPacket) -> LocalDatagram {
        let body = packet.build();
        let mut payload = build_udp_header(
            sender.into(),
            RIP_PORT,
            Ipv4Address::RIP_ROUTERS,
            RIP_PORT,
            body.iter().cloned(),
            body.len(),
        )
        .unwrap();
        payload.extend(body);
        let header = Ipv4HeaderBuilder::new(
            sender.into(),
            Ipv4Address::RIP_ROUTERS,
            17,
            payload.len() as u16,
        )
        .time_to_live(1)
        .build()
        .unwrap();
        LocalDatagram {
            slot,
            source_mac: N1_MAC,
            header: Ipv4Header::from_bytes(header.into_iter()).unwrap(),
            payload,
        }
    }

    fn response(routes: &[((Ipv4Address, Ipv4Mask), u32)]) -> RipPacket {
        RipPacket::new_responses(
            routes
                .iter()
                .map(|((address, mask), metric)| {
                    RipEntry::new(*address, *mask, Ipv4Address::CURRENT_NETWORK, *metric)
                })
                .collect(),
        )
        .remove(0)
    }

    /// Decodes a captured frame back into its addressing and RIP message.
    fn decode(frame: &[u8]) -> (EthernetHeader, Ipv4Header, RipPacket) {
        let ethernet = EthernetHeader::from_bytes(frame.iter().cloned()).unwrap();
        let ip = &frame[ethernet::HEADER_OCTETS..];
        let header = Ipv4Header::from_bytes(ip.iter().cloned()).unwrap();
        let udp = &ip[header.header_len()..];
        UdpHeader::from_bytes_ipv4(udp.iter().cloned(), udp.len(), header.source, header.destination)
            .unwrap();
        let packet = RipPacket::from_bytes(&udp[8..]).unwrap();
        (ethernet, header, packet)
    }

    #[test]
    fn start_installs_connected_routes_and_requests_tables() {
        let (rip, table, capture) = engine();
        rip.start();

        let (dest, mask) = net(10, 0, 0, 24);
        let connected = table.find(dest, mask).unwrap();
        assert_eq!(connected.origin, Origin::Connected);
        assert_eq!(connected.metric, 0);
        assert!(connected.is_direct());
        assert_eq!(table.len(), 2);

        let sent = capture.take();
        assert_eq!(sent.iter().map(|(_, slot)| *slot).collect::<Vec<_>>(), [ETH0, ETH1]);
        for (frame, _) in sent {
            let (ethernet, header, packet) = decode(&frame);
            assert_eq!(ethernet.destination, BROADCAST_MAC);
            assert_eq!(header.destination, Ipv4Address::RIP_ROUTERS);
            assert_eq!(header.time_to_live, TIME_TO_LIVE);
            assert_eq!(packet, RipPacket::new_full_table_request());
        }
    }

    #[test]
    fn learns_advertised_route() {
        let (rip, table, _) = engine();
        rip.start();
        let advertised = net(172, 16, 0, 16);
        rip.on_receive(&datagram(N1, ETH0, &response(&[(advertised, 1)])))
            .unwrap();

        let entry = table.find(advertised.0, advertised.1).unwrap();
        assert_eq!(entry.gateway, N1.into());
        assert_eq!(entry.interface, ETH0);
        assert_eq!(entry.metric, 2);
        assert_eq!(entry.origin, Origin::Learned);
    }

    #[test]
    fn metric_rule() {
        let (rip, table, _) = engine();
        let (dest, mask) = net(10, 9, 0, 24);
        let now = Instant::now();
        table.insert(RouteEntry::new(dest, N1.into(), mask, ETH0, 3, Origin::Learned));

        // Strictly better from another neighbor replaces
        let advertised = RipEntry::new(dest, mask, Ipv4Address::CURRENT_NETWORK, 1);
        assert_eq!(rip.process_entry(&advertised, N2.into(), ETH0, now), Decision::Replace);
        let entry = table.find(dest, mask).unwrap();
        assert_eq!((entry.gateway, entry.metric), (N2.into(), 2));

        // Worse from another neighbor does not
        let advertised = RipEntry::new(dest, mask, Ipv4Address::CURRENT_NETWORK, 3);
        assert_eq!(rip.process_entry(&advertised, N3.into(), ETH0, now), Decision::Ignore);
        assert_eq!(table.find(dest, mask).unwrap().gateway, N2.into());

        // Worse from the current next hop is trusted
        let advertised = RipEntry::new(dest, mask, Ipv4Address::CURRENT_NETWORK, 5);
        assert_eq!(rip.process_entry(&advertised, N2.into(), ETH0, now), Decision::Replace);
        assert_eq!(table.find(dest, mask).unwrap().metric, 6);

        // Infinity from the current next hop withdraws the route
        let advertised = RipEntry::new(dest, mask, Ipv4Address::CURRENT_NETWORK, 20);
        assert_eq!(rip.process_entry(&advertised, N2.into(), ETH0, now), Decision::Withdraw);
        let entry = table.find(dest, mask).unwrap();
        assert_eq!(entry.metric, INFINITY);
        assert_eq!(entry.gateway, N2.into());
    }

    #[test]
    fn unreachable_routes_are_not_learned() {
        let (rip, table, _) = engine();
        let (dest, mask) = net(10, 9, 0, 24);
        let now = Instant::now();
        for metric in [16, 20] {
            let advertised = RipEntry::new(dest, mask, Ipv4Address::CURRENT_NETWORK, metric);
            assert_eq!(rip.process_entry(&advertised, N1.into(), ETH0, now), Decision::Ignore);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn one_hop_short_of_infinity_is_still_learned() {
        let (rip, table, _) = engine();
        let (dest, mask) = net(172, 16, 0, 16);
        let advertised = RipEntry::new(dest, mask, Ipv4Address::CURRENT_NETWORK, 15);
        assert_eq!(
            rip.process_entry(&advertised, N1.into(), ETH0, Instant::now()),
            Decision::Insert
        );
        let entry = table.find(dest, mask).unwrap();
        assert_eq!(entry.origin, Origin::Learned);
        assert_eq!(entry.gateway, N1.into());
        assert_eq!(entry.metric, INFINITY);
    }

    #[tokio::test(start_paused = true)]
    async fn current_next_hop_keeps_a_distant_route_alive() {
        let (rip, table, _) = engine();
        let (dest, mask) = net(172, 16, 0, 16);
        let advertised = RipEntry::new(dest, mask, Ipv4Address::CURRENT_NETWORK, 3);
        rip.process_entry(&advertised, N1.into(), ETH0, Instant::now());

        // The route drifts to the edge of reach but its owner keeps
        // advertising it
        let advertised = RipEntry::new(dest, mask, Ipv4Address::CURRENT_NETWORK, 15);
        for _ in 0..4 {
            tokio::time::advance(UPDATE_PERIOD).await;
            assert_eq!(
                rip.process_entry(&advertised, N1.into(), ETH0, Instant::now()),
                Decision::Replace
            );
            assert!(table.sweep_expired(ROUTE_TIMEOUT).is_empty());
        }
        let entry = table.find(dest, mask).unwrap();
        assert_eq!(entry.metric, INFINITY);
        assert_eq!(entry.last_refreshed, Instant::now());
    }

    #[test]
    fn connected_routes_are_never_overwritten() {
        let (rip, table, _) = engine();
        rip.start();
        let (dest, mask) = net(10, 0, 0, 24);
        rip.on_receive(&datagram(N1, ETH0, &response(&[((dest, mask), 0)])))
            .unwrap();
        let entry = table.find(dest, mask).unwrap();
        assert_eq!(entry.origin, Origin::Connected);
        assert_eq!(entry.interface, ETH1);
    }

    #[test]
    fn static_routes_are_never_overwritten() {
        let (rip, table, _) = engine();
        let (dest, mask) = net(172, 16, 0, 16);
        table.insert(RouteEntry::new(dest, N3.into(), mask, ETH0, 5, Origin::Static));
        let advertised = RipEntry::new(dest, mask, Ipv4Address::CURRENT_NETWORK, 1);
        assert_eq!(
            rip.process_entry(&advertised, N1.into(), ETH0, Instant::now()),
            Decision::Ignore
        );
        assert_eq!(table.find(dest, mask).unwrap().origin, Origin::Static);
    }

    #[test]
    fn next_hop_hint_is_used() {
        let (rip, table, _) = engine();
        let (dest, mask) = net(172, 17, 0, 16);
        let advertised = RipEntry::new(dest, mask, N3.into(), 1);
        assert_eq!(
            rip.process_entry(&advertised, N1.into(), ETH0, Instant::now()),
            Decision::Insert
        );
        assert_eq!(table.find(dest, mask).unwrap().gateway, N3.into());

        // A hint pointing back at us is useless
        let (dest, mask) = net(172, 18, 0, 16);
        let advertised = RipEntry::new(dest, mask, [192, 168, 1, 1].into(), 1);
        assert_eq!(
            rip.process_entry(&advertised, N1.into(), ETH0, Instant::now()),
            Decision::Ignore
        );

        // A hint on some other link falls back to the sender
        let (dest, mask) = net(172, 19, 0, 16);
        let advertised = RipEntry::new(dest, mask, [10, 9, 9, 9].into(), 1);
        assert_eq!(
            rip.process_entry(&advertised, N1.into(), ETH0, Instant::now()),
            Decision::Insert
        );
        assert_eq!(table.find(dest, mask).unwrap().gateway, N1.into());
    }

    #[test]
    fn answers_requests_directly() {
        let (rip, _, capture) = engine();
        rip.start();
        capture.take();

        rip.on_receive(&datagram(N1, ETH0, &RipPacket::new_full_table_request()))
            .unwrap();
        let sent = capture.take();
        assert_eq!(sent.len(), 1);
        let (frame, slot) = &sent[0];
        assert_eq!(*slot, ETH0);
        let (ethernet, header, packet) = decode(frame);
        assert_eq!(ethernet.destination, N1_MAC);
        assert_eq!(header.source, [192, 168, 1, 1].into());
        assert_eq!(header.destination, N1.into());
        assert_eq!(packet.command, Command::Response);
        let mut advertised: Vec<_> = packet
            .entries
            .iter()
            .map(|e| (e.address, e.subnet_mask.count_ones(), e.metric))
            .collect();
        advertised.sort();
        assert_eq!(
            advertised,
            [([10, 0, 0, 0].into(), 24, 0), ([192, 168, 1, 0].into(), 24, 0)]
        );
    }

    #[test]
    fn advertises_out_every_interface() {
        let (rip, _, capture) = engine();
        rip.start();
        capture.take();
        rip.advertise();
        let sent = capture.take();
        assert_eq!(sent.len(), 2);
        for (frame, _) in sent {
            let (ethernet, _, packet) = decode(&frame);
            assert_eq!(ethernet.destination, BROADCAST_MAC);
            assert_eq!(packet.command, Command::Response);
            assert_eq!(packet.entries.len(), 2);
        }
    }

    #[test]
    fn rejects_bad_messages() {
        let (rip, table, _) = engine();
        let mut bad = datagram(N1, ETH0, &response(&[(net(172, 16, 0, 16), 1)]));
        // Flip a bit in the body so the UDP checksum fails
        let last = bad.payload.len() - 1;
        bad.payload[last] ^= 1;
        assert!(matches!(rip.on_receive(&bad), Err(RipError::Udp(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn unknown_command_is_a_protocol_violation() {
        let (rip, _, _) = engine();
        let mut packet = datagram(N1, ETH0, &RipPacket::new_full_table_request());
        // Rebuild the UDP header around a body with command 9
        let body = [9, 2, 0, 0];
        packet.payload = build_udp_header(
            N1.into(),
            RIP_PORT,
            Ipv4Address::RIP_ROUTERS,
            RIP_PORT,
            body.iter().cloned(),
            body.len(),
        )
        .unwrap();
        packet.payload.extend(body);
        let error = rip.on_receive(&packet).unwrap_err();
        assert!(error.is_protocol_violation());
        assert_eq!(
            error,
            RipError::Parse(rip_parsing::ParseError::UnknownCommand(9))
        );
    }
}
