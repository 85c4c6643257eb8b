//! Wrapper functions for the router's structured log events. Each function
//! corresponds to one kind of event and logs under its own target, so a
//! subscriber can filter them independently (`RUST_LOG=routes=debug`).

use crate::{
    forwarding::DropReason,
    network::Slot,
    protocols::{ipv4::Ipv4Address, rip::Command},
    route_table::RouteEntry,
};
use tracing::{event, Level};

/// A change to the route table: `insert`, `replace`, `update`, `withdraw`,
/// `remove`, or `expire`.
pub fn route_event(action: &str, entry: &RouteEntry) {
    event!(
        target: "routes",
        Level::DEBUG,
        action,
        destination = %entry.destination,
        mask = %entry.mask,
        gateway = %entry.gateway,
        interface = entry.interface,
        metric = entry.metric,
        origin = ?entry.origin,
    );
}

/// A datagram the router discarded.
pub fn drop_event(slot: Slot, reason: DropReason) {
    event!(target: "drops", Level::TRACE, slot, reason = ?reason);
}

/// A datagram sent on toward its destination.
pub fn forward_event(
    slot: Slot,
    destination: Ipv4Address,
    next_hop: Ipv4Address,
    out_slot: Slot,
) {
    event!(
        target: "forwarding",
        Level::TRACE,
        slot,
        destination = %destination,
        next_hop = %next_hop,
        out_slot,
    );
}

/// A routing protocol message sent or received.
pub fn rip_event(direction: &str, slot: Slot, peer: Ipv4Address, command: Command, entries: usize) {
    event!(
        target: "rip",
        Level::DEBUG,
        direction,
        slot,
        peer = %peer,
        command = ?command,
        entries,
    );
}
