//! The composition root that ties a transport, a route table, the
//! forwarding pipeline, and the routing protocol into one device.

use crate::{
    arp_cache::ArpCache,
    forwarding::{Disposition, Forwarding},
    network::{Delivery, Slot, Transport},
    protocols::{
        ipv4::{Ipv4Address, Ipv4Mask},
        rip::{Rip, ROUTE_TIMEOUT, SWEEP_PERIOD, UPDATE_PERIOD},
    },
    route_table::{Origin, RouteEntry, RouteTable},
    shutdown::{ExitStatus, Shutdown},
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinSet,
    time::{interval_at, Instant, MissedTickBehavior},
};

/// A software IP router.
///
/// Frames come in through [`Router::receive`], usually from
/// [`Router::run`] draining the channel its transport delivers on.
pub struct Router {
    table: Arc<RouteTable>,
    arp: Arc<ArpCache>,
    forwarding: Forwarding,
    rip: Option<Rip>,
}

impl Router {
    /// Creates a router on `transport`. With `rip` false the router only
    /// knows its connected and static routes.
    pub fn new(transport: Arc<dyn Transport>, arp: ArpCache, rip: bool) -> Self {
        let table = Arc::new(RouteTable::new(transport.interfaces().clone()));
        let arp = Arc::new(arp);
        Self {
            forwarding: Forwarding::new(table.clone(), arp.clone(), transport.clone()),
            rip: rip.then(|| Rip::new(table.clone(), transport)),
            table,
            arp,
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn arp(&self) -> &ArpCache {
        &self.arp
    }

    pub fn rip_enabled(&self) -> bool {
        self.rip.is_some()
    }

    /// Adds a route that never expires and is never replaced by a learned
    /// one.
    pub fn add_static_route(
        &self,
        destination: Ipv4Address,
        gateway: Ipv4Address,
        mask: Ipv4Mask,
        slot: Slot,
        metric: u8,
    ) {
        self.table.insert(RouteEntry::new(
            destination,
            gateway,
            mask,
            slot,
            metric,
            Origin::Static,
        ));
    }

    /// Installs the connected routes and, with RIP enabled, requests the
    /// neighbors' tables.
    pub fn start(&self) {
        match &self.rip {
            Some(rip) => rip.start(),
            None => self.table.insert_connected(),
        }
    }

    /// Handles one received frame.
    pub fn receive(&self, delivery: Delivery) -> Disposition {
        let disposition = self.forwarding.on_receive(delivery.frame, delivery.slot);
        if let Disposition::Local(datagram) = &disposition {
            match &self.rip {
                Some(rip) => {
                    if let Err(e) = rip.on_receive(datagram) {
                        if e.is_protocol_violation() {
                            tracing::warn!(
                                slot = datagram.slot,
                                source = %datagram.header.source,
                                "Rejected RIP message: {}",
                                e
                            );
                        } else {
                            tracing::debug!(
                                slot = datagram.slot,
                                source = %datagram.header.source,
                                "Dropped RIP message: {}",
                                e
                            );
                        }
                    }
                }
                None => tracing::trace!(slot = datagram.slot, "RIP is disabled"),
            }
        }
        disposition
    }

    /// Sends the periodic unsolicited advertisement, if RIP is enabled.
    pub fn advertise(&self) {
        if let Some(rip) = &self.rip {
            rip.advertise();
        }
    }

    /// Removes learned routes that have not been refreshed in time.
    pub fn sweep(&self) {
        self.table.sweep_expired(ROUTE_TIMEOUT);
    }

    /// Starts the router and runs it until shut down or until the
    /// transport stops delivering.
    ///
    /// Each delivery is handled in its own task. The advertisement and
    /// expiry timers run in tasks of their own.
    pub async fn run(
        self: Arc<Self>,
        mut deliveries: mpsc::Receiver<Delivery>,
        mut shutdown: Shutdown,
    ) -> ExitStatus {
        self.start();
        // Dropping the set stops the timers
        let mut timers = JoinSet::new();
        timers.spawn(self.clone().every(UPDATE_PERIOD, Router::advertise));
        timers.spawn(self.clone().every(SWEEP_PERIOD, Router::sweep));
        loop {
            tokio::select! {
                delivery = deliveries.recv() => match delivery {
                    Some(delivery) => {
                        let router = self.clone();
                        tokio::spawn(async move { router.receive(delivery) });
                    }
                    None => {
                        tracing::info!("Transport closed, stopping router");
                        return ExitStatus::Exited;
                    }
                },
                status = shutdown.wait_for_shutdown() => {
                    tracing::info!("Router shutting down");
                    return status;
                }
            }
        }
    }

    /// Calls `tick` every `period`, starting one period from now.
    async fn every(self: Arc<Self>, period: Duration, tick: fn(&Router)) {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            tick(&self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        network::{Interface, Interfaces},
        networks::Capture,
    };

    fn capture() -> Arc<Capture> {
        Arc::new(Capture::new(Interfaces::new([Interface {
            slot: 0,
            name: "eth0".into(),
            address: [192, 168, 1, 1].into(),
            mask: Ipv4Mask::from_bitcount(24),
            mac: 1,
        }])))
    }

    #[test]
    fn static_mode_sends_nothing() {
        let capture = capture();
        let router = Router::new(capture.clone(), ArpCache::new(), false);
        router.start();
        router.advertise();
        assert!(!router.rip_enabled());
        assert_eq!(router.table().len(), 1);
        assert!(capture.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_advertises_on_schedule_until_shut_down() {
        let capture = capture();
        let router = Arc::new(Router::new(capture.clone(), ArpCache::new(), true));
        let (_deliver, deliveries) = mpsc::channel(1);
        let shutdown = Shutdown::new();
        let handle = tokio::spawn({
            let router = router.clone();
            let shutdown = shutdown.clone();
            async move { router.run(deliveries, shutdown).await }
        });

        // The startup request
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        assert_eq!(capture.take().len(), 1);

        tokio::time::sleep(UPDATE_PERIOD).await;
        assert_eq!(capture.take().len(), 1);

        shutdown.shut_down();
        assert_eq!(handle.await.unwrap(), ExitStatus::Exited);
    }
}
