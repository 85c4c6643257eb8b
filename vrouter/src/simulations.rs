//! Canned in-memory networks of several routers, used to watch routes
//! propagate and datagrams cross more than one hop.

use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::Instant};
use vrouter_core::{
    network::SendError,
    networks::{Attachment, LinkTransport, Segment},
    protocols::{
        ethernet::{self, EthernetHeader},
        ipv4::{
            self, ipv4_parsing::HeaderBuildError, Ipv4Address, Ipv4Header, Ipv4HeaderBuilder,
            Ipv4Mask,
        },
    },
    ArpCache, ExitStatus, Frame, Interface, Interfaces, Mac, Router, Shutdown,
};

/// How the routers in a simulation learn about remote subnets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// The routers exchange RIP advertisements.
    Rip,
    /// Every router is configured with static routes to every remote subnet
    /// and RIP is off.
    Static,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Could not build the datagram: {0}")]
    Build(#[from] HeaderBuildError),
    #[error("Could not put the frame on the segment: {0}")]
    Send(#[from] SendError),
}

/// Routers connected in a line by point-to-point segments, with a host on
/// every segment:
///
/// ```text
/// host0 -- seg0 -- R0 -- seg1 -- R1 -- seg2 -- ... -- R(n-1) -- seg(n)
/// ```
///
/// Segment `j` is the subnet `10.0.j.0/24`. On it the router to the left
/// is `10.0.j.1`, the router to the right is `10.0.j.2`, and the host is
/// `10.0.j.100`.
pub struct Chain {
    routers: Vec<Arc<Router>>,
    hosts: Vec<Attachment>,
    shutdown: Shutdown,
    handles: Vec<JoinHandle<ExitStatus>>,
}

const HOST: u8 = 100;

impl Chain {
    /// Builds and starts a chain of `count` routers. Must be called from
    /// within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero or exceeds 254.
    pub fn new(count: usize, routing: Routing) -> Self {
        assert!((1..=254).contains(&count), "a chain holds 1 to 254 routers");
        let segments: Vec<Segment> = (0..=count).map(|_| Segment::new()).collect();
        let hosts = (0..=count)
            .map(|j| segments[j].attach(Self::host_mac(j)))
            .collect();
        let shutdown = Shutdown::new();
        let mut routers = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);
        for i in 0..count {
            let interfaces = Interfaces::new([
                Interface {
                    slot: 0,
                    name: "eth0".into(),
                    address: Self::station(i, 2),
                    mask: Self::MASK,
                    mac: Self::router_mac(i, 0),
                },
                Interface {
                    slot: 1,
                    name: "eth1".into(),
                    address: Self::station(i + 1, 1),
                    mask: Self::MASK,
                    mac: Self::router_mac(i, 1),
                },
            ]);
            let links = vec![segments[i].clone(), segments[i + 1].clone()];
            let (transport, deliveries) = LinkTransport::new(interfaces, links);
            let arp = Self::neighbors(i, count);
            let router = Arc::new(Router::new(
                Arc::new(transport),
                arp,
                routing == Routing::Rip,
            ));
            if routing == Routing::Static {
                Self::add_static_routes(&router, i, count);
            }
            handles.push(tokio::spawn({
                let router = router.clone();
                let shutdown = shutdown.clone();
                async move { router.run(deliveries, shutdown).await }
            }));
            routers.push(router);
        }
        tracing::info!(routers = count, ?routing, "Chain up");
        Self {
            routers,
            hosts,
            shutdown,
            handles,
        }
    }

    const MASK: Ipv4Mask = Ipv4Mask::from_bitcount(24);

    /// Address `host` on segment `segment`.
    fn station(segment: usize, host: u8) -> Ipv4Address {
        Ipv4Address::new([10, 0, segment as u8, host])
    }

    fn router_mac(router: usize, slot: u8) -> Mac {
        0x0200_0000_0000 | (router as Mac) << 8 | slot as Mac
    }

    fn host_mac(segment: usize) -> Mac {
        0x0200_00ff_0000 | segment as Mac
    }

    /// The subnet of `segment`.
    pub fn subnet(segment: usize) -> (Ipv4Address, Ipv4Mask) {
        (Self::station(segment, 0), Self::MASK)
    }

    pub fn host_address(segment: usize) -> Ipv4Address {
        Self::station(segment, HOST)
    }

    /// Every station on the two segments router `i` is attached to.
    fn neighbors(i: usize, count: usize) -> ArpCache {
        let arp = ArpCache::new();
        for segment in [i, i + 1] {
            arp.insert(Self::host_address(segment), Self::host_mac(segment));
            if segment > 0 {
                arp.insert(Self::station(segment, 1), Self::router_mac(segment - 1, 1));
            }
            if segment < count {
                arp.insert(Self::station(segment, 2), Self::router_mac(segment, 0));
            }
        }
        arp
    }

    /// Routes from router `i` to every segment it is not attached to, through
    /// the neighboring router on that side.
    fn add_static_routes(router: &Router, i: usize, count: usize) {
        for segment in 0..=count {
            let (destination, mask) = Self::subnet(segment);
            if segment < i {
                let metric = (i - segment) as u8;
                router.add_static_route(destination, Self::station(i, 1), mask, 0, metric);
            } else if segment > i + 1 {
                let metric = (segment - i - 1) as u8;
                router.add_static_route(destination, Self::station(i + 1, 2), mask, 1, metric);
            }
        }
    }

    /// The MAC a host on `segment` sends off-link traffic to.
    fn gateway_mac(&self, segment: usize) -> Mac {
        if segment < self.routers.len() {
            Self::router_mac(segment, 0)
        } else {
            Self::router_mac(segment - 1, 1)
        }
    }

    pub fn router(&self, i: usize) -> &Router {
        &self.routers[i]
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    /// Whether every router has a usable route to every segment.
    pub fn is_converged(&self) -> bool {
        self.routers.iter().all(|router| {
            (0..=self.routers.len()).all(|segment| {
                let (destination, mask) = Self::subnet(segment);
                router
                    .table()
                    .find(destination, mask)
                    .map_or(false, |entry| entry.is_reachable())
            })
        })
    }

    /// Waits until the chain has converged, giving up after `limit`.
    pub async fn wait_for_convergence(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while !self.is_converged() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        true
    }

    /// Sends a datagram from the host on `segment` to `destination`.
    pub fn send_from_host(
        &self,
        segment: usize,
        destination: Ipv4Address,
        time_to_live: u8,
        payload: &[u8],
    ) -> Result<(), HostError> {
        let mut frame = EthernetHeader::new(
            self.gateway_mac(segment),
            Self::host_mac(segment),
            ipv4::ETHER_TYPE,
        )
        .build();
        frame.extend(
            Ipv4HeaderBuilder::new(
                Self::host_address(segment),
                destination,
                ipv4::ProtocolNumber::Tcp as u8,
                payload.len() as u16,
            )
            .time_to_live(time_to_live)
            .build()?,
        );
        frame.extend_from_slice(payload);
        self.hosts[segment].send(frame)?;
        Ok(())
    }

    /// Waits for the next datagram addressed to the host on `segment`,
    /// skipping routing traffic. Returns the datagram's header and the whole
    /// frame.
    pub async fn recv_at_host(&mut self, segment: usize) -> Option<(Ipv4Header, Frame)> {
        let address = Self::host_address(segment);
        loop {
            let frame = self.hosts[segment].recv().await?;
            let header = frame
                .get(ethernet::HEADER_OCTETS..)
                .and_then(|ip| Ipv4Header::from_bytes(ip.iter().cloned()).ok());
            if let Some(header) = header {
                if header.destination == address {
                    return Some((header, frame));
                }
            }
        }
    }

    /// Stops every router and collects how each one exited.
    pub async fn shut_down(self) -> Vec<ExitStatus> {
        self.shutdown.shut_down();
        let mut statuses = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(status) => statuses.push(status),
                Err(e) => tracing::error!("Router task failed: {}", e),
            }
        }
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addressing() {
        assert_eq!(Chain::host_address(3), Ipv4Address::new([10, 0, 3, 100]));
        assert_eq!(Chain::router_mac(2, 1), 0x0200_0000_0201);
        let arp = Chain::neighbors(1, 3);
        // Segments 1 and 2: two hosts and four router ports
        assert_eq!(arp.len(), 6);
        assert_eq!(arp.lookup([10, 0, 2, 2].into()), Some(Chain::router_mac(2, 0)));
        assert_eq!(arp.lookup([10, 0, 1, 1].into()), Some(Chain::router_mac(0, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn single_router_is_converged_at_once() {
        let chain = Chain::new(1, Routing::Rip);
        assert!(chain.wait_for_convergence(Duration::from_secs(1)).await);
        assert_eq!(chain.shut_down().await, vec![ExitStatus::Exited]);
    }
}
