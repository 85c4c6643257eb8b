//! Carries each of the router's links over a UDP socket, so that router
//! processes on one or more hosts can be wired into a virtual network.
//!
//! Every datagram on the socket holds exactly one Ethernet frame.

use crate::parsing::Config;
use std::{io, net::SocketAddr, sync::Arc};
use tokio::{net::UdpSocket, sync::mpsc};
use vrouter_core::{
    network::{Delivery, Interfaces, SendError, Slot, Transport},
    Frame,
};

/// The largest datagram a link accepts.
const MAX_FRAME: usize = 65_535;

struct Link {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

/// A [`Transport`] with one UDP socket per interface, each exchanging frames
/// with a single peer socket.
pub struct UdpTransport {
    interfaces: Interfaces,
    links: Vec<Link>,
}

impl UdpTransport {
    /// Binds a socket for every interface and spawns a task per socket that
    /// hands received frames to the returned channel.
    pub async fn bind(config: &Config) -> io::Result<(Self, mpsc::Receiver<Delivery>)> {
        let interfaces = config.interface_set();
        let (deliver, deliveries) = mpsc::channel(64);
        let mut links = Vec::with_capacity(interfaces.len());
        for (iface, record) in interfaces.iter().zip(config.interfaces.iter()) {
            let socket = Arc::new(UdpSocket::bind(record.bind).await?);
            tracing::info!(
                interface = %iface.name,
                bind = %socket.local_addr()?,
                peer = %record.peer,
                "Link up"
            );
            tokio::spawn(receive_loop(
                socket.clone(),
                iface.slot,
                deliver.clone(),
            ));
            links.push(Link {
                socket,
                peer: record.peer,
            });
        }
        Ok((Self { interfaces, links }, deliveries))
    }

    /// The address each interface's socket is bound to, in slot order.
    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.links.iter().map(|link| link.socket.local_addr()).collect()
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, slot: Slot, deliver: mpsc::Sender<Delivery>) {
    let mut buf = vec![0u8; MAX_FRAME];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, _)) => {
                let delivery = Delivery {
                    frame: buf[..len].to_vec(),
                    slot,
                };
                if deliver.send(delivery).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                // A peer that is not up yet makes some platforms report
                // ICMP port unreachable on the next receive
                tracing::debug!(slot, "Receive failed: {}", e);
            }
        }
    }
}

impl Transport for UdpTransport {
    fn interfaces(&self) -> &Interfaces {
        &self.interfaces
    }

    fn send(&self, frame: Frame, slot: Slot) -> Result<(), SendError> {
        let link = self
            .links
            .get(slot as usize)
            .ok_or(SendError::UnknownSlot(slot))?;
        if frame.len() > MAX_FRAME {
            Err(SendError::Mtu(frame.len()))?
        }
        match link.socket.try_send_to(&frame, link.peer) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(SendError::Busy(slot)),
            Err(e) => {
                tracing::debug!(slot, peer = %link.peer, "Send failed: {}", e);
                Err(SendError::Closed(slot))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::InterfaceRecord;
    use vrouter_core::protocols::ipv4::Ipv4Mask;

    fn config(name: &str, peer: SocketAddr) -> Config {
        let record = InterfaceRecord {
            name: name.to_string(),
            address: [10, 0, 0, 1].into(),
            mask: Ipv4Mask::from_bitcount(24),
            mac: 1,
            bind: "127.0.0.1:0".parse().unwrap(),
            peer,
            line: 1,
        };
        Config {
            interfaces: vec![record],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn exchanges_frames_with_peer() -> anyhow::Result<()> {
        let peer = UdpSocket::bind("127.0.0.1:0").await?;
        let (transport, mut deliveries) =
            UdpTransport::bind(&config("eth0", peer.local_addr()?)).await?;
        let local = transport.local_addrs()?[0];

        transport.send(b"outbound".to_vec(), 0)?;
        let mut buf = [0u8; 64];
        let (len, from) = peer.recv_from(&mut buf).await?;
        assert_eq!(&buf[..len], b"outbound");
        assert_eq!(from, local);

        peer.send_to(b"inbound", local).await?;
        let delivery = deliveries.recv().await.unwrap();
        assert_eq!(delivery.slot, 0);
        assert_eq!(delivery.frame, b"inbound");

        assert_eq!(transport.send(vec![], 3), Err(SendError::UnknownSlot(3)));
        Ok(())
    }
}
