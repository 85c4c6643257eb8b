use super::Mtu;
use crate::{
    network::{Delivery, Interfaces, Mac, SendError, Slot, Transport, BROADCAST_MAC},
    protocols::ethernet,
    Frame,
};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};

/// The payload limit of a classic Ethernet link.
pub const ETHERNET_MTU: Mtu = 1500;

#[derive(Debug, Clone)]
struct Transmission {
    source: Mac,
    frame: Frame,
}

/// An emulated shared Ethernet link. Every frame put on the segment is seen
/// by every attachment except its sender, and each attachment only keeps
/// frames addressed to its own MAC or to the broadcast address.
///
/// Cloning a segment yields another handle to the same link.
#[derive(Debug, Clone)]
pub struct Segment {
    mtu: Mtu,
    wire: broadcast::Sender<Transmission>,
}

impl Segment {
    pub fn new() -> Self {
        Self::with_mtu(ETHERNET_MTU)
    }

    pub fn with_mtu(mtu: Mtu) -> Self {
        Self {
            mtu,
            wire: broadcast::channel(64).0,
        }
    }

    /// Connects a new station with the given MAC to the segment.
    pub fn attach(&self, mac: Mac) -> Attachment {
        Attachment {
            mac,
            segment: self.clone(),
            receiver: self.wire.subscribe(),
        }
    }

    /// Puts a frame on the wire. A frame sent on a segment nobody is
    /// attached to is lost, as it would be on a real link.
    pub fn transmit(&self, source: Mac, frame: Frame) -> Result<(), SendError> {
        if frame.len() > self.mtu + ethernet::HEADER_OCTETS {
            Err(SendError::Mtu(frame.len()))?
        }
        if self.wire.send(Transmission { source, frame }).is_err() {
            tracing::trace!("Frame sent on a segment with no attachments");
        }
        Ok(())
    }
}

impl Default for Segment {
    fn default() -> Self {
        Self::new()
    }
}

/// One station's connection to a [`Segment`].
#[derive(Debug)]
pub struct Attachment {
    mac: Mac,
    segment: Segment,
    receiver: broadcast::Receiver<Transmission>,
}

impl Attachment {
    pub fn mac(&self) -> Mac {
        self.mac
    }

    /// Sends a frame from this station.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        self.segment.transmit(self.mac, frame)
    }

    /// Waits for the next frame addressed to this station. Returns `None`
    /// once the segment is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match self.receiver.recv().await {
                Ok(transmission) => {
                    if transmission.source != self.mac && self.accepts(&transmission.frame) {
                        return Some(transmission.frame);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(mac = self.mac, missed, "Station fell behind its segment");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn accepts(&self, frame: &[u8]) -> bool {
        if frame.len() < 6 {
            return false;
        }
        let mut destination = [0u8; 8];
        destination[2..].copy_from_slice(&frame[..6]);
        let destination = Mac::from_be_bytes(destination);
        destination == self.mac || destination == BROADCAST_MAC
    }
}

/// Connects each of a router's interfaces to a [`Segment`].
pub struct LinkTransport {
    interfaces: Interfaces,
    segments: Vec<Segment>,
}

impl LinkTransport {
    /// Attaches the interface in each slot to the segment at the same index
    /// and spawns a task per interface that hands received frames to the
    /// returned channel. Must be called from within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if the number of segments differs from the number of
    /// interfaces.
    pub fn new(interfaces: Interfaces, segments: Vec<Segment>) -> (Self, mpsc::Receiver<Delivery>) {
        assert_eq!(
            interfaces.len(),
            segments.len(),
            "every interface needs exactly one segment"
        );
        let (deliver, deliveries) = mpsc::channel(64);
        for (iface, segment) in interfaces.iter().zip(segments.iter()) {
            let mut attachment = segment.attach(iface.mac);
            let deliver = deliver.clone();
            let slot = iface.slot;
            tokio::spawn(async move {
                while let Some(frame) = attachment.recv().await {
                    if deliver.send(Delivery { frame, slot }).await.is_err() {
                        break;
                    }
                }
            });
        }
        (
            Self {
                interfaces,
                segments,
            },
            deliveries,
        )
    }
}

impl Transport for LinkTransport {
    fn interfaces(&self) -> &Interfaces {
        &self.interfaces
    }

    fn send(&self, frame: Frame, slot: Slot) -> Result<(), SendError> {
        let iface = self
            .interfaces
            .get(slot)
            .ok_or(SendError::UnknownSlot(slot))?;
        let segment = self
            .segments
            .get(slot as usize)
            .ok_or(SendError::UnknownSlot(slot))?;
        segment.transmit(iface.mac, frame)
    }
}
