//! [`Transport`](crate::network::Transport) implementations that never touch
//! a real network: an emulated Ethernet segment and a recorder for tests.

/// A network maximum transmission unit.
///
/// The largest number of payload bytes a frame can carry over the link.
pub type Mtu = usize;

mod segment;
pub use segment::{Attachment, LinkTransport, Segment};

mod capture;
pub use capture::Capture;
