use crate::{
    network::{Interfaces, SendError, Slot, Transport},
    Frame,
};
use std::sync::{Mutex, PoisonError};

/// A transport that records every frame sent through it instead of
/// delivering it anywhere.
#[derive(Debug)]
pub struct Capture {
    interfaces: Interfaces,
    sent: Mutex<Vec<(Frame, Slot)>>,
}

impl Capture {
    pub fn new(interfaces: Interfaces) -> Self {
        Self {
            interfaces,
            sent: Default::default(),
        }
    }

    /// Removes and returns the frames sent so far, oldest first.
    pub fn take(&self) -> Vec<(Frame, Slot)> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Transport for Capture {
    fn interfaces(&self) -> &Interfaces {
        &self.interfaces
    }

    fn send(&self, frame: Frame, slot: Slot) -> Result<(), SendError> {
        if self.interfaces.get(slot).is_none() {
            Err(SendError::UnknownSlot(slot))?
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((frame, slot));
        Ok(())
    }
}
