use std::sync::Arc;
use tokio::sync::watch;

/// A handle for stopping running routers.
///
/// Clones share one status. Once a status is set every clone observes it,
/// whether or not it was waiting at the time.
#[derive(Debug, Clone)]
pub struct Shutdown {
    notify: Arc<watch::Sender<Option<ExitStatus>>>,
    status: watch::Receiver<Option<ExitStatus>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (notify, status) = watch::channel(None);
        Self {
            notify: Arc::new(notify),
            status,
        }
    }

    /// Stops everything sharing this handle with [`ExitStatus::Exited`].
    pub fn shut_down(&self) {
        self.shut_down_with_status(ExitStatus::Exited)
    }

    /// The first status set wins.
    pub fn shut_down_with_status(&self, status: ExitStatus) {
        self.notify.send_if_modified(|current| match current {
            Some(_) => false,
            None => {
                *current = Some(status);
                true
            }
        });
    }

    /// Resolves once a status is set. Cancel safe, and returns at once on
    /// later calls.
    pub async fn wait_for_shutdown(&mut self) -> ExitStatus {
        loop {
            let current = *self.status.borrow();
            if let Some(status) = current {
                return status;
            }
            // We hold the sender, so the channel cannot close
            if self.status.changed().await.is_err() {
                return ExitStatus::Exited;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// How a router stopped.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ExitStatus {
    Exited,
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_clone_sees_the_first_status() {
        let shutdown = Shutdown::new();
        let mut waiter = shutdown.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_shutdown().await });

        shutdown.shut_down_with_status(ExitStatus::TimedOut);
        shutdown.shut_down();
        assert_eq!(handle.await.unwrap(), ExitStatus::TimedOut);

        // A clone made afterwards, and repeated waits, see the same
        let mut late = shutdown.clone();
        assert_eq!(late.wait_for_shutdown().await, ExitStatus::TimedOut);
        assert_eq!(late.wait_for_shutdown().await, ExitStatus::TimedOut);
    }
}
