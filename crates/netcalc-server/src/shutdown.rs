//! Process-wide shutdown flag.
//!
//! One [`Shutdown`] is owned by the acceptor; every worker holds a
//! [`ShutdownSignal`] and races its pending read against [`ShutdownSignal::wait`].
//! The flag only ever goes from `false` to `true`.

use tokio::sync::watch;

/// Sending half of the shutdown flag.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create an untriggered flag.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Get a receiver for a worker.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal { rx: self.tx.subscribe() }
    }

    /// Set the flag and wake every waiting worker.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// True once [`Shutdown::trigger`] has been called.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of the shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Current value of the flag.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the flag is set.
    ///
    /// Also resolves if the [`Shutdown`] was dropped: nobody is left to
    /// serve for.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|&triggered| triggered).await;
    }
}
