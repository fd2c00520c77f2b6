//! Shutdown signalling for long waits

use tokio::sync::watch;

/// Sending half; call [`ShutdownTrigger::trigger`] to stop the pipeline
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half, cheap to clone
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_trigger, shutdown) = shutdown_channel();
        shutdown
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested. A dropped trigger never
    /// resolves.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        let closed = rx.wait_for(|stop| *stop).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}
