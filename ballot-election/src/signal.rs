//! One-shot stop signal.

use tokio::sync::watch;

/// Single-use cancellation token. Triggering it is permanent.
pub(crate) struct StopSignal {
    tx: watch::Sender<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Trigger the signal. Returns `true` only for the call that triggered it.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|stopped| !std::mem::replace(stopped, true))
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn listener(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observer side of a [`StopSignal`].
#[derive(Clone)]
pub(crate) struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopListener {
    #[cfg(test)]
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal has been triggered (or its owner is gone).
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
