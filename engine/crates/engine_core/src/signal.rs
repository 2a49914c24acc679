use tokio::sync::watch;

/// Sender side of a one-shot signal (shutdown, session termination).
#[derive(Debug)]
pub struct Trigger(watch::Sender<bool>);

/// Receiver side, cloned to every task that must react to the signal.
#[derive(Debug, Clone)]
pub struct Listener(watch::Receiver<bool>);

/// Create a signal pair.
pub fn signal_channel() -> (Trigger, Listener) {
    let (tx, rx) = watch::channel(false);
    (Trigger(tx), Listener(rx))
}

impl Trigger {
    /// Signal all listeners. Idempotent.
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// A new listener for this trigger.
    pub fn listener(&self) -> Listener {
        Listener(self.0.subscribe())
    }
}

impl Listener {
    /// Wait until the signal fires. Also returns when the trigger is dropped.
    pub async fn wait(&mut self) {
        while !*self.0.borrow_and_update() {
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }

    /// Non-blocking check.
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }
}
