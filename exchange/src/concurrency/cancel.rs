use tokio::sync::watch;

/// Transmitter side of the cancellation channel of a distribution operation.
#[derive(Debug, Clone)]
pub struct CancelTx(watch::Sender<bool>);

impl CancelTx {
    /// Requests cancellation. Repeated requests are harmless.
    pub fn cancel(&self) {
        // `send_replace` succeeds even when the pulling task already finished.
        self.0.send_replace(true);
    }

    pub fn is_canceled(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new receiver subscription.
    pub fn subscribe(&self) -> CancelRx {
        self.0.subscribe()
    }
}

/// Receiver side of the cancellation channel.
pub type CancelRx = watch::Receiver<bool>;

/// Creates a new, not yet canceled, cancellation channel.
pub fn create_cancel_channel() -> (CancelTx, CancelRx) {
    let (tx, rx) = watch::channel(false);
    (CancelTx(tx), rx)
}

/// Waits until cancellation is requested.
///
/// Never resolves if the transmitter is dropped without canceling.
pub async fn canceled(rx: &mut CancelRx) {
    if rx.wait_for(|canceled| *canceled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
