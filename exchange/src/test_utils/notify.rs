use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;

/// Timeout applied when waiting on test notifications.
///
/// Distribution tests move a handful of rows in memory, anything taking longer than this is
/// stuck.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// [`Notify`] wrapper failing the test instead of hanging when a notification never arrives.
#[derive(Clone)]
pub struct TimedNotify {
    notify: Arc<Notify>,
    timeout_duration: Duration,
}

impl TimedNotify {
    pub fn new(notify: Arc<Notify>) -> Self {
        Self::with_timeout(notify, DEFAULT_NOTIFY_TIMEOUT)
    }

    pub fn with_timeout(notify: Arc<Notify>, timeout_duration: Duration) -> Self {
        Self {
            notify,
            timeout_duration,
        }
    }

    /// Waits for the notification.
    ///
    /// # Panics
    ///
    /// Panics when the timeout elapses first.
    pub async fn notified(&self) {
        if timeout(self.timeout_duration, self.notify.notified())
            .await
            .is_err()
        {
            panic!(
                "Test notification timed out after {:?}. The awaited distribution state was \
                 never reached; check whether the operation stalled or already finished.",
                self.timeout_duration
            );
        }
    }

    /// Fires the notification, waking the waiter or letting the next wait return immediately.
    pub fn notify(&self) {
        self.notify.notify_one();
    }

    pub fn inner(&self) -> &Arc<Notify> {
        &self.notify
    }
}

impl fmt::Debug for TimedNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedNotify")
            .field("timeout_duration", &self.timeout_duration)
            .finish()
    }
}
