use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT/SIGTERM
    Signal,
    /// The bridge gave up on the device and wants a supervisor restart.
    Restart(String),
}

/// Process-wide cooperative stop flag. Every loop checks it at its suspension points.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<StopReason>>>,
    rx: watch::Receiver<Option<StopReason>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Shutdown::new()
    }
}

impl Shutdown {
    pub fn new() -> Shutdown {
        let (tx, rx) = watch::channel(None);
        Shutdown {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request a stop. The first reason wins.
    pub fn trigger(&self, reason: StopReason) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            log::warn!("Stopping bridge: {:?}", reason);
            *current = Some(reason);
            true
        });
    }

    pub fn is_running(&self) -> bool {
        self.rx.borrow().is_none()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.rx.borrow().clone()
    }

    /// Sleep for `duration` unless stopped first. Returns whether the bridge is still running.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_running(),
            _ = self.stopped() => false,
        }
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) -> StopReason {
        let mut rx = self.rx.clone();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        };
        reason.unwrap_or(StopReason::Signal)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_short_by_trigger() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            other.trigger(StopReason::Restart("Request failures".into()));
        });

        let start = tokio::time::Instant::now();
        assert!(!shutdown.sleep(Duration::from_secs(3600)).await);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(
            StopReason::Restart("Request failures".into()),
            shutdown.stopped().await
        );
    }

    #[tokio::test]
    async fn first_reason_wins() {
        let shutdown = Shutdown::new();
        assert!(shutdown.is_running());

        shutdown.trigger(StopReason::Signal);
        shutdown.trigger(StopReason::Restart("Access denied".into()));

        assert!(!shutdown.is_running());
        assert_eq!(Some(StopReason::Signal), shutdown.reason());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_while_running() {
        let shutdown = Shutdown::new();
        assert!(shutdown.sleep(Duration::from_secs(5)).await);
    }
}
