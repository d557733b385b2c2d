use tokio::sync::watch;

/// Creates a shutdown trigger and its signal.
pub fn channel() -> (Trigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (Trigger(Some(tx)), Shutdown(rx))
}

/// Fires the shutdown signal. Fires at most once.
#[derive(Debug)]
pub struct Trigger(Option<watch::Sender<bool>>);

impl Trigger {
    /// Fires the signal. Returns `false` if it had already fired.
    pub fn fire(&mut self) -> bool {
        match self.0.take() {
            Some(tx) => {
                // Receivers also observe the sender being dropped.
                let _ = tx.send(true);
                true
            }
            None => false,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.0.is_none()
    }
}

/// Cloneable view of a shutdown signal that background tasks wait on.
#[derive(Clone, Debug)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    pub fn is_signaled(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Resolves once the trigger fires or is dropped.
    pub async fn signaled(mut self) {
        let _ = self.0.wait_for(|fired| *fired).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    #[tokio::test]
    async fn fires_once() {
        let (mut trigger, shutdown) = super::channel();
        assert!(!shutdown.is_signaled());
        assert!(!trigger.is_fired());

        assert!(trigger.fire());
        assert!(!trigger.fire());
        assert!(trigger.is_fired());
        assert!(shutdown.is_signaled());

        timeout(Duration::from_secs(1), shutdown.signaled())
            .await
            .expect("signal should resolve after firing");
    }

    #[tokio::test]
    async fn dropped_trigger_signals() {
        let (trigger, shutdown) = super::channel();
        drop(trigger);
        assert!(shutdown.is_signaled());
        timeout(Duration::from_secs(1), shutdown.signaled())
            .await
            .expect("signal should resolve after the trigger is dropped");
    }

    #[tokio::test]
    async fn pending_until_fired() {
        let (_trigger, shutdown) = super::channel();
        assert!(
            timeout(Duration::from_millis(20), shutdown.signaled())
                .await
                .is_err()
        );
    }
}
