//! Process-wide shutdown signal.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Value carried by the shutdown signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownState {
    Running,
    Dying,
    Restarting,
}

impl ShutdownState {
    pub fn is_set(&self) -> bool {
        !matches!(self, ShutdownState::Running)
    }
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownState::Running => "NOT_SET",
            ShutdownState::Dying => "DIE",
            ShutdownState::Restarting => "RESTART",
        };
        f.write_str(name)
    }
}

/// Shared, clonable shutdown signal.
///
/// Checked without blocking by the dispatcher and waited on (with a bound)
/// by handlers parked in [`crate::Invocation::wait_for_transition`].
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<ShutdownState>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ShutdownState::Running);
        Self { tx: Arc::new(tx) }
    }

    /// Current value.
    pub fn value(&self) -> ShutdownState {
        *self.tx.borrow()
    }

    pub fn is_set(&self) -> bool {
        self.value().is_set()
    }

    /// Set the signal. `Running` is not a settable value; use [`Shutdown::clear`].
    pub fn set(&self, state: ShutdownState) -> crate::Result<()> {
        if !state.is_set() {
            return Err(crate::Error::Config(format!(
                "Invalid shutdown value {}, only {} or {} are allowed",
                state,
                ShutdownState::Dying,
                ShutdownState::Restarting
            )));
        }
        self.tx.send_replace(state);
        Ok(())
    }

    pub fn clear(&self) {
        self.tx.send_replace(ShutdownState::Running);
    }

    /// Wait up to `timeout` for the signal; returns whether it is set.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        let _ = tokio::time::timeout(timeout, rx.wait_for(|s| s.is_set())).await;
        self.is_set()
    }

    /// Wait without bound until the signal is set, returning its value.
    pub async fn wait_set(&self) -> ShutdownState {
        let mut rx = self.tx.subscribe();
        let state = match rx.wait_for(|s| s.is_set()).await {
            Ok(state) => *state,
            Err(_) => self.value(),
        };
        state
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shutdown").field(&self.value()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let signal = Shutdown::new();
        assert!(!signal.is_set());
        signal.set(ShutdownState::Restarting).unwrap();
        assert_eq!(signal.value(), ShutdownState::Restarting);
        signal.clear();
        assert!(!signal.is_set());
    }

    #[test]
    fn test_set_running_rejected() {
        let signal = Shutdown::new();
        assert!(signal.set(ShutdownState::Running).is_err());
    }

    #[tokio::test]
    async fn test_wait_times_out_when_unset() {
        let signal = Shutdown::new();
        let started = std::time::Instant::now();
        assert!(!signal.wait(Duration::from_millis(50)).await);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_set() {
        let signal = Shutdown::new();
        let setter = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.set(ShutdownState::Dying).unwrap();
        });
        assert!(signal.wait(Duration::from_secs(5)).await);
        assert_eq!(signal.wait_set().await, ShutdownState::Dying);
    }

    #[tokio::test]
    async fn test_wait_set_blocks_until_set() {
        let signal = Shutdown::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait_set().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        signal.set(ShutdownState::Restarting).unwrap();
        assert_eq!(waiter.await.unwrap(), ShutdownState::Restarting);
    }
}
