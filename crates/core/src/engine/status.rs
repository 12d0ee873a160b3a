//! Engine readiness tracking.

use serde::Serialize;
use tokio::sync::watch;

use super::error::EngineError;

/// Lifecycle of an engine's underlying runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineStatus {
    /// Still initializing. Conversions may already be attempted.
    Loading,
    /// Initialization finished.
    Ready,
    /// Initialization failed; the engine stays unavailable.
    Failed { reason: String },
}

/// Observable status cell. Leaves `Loading` at most once.
#[derive(Debug)]
pub struct StatusCell {
    tx: watch::Sender<EngineStatus>,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(EngineStatus::Loading);
        Self { tx }
    }

    pub fn get(&self) -> EngineStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.tx.subscribe()
    }

    /// Transitions `Loading -> Ready`. Returns whether the transition happened.
    pub fn mark_ready(&self) -> bool {
        self.tx.send_if_modified(|status| {
            if matches!(status, EngineStatus::Loading) {
                *status = EngineStatus::Ready;
                true
            } else {
                false
            }
        })
    }

    /// Transitions `Loading -> Failed`. Returns whether the transition happened.
    pub fn mark_failed(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.tx.send_if_modified(|status| {
            if matches!(status, EngineStatus::Loading) {
                *status = EngineStatus::Failed { reason };
                true
            } else {
                false
            }
        })
    }

    /// Fails with [`EngineError::Unavailable`] once initialization has failed.
    pub fn ensure_available(&self, engine: &str) -> Result<(), EngineError> {
        match &*self.tx.borrow() {
            EngineStatus::Failed { reason } => Err(EngineError::unavailable(engine, reason.clone())),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_transition_happens_once() {
        let cell = StatusCell::new();
        assert_eq!(cell.get(), EngineStatus::Loading);
        assert!(cell.mark_ready());
        assert!(!cell.mark_ready());
        assert!(!cell.mark_failed("late"));
        assert_eq!(cell.get(), EngineStatus::Ready);
    }

    #[test]
    fn test_failed_is_permanent() {
        let cell = StatusCell::new();
        assert!(cell.mark_failed("ffmpeg not found"));
        assert!(!cell.mark_ready());

        let err = cell.ensure_available("media").unwrap_err();
        assert_eq!(err.error_kind(), "EngineUnavailable");
        assert!(err.to_string().contains("ffmpeg not found"));
    }

    #[test]
    fn test_loading_is_available() {
        let cell = StatusCell::new();
        assert!(cell.ensure_available("image").is_ok());
    }

    #[tokio::test]
    async fn test_subscribers_observe_ready() {
        let cell = StatusCell::new();
        let mut rx = cell.subscribe();
        cell.mark_ready();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), EngineStatus::Ready);
    }
}
