//! Detection controller implementations

use crate::error::StoreError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Start/stop/reload surface of the network detection process
#[async_trait]
pub trait DetectionController: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<(), StoreError>;

    async fn stop(&self) -> Result<(), StoreError>;

    async fn reload(&self) -> Result<(), StoreError>;
}

/// Runs the detection process as a child program. Reload restarts it.
pub struct CommandController {
    program: PathBuf,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl CommandController {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: Mutex::new(None),
        }
    }

    /// Process id of the running child
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(Child::id)
    }

    async fn spawn(&self, slot: &mut Option<Child>) -> Result<(), StoreError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StoreError::io(&self.program, e))?;
        info!(program = %self.program.display(), pid = ?child.id(), "detection process started");
        *slot = Some(child);
        Ok(())
    }

    async fn terminate(&self, slot: &mut Option<Child>) -> Result<(), StoreError> {
        if let Some(mut child) = slot.take() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    warn!(program = %self.program.display(), %status, "detection process had already exited");
                }
                _ => {
                    child
                        .kill()
                        .await
                        .map_err(|e| StoreError::io(&self.program, e))?;
                    info!(program = %self.program.display(), "detection process stopped");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DetectionController for CommandController {
    fn name(&self) -> &str {
        "command"
    }

    async fn start(&self) -> Result<(), StoreError> {
        let mut slot = self.child.lock().await;
        if let Some(child) = slot.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                return Ok(());
            }
        }
        self.spawn(&mut slot).await
    }

    async fn stop(&self) -> Result<(), StoreError> {
        let mut slot = self.child.lock().await;
        self.terminate(&mut slot).await
    }

    async fn reload(&self) -> Result<(), StoreError> {
        let mut slot = self.child.lock().await;
        self.terminate(&mut slot).await?;
        self.spawn(&mut slot).await
    }
}

/// Records and logs commands without running anything
#[derive(Debug, Default)]
pub struct LogOnlyController {
    starts: AtomicUsize,
    stops: AtomicUsize,
    reloads: AtomicUsize,
}

impl LogOnlyController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetectionController for LogOnlyController {
    fn name(&self) -> &str {
        "log-only"
    }

    async fn start(&self) -> Result<(), StoreError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        info!("detection start requested");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StoreError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        info!("detection stop requested");
        Ok(())
    }

    async fn reload(&self) -> Result<(), StoreError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        info!("detection reload requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_only_counts() {
        let controller = LogOnlyController::new();
        controller.start().await.unwrap();
        controller.reload().await.unwrap();
        controller.reload().await.unwrap();
        controller.stop().await.unwrap();
        assert_eq!(
            (controller.starts(), controller.reloads(), controller.stops()),
            (1, 2, 1)
        );
    }

    #[tokio::test]
    async fn test_missing_program_fails_start() {
        let controller = CommandController::new("/nonexistent/podwatch-detector", vec![]);
        assert!(matches!(controller.start().await, Err(StoreError::Io { .. })));
        assert!(controller.pid().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_lifecycle() {
        let controller = CommandController::new("sleep", vec!["30".into()]);
        controller.start().await.unwrap();
        let first = controller.pid().await.unwrap();

        // Second start leaves the running child alone
        controller.start().await.unwrap();
        assert_eq!(controller.pid().await, Some(first));

        controller.reload().await.unwrap();
        let second = controller.pid().await.unwrap();
        assert_ne!(first, second);

        controller.stop().await.unwrap();
        assert!(controller.pid().await.is_none());
    }
}
