use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::process::{Child, Command};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ToolError;

struct Inner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    spawned: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

/// The one bound on concurrently running external processes.
///
/// Every child, whichever path launches it, is created through a [`Slot`].
#[derive(Clone)]
pub struct Slots {
    inner: Arc<Inner>,
}

impl Slots {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                spawned: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a free slot. Dropping the future leaves the queue untouched.
    pub async fn acquire(&self) -> Result<Slot, ToolError> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ToolError::ExecutionFailed {
                code: None,
                message: "execution slots are closed".into(),
            })?;
        Ok(Slot {
            _permit: permit,
            slots: self.clone(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Processes created so far.
    pub fn spawned(&self) -> usize {
        self.inner.spawned.load(Ordering::SeqCst)
    }

    /// Processes created and not yet reaped.
    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Highest value `running` has reached.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Slots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slots")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("running", &self.running())
            .finish()
    }
}

/// Permission to run one process. Released on drop.
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    slots: Slots,
}

impl Slot {
    /// Spawn under this slot. The returned guard counts the child as running until dropped.
    pub fn spawn(&self, command: &mut Command) -> io::Result<(Child, Running)> {
        let child = command.spawn()?;
        let inner = &self.slots.inner;
        inner.spawned.fetch_add(1, Ordering::SeqCst);
        let now = inner.running.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak.fetch_max(now, Ordering::SeqCst);
        Ok((
            child,
            Running {
                slots: self.slots.clone(),
            },
        ))
    }
}

/// Drop only once the child has been reaped.
pub struct Running {
    slots: Slots,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.slots.inner.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn acquire_until_full() {
        let slots = Slots::new(2);
        let a = slots.acquire().await.unwrap();
        let _b = slots.acquire().await.unwrap();
        assert_eq!(slots.available(), 0);

        let waiting = tokio::time::timeout(Duration::from_millis(50), slots.acquire()).await;
        assert!(waiting.is_err());

        drop(a);
        assert_eq!(slots.available(), 1);
        assert!(slots.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn abandoned_wait_consumes_nothing() {
        let slots = Slots::new(1);
        let held = slots.acquire().await.unwrap();
        let _ = tokio::time::timeout(Duration::from_millis(20), slots.acquire()).await;
        drop(held);
        assert_eq!(slots.available(), 1);
    }

    #[tokio::test]
    async fn clones_share_capacity() {
        let slots = Slots::new(1);
        let other = slots.clone();
        let _held = slots.acquire().await.unwrap();
        assert_eq!(other.available(), 0);
        assert_eq!(other.capacity(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_tracks_running() {
        let slots = Slots::new(1);
        let slot = slots.acquire().await.unwrap();
        let (mut child, running) = slot.spawn(&mut Command::new("true")).unwrap();
        assert_eq!(slots.running(), 1);
        child.wait().await.unwrap();
        drop(running);
        assert_eq!(slots.running(), 0);
        assert_eq!(slots.spawned(), 1);
        assert_eq!(slots.peak(), 1);
    }
}
