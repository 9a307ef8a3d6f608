// src/task.rs  -  One-shot background work polled from the main loop
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

/// Result of a closure running on its own thread.
pub struct Pending<T> {
    rx: Receiver<T>,
}

pub enum Poll<T> {
    Ready(T),
    Waiting,
    /// The worker panicked before producing a value
    Lost,
}

impl<T: Send + 'static> Pending<T> {
    pub fn spawn<F>(name: &str, work: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _ = tx.send(work());
            });
        if let Err(e) = spawned {
            log::warn!("[task] cannot spawn {name}: {e}");
        }
        Self { rx }
    }

    pub fn try_take(&self) -> Poll<T> {
        match self.rx.try_recv() {
            Ok(v) => Poll::Ready(v),
            Err(TryRecvError::Empty) => Poll::Waiting,
            Err(TryRecvError::Disconnected) => Poll::Lost,
        }
    }
}
