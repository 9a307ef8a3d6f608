// src/session/events.rs  -  Attendance push events: in-process pub/sub
//
// Server-pushed events arrive through whatever transport the deployment
// has (socket bridge, named pipe, ...).  They are published on an EventBus;
// consumers hold a Subscription for as long as they are mounted and drop
// it to unsubscribe.
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AttendanceEvent {
    AttendanceMarked {
        #[serde(rename = "studentId")]
        student_id:        String,
        #[serde(rename = "classInstanceId")]
        class_instance_id: String,
    },
    AttendanceStatisticsUpdated {
        #[serde(rename = "classInstanceId")]
        class_instance_id: String,
    },
}

impl AttendanceEvent {
    pub fn from_json(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    pub fn class_instance_id(&self) -> &str {
        match self {
            AttendanceEvent::AttendanceMarked { class_instance_id, .. }
            | AttendanceEvent::AttendanceStatisticsUpdated { class_instance_id } => class_instance_id,
        }
    }
}

#[derive(Default)]
struct BusInner {
    subscribers: Mutex<Vec<(u64, Sender<AttendanceEvent>)>>,
    next_id:     AtomicU64,
}

impl BusInner {
    fn subscribers(&self) -> MutexGuard<'_, Vec<(u64, Sender<AttendanceEvent>)>> {
        self.subscribers.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self { Self::default() }

    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        self.inner.subscribers().push((id, tx));
        log::debug!("[events] subscriber {id} attached");
        Subscription { id, rx, bus: Arc::downgrade(&self.inner) }
    }

    /// Deliver to every live subscriber.  Returns how many received it.
    pub fn publish(&self, event: AttendanceEvent) -> usize {
        let mut subs = self.inner.subscribers();
        subs.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        subs.len()
    }
}

/// Live subscription; unsubscribes on drop.
pub struct Subscription {
    id:  u64,
    rx:  Receiver<AttendanceEvent>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn try_next(&self) -> Option<AttendanceEvent> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers().retain(|(id, _)| *id != self.id);
            log::debug!("[events] subscriber {} detached", self.id);
        }
    }
}

/// Publish every JSON line read from `reader` until EOF.  Lines that are
/// not events are skipped.  The handle yields the number published.
pub fn spawn_json_lines_feed<R>(reader: R, bus: EventBus) -> thread::JoinHandle<usize>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut published = 0;
        for line in BufReader::new(reader).lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    log::warn!("[events] feed read error: {e}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match AttendanceEvent::from_json(&line) {
                Ok(ev) => {
                    bus.publish(ev);
                    published += 1;
                }
                Err(e) => log::warn!("[events] skipped feed line: {e}"),
            }
        }
        log::debug!("[events] feed closed after {published} events");
        published
    })
}
