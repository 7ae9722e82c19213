//! Event sinks

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn, Level};

use super::events::EngineEvent;
use crate::store::{keys, record, StateStore};

/// Receives engine events. `emit` never blocks.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Forwards events to `tracing` at the event's level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: EngineEvent) {
        let name = event.name();
        let details = serde_json::to_string(&event).unwrap_or_default();
        let level = event.level();
        if level == Level::ERROR {
            error!(event = name, details = %details, "engine event");
        } else if level == Level::WARN {
            warn!(event = name, details = %details, "engine event");
        } else if level == Level::INFO {
            info!(event = name, details = %details, "engine event");
        } else if level == Level::DEBUG {
            debug!(event = name, details = %details, "engine event");
        } else {
            trace!(event = name, details = %details, "engine event");
        }
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name() == name).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: EngineEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Sends every event to each inner sink
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: EngineEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

enum Command {
    Event(EngineEvent),
    Close(oneshot::Sender<()>),
}

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Buffers events and appends them to the store's event log in batches.
///
/// Acquire with [`StoreSink::spawn`]; release with [`StoreSink::close`],
/// which drains everything buffered.
pub struct StoreSink {
    tx: mpsc::Sender<Command>,
    dropped: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StoreSink {
    pub fn spawn(store: Arc<dyn StateStore>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        let (tx, rx) = mpsc::channel(batch_size * 16);
        let task = tokio::spawn(run_store_sink(store, rx, batch_size));
        Self {
            tx,
            dropped: AtomicU64::new(0),
            task: Mutex::new(Some(task)),
        }
    }

    /// Events discarded because the buffer was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Flush buffered events and stop the writer task
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Close(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        let task = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl EventSink for StoreSink {
    fn emit(&self, event: EngineEvent) {
        if self.tx.try_send(Command::Event(event)).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

async fn run_store_sink(
    store: Arc<dyn StateStore>,
    mut rx: mpsc::Receiver<Command>,
    batch_size: usize,
) {
    let mut buffer: Vec<EngineEvent> = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Event(event)) => {
                    buffer.push(event);
                    if buffer.len() >= batch_size {
                        flush(store.as_ref(), &mut buffer).await;
                    }
                }
                Some(Command::Close(ack)) => {
                    flush(store.as_ref(), &mut buffer).await;
                    let _ = ack.send(());
                    break;
                }
                None => {
                    flush(store.as_ref(), &mut buffer).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush(store.as_ref(), &mut buffer).await;
                }
            }
        }
    }
}

async fn flush(store: &dyn StateStore, buffer: &mut Vec<EngineEvent>) {
    if buffer.is_empty() {
        return;
    }
    let count = buffer.len();
    let values: Vec<serde_json::Value> = buffer
        .drain(..)
        .filter_map(|event| record::encode(&event).ok())
        .collect();
    // Failures are reported through tracing only; the sink must not feed itself
    if let Err(e) = store.append_batch(keys::EVENT_LOG, values).await {
        warn!(error = %e, count, "Failed to persist engine events");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_store_sink_flushes_on_close() {
        let store = Arc::new(MemoryStore::new());
        let sink = StoreSink::spawn(store.clone(), 100);
        for i in 0..5 {
            sink.emit(EngineEvent::CycleFailed {
                cycle: i,
                error: "boom".into(),
            });
        }
        sink.close().await;

        assert_eq!(store.log_len(keys::EVENT_LOG).await, 5);
        let entries = store.read_log(keys::EVENT_LOG, 0, 10).await.unwrap();
        let decoded = record::decode_entries::<EngineEvent>(entries).unwrap();
        assert_eq!(
            decoded[4].1,
            EngineEvent::CycleFailed {
                cycle: 4,
                error: "boom".into()
            }
        );
    }

    #[tokio::test]
    async fn test_store_sink_flushes_full_batches() {
        let store = Arc::new(MemoryStore::new());
        let sink = StoreSink::spawn(store.clone(), 2);
        for i in 0..4 {
            sink.emit(EngineEvent::CoordinatorResumed { halted_for_ms: i });
        }
        sink.close().await;
        assert_eq!(store.log_len(keys::EVENT_LOG).await, 4);
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new(vec![a.clone(), b.clone()]).with(Arc::new(TracingSink));
        fanout.emit(EngineEvent::CoordinatorResumed { halted_for_ms: 1 });
        assert_eq!(a.count("coordinator_resumed"), 1);
        assert_eq!(b.events().len(), 1);
    }
}
