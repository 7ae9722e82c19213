//! Market Observation Feed
//!
//! Validates, de-duplicates and orders raw observations, retains a bounded
//! history per symbol and fans accepted records out to subscribers over a
//! bounded broadcast queue. A slow subscriber loses the oldest records and
//! the loss is reported with a count.

pub mod connector;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::config::DataConfig;
use crate::domain::{Observation, ObservationWindow};
use crate::error::FeedError;
use crate::logging::{EngineEvent, EventSink};

pub use connector::{DataConnector, FeedProducer, JsonLinesConnector, ProducerReport, ReplayConnector};

/// Ingestion counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    pub accepted: u64,
    pub out_of_order: u64,
    pub duplicates: u64,
    pub invalid: u64,
    /// Records lost by lagging subscribers
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct SymbolState {
    last: Option<DateTime<Utc>>,
    history: VecDeque<Observation>,
}

#[derive(Debug, Default)]
struct FeedState {
    symbols: HashMap<String, SymbolState>,
    stats: FeedStats,
}

pub struct ObservationFeed {
    state: Mutex<FeedState>,
    tx: broadcast::Sender<Observation>,
    history_capacity: usize,
    dropped: Arc<AtomicU64>,
    next_subscriber: AtomicU64,
    sink: Arc<dyn EventSink>,
}

impl ObservationFeed {
    pub fn new(live_capacity: usize, history_capacity: usize, sink: Arc<dyn EventSink>) -> Self {
        let (tx, _) = broadcast::channel(live_capacity.max(1));
        Self {
            state: Mutex::new(FeedState::default()),
            tx,
            history_capacity: history_capacity.max(1),
            dropped: Arc::new(AtomicU64::new(0)),
            next_subscriber: AtomicU64::new(1),
            sink,
        }
    }

    pub fn from_config(config: &DataConfig, sink: Arc<dyn EventSink>) -> Self {
        Self::new(config.live_capacity, config.history_capacity, sink)
    }

    /// Validate and record one observation.
    ///
    /// Rejections are logged, counted and returned; they are never fatal.
    pub async fn ingest(&self, observation: Observation) -> Result<(), FeedError> {
        let mut state = self.state.lock().await;
        match Self::check(&state, &observation) {
            Ok(()) => {}
            Err(e) => {
                match e {
                    FeedError::OutOfOrderObservation { .. } => state.stats.out_of_order += 1,
                    FeedError::DuplicateObservation { .. } => state.stats.duplicates += 1,
                    FeedError::InvalidObservation { .. } => state.stats.invalid += 1,
                }
                drop(state);
                // The sink is the single record of a rejection
                self.sink.emit(EngineEvent::ObservationRejected {
                    symbol: observation.symbol.clone(),
                    timestamp: observation.timestamp,
                    kind: e.kind().to_string(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        }

        let entry = state.symbols.entry(observation.symbol.clone()).or_default();
        entry.last = Some(observation.timestamp);
        entry.history.push_back(observation.clone());
        while entry.history.len() > self.history_capacity {
            entry.history.pop_front();
        }
        state.stats.accepted += 1;

        // Sent under the lock so `subscribe_from` sees history and live
        // records without a gap. No receivers is not an error.
        let _ = self.tx.send(observation);
        Ok(())
    }

    fn check(state: &FeedState, observation: &Observation) -> Result<(), FeedError> {
        observation
            .validate()
            .map_err(|reason| FeedError::InvalidObservation {
                symbol: observation.symbol.clone(),
                reason,
            })?;

        let Some(symbol) = state.symbols.get(&observation.symbol) else {
            return Ok(());
        };
        let Some(last) = symbol.last else {
            return Ok(());
        };
        let ts = observation.timestamp;
        let seen = ts == last
            || symbol
                .history
                .binary_search_by_key(&ts, |o| o.timestamp)
                .is_ok();
        if seen {
            return Err(FeedError::DuplicateObservation {
                symbol: observation.symbol.clone(),
                timestamp: ts,
            });
        }
        if ts < last {
            return Err(FeedError::OutOfOrderObservation {
                symbol: observation.symbol.clone(),
                timestamp: ts,
                last_seen: last,
            });
        }
        Ok(())
    }

    /// Live observations for `symbols` from now on
    pub async fn subscribe(&self, symbols: &[String]) -> Subscription {
        let _state = self.state.lock().await;
        self.subscription(symbols, VecDeque::new())
    }

    /// Restart each symbol from its own cursor.
    ///
    /// Retained history at or after a symbol's cursor is replayed first,
    /// merged by timestamp across symbols, then delivery continues live for
    /// every symbol in `cursors`.
    pub async fn subscribe_from(&self, cursors: &HashMap<String, DateTime<Utc>>) -> Subscription {
        let state = self.state.lock().await;
        let mut replay: Vec<Observation> = cursors
            .iter()
            .filter_map(|(symbol, cursor)| state.symbols.get(symbol).map(|s| (s, *cursor)))
            .flat_map(|(s, cursor)| s.history.iter().filter(move |o| o.timestamp >= cursor).cloned())
            .collect();
        replay.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.symbol.cmp(&b.symbol)));
        debug!(replay = replay.len(), symbols = cursors.len(), "Subscription restarted from cursors");
        let symbols: Vec<String> = cursors.keys().cloned().collect();
        self.subscription(&symbols, replay.into())
    }

    fn subscription(&self, symbols: &[String], replay: VecDeque<Observation>) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        Subscription {
            id: format!("sub-{id}"),
            symbols: symbols.iter().cloned().collect(),
            replay,
            rx: self.tx.subscribe(),
            dropped: self.dropped.clone(),
            sink: self.sink.clone(),
        }
    }

    /// Latest `len` observations for `symbol`
    pub async fn window(&self, symbol: &str, len: usize) -> ObservationWindow {
        let state = self.state.lock().await;
        let observations = state
            .symbols
            .get(symbol)
            .map(|s| {
                let skip = s.history.len().saturating_sub(len);
                s.history.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default();
        ObservationWindow::new(symbol, observations)
    }

    pub async fn last_timestamp(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.state.lock().await.symbols.get(symbol).and_then(|s| s.last)
    }

    pub async fn stats(&self) -> FeedStats {
        let mut stats = self.state.lock().await.stats.clone();
        stats.dropped = self.dropped.load(Ordering::Relaxed);
        stats
    }
}

/// Observations for a set of symbols, in arrival order
pub struct Subscription {
    id: String,
    symbols: HashSet<String>,
    replay: VecDeque<Observation>,
    rx: broadcast::Receiver<Observation>,
    dropped: Arc<AtomicU64>,
    sink: Arc<dyn EventSink>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next observation; `None` once the feed is gone
    pub async fn recv(&mut self) -> Option<Observation> {
        if let Some(observation) = self.replay.pop_front() {
            return Some(observation);
        }
        loop {
            match self.rx.recv().await {
                Ok(observation) => {
                    if self.symbols.contains(&observation.symbol) {
                        return Some(observation);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped.fetch_add(n, Ordering::Relaxed);
                    self.sink.emit(EngineEvent::ObservationsDropped {
                        subscriber: self.id.clone(),
                        count: n,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(subscriber = %self.id, "Feed closed");
                    return None;
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Observation> + Send + Unpin {
        Box::pin(futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|observation| (observation, sub))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use crate::test_support::{series, t0};
    use chrono::Duration;
    use futures::StreamExt;

    fn feed(live: usize, history: usize) -> (ObservationFeed, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (ObservationFeed::new(live, history, sink.clone()), sink)
    }

    fn symbols() -> Vec<String> {
        vec!["BTC/USDT".to_string()]
    }

    #[tokio::test]
    async fn test_out_of_order_rejected_and_counted() {
        let (feed, sink) = feed(16, 100);
        let data = series("BTC/USDT", 3, 0.0);
        let mut late = data[0].clone();
        late.timestamp = t0() - Duration::hours(1);

        feed.ingest(data[1].clone()).await.unwrap();
        let err = feed.ingest(late).await.unwrap_err();
        assert!(matches!(err, FeedError::OutOfOrderObservation { .. }));

        feed.ingest(data[2].clone()).await.unwrap();
        let stats = feed.stats().await;
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.out_of_order, 1);
        assert_eq!(sink.count("observation_rejected"), 1);
    }

    #[tokio::test]
    async fn test_duplicates_and_invalid_rejected() {
        let (feed, sink) = feed(16, 100);
        let data = series("BTC/USDT", 3, 0.0);
        feed.ingest(data[0].clone()).await.unwrap();
        feed.ingest(data[1].clone()).await.unwrap();

        let dup = feed.ingest(data[1].clone()).await.unwrap_err();
        assert!(matches!(dup, FeedError::DuplicateObservation { .. }));
        // Older record already in history is a duplicate too
        let old = feed.ingest(data[0].clone()).await.unwrap_err();
        assert!(matches!(old, FeedError::DuplicateObservation { .. }));

        let mut bad = data[2].clone();
        bad.low = bad.high + rust_decimal::Decimal::ONE;
        let invalid = feed.ingest(bad).await.unwrap_err();
        assert_eq!(invalid.kind(), "invalid");
        assert_eq!(feed.stats().await.duplicates, 2);

        // One event per rejection, carrying the reason
        let rejected: Vec<String> = sink
            .events()
            .into_iter()
            .filter_map(|event| match event {
                EngineEvent::ObservationRejected { kind, .. } => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(rejected, vec!["duplicate", "duplicate", "invalid"]);
    }

    #[tokio::test]
    async fn test_subscription_filters_symbols() {
        let (feed, _) = feed(16, 100);
        let mut sub = feed.subscribe(&symbols()).await;
        for o in series("ETH/USDT", 2, 0.0) {
            feed.ingest(o).await.unwrap();
        }
        let btc = series("BTC/USDT", 1, 0.0).remove(0);
        feed.ingest(btc.clone()).await.unwrap();
        assert_eq!(sub.recv().await, Some(btc));
    }

    #[tokio::test]
    async fn test_subscribe_from_replays_then_goes_live() {
        let (feed, _) = feed(16, 100);
        let data = series("BTC/USDT", 6, 0.0);
        for o in &data[..4] {
            feed.ingest(o.clone()).await.unwrap();
        }
        let cursors = HashMap::from([("BTC/USDT".to_string(), data[2].timestamp)]);
        let sub = feed.subscribe_from(&cursors).await;
        for o in &data[4..] {
            feed.ingest(o.clone()).await.unwrap();
        }

        let received: Vec<Observation> = sub.into_stream().take(4).collect().await;
        assert_eq!(received, data[2..].to_vec());
    }

    #[tokio::test]
    async fn test_subscribe_from_uses_each_symbols_cursor() {
        let (feed, _) = feed(16, 100);
        let btc = series("BTC/USDT", 4, 0.0);
        let eth = series("ETH/USDT", 4, 0.0);
        for (b, e) in btc.iter().zip(&eth) {
            feed.ingest(b.clone()).await.unwrap();
            feed.ingest(e.clone()).await.unwrap();
        }

        let cursors = HashMap::from([
            ("BTC/USDT".to_string(), btc[3].timestamp),
            ("ETH/USDT".to_string(), eth[1].timestamp),
        ]);
        let sub = feed.subscribe_from(&cursors).await;
        let received: Vec<Observation> = sub.into_stream().take(4).collect().await;
        // Merged by timestamp: ETH t1, ETH t2, then BTC and ETH at t3
        assert_eq!(received, vec![eth[1].clone(), eth[2].clone(), btc[3].clone(), eth[3].clone()]);
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest_with_count() {
        let (feed, sink) = feed(4, 100);
        let mut sub = feed.subscribe(&symbols()).await;
        let data = series("BTC/USDT", 10, 0.0);
        for o in &data {
            feed.ingest(o.clone()).await.unwrap();
        }

        // The four newest survive
        assert_eq!(sub.recv().await, Some(data[6].clone()));
        assert_eq!(feed.stats().await.dropped, 6);
        assert_eq!(sink.count("observations_dropped"), 1);
    }

    #[tokio::test]
    async fn test_window_returns_latest_bounded_history() {
        let (feed, _) = feed(16, 5);
        for o in series("BTC/USDT", 8, 0.0) {
            feed.ingest(o).await.unwrap();
        }
        let window = feed.window("BTC/USDT", 3).await;
        assert_eq!(window.len(), 3);
        assert_eq!(window.end(), feed.last_timestamp("BTC/USDT").await);
        assert_eq!(feed.window("BTC/USDT", 100).await.len(), 5);
        assert!(feed.window("SOL/USDT", 3).await.is_empty());
    }
}
