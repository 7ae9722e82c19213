//! Append-only promotion decision log

use std::sync::Arc;
use tracing::info;

use crate::domain::PromotionDecision;
use crate::error::Result;
use crate::logging::{EngineEvent, EventSink};
use crate::store::record::{append_record, decode_entries};
use crate::store::{keys, StateStore};

const PAGE_SIZE: usize = 500;

/// Decisions are only ever appended; there is no update or delete
pub struct DecisionLog {
    store: Arc<dyn StateStore>,
    sink: Arc<dyn EventSink>,
}

impl DecisionLog {
    pub fn new(store: Arc<dyn StateStore>, sink: Arc<dyn EventSink>) -> Self {
        Self { store, sink }
    }

    /// Append, then log with every compared input; returns the log sequence
    pub async fn append(&self, decision: &PromotionDecision) -> Result<u64> {
        let seq = append_record(self.store.as_ref(), keys::PROMOTION_LOG, decision).await?;
        let r = &decision.reasoning;
        info!(
            seq,
            decision_id = %decision.id,
            candidate_id = %decision.candidate_id,
            decision = %decision.decision,
            source = %r.candidate_source,
            candidate_fitness = ?r.candidate_fitness,
            live_strategy_id = ?r.live_strategy_id.map(|id| id.to_string()),
            live_fitness = ?r.live_fitness,
            promotion_margin = r.promotion_margin,
            min_fitness = r.min_fitness,
            window_observations = r.window.observations,
            min_evaluation_window = r.min_evaluation_window,
            reason = %r.reason,
            "Promotion decision"
        );
        self.sink.emit(EngineEvent::PromotionDecided {
            decision_id: decision.id,
            candidate_id: decision.candidate_id,
            decision: decision.decision,
            candidate_fitness: r.candidate_fitness,
            live_fitness: r.live_fitness,
            promotion_margin: r.promotion_margin,
            window: r.window.clone(),
            reason: r.reason.clone(),
        });
        Ok(seq)
    }

    /// Decisions after `after`, oldest first
    pub async fn read(&self, after: u64, limit: usize) -> Result<Vec<(u64, PromotionDecision)>> {
        let entries = self.store.read_log(keys::PROMOTION_LOG, after, limit).await?;
        decode_entries(entries)
    }

    pub async fn all(&self) -> Result<Vec<PromotionDecision>> {
        let mut decisions = Vec::new();
        let mut after = 0;
        loop {
            let page = self.read(after, PAGE_SIZE).await?;
            let Some((last, _)) = page.last() else {
                break;
            };
            after = *last;
            let full = page.len() == PAGE_SIZE;
            decisions.extend(page.into_iter().map(|(_, d)| d));
            if !full {
                break;
            }
        }
        Ok(decisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decision, EvaluationWindow, Provenance, ReasoningSnapshot, StrategyId};
    use crate::logging::MemorySink;
    use crate::store::MemoryStore;

    fn decision(decision: Decision) -> PromotionDecision {
        PromotionDecision::new(
            StrategyId::new(),
            decision,
            ReasoningSnapshot {
                candidate_source: Provenance::GaChild,
                candidate_fitness: Some(1.0),
                live_strategy_id: None,
                live_fitness: None,
                promotion_margin: 0.05,
                min_fitness: 0.0,
                window: EvaluationWindow {
                    symbol: "BTC/USDT".into(),
                    start: None,
                    end: None,
                    observations: 300,
                },
                min_evaluation_window: 200,
                reason: "test".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_append_preserves_order_and_emits() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let log = DecisionLog::new(store, sink.clone());

        let first = decision(Decision::Promote);
        let second = decision(Decision::Reject);
        let s1 = log.append(&first).await.unwrap();
        let s2 = log.append(&second).await.unwrap();
        assert!(s2 > s1);

        let all = log.all().await.unwrap();
        assert_eq!(all, vec![first, second]);
        assert_eq!(sink.count("promotion_decided"), 2);
        assert_eq!(log.read(s1, 10).await.unwrap().len(), 1);
    }
}
