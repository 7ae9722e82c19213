//! Data connectors and the feed producer task

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ObservationFeed;
use crate::coordination::ShutdownHandle;
use crate::domain::Observation;
use crate::error::Result;

/// Pull interface to an exchange or data vendor
#[async_trait]
pub trait DataConnector: Send {
    fn name(&self) -> &str;

    /// Next batch of raw observations.
    ///
    /// `Some(vec![])` means nothing new yet; `None` means the source is
    /// exhausted and will never produce again.
    async fn poll(&mut self) -> Result<Option<Vec<Observation>>>;
}

/// In-memory replay of pre-loaded observations, in the given order
pub struct ReplayConnector {
    observations: VecDeque<Observation>,
    batch_size: usize,
}

impl ReplayConnector {
    pub fn new(observations: Vec<Observation>, batch_size: usize) -> Self {
        Self {
            observations: observations.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// Total number of remaining observations
    pub fn remaining(&self) -> usize {
        self.observations.len()
    }
}

#[async_trait]
impl DataConnector for ReplayConnector {
    fn name(&self) -> &str {
        "replay"
    }

    async fn poll(&mut self) -> Result<Option<Vec<Observation>>> {
        if self.observations.is_empty() {
            return Ok(None);
        }
        let n = self.batch_size.min(self.observations.len());
        Ok(Some(self.observations.drain(..n).collect()))
    }
}

/// One JSON-encoded [`Observation`] per line. Unparseable lines are skipped.
pub struct JsonLinesConnector {
    path: PathBuf,
    lines: Lines<BufReader<tokio::fs::File>>,
    batch_size: usize,
    line_no: usize,
    skipped: usize,
}

impl JsonLinesConnector {
    pub async fn open(path: impl AsRef<Path>, batch_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::File::open(&path).await?;
        info!(path = %path.display(), "Opened observation file");
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            batch_size: batch_size.max(1),
            line_no: 0,
            skipped: 0,
        })
    }

    /// Lines that could not be parsed so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[async_trait]
impl DataConnector for JsonLinesConnector {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn poll(&mut self) -> Result<Option<Vec<Observation>>> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            let Some(line) = self.lines.next_line().await? else {
                break;
            };
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Observation>(line) {
                Ok(observation) => batch.push(observation),
                Err(e) => {
                    self.skipped += 1;
                    warn!(
                        path = %self.path.display(),
                        line = self.line_no,
                        error = %e,
                        "Skipping unparseable observation"
                    );
                }
            }
        }
        if batch.is_empty() {
            debug!(path = %self.path.display(), lines = self.line_no, "Observation file exhausted");
            return Ok(None);
        }
        Ok(Some(batch))
    }
}

/// What a producer did before it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub accepted: u64,
    pub rejected: u64,
    /// The connector reported exhaustion (as opposed to shutdown)
    pub exhausted: bool,
}

/// Background task pulling from a connector into the feed
pub struct FeedProducer;

impl FeedProducer {
    pub fn spawn(
        mut connector: Box<dyn DataConnector>,
        feed: Arc<ObservationFeed>,
        poll_interval: Duration,
        shutdown: ShutdownHandle,
    ) -> JoinHandle<ProducerReport> {
        tokio::spawn(async move {
            let name = connector.name().to_string();
            info!(connector = %name, "Feed producer started");
            let mut report = ProducerReport::default();

            loop {
                if shutdown.is_requested() {
                    break;
                }
                let polled = tokio::select! {
                    _ = shutdown.wait() => break,
                    polled = connector.poll() => polled,
                };
                match polled {
                    Ok(Some(batch)) if !batch.is_empty() => {
                        for observation in batch {
                            match feed.ingest(observation).await {
                                Ok(()) => report.accepted += 1,
                                Err(_) => report.rejected += 1,
                            }
                        }
                        continue;
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        report.exhausted = true;
                        break;
                    }
                    Err(e) => warn!(connector = %name, error = %e, "Connector poll failed"),
                }
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }

            info!(
                connector = %name,
                accepted = report.accepted,
                rejected = report.rejected,
                exhausted = report.exhausted,
                "Feed producer stopped"
            );
            report
        })
    }
}
