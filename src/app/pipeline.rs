use super::config::Config;
use crate::domain::LogTuple;
use crate::sender::{AuthenticatedClient, Dispatcher};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{error, info, warn};

const MAX_DELIVERY_ATTEMPTS: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Thin stand-in for the host framework's buffering machinery: reads NDJSON
/// tuples from stdin, accumulates chunks bounded by size and flush interval,
/// and hands each chunk to the dispatcher, re-delivering on retriable
/// failure.
pub struct Pipeline<C> {
    dispatcher: Dispatcher<C>,
    chunk_size: usize,
    flush_interval: Duration,
}

impl<C: AuthenticatedClient> Pipeline<C> {
    pub fn new(dispatcher: Dispatcher<C>, config: &Config) -> Self {
        Self {
            dispatcher,
            chunk_size: config.chunk_size,
            flush_interval: Duration::from_millis(config.flush_interval_ms),
        }
    }

    /// Runs until stdin reaches EOF or a shutdown signal arrives; the
    /// pending chunk is flushed either way.
    pub async fn run(&self) -> std::io::Result<()> {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        let mut chunk: Vec<LogTuple> = Vec::with_capacity(self.chunk_size);

        let mut ticker = interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<LogTuple>(&line) {
                        Ok(tuple) => {
                            chunk.push(tuple);
                            if chunk.len() >= self.chunk_size {
                                self.deliver(std::mem::take(&mut chunk)).await;
                            }
                        }
                        Err(error) => warn!(%error, "discarding undecodable input line"),
                    }
                }
                _ = ticker.tick() => {
                    if !chunk.is_empty() {
                        self.deliver(std::mem::take(&mut chunk)).await;
                    }
                }
                _ = &mut shutdown => {
                    info!("shutdown signal received, flushing pending chunk");
                    break;
                }
            }
        }

        if !chunk.is_empty() {
            self.deliver(chunk).await;
        }
        Ok(())
    }

    async fn deliver(&self, chunk: Vec<LogTuple>) {
        let mut delay = BASE_BACKOFF;
        for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
            match self.dispatcher.write_chunk(&chunk).await {
                Ok(()) => return,
                Err(error) => {
                    warn!(attempt, %error, "chunk delivery failed");
                    if attempt < MAX_DELIVERY_ATTEMPTS {
                        sleep(delay).await;
                        delay = (delay * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }
        error!(
            entries = chunk.len(),
            "giving up on chunk after repeated delivery failures"
        );
    }
}
