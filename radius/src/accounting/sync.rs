use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::time::{self, Instant};

use crate::accounting::queue::AccountingQueue;
use crate::storage::{AccountingRow, Storage};

/// Periodically moves queued usage into the accounting table and the users' quota.
pub struct UsageSync {
    storage: Arc<dyn Storage>,
    queue: Arc<AccountingQueue>,
    hostname: String,
}

impl UsageSync {
    pub fn new(storage: Arc<dyn Storage>, queue: Arc<AccountingQueue>, hostname: &str) -> Self {
        UsageSync {
            storage,
            queue,
            hostname: hostname.to_owned(),
        }
    }

    /// Drains the queue now. Failed writes are logged and the statistic is lost;
    /// returns the number of users flushed.
    pub async fn flush(&self) -> usize {
        let entries = self.queue.flush();
        debug!("sync.flush {} metrics", entries.len());

        let date = Utc::now().format("%Y-%m-%d %H:%M").to_string();
        for (user, usage) in &entries {
            let row = AccountingRow {
                user: user.clone(),
                date: date.clone(),
                bytes_in: usage.in_octets,
                bytes_out: usage.out_octets,
                packets_in: usage.in_packets,
                packets_out: usage.out_packets,
                hostname: self.hostname.clone(),
            };
            if let Err(e) = self.storage.insert_accounting_row(&row).await {
                warn!("losing statistic data for user={}; {}", user, e);
            }

            let used = usage.total_octets();
            if used == 0 {
                continue;
            }
            if let Err(e) = self.storage.update_remaining_quota(user, used).await {
                warn!("losing statistic data for user={}; {}", user, e);
            }
        }
        entries.len()
    }

    /// Flushes every `interval` plus a random jitter in `[0, jitter)` until `shutdown_trigger` resolves.
    /// The caller is expected to run a final `flush()` once the listeners have stopped.
    pub async fn run(&self, interval: Duration, jitter: Duration, shutdown_trigger: impl Future) {
        let jitter = if jitter.is_zero() {
            Duration::ZERO
        } else {
            rand::thread_rng().gen_range(Duration::ZERO..jitter)
        };
        let period = interval + jitter;
        info!("sync every {:?}", period);

        let mut ticker = time::interval_at(Instant::now() + period, period);
        tokio::pin!(shutdown_trigger);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                _ = &mut shutdown_trigger => {
                    info!("usage sync is shutting down");
                    return;
                }
            }
        }
    }
}
