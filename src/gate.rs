/// Process-wide admission control for DHT reads
use crate::{
    error::{ClientError, ClientResult},
    metrics,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Bounds the number of dhtget calls in flight
///
/// Excess requests wait for a release instead of polling; waiters are
/// admitted in arrival order.
#[derive(Clone)]
pub struct DhtQueryGate {
    permits: Arc<Semaphore>,
    max_queries: usize,
}

struct ActiveQuery;

impl ActiveQuery {
    fn start() -> Self {
        metrics::DHT_QUERIES_ACTIVE.inc();
        Self
    }
}

impl Drop for ActiveQuery {
    fn drop(&mut self) {
        metrics::DHT_QUERIES_ACTIVE.dec();
    }
}

impl DhtQueryGate {
    pub fn new(max_queries: usize) -> Self {
        let max_queries = max_queries.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_queries)),
            max_queries,
        }
    }

    pub fn max_queries(&self) -> usize {
        self.max_queries
    }

    /// Queries currently admitted
    pub fn in_flight(&self) -> usize {
        self.max_queries - self.permits.available_permits()
    }

    /// Run `operation` once a slot is free; the slot is released on
    /// completion, error or cancellation
    pub async fn admit<F, Fut, T>(&self, operation: F) -> ClientResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        if self.permits.available_permits() == 0 {
            debug!("DHT gate full ({} in flight), waiting", self.max_queries);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ClientError::HostUnreachable("DHT query gate closed".to_string()))?;
        let _active = ActiveQuery::start();

        operation().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_admission_bound() {
        let gate = DhtQueryGate::new(2);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let gate = gate.clone();
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                gate.admit(|| async {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_slot_released_on_error() {
        let gate = DhtQueryGate::new(1);
        let result: ClientResult<()> = gate
            .admit(|| async { Err(ClientError::HttpStatus(500)) })
            .await;
        assert!(result.is_err());
        assert_eq!(gate.in_flight(), 0);

        let value = gate.admit(|| async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
