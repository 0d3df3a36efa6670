//! Fixed-width pool of fetch workers.
//!
//! `width` tokio tasks pull jobs from one shared queue and report on an
//! unbounded channel, so at most `width` jobs are in flight at once and a
//! slow job only holds up its own worker. Results are put back into input
//! order before they are returned.

use anyhow::{Result, anyhow};
use futures::future::try_join_all;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use crate::constants::DEFAULT_PARALLELISM;

/// Bounded set of workers draining a shared job queue.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    width: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLELISM)
    }
}

impl WorkerPool {
    pub const fn new(width: usize) -> Self {
        Self { width }
    }

    /// Workers actually started for `jobs` jobs: never zero, never more
    /// than there are jobs.
    pub fn width_for(&self, jobs: usize) -> usize {
        self.width.clamp(1, jobs.max(1))
    }

    /// Run `worker` over every item and return the results in input order.
    ///
    /// Errors inside a job are part of `R` and never stop other jobs. Only a
    /// worker task dying (a panic) fails the whole run.
    pub async fn run<T, R, W, Fut>(&self, items: Vec<T>, worker: W) -> Result<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        W: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let width = self.width_for(total);
        tracing::debug!(target: "pool", "Starting {} workers for {} jobs", width, total);

        let queue: Arc<Mutex<VecDeque<(usize, T)>>> =
            Arc::new(Mutex::new(items.into_iter().enumerate().collect()));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, R)>();
        let worker = Arc::new(worker);

        let mut handles = Vec::with_capacity(width);
        for worker_id in 0..width {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let worker = Arc::clone(&worker);

            handles.push(tokio::spawn(async move {
                let mut done = 0usize;
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some((index, item)) = next else {
                        break;
                    };
                    let result = worker(item).await;
                    done += 1;
                    if tx.send((index, result)).is_err() {
                        break;
                    }
                }
                tracing::trace!(target: "pool", "Worker {} finished after {} jobs", worker_id, done);
            }));
        }
        drop(tx);

        let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
        while let Some((index, result)) = rx.recv().await {
            slots[index] = Some(result);
        }

        try_join_all(handles).await.map_err(|e| anyhow!("Fetch worker terminated unexpectedly: {e}"))?;

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.ok_or_else(|| anyhow!("Job {index} produced no result")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_width_is_clamped() {
        assert_eq!(WorkerPool::new(30).width_for(3), 3);
        assert_eq!(WorkerPool::new(0).width_for(3), 1);
        assert_eq!(WorkerPool::new(4).width_for(100), 4);
        assert_eq!(WorkerPool::new(4).width_for(0), 1);
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let items: Vec<u64> = vec![30, 5, 20, 0, 10];
        let results = WorkerPool::new(5)
            .run(items, |delay| async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay * 2
            })
            .await
            .unwrap();
        assert_eq!(results, vec![60, 10, 40, 0, 20]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_jobs_never_exceed_width() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let results = WorkerPool::new(3)
            .run((0..20).collect::<Vec<u32>>(), move |n| {
                let active = Arc::clone(&a);
                let peak = Arc::clone(&p);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    n
                }
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_failed_jobs_do_not_stop_others() {
        let results = WorkerPool::new(2)
            .run(vec![1, 2, 3, 4], |n| async move {
                if n % 2 == 0 { Err(format!("job {n} failed")) } else { Ok(n) }
            })
            .await
            .unwrap();
        assert_eq!(results, vec![Ok(1), Err("job 2 failed".to_string()), Ok(3), Err("job 4 failed".to_string())]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results: Vec<u8> = WorkerPool::default().run(Vec::<u8>::new(), |n| async move { n }).await.unwrap();
        assert!(results.is_empty());
    }
}
