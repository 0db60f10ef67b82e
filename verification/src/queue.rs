//! Per-subject operation queue.
//!
//! Every mutating operation for a subject (send, verify, capture, submit,
//! face match) runs inside a [`SubjectTurn`]. Turns are granted in FIFO order,
//! so a send issued while a verify is pending waits for the verify to finish.

use ekyc_types::SubjectId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Lanes = Mutex<HashMap<SubjectId, Arc<AsyncMutex<()>>>>;

fn lock(lanes: &Lanes) -> MutexGuard<'_, HashMap<SubjectId, Arc<AsyncMutex<()>>>> {
    lanes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive access to one subject's operations. Released on drop; the last
/// turn out removes the subject's lane.
pub struct SubjectTurn {
    lanes: Arc<Lanes>,
    subject: SubjectId,
    guard: OwnedMutexGuard<()>,
}

impl Drop for SubjectTurn {
    fn drop(&mut self) {
        let mut lanes = lock(&self.lanes);
        // The map and this guard are the only owners: nobody is waiting.
        let idle = lanes.get(&self.subject).is_some_and(|lane| {
            Arc::ptr_eq(lane, OwnedMutexGuard::mutex(&self.guard)) && Arc::strong_count(lane) == 2
        });
        if idle {
            lanes.remove(&self.subject);
        }
    }
}

#[derive(Default)]
pub struct SubjectQueue {
    lanes: Arc<Lanes>,
}

impl SubjectQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for this subject's turn.
    pub async fn enter(&self, subject: &SubjectId) -> SubjectTurn {
        let lane = lock(&self.lanes).entry(subject.clone()).or_default().clone();
        SubjectTurn {
            lanes: self.lanes.clone(),
            subject: subject.clone(),
            guard: lane.lock_owned().await,
        }
    }

    /// Whether an operation for `subject` currently holds the turn.
    pub fn is_busy(&self, subject: &SubjectId) -> bool {
        lock(&self.lanes)
            .get(subject)
            .is_some_and(|lane| lane.try_lock().is_err())
    }

    /// Subjects with an operation running or waiting.
    pub fn len(&self) -> usize {
        lock(&self.lanes).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn subject(s: &str) -> SubjectId {
        SubjectId::parse(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn operations_for_one_subject_never_interleave() {
        let queue = Arc::new(SubjectQueue::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let (queue, active, peak) = (queue.clone(), active.clone(), peak.clone());
            tasks.push(tokio::spawn(async move {
                let _turn = queue.enter(&subject("s-1")).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_subjects_do_not_block_each_other() {
        let queue = SubjectQueue::new();
        let _a = queue.enter(&subject("a")).await;
        assert!(queue.is_busy(&subject("a")));
        let _b = queue.enter(&subject("b")).await;
        assert!(queue.is_busy(&subject("b")));
    }

    #[tokio::test]
    async fn last_turn_out_releases_the_lane() {
        let queue = SubjectQueue::new();
        drop(queue.enter(&subject("a")).await);
        assert!(queue.is_empty());

        let held = queue.enter(&subject("b")).await;
        assert_eq!(queue.len(), 1);
        assert!(queue.is_busy(&subject("b")));
        drop(held);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lane_survives_while_someone_waits() {
        let queue = Arc::new(SubjectQueue::new());
        let first = queue.enter(&subject("a")).await;

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let _turn = queue.enter(&subject("a")).await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(first);
        assert_eq!(queue.len(), 1);

        waiter.await.unwrap();
        assert!(queue.is_empty());
    }
}
