//! Pending-call table: call ids mapped to their result channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{RemoteError, SocketError};

/// Receiver side of one pending call.
pub type JobReceiver = oneshot::Receiver<Result<Value, SocketError>>;

struct Job {
    tx: oneshot::Sender<Result<Value, SocketError>>,
    issued_at: Instant,
}

/// Table of pending outgoing calls plus the id sequence.
///
/// Ids are allocated from a counter wrapping modulo 2³². Removal always
/// precedes resolution, and both happen under the table lock, so the
/// expiry tick can never race a completion for the same id.
#[derive(Default)]
pub struct JobTable {
    jobs: Mutex<HashMap<u32, Job>>,
    sequence: AtomicU32,
}

impl JobTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next call id.
    pub fn next_id(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a pending call under `id` and return its result receiver.
    ///
    /// An id colliding with a live job is rejected; with the 32-bit wrap
    /// this requires 2³² concurrent calls and cannot occur in normal
    /// operation.
    pub fn register(&self, id: u32) -> Result<JobReceiver, SocketError> {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&id) {
            return Err(SocketError::JobCollision { id });
        }
        let (tx, rx) = oneshot::channel();
        let _ = jobs.insert(
            id,
            Job {
                tx,
                issued_at: Instant::now(),
            },
        );
        Ok(rx)
    }

    /// Complete the job for `id`, removing it from the table first.
    ///
    /// Returns an error when no job is registered under `id`.
    pub fn complete(&self, id: u32, outcome: Result<Value, RemoteError>) -> Result<(), SocketError> {
        let job = self
            .jobs
            .lock()
            .remove(&id)
            .ok_or_else(|| SocketError::protocol(format!("No job registered for ack {id}.")))?;
        let _ = job.tx.send(outcome.map_err(SocketError::Remote));
        Ok(())
    }

    /// Remove the registration for `id` without resolving it.
    ///
    /// Used when the send for a freshly registered call fails.
    pub fn forget(&self, id: u32) {
        let _ = self.jobs.lock().remove(&id);
    }

    /// Reject every job older than `ttl`. Returns how many were rejected.
    pub fn expire(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut jobs = self.jobs.lock();
        let expired: Vec<u32> = jobs
            .iter()
            .filter(|(_, job)| now.duration_since(job.issued_at) > ttl)
            .map(|(&id, _)| id)
            .collect();
        for id in &expired {
            if let Some(job) = jobs.remove(id) {
                debug!(id, "rejecting expired job");
                let _ = job.tx.send(Err(SocketError::JobTimeout));
            }
        }
        expired.len()
    }

    /// Reject every pending job. Returns how many were rejected.
    pub fn reject_all(&self) -> usize {
        let drained: Vec<Job> = self.jobs.lock().drain().map(|(_, job)| job).collect();
        let count = drained.len();
        for job in drained {
            let _ = job.tx.send(Err(SocketError::JobTimeout));
        }
        count
    }

    /// Reset the id sequence to zero.
    pub fn reset_sequence(&self) {
        self.sequence.store(0, Ordering::Relaxed);
    }

    /// Number of pending jobs.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Whether no jobs are pending.
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_sequential() {
        let table = JobTable::new();
        assert_eq!(table.next_id(), 0);
        assert_eq!(table.next_id(), 1);
        assert_eq!(table.next_id(), 2);
    }

    #[test]
    fn sequence_wraps_modulo_u32() {
        let table = JobTable::new();
        table.sequence.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(table.next_id(), u32::MAX);
        assert_eq!(table.next_id(), 0);
    }

    #[test]
    fn reset_sequence() {
        let table = JobTable::new();
        let _ = table.next_id();
        let _ = table.next_id();
        table.reset_sequence();
        assert_eq!(table.next_id(), 0);
    }

    #[tokio::test]
    async fn resolve_removes_before_completing() {
        let table = JobTable::new();
        let rx = table.register(7).unwrap();
        table.complete(7, Ok(json!(3))).unwrap();
        // Table entry is gone before the receiver observes the result
        assert!(table.is_empty());
        assert_eq!(rx.await.unwrap().unwrap(), json!(3));
    }

    #[tokio::test]
    async fn reject_carries_remote_error() {
        let table = JobTable::new();
        let rx = table.register(1).unwrap();
        table
            .complete(1, Err(RemoteError::new("bad").with_code(42)))
            .unwrap();
        let err = rx.await.unwrap().unwrap_err();
        match err {
            SocketError::Remote(remote) => assert_eq!(remote.message, "bad"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_ack_id_is_an_error() {
        let table = JobTable::new();
        let err = table.complete(99, Ok(Value::Null)).unwrap_err();
        assert!(matches!(err, SocketError::Protocol { .. }));
    }

    #[test]
    fn collision_is_rejected() {
        let table = JobTable::new();
        let _rx = table.register(5).unwrap();
        let err = table.register(5).unwrap_err();
        assert!(matches!(err, SocketError::JobCollision { id: 5 }));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn expire_rejects_only_old_jobs() {
        let table = JobTable::new();
        let old_rx = table.register(1).unwrap();
        // Backdate the first job past the deadline
        table.jobs.lock().get_mut(&1).unwrap().issued_at =
            Instant::now() - Duration::from_secs(700);
        let fresh_rx = table.register(2).unwrap();

        let expired = table.expire(Duration::from_secs(600));
        assert_eq!(expired, 1);
        assert_eq!(table.len(), 1);

        let err = old_rx.await.unwrap().unwrap_err();
        assert!(matches!(err, SocketError::JobTimeout));
        drop(fresh_rx);
    }

    #[tokio::test]
    async fn reject_all_drains_the_table() {
        let table = JobTable::new();
        let rx1 = table.register(1).unwrap();
        let rx2 = table.register(2).unwrap();

        assert_eq!(table.reject_all(), 2);
        assert!(table.is_empty());

        for rx in [rx1, rx2] {
            let err = rx.await.unwrap().unwrap_err();
            assert_eq!(err.to_string(), "Job timed out.");
        }
    }

    #[test]
    fn forget_drops_silently() {
        let table = JobTable::new();
        let rx = table.register(3).unwrap();
        table.forget(3);
        assert!(table.is_empty());
        drop(rx);
    }
}
