use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ConversionError;

/// Bounded admission for engine processes.
///
/// Two semaphores split the budget: `admission` caps how many conversions may
/// be accepted at all (`max_concurrent + queue_capacity`), `workers` caps how
/// many of those run an engine process at once. A request that cannot get an
/// admission slot is rejected immediately with [`ConversionError::Busy`]
/// instead of queueing without bound.
#[derive(Debug, Clone)]
pub struct ConversionPool {
    admission: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    max_concurrent: usize,
    capacity: usize,
}

/// An accepted conversion waiting for a worker. Dropping it frees the slot.
#[derive(Debug)]
pub struct Admission {
    permit: OwnedSemaphorePermit,
    workers: Arc<Semaphore>,
    capacity: usize,
}

/// A conversion holding a worker slot; released on drop.
#[derive(Debug)]
pub struct Running {
    _admission: OwnedSemaphorePermit,
    _worker: OwnedSemaphorePermit,
}

impl ConversionPool {
    /// `max_concurrent` engine processes, plus up to `queue_capacity` accepted
    /// conversions waiting for one. `max_concurrent` is clamped to at least 1.
    pub fn new(max_concurrent: usize, queue_capacity: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let capacity = max_concurrent + queue_capacity;
        Self {
            admission: Arc::new(Semaphore::new(capacity)),
            workers: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            capacity,
        }
    }

    /// Reserve a slot or fail fast with `Busy`.
    pub fn try_admit(&self) -> Result<Admission, ConversionError> {
        Arc::clone(&self.admission)
            .try_acquire_owned()
            .map(|permit| Admission {
                permit,
                workers: Arc::clone(&self.workers),
                capacity: self.capacity,
            })
            .map_err(|_| ConversionError::Busy {
                capacity: self.capacity,
            })
    }

    /// Conversions accepted and not yet finished (running or waiting).
    pub fn in_flight(&self) -> usize {
        self.capacity - self.admission.available_permits()
    }

    /// Conversions currently holding a worker slot.
    pub fn running(&self) -> usize {
        self.max_concurrent - self.workers.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Admission {
    /// Wait for a worker slot.
    pub async fn start(self) -> Result<Running, ConversionError> {
        let worker = self
            .workers
            .acquire_owned()
            .await
            .map_err(|_| ConversionError::Busy {
                capacity: self.capacity,
            })?;
        Ok(Running {
            _admission: self.permit,
            _worker: worker,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rejects_beyond_capacity_and_recovers() {
        let pool = ConversionPool::new(1, 1);
        let a = pool.try_admit().expect("first admission");
        let _b = pool.try_admit().expect("second admission (queued)");
        let err = pool.try_admit().unwrap_err();
        assert!(matches!(err, ConversionError::Busy { capacity: 2 }));
        assert_eq!(pool.in_flight(), 2);

        drop(a);
        assert!(pool.try_admit().is_ok(), "slot is freed on drop");
    }

    #[test]
    fn zero_workers_is_clamped() {
        let pool = ConversionPool::new(0, 0);
        assert_eq!(pool.max_concurrent(), 1);
        assert!(pool.try_admit().is_ok());
    }

    #[tokio::test]
    async fn queued_admission_waits_for_a_worker() {
        let pool = ConversionPool::new(1, 1);
        let first = pool.try_admit().unwrap().start().await.unwrap();
        assert_eq!(pool.running(), 1);

        let queued = pool.try_admit().unwrap();
        let mut waiting = tokio::spawn(queued.start());
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut waiting)
                .await
                .is_err(),
            "second conversion must wait while the worker is busy"
        );

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("worker should be released")
            .unwrap()
            .unwrap();
        assert_eq!(pool.running(), 1);
        drop(second);
        assert_eq!(pool.running(), 0);
        assert_eq!(pool.in_flight(), 0);
    }
}
