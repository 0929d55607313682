use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, mpsc},
    thread,
};

use log::{debug, warn};
use thiserror::Error;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("compute pool is shut down")]
    Closed,
    #[error("failed to spawn compute thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Fixed set of compute threads pulling jobs off a shared queue.
///
/// Every statistics request in the process shares one pool, so the number
/// of threads counting segments at any moment never exceeds its size.
#[derive(Debug)]
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::Sender<Job>>,
}

impl ThreadPool {
    /// # Panics
    /// If `size` is zero.
    pub fn new(size: usize) -> Result<Self, PoolError> {
        assert!(size > 0);

        let mut workers = Vec::with_capacity(size);
        let (sender, receiver) = mpsc::channel();

        let receiver = Arc::new(Mutex::new(receiver));
        let sender = Some(sender);

        for i in 0..size {
            workers.push(Worker::new(i, Arc::clone(&receiver))?);
        }

        Ok(Self { workers, sender })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn execute<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let job = Box::new(f);
        self.sender
            .as_ref()
            .ok_or(PoolError::Closed)?
            .send(job)
            .map_err(|_| PoolError::Closed)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        drop(self.sender.take());

        for worker in self.workers.drain(..) {
            debug!("shutting down compute worker {}", worker.id);

            if worker.thread.join().is_err() {
                warn!("compute worker {} exited abnormally", worker.id);
            }
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> Result<Self, PoolError> {
        let thread = thread::Builder::new()
            .name(format!("tally-compute-{id}"))
            .spawn(move || {
                loop {
                    let msg = match receiver.lock() {
                        Ok(guard) => guard.recv(),
                        Err(poisoned) => poisoned.into_inner().recv(),
                    };
                    match msg {
                        Ok(job) => {
                            // A panicking job drops its result channel; the
                            // worker itself stays in the pool.
                            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                                warn!("compute worker {id} recovered from a panicking job");
                            }
                        }
                        Err(_) => {
                            debug!("compute worker {id} disconnected");
                            break;
                        }
                    }
                }
            })?;

        Ok(Self { id, thread })
    }
}
