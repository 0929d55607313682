//! Per-connection statistics state.
//!
//! A [`Session`] is created when a connection is accepted and dropped when it
//! closes. It is owned by the connection's thread and never shared, so none of
//! its state needs locking. The connection loop feeds it decoded [`Request`]s
//! in arrival order and writes back whatever [`Response`] it returns.
use std::sync::Arc;

use log::{debug, warn};

use crate::stats::{AggregateError, Summary, ThreadPool, aggregate};

use super::{ComputeStatus, FetchReply, Request, Response};

/// Observable lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing submitted yet.
    Idle,
    /// At least one array lacks a result.
    DataPartial,
    /// Every submitted array has a result.
    Computed,
}

#[derive(Debug)]
struct Submission {
    values: Arc<[i32]>,
    workers: u32,
}

#[derive(Debug)]
pub struct Session {
    submissions: Vec<Submission>,
    results: Vec<Summary>,
    data_received: bool,
    computation_done: bool,
    max_workers: u32,
    pool: Arc<ThreadPool>,
}

impl Session {
    pub fn new(pool: Arc<ThreadPool>, max_workers: u32) -> Self {
        Self {
            submissions: Vec::new(),
            results: Vec::new(),
            data_received: false,
            computation_done: false,
            max_workers: max_workers.max(1),
            pool,
        }
    }

    pub fn state(&self) -> SessionState {
        match (self.data_received, self.computation_done) {
            (false, _) => SessionState::Idle,
            (true, false) => SessionState::DataPartial,
            (true, true) => SessionState::Computed,
        }
    }

    /// Number of arrays submitted so far.
    pub fn submitted(&self) -> usize {
        self.submissions.len()
    }

    /// Applies one request. SubmitArray produces no reply.
    pub fn handle(&mut self, request: Request) -> Result<Option<Response>, AggregateError> {
        match request {
            Request::SubmitArray { workers, values } => {
                self.submit(values, workers);
                Ok(None)
            }
            Request::Compute => Ok(Some(Response::Compute(self.compute()?))),
            Request::FetchResults => Ok(Some(Response::Fetch(self.fetch()))),
        }
    }

    fn submit(&mut self, values: Vec<i32>, workers: u32) {
        self.submissions.push(Submission {
            values: values.into(),
            workers,
        });
        self.data_received = true;
        self.computation_done = false;
    }

    /// Aggregates every array that has no result yet, in submission order.
    fn compute(&mut self) -> Result<ComputeStatus, AggregateError> {
        if !self.data_received {
            return Ok(ComputeStatus::NoData);
        }

        // Arrays asking for zero workers are dropped so later computes can
        // still make progress.
        let done = self.results.len();
        let before = self.submissions.len();
        let mut index = 0;
        self.submissions.retain(|s| {
            let keep = index < done || s.workers > 0;
            index += 1;
            keep
        });
        if self.submissions.len() != before {
            warn!(
                "rejecting compute: dropped {} arrays requesting zero workers",
                before - self.submissions.len()
            );
            self.data_received = !self.submissions.is_empty();
            self.computation_done = done > 0 && done == self.submissions.len();
            return Ok(ComputeStatus::Rejected);
        }

        for submission in &self.submissions[done..] {
            let workers = submission.workers.min(self.max_workers);
            if workers < submission.workers {
                debug!(
                    "clamping {} requested workers to {workers}",
                    submission.workers
                );
            }
            let summary = aggregate(&self.pool, &submission.values, workers as usize)?;
            debug!(
                "aggregated {} values with {workers} workers: mode {:?}, median {}",
                submission.values.len(),
                summary.mode,
                summary.median
            );
            self.results.push(summary);
        }

        self.computation_done = true;
        Ok(ComputeStatus::Ok)
    }

    fn fetch(&self) -> FetchReply {
        match self.state() {
            SessionState::Computed => FetchReply::Done(self.results.clone()),
            SessionState::DataPartial => FetchReply::InProgress,
            SessionState::Idle => FetchReply::NoData,
        }
    }
}
