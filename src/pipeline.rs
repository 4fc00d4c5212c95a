//! Stage-flow pipeline for ingestion.
//!
//! Three stage kinds compose a run:
//! - serial-in-order: the source iterator plus the `prepare` hook run on a
//!   single feeder thread and see tokens in document order;
//! - parallel: `transform` runs on a bounded worker pool, tokens in flight
//!   are capped at roughly 1.5 x the worker count;
//! - serial sink: runs on the calling thread, either in emission order
//!   (tokens are re-sorted by sequence number) or out of order.
//!
//! Any stage failure terminates the run; the driver re-raises the first
//! failure after the channels drain.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use crossbeam::channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOrdering {
    InOrder,
    OutOfOrder,
}

/// In-flight token budget for a given worker count.
pub fn token_count(workers: usize) -> usize {
    ((workers * 3 + 1) / 2).max(2)
}

pub fn run<T, U, I, P, F, S>(
    source: I,
    mut prepare: P,
    transform: F,
    mut sink: S,
    workers: usize,
    ordering: SinkOrdering,
) -> Result<()>
where
    T: Send,
    U: Send,
    I: Iterator<Item = Result<T>> + Send,
    P: FnMut(T) -> Result<T> + Send,
    F: Fn(T) -> Result<U> + Sync,
    S: FnMut(U) -> Result<()>,
{
    let workers = workers.max(1);
    let tokens = token_count(workers);

    let outcome = crossbeam::thread::scope(|scope| {
        let (task_tx, task_rx) = channel::bounded::<(u64, T)>(tokens);
        let (result_tx, result_rx) = channel::bounded::<(u64, Result<U>)>(tokens);

        let feeder_result_tx = result_tx.clone();
        scope.spawn(move |_| {
            let mut seq = 0u64;
            for item in source {
                match item.and_then(|t| prepare(t)) {
                    Ok(token) => {
                        if task_tx.send((seq, token)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // Forward the failure in place of the token and stop
                        // reading.
                        let _ = feeder_result_tx.send((seq, Err(e)));
                        break;
                    }
                }
                seq += 1;
            }
        });

        for _ in 0..workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let transform = &transform;
            scope.spawn(move |_| {
                for (seq, token) in task_rx {
                    if result_tx.send((seq, transform(token))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(task_rx);
        drop(result_tx);

        let mut failure: Option<anyhow::Error> = None;
        let mut pending: HashMap<u64, U> = HashMap::new();
        let mut next_seq = 0u64;
        for (seq, result) in result_rx {
            match result {
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
                Ok(output) => {
                    if failure.is_some() {
                        continue;
                    }
                    match ordering {
                        SinkOrdering::OutOfOrder => {
                            if let Err(e) = sink(output) {
                                failure = Some(e);
                            }
                        }
                        SinkOrdering::InOrder => {
                            pending.insert(seq, output);
                            while let Some(ready) = pending.remove(&next_seq) {
                                next_seq += 1;
                                if let Err(e) = sink(ready) {
                                    failure = Some(e);
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    })
    .map_err(|_| anyhow!("pipeline worker panicked"))?;

    outcome
}
