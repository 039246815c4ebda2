/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines progress reporting messages, sinks, and helper functions for iterative solves.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Progress reporting primitives for long-running computations.

use crate::rbf_solver::SolveStatus;
use std::fmt::Debug;
use std::sync::{Arc, mpsc};
use std::thread;

/// Progress events emitted during a solve.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMsg {
    /// Iteration status of the iterative solver.
    SolverIteration {
        iter: usize,
        relative_residual: f64,
        absolute_residual: f64,
        converged: bool,
        progress: f64,
    },

    /// Emitted once when a solve returns.
    SolverFinished {
        status: SolveStatus,
        iterations: usize,
        absolute_residual: f64,
    },

    /// Arbitrary informational message.
    Message { message: String },
}

/// Sink that consumes progress messages.
pub trait ProgressSink: Send + Sync + Debug {
    fn emit(&self, msg: ProgressMsg);
}

/// Progress sink that forwards messages over a channel.
#[derive(Debug)]
pub struct ClosureSink {
    tx: mpsc::SyncSender<ProgressMsg>,
}

impl ProgressSink for ClosureSink {
    #[inline]
    fn emit(&self, msg: ProgressMsg) {
        let _ = self.tx.try_send(msg);
    }
}

/// Spawns a listener thread that runs a handler closure for each progress message.
///
/// The thread exits once every clone of the returned sink has been dropped.
pub fn closure_sink<F>(
    buffer: usize,
    mut handler: F,
) -> (Arc<dyn ProgressSink>, thread::JoinHandle<()>)
where
    F: FnMut(ProgressMsg) + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel::<ProgressMsg>(buffer.max(1));
    let sink: Arc<dyn ProgressSink> = Arc::new(ClosureSink { tx });

    let handle = thread::spawn(move || {
        while let Ok(msg) = rx.recv() {
            handler(msg);
        }
    });

    (sink, handle)
}

/// Calculates the progress of the solver from the current residual, the starting
/// residual and the requested tolerance, on a log scale. Returns a value in `[0, 1]`.
#[inline]
pub(crate) fn progress_from_rel(current_res: f64, start_res: f64, target_res: f64) -> f64 {
    if current_res <= target_res {
        return 1.0;
    }
    if !(start_res > target_res) || current_res <= 0.0 || target_res <= 0.0 {
        return 0.0;
    }

    let progress =
        (start_res.log10() - current_res.log10()) / (start_res.log10() - target_res.log10());
    progress.clamp(0.0, 1.0)
}
