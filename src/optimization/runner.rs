use super::callback::{IterationSummary, SearchCallback};
use super::designers::{Designer, Strategy};
use super::evaluator::Evaluate;
use crate::core::{
    Candidate, CandidateDatabase, CandidateId, DesignerKind, NewCandidate, Outcome, ParameterSet, Provenance,
    RejectionKind,
};
use crate::error::{ConfigurationError, Error, Result};
use crossbeam::channel;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Why a task stopped iterating
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    MaxIterations,
    /// The designer itself declined to continue (converged or single pass)
    DesignerFinished,
    /// The callback asked to stop
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MaxIterations => "max iterations reached",
            Self::DesignerFinished => "designer finished",
            Self::Interrupted => "interrupted",
        })
    }
}

/// Outcome of one task run
#[derive(Clone, Debug)]
pub struct TaskReport {
    pub task: String,
    pub designer: DesignerKind,
    pub iterations: u32,
    pub proposed: usize,
    pub scored: usize,
    pub rejected: usize,
    /// Best candidate produced by this task
    pub best: Option<(CandidateId, f64)>,
    /// Selection published by the designer, if any
    pub selected: Vec<CandidateId>,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl TaskReport {
    fn new(task: &str, designer: DesignerKind) -> Self {
        Self {
            task: task.to_string(),
            designer,
            iterations: 0,
            proposed: 0,
            scored: 0,
            rejected: 0,
            best: None,
            selected: Vec::new(),
            stop_reason: StopReason::MaxIterations,
            elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, evaluated: &[Arc<Candidate>]) {
        self.proposed += evaluated.len();
        for candidate in evaluated {
            let Some(merit) = candidate.merit() else {
                self.rejected += 1;
                continue;
            };
            self.scored += 1;
            if self.best.is_none_or(|(_, best)| merit < best) {
                self.best = Some((candidate.id(), merit));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Drives one designer's propose / evaluate / update loop.
///
/// The runner owns the designer and is the only writer to the database;
/// workers only compute outcomes and hand them back over a channel.
pub struct TaskRunner<'a> {
    task: &'a str,
    database: &'a CandidateDatabase,
    evaluator: Option<&'a dyn Evaluate>,
}

impl<'a> TaskRunner<'a> {
    pub fn new(task: &'a str, database: &'a CandidateDatabase, evaluator: Option<&'a dyn Evaluate>) -> Self {
        Self {
            task,
            database,
            evaluator,
        }
    }

    fn build_pool(&self, threads: usize) -> Result<ThreadPool> {
        let prefix = format!("{}-worker", self.task);
        ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .build()
            .map_err(|e| Error::WorkerPool(e.to_string()))
    }

    pub fn run(&self, designer: &mut Designer, callback: &mut dyn SearchCallback) -> Result<TaskReport> {
        let start = Instant::now();
        let kind = designer.kind();
        let max_iters = designer.max_iters();
        let mut report = TaskReport::new(self.task, kind);

        let pool = self.build_pool(designer.max_concurrent())?;

        info!(task = self.task, designer = %kind, max_iters, "starting task");

        for iteration in 0..max_iters {
            if callback.should_stop() {
                report.stop_reason = StopReason::Interrupted;
                break;
            }

            let proposals = designer.propose(self.database, iteration);
            let outcomes = if proposals.is_empty() {
                Vec::new()
            } else {
                let evaluator = self
                    .evaluator
                    .ok_or_else(|| ConfigurationError::MissingMerit(self.task.to_string()))?;
                evaluate_batch(&pool, evaluator, &proposals)
            };

            // barrier passed: the whole batch is recorded before the designer sees it
            let batch: Vec<NewCandidate> = proposals
                .into_iter()
                .zip(outcomes)
                .enumerate()
                .map(|(slot, (parameters, outcome))| NewCandidate {
                    parameters,
                    outcome,
                    provenance: Provenance {
                        task: self.task.to_string(),
                        designer: kind,
                        iteration,
                        slot,
                    },
                })
                .collect();
            let ids = self.database.append_batch(batch);
            let snapshot = self.database.snapshot();
            let evaluated: Vec<Arc<Candidate>> = ids.iter().filter_map(|id| snapshot.get(*id).cloned()).collect();
            report.record(&evaluated);

            let outcome = designer.update(self.database, &evaluated);
            if let Some(selection) = outcome.selection {
                debug!(task = self.task, selected = selection.len(), "publishing selection");
                self.database.mark_active(self.task, selection.clone());
                report.selected = selection;
            }
            report.iterations = iteration + 1;

            callback.on_iteration(&IterationSummary {
                task: self.task,
                designer: kind,
                iteration,
                max_iters,
                evaluated: &evaluated,
                best: report.best,
            });

            if !outcome.proceed {
                report.stop_reason = StopReason::DesignerFinished;
                break;
            }
        }

        report.elapsed = start.elapsed();
        Ok(report)
    }
}

/// Evaluate a batch on the pool and collect every slot.
///
/// Completion order is arbitrary; the result is in proposal order. A job that
/// panics or never reports back yields a rejected outcome for its slot.
fn evaluate_batch(pool: &ThreadPool, evaluator: &dyn Evaluate, proposals: &[ParameterSet]) -> Vec<Outcome> {
    let (tx, rx) = channel::unbounded::<(usize, Outcome)>();

    pool.scope(|scope| {
        for (slot, parameters) in proposals.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(parameters)))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(&*payload);
                        warn!(slot, panic = message, "evaluation job panicked");
                        Outcome::rejected(RejectionKind::Simulation, format!("evaluation panicked: {}", message))
                    });
                // the receiver lives until after the scope
                let _ = tx.send((slot, outcome));
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<Outcome>> = vec![None; proposals.len()];
    for (slot, outcome) in rx.iter() {
        slots[slot] = Some(outcome);
    }
    slots
        .into_iter()
        .map(|outcome| {
            outcome.unwrap_or_else(|| Outcome::rejected(RejectionKind::Simulation, "evaluation job returned no result"))
        })
        .collect()
}
