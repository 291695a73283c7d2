use super::runner::TaskReport;
use crate::core::{Candidate, CandidateId, DesignerKind};
use crate::utils::format_duration;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Snapshot of one finished iteration handed to the callback
#[derive(Debug)]
pub struct IterationSummary<'a> {
    pub task: &'a str,
    pub designer: DesignerKind,
    pub iteration: u32,
    pub max_iters: u32,
    /// The complete batch, in proposal order
    pub evaluated: &'a [Arc<Candidate>],
    /// Best candidate of this task so far
    pub best: Option<(CandidateId, f64)>,
}

impl IterationSummary<'_> {
    pub fn scored(&self) -> usize {
        self.evaluated.iter().filter(|c| c.is_scored()).count()
    }

    pub fn rejected(&self) -> usize {
        self.evaluated.len() - self.scored()
    }
}

/// Hook into the task runner's loop
pub trait SearchCallback {
    fn on_iteration(&mut self, summary: &IterationSummary<'_>);

    /// Called once per task after its last iteration
    fn on_task_finished(&mut self, _report: &TaskReport) {}

    /// Polled before each iteration; `true` ends the task early
    fn should_stop(&self) -> bool {
        false
    }
}

/// Iteration result for tracking search progress
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub task: String,
    pub iteration: u32,
    pub proposed: usize,
    pub scored: usize,
    pub rejected: usize,
    pub best_merit: Option<f64>,
}

/// Callback tracking and logging search progress
pub struct ProgressTracker {
    verbose: bool,
    history: Vec<IterationRecord>,
    last_iteration: Instant,
}

impl ProgressTracker {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            history: Vec::new(),
            last_iteration: Instant::now(),
        }
    }

    /// Get iteration history
    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// Log a task summary
    pub fn log_summary(&self, report: &TaskReport) {
        info!(
            task = %report.task,
            designer = %report.designer,
            iterations = report.iterations,
            proposed = report.proposed,
            scored = report.scored,
            rejected = report.rejected,
            best = ?report.best,
            stop_reason = %report.stop_reason,
            elapsed = %format_duration(report.elapsed),
            "task finished"
        );
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SearchCallback for ProgressTracker {
    fn on_iteration(&mut self, summary: &IterationSummary<'_>) {
        let elapsed = self.last_iteration.elapsed();
        self.last_iteration = Instant::now();

        let record = IterationRecord {
            task: summary.task.to_string(),
            iteration: summary.iteration,
            proposed: summary.evaluated.len(),
            scored: summary.scored(),
            rejected: summary.rejected(),
            best_merit: summary.best.map(|(_, merit)| merit),
        };

        if self.verbose {
            info!(
                task = summary.task,
                iteration = summary.iteration + 1,
                max_iters = summary.max_iters,
                scored = record.scored,
                rejected = record.rejected,
                best = ?record.best_merit,
                took = %format_duration(elapsed),
                "iteration complete"
            );
        } else {
            debug!(task = summary.task, iteration = summary.iteration, "iteration complete");
        }

        self.history.push(record);
    }

    fn on_task_finished(&mut self, report: &TaskReport) {
        self.log_summary(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CandidateDatabase, NewCandidate, Outcome, ParameterSet, Provenance, RejectionKind};

    #[test]
    fn test_tracker_records_history() {
        let db = CandidateDatabase::in_memory();
        let provenance = Provenance {
            task: "random".into(),
            designer: DesignerKind::RandomSearch,
            iteration: 0,
            slot: 0,
        };
        let ids = db.append_batch(vec![
            NewCandidate {
                parameters: ParameterSet::default(),
                outcome: Outcome::scored(2.0, None),
                provenance: provenance.clone(),
            },
            NewCandidate {
                parameters: ParameterSet::default(),
                outcome: Outcome::rejected(RejectionKind::Simulation, "crash"),
                provenance,
            },
        ]);
        let evaluated: Vec<_> = ids.iter().filter_map(|id| db.get(*id)).collect();

        let mut tracker = ProgressTracker::new(false);
        tracker.on_iteration(&IterationSummary {
            task: "random",
            designer: DesignerKind::RandomSearch,
            iteration: 0,
            max_iters: 3,
            evaluated: &evaluated,
            best: Some((ids[0], 2.0)),
        });

        assert_eq!(
            tracker.history(),
            &[IterationRecord {
                task: "random".into(),
                iteration: 0,
                proposed: 2,
                scored: 1,
                rejected: 1,
                best_merit: Some(2.0),
            }]
        );
        assert!(!tracker.should_stop());
    }
}
