//! Append-only execution history for one session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sandbox::ExecutionOutcome;

/// An image artifact intercepted from the plotting shim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedFigure {
    /// Session-unique, assigned in emission order.
    pub sequence: u64,
    /// Index of the record that produced this figure.
    pub record_index: u64,
    pub svg: String,
}

/// Immutable log entry for one executed fragment and its captured effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub index: u64,
    pub code: String,
    pub stdout: String,
    pub error: Option<String>,
    pub figures: Vec<CapturedFigure>,
    pub success: bool,
    pub duration: Duration,
}

/// Ordered execution records. Records are only ever appended; indices are
/// contiguous from zero and never reused.
#[derive(Debug, Default)]
pub struct ExecutionHistory {
    records: Vec<ExecutionRecord>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a sandbox outcome into the next record.
    pub fn push_outcome(&mut self, code: &str, outcome: ExecutionOutcome) -> &ExecutionRecord {
        let index = self.records.len() as u64;
        let figures = outcome
            .figures
            .into_iter()
            .map(|figure| CapturedFigure {
                sequence: figure.sequence,
                record_index: index,
                svg: figure.svg,
            })
            .collect();
        self.records.push(ExecutionRecord {
            index,
            code: code.to_string(),
            stdout: outcome.stdout,
            error: outcome.error,
            figures,
            success: outcome.success,
            duration: outcome.duration,
        });
        // Just pushed, so the slot exists.
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn figure_count(&self) -> usize {
        self.records.iter().map(|r| r.figures.len()).sum()
    }

    /// All captured figures across records, in sequence order.
    pub fn figures(&self) -> impl Iterator<Item = &CapturedFigure> {
        self.records.iter().flat_map(|r| r.figures.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::RenderedFigure;

    fn outcome(figures: Vec<RenderedFigure>) -> ExecutionOutcome {
        ExecutionOutcome {
            stdout: "ok".to_string(),
            error: None,
            figures,
            success: true,
            duration: Duration::from_millis(5),
        }
    }

    fn figure(sequence: u64) -> RenderedFigure {
        RenderedFigure {
            sequence,
            svg: "<svg/>".to_string(),
        }
    }

    #[test]
    fn indices_are_contiguous_from_zero() {
        let mut history = ExecutionHistory::new();
        history.push_outcome("a = 1", outcome(vec![]));
        history.push_outcome("b = 2", outcome(vec![]));
        history.push_outcome("c = 3", outcome(vec![]));

        let indices: Vec<u64> = history.records().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn figures_keep_emission_order_and_record_index() {
        let mut history = ExecutionHistory::new();
        history.push_outcome("plot_a", outcome(vec![figure(0), figure(1)]));
        history.push_outcome("plot_b", outcome(vec![figure(2)]));

        let sequences: Vec<u64> = history.figures().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        let owners: Vec<u64> = history.figures().map(|f| f.record_index).collect();
        assert_eq!(owners, vec![0, 0, 1]);
        assert_eq!(history.figure_count(), 3);
    }
}
