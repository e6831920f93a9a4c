//! Render metrics.
//!
//! Every render collects a [`RenderMetrics`] value: how long each pass took,
//! how many markers it replaced, how often the pipeline recursed and how deep.
//! The CLI prints it with `--stats` (see `debug_report.rs`).
//!
//! ## Design notes
//!
//! - Pass durations are inclusive. A pass that recurses (conditions, each,
//!   partials, with) also counts the time spent in the passes run beneath it,
//!   so the per-pass rows do not add up to `total`.
//! - Counters accumulate over every pipeline invocation of the render,
//!   nested ones included.

use std::time::Duration;

/// The substitution passes, in the order the pipeline runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    Flatten,
    Comments,
    Conditions,
    Each,
    Partials,
    With,
    Eval,
    Helpers,
    Variables,
    Attributes,
}

impl Pass {
    pub const ALL: [Pass; 10] = [
        Pass::Flatten,
        Pass::Comments,
        Pass::Conditions,
        Pass::Each,
        Pass::Partials,
        Pass::With,
        Pass::Eval,
        Pass::Helpers,
        Pass::Variables,
        Pass::Attributes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pass::Flatten => "flatten",
            Pass::Comments => "comments",
            Pass::Conditions => "conditions",
            Pass::Each => "each",
            Pass::Partials => "partials",
            Pass::With => "with",
            Pass::Eval => "eval",
            Pass::Helpers => "helpers",
            Pass::Variables => "variables",
            Pass::Attributes => "attributes",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Accumulated timing for one pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassMetrics {
    /// Elapsed time, summed over every run.
    pub duration: Duration,
    /// Number of pipeline invocations that ran the pass (not skipped by the
    /// trigger scan).
    pub runs: usize,
    /// Markers or blocks replaced.
    pub replaced: usize,
}

#[derive(Debug, Default, Clone)]
pub struct RenderMetrics {
    /// Wall time of the whole render.
    pub total: Duration,
    passes: [PassMetrics; 10],
    /// Pipeline invocations, the top-level one included.
    pub invocations: usize,
    /// Deepest recursion reached (1 = no nesting).
    pub max_depth: usize,
    /// Partials expanded.
    pub partials: usize,
}

impl RenderMetrics {
    pub fn pass(&self, pass: Pass) -> &PassMetrics {
        &self.passes[pass.index()]
    }

    /// `(pass, metrics)` rows in pipeline order.
    pub fn passes(&self) -> impl Iterator<Item = (Pass, &PassMetrics)> + '_ {
        Pass::ALL.into_iter().map(|p| (p, self.pass(p)))
    }

    pub(crate) fn record(&mut self, pass: Pass, duration: Duration, replaced: usize) {
        let m = &mut self.passes[pass.index()];
        m.duration += duration;
        m.runs += 1;
        m.replaced += replaced;
    }

    /// Replacements across all passes.
    pub fn replaced(&self) -> usize {
        self.passes.iter().map(|m| m.replaced).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate_per_pass() {
        let mut m = RenderMetrics::default();
        m.record(Pass::Each, Duration::from_millis(2), 3);
        m.record(Pass::Each, Duration::from_millis(1), 1);
        m.record(Pass::Variables, Duration::from_millis(1), 5);
        assert_eq!(m.pass(Pass::Each).runs, 2);
        assert_eq!(m.pass(Pass::Each).replaced, 4);
        assert_eq!(m.pass(Pass::Each).duration, Duration::from_millis(3));
        assert_eq!(m.replaced(), 9);
        assert_eq!(m.passes().map(|(p, _)| p.name()).next(), Some("flatten"));
    }
}
