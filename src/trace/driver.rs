//! Trace-formation driver: seed enumeration and trace evaluation.
//!
//! Seeds follow the loop structure first — loops in descending-depth order,
//! and within each loop its member blocks that are not in a deeper sub-loop
//! — then any remaining function blocks in layout order. Every seed that is
//! not already part of a trace grows one.
//!
//! The driver is read-only: it never mutates the IR. Its product is a
//! [`TraceReport`] whose `Display` impl prints the per-trace lines and the
//! aggregate hazard/fall-through summary.

use std::fmt;

use crate::analysis::{edge_probability, profile_count, FunctionAnalysis};
use crate::ir::Function;

use super::grower::TraceGrower;
use super::hazard::contains_hazard;
use super::policy::{Predictor, PredictorCtx};
use super::Trace;

/// Evaluation of a single trace.
#[derive(Debug)]
pub struct TraceStats {
    pub head_name: String,
    pub trace: Trace,
    /// Hazardous blocks inside the trace.
    pub hazards: usize,
    /// Head's profile count; absent when frequency data is unavailable.
    pub in_count: Option<u64>,
    /// In-count successively scaled by the probability of each edge onto
    /// the next trace block.
    pub out_count: f64,
}

/// Per-function result of a trace-formation pass.
#[derive(Debug)]
pub struct TraceReport {
    pub function: String,
    pub traces: Vec<TraceStats>,
    pub total_hazards: usize,
    /// Σ out-count / Σ in-count over traces longer than one block.
    pub average_fall_through: Option<f64>,
}

impl fmt::Display for TraceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "@{}: {} traces", self.function, self.traces.len())?;
        for stats in &self.traces {
            write!(
                f,
                "  trace ^{} len={} hazards={}",
                stats.head_name,
                stats.trace.len(),
                stats.hazards
            )?;
            match stats.in_count {
                Some(in_count) => {
                    writeln!(f, " in={} out={:.3}", in_count, stats.out_count)?
                }
                None => writeln!(f, " in=0")?,
            }
        }
        write!(f, "  total hazards: {}", self.total_hazards)?;
        match self.average_fall_through {
            Some(avg) => write!(f, ", average fall-through: {:.3}", avg),
            None => write!(f, ", average fall-through: n/a"),
        }
    }
}

/// Run trace formation over one function with the given policy.
pub fn run_trace_formation<P: Predictor>(policy: &mut P, func: &Function) -> TraceReport {
    let analysis = FunctionAnalysis::compute(func);
    let cx = PredictorCtx {
        func,
        analysis: &analysis,
    };
    policy.prepare(&cx);

    let mut grower = TraceGrower::new();
    let mut traces: Vec<Trace> = Vec::new();

    // Loop seeds, deepest loops first; skip blocks owned by a sub-loop.
    for l in analysis.loops.by_depth_descending() {
        let lp = &analysis.loops.loops[l];
        log::trace!(
            "@{}: seeding loop at ^{} (depth {})",
            func.name,
            func.block(lp.header).name,
            lp.depth
        );
        for &block in &lp.blocks {
            if !analysis.loops.in_sub_loop(block, l) && !grower.is_visited(block) {
                traces.push(grower.grow(&cx, policy, block));
            }
        }
    }

    // Remaining function blocks in layout order.
    for block in func.blocks() {
        if !grower.is_visited(block) {
            traces.push(grower.grow(&cx, policy, block));
        }
    }

    evaluate(func, traces)
}

fn evaluate(func: &Function, traces: Vec<Trace>) -> TraceReport {
    let mut stats = Vec::with_capacity(traces.len());
    let mut total_hazards = 0usize;
    let mut sum_in = 0f64;
    let mut sum_out = 0f64;

    for trace in traces {
        let hazards = trace
            .blocks
            .iter()
            .filter(|&&b| contains_hazard(func, b))
            .count();
        total_hazards += hazards;

        let in_count = profile_count(func, trace.head());
        let mut out_count = in_count.unwrap_or(0) as f64;
        for pair in trace.blocks.windows(2) {
            out_count *= edge_probability(func, pair[0], pair[1]).as_f64();
        }
        // Traces with no profile data are skipped in the aggregate, as are
        // single-block traces.
        if trace.len() > 1 {
            if let Some(in_count) = in_count {
                sum_in += in_count as f64;
                sum_out += out_count;
            }
        }

        stats.push(TraceStats {
            head_name: func.block(trace.head()).name.clone(),
            trace,
            hazards,
            in_count,
            out_count,
        });
    }

    TraceReport {
        function: func.name.clone(),
        traces: stats,
        total_hazards,
        average_fall_through: (sum_in > 0.0).then(|| sum_out / sum_in),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_module;
    use crate::trace::policy::{BasePolicy, ProfilePolicy};

    #[test]
    fn statistics_multiply_edge_probabilities() {
        // Head count 100 through two 0.9 edges gives out ~81
        // and fall-through ~0.810.
        let module = parse_module(
            "
func @counted(%c: i1) {
a: !count 100
  condbr %c, ^b, ^out !prob 0.9, 0.1
b:
  condbr %c, ^d, ^out !prob 0.9, 0.1
d:
  br ^out
out:
  ret
}
",
        )
        .unwrap();
        let f = &module.functions[0];
        let mut policy = ProfilePolicy::default();
        let report = run_trace_formation(&mut policy, f);

        let first = &report.traces[0];
        assert_eq!(first.head_name, "a");
        // a -> b -> d -> out; the final edge has probability 1.0.
        assert_eq!(first.trace.len(), 4);
        assert!((first.out_count - 81.0).abs() < 0.01);
        let avg = report.average_fall_through.unwrap();
        assert!((avg - 0.81).abs() < 0.001);
    }

    #[test]
    fn every_block_lands_in_exactly_one_trace() {
        let module = parse_module(
            "
func @cover(%c: i1) {
entry:
  br ^header
header:
  condbr %c, ^body, ^exit !prob 0.9, 0.1
body:
  br ^header
exit:
  ret
}
",
        )
        .unwrap();
        let f = &module.functions[0];
        let mut policy = ProfilePolicy::default();
        let report = run_trace_formation(&mut policy, f);
        let mut seen = std::collections::HashSet::new();
        for stats in &report.traces {
            for &b in &stats.trace.blocks {
                assert!(seen.insert(b), "block in two traces");
            }
        }
        assert_eq!(seen.len(), f.num_blocks());
    }

    #[test]
    fn loop_blocks_seed_before_function_blocks() {
        // The header seeds first even though entry precedes it in layout.
        let module = parse_module(
            "
func @seed(%c: i1) {
entry:
  br ^header
header:
  condbr %c, ^body, ^exit !prob 0.9, 0.1
body:
  br ^header
exit:
  ret
}
",
        )
        .unwrap();
        let f = &module.functions[0];
        let mut policy = BasePolicy;
        let report = run_trace_formation(&mut policy, f);
        assert_eq!(report.traces[0].head_name, "header");
    }

    #[test]
    fn trace_set_is_deterministic() {
        let module = parse_module(
            "
func @det(%c: i1) {
entry:
  br ^header
header:
  condbr %c, ^body, ^exit !prob 0.9, 0.1
body:
  br ^header
exit:
  ret
}
",
        )
        .unwrap();
        let f = &module.functions[0];
        let first = run_trace_formation(&mut ProfilePolicy::default(), f).to_string();
        let second = run_trace_formation(&mut ProfilePolicy::default(), f).to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn report_formats_three_decimal_fall_through() {
        let module = parse_module(
            "
func @fmt(%c: i1) {
a: !count 10
  condbr %c, ^b, ^c !prob 0.9, 0.1
b:
  ret
c:
  ret
}
",
        )
        .unwrap();
        let f = &module.functions[0];
        let mut policy = ProfilePolicy::default();
        let report = run_trace_formation(&mut policy, f);
        let text = report.to_string();
        assert!(text.contains("average fall-through: 0.900"), "{}", text);
    }
}
