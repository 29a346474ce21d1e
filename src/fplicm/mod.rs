//! Frequent-path loop-invariant code motion (FP-LICM).
//!
//! Hoists loads (and, in the performance variant, chains of almost-invariant
//! consumers) whose invariance holds only along the loop's frequent path,
//! parking the hoisted value in a pre-header "home" slot and patching the
//! infrequent paths that invalidate it.
//!
//! Registered as `fplicm-correctness` and `fplicm-performance`. The passes
//! mutate the IR in place and report whether anything changed; failures are
//! local to a loop.

pub mod candidates;
pub mod freq_path;
pub mod rewrite;

pub use candidates::{find_candidates, HoistCandidate};
pub use freq_path::{discover, FrequentPath};

use crate::analysis::{FunctionAnalysis, LoopId};
use crate::error::RewriteAbort;
use crate::ir::{Function, Module};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Correctness,
    Performance,
}

pub struct FplicmPass {
    variant: Variant,
}

impl FplicmPass {
    pub fn new(variant: Variant) -> Self {
        FplicmPass { variant }
    }

    pub fn run_on_module(&self, module: &mut Module) -> bool {
        let mut changed = false;
        for func in &mut module.functions {
            changed |= self.run_on_function(func);
        }
        changed
    }

    /// Process every loop of the function, innermost first. The CFG shape
    /// is never modified, so one analysis serves all loops.
    pub fn run_on_function(&self, func: &mut Function) -> bool {
        let analysis = FunctionAnalysis::compute(func);
        let mut changed = false;
        for l in analysis.loops.by_depth_descending() {
            match self.run_on_loop(func, &analysis, l) {
                Ok(loop_changed) => changed |= loop_changed,
                Err(abort) => {
                    log::warn!(
                        "@{}: leaving loop at ^{} unchanged: {}",
                        func.name,
                        func.block(analysis.loops.loops[l].header).name,
                        abort
                    );
                }
            }
        }
        changed
    }

    fn run_on_loop(
        &self,
        func: &mut Function,
        analysis: &FunctionAnalysis,
        l: LoopId,
    ) -> Result<bool, RewriteAbort> {
        let lp = &analysis.loops.loops[l];
        if self.variant == Variant::Performance && !lp.is_innermost() {
            // Only innermost loops are optimized in the performance variant.
            return Ok(false);
        }
        let preheader = lp.preheader.ok_or(RewriteAbort::MissingPreheader)?;
        let path = freq_path::discover(func, lp).ok_or(RewriteAbort::NoFrequentPath)?;

        let with_chains = self.variant == Variant::Performance;
        let candidates = candidates::find_candidates(func, lp, &path, with_chains);
        if candidates.is_empty() {
            return Ok(false);
        }
        rewrite::validate(func, &candidates)?;

        match self.variant {
            Variant::Correctness => rewrite::rewrite_correctness(func, preheader, &candidates),
            Variant::Performance => rewrite::rewrite_performance(func, preheader, &candidates),
        }
        log::debug!(
            "@{}: hoisted {} candidate(s) out of loop at ^{}",
            func.name,
            candidates.len(),
            func.block(lp.header).name
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_module;
    use crate::ir::verify::verify_module;

    const HOISTABLE: &str = "
func @loop(%slot: ptr, %c: i1, %d: i1) {
entry:
  br ^header
header:
  condbr %c, ^freq, ^rare !prob 0.9, 0.1
freq:
  %x: i32 = load %slot
  br ^latch
rare:
  store 5:i32, %slot
  br ^latch
latch:
  condbr %d, ^header, ^exit !prob 0.95, 0.05
exit:
  ret
}
";

    #[test]
    fn correctness_pass_reports_change() {
        let mut module = parse_module(HOISTABLE).unwrap();
        let pass = FplicmPass::new(Variant::Correctness);
        assert!(pass.run_on_module(&mut module));
        verify_module(&module).unwrap();
    }

    #[test]
    fn empty_candidate_set_leaves_loop_unchanged() {
        let text = "
func @nothing(%slot: ptr, %c: i1) {
entry:
  br ^header
header:
  %x: i32 = load %slot
  condbr %c, ^header, ^exit !prob 0.9, 0.1
exit:
  ret
}
";
        let mut module = parse_module(text).unwrap();
        let before = module.to_string();
        let pass = FplicmPass::new(Variant::Correctness);
        assert!(!pass.run_on_module(&mut module));
        assert_eq!(module.to_string(), before);
    }

    #[test]
    fn no_frequent_path_leaves_loop_unchanged() {
        let text = "
func @flat(%slot: ptr, %c: i1, %d: i1) {
entry:
  br ^header
header:
  condbr %c, ^a, ^b !prob 0.5, 0.5
a:
  %x: i32 = load %slot
  br ^latch
b:
  store 5:i32, %slot
  br ^latch
latch:
  condbr %d, ^header, ^exit !prob 0.95, 0.05
exit:
  ret
}
";
        let mut module = parse_module(text).unwrap();
        let before = module.to_string();
        let pass = FplicmPass::new(Variant::Correctness);
        assert!(!pass.run_on_module(&mut module));
        assert_eq!(module.to_string(), before);
    }

    #[test]
    fn performance_pass_declines_non_innermost_loops() {
        // The outer loop carries the hoistable load; only the inner loop is
        // innermost, and it has nothing to hoist.
        let text = "
func @nest(%slot: ptr, %c: i1, %d: i1, %e: i1) {
entry:
  br ^outer
outer:
  condbr %c, ^freq, ^rare !prob 0.9, 0.1
freq:
  %x: i32 = load %slot
  br ^inner
rare:
  store 5:i32, %slot
  br ^inner
inner:
  condbr %d, ^inner, ^latch !prob 0.9, 0.1
latch:
  condbr %e, ^outer, ^exit !prob 0.95, 0.05
exit:
  ret
}
";
        let mut module = parse_module(text).unwrap();
        let before = module.to_string();
        let pass = FplicmPass::new(Variant::Performance);
        assert!(!pass.run_on_module(&mut module));
        assert_eq!(module.to_string(), before);
    }

    #[test]
    fn performance_pass_changes_innermost_loop() {
        let mut module = parse_module(HOISTABLE).unwrap();
        let pass = FplicmPass::new(Variant::Performance);
        assert!(pass.run_on_module(&mut module));
        verify_module(&module).unwrap();
    }
}
