//! Pass registration.
//!
//! Every pass has a unique string identifier the driver selects by. The
//! trace-formation family is read-only and yields per-function reports; the
//! FP-LICM family mutates the module and reports whether anything changed.

use crate::fplicm::{FplicmPass, Variant};
use crate::ir::Module;
use crate::trace::{
    run_trace_formation, BasePolicy, HazardProfilePolicy, ProfilePolicy, StaticPolicy,
    TraceReport,
};

pub const BASE: &str = "base";
pub const STATIC: &str = "static";
pub const PROFILE: &str = "profile";
pub const HAZARD_PROFILE: &str = "hazardprofile";
pub const FPLICM_CORRECTNESS: &str = "fplicm-correctness";
pub const FPLICM_PERFORMANCE: &str = "fplicm-performance";

/// All registered pass identifiers, in registration order.
pub const REGISTERED: [&str; 6] = [
    BASE,
    STATIC,
    PROFILE,
    HAZARD_PROFILE,
    FPLICM_CORRECTNESS,
    FPLICM_PERFORMANCE,
];

/// A registered pass, resolved from its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    TraceBase,
    TraceStatic,
    TraceProfile,
    TraceHazardProfile,
    FplicmCorrectness,
    FplicmPerformance,
}

impl Pass {
    pub fn lookup(name: &str) -> Option<Pass> {
        Some(match name {
            BASE => Pass::TraceBase,
            STATIC => Pass::TraceStatic,
            PROFILE => Pass::TraceProfile,
            HAZARD_PROFILE => Pass::TraceHazardProfile,
            FPLICM_CORRECTNESS => Pass::FplicmCorrectness,
            FPLICM_PERFORMANCE => Pass::FplicmPerformance,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Pass::TraceBase => BASE,
            Pass::TraceStatic => STATIC,
            Pass::TraceProfile => PROFILE,
            Pass::TraceHazardProfile => HAZARD_PROFILE,
            Pass::FplicmCorrectness => FPLICM_CORRECTNESS,
            Pass::FplicmPerformance => FPLICM_PERFORMANCE,
        }
    }
}

/// What running a pass produced.
pub struct PassResult {
    /// Whether the IR was modified (always false for trace passes).
    pub changed: bool,
    /// Per-function trace reports (empty for FP-LICM passes).
    pub reports: Vec<TraceReport>,
}

/// Run `pass` over the whole module.
pub fn run_pass(pass: Pass, module: &mut Module) -> PassResult {
    match pass {
        Pass::TraceBase => trace_all(module, &mut BasePolicy),
        Pass::TraceStatic => trace_all(module, &mut StaticPolicy::default()),
        Pass::TraceProfile => trace_all(module, &mut ProfilePolicy::default()),
        Pass::TraceHazardProfile => trace_all(module, &mut HazardProfilePolicy::default()),
        Pass::FplicmCorrectness => PassResult {
            changed: FplicmPass::new(Variant::Correctness).run_on_module(module),
            reports: Vec::new(),
        },
        Pass::FplicmPerformance => PassResult {
            changed: FplicmPass::new(Variant::Performance).run_on_module(module),
            reports: Vec::new(),
        },
    }
}

fn trace_all<P: crate::trace::Predictor>(module: &Module, policy: &mut P) -> PassResult {
    let reports = module
        .functions
        .iter()
        .map(|func| run_trace_formation(policy, func))
        .collect();
    PassResult {
        changed: false,
        reports,
    }
}
