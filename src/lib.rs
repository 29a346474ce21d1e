//! hotpath - Frequent-Path Optimization Toolkit.
//!
//! hotpath operates on a typed, CFG-based SSA IR carrying branch-probability
//! and block-frequency metadata. It provides two independent subsystems:
//!
//! - **Trace formation** grows linear block sequences along likely execution
//!   paths, driven by a selectable prediction policy (`base`, `static`,
//!   `profile`, `hazardprofile`), and evaluates hazard counts and
//!   fall-through accuracy per trace.
//! - **FP-LICM** (`fplicm-correctness`, `fplicm-performance`) hoists loads
//!   and chains of almost-invariant computation whose invariance holds only
//!   along a loop's frequent path, with fix-up code on the infrequent paths.
//!
//! # Usage
//!
//! ```
//! use hotpath::ir::parse_module;
//! use hotpath::pass::{run_pass, Pass};
//!
//! let mut module = parse_module(
//!     "func @f(%c: i1) {\nentry:\n  condbr %c, ^a, ^b !prob 0.9, 0.1\na:\n  ret\nb:\n  ret\n}",
//! ).unwrap();
//! let result = run_pass(Pass::TraceProfile, &mut module);
//! for report in &result.reports {
//!     println!("{}", report);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - SSA IR, text parser/printer, structural verifier
//! - [`analysis`] - dominators, post-dominators, loops, branch probabilities
//! - [`trace`] - hazard classifier, predictor policies, grower, driver
//! - [`fplicm`] - frequent path, hoist candidates, SSA-preserving rewriter
//! - [`pass`] - string-identifier pass registry

pub mod analysis;
pub mod error;
pub mod fplicm;
pub mod ir;
pub mod pass;
pub mod trace;

pub use error::{HotpathError, HotpathResult};
pub use pass::{run_pass, Pass, PassResult};
