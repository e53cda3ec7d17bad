// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # optigraph
//!
//! A middle-end optimization pipeline for a method-level SSA instruction
//! graph, as used by ahead-of-time and just-in-time compilers for managed
//! runtimes. A front end builds one [`ir::Graph`] per method; `optigraph`
//! rewrites it in place and hands it to a code generator.
//!
//! ## Features
//!
//! - **Arena SSA graph** - typed instructions with bidirectional def-use lists,
//!   dominators and natural loops
//! - **Constant folding** - static evaluation with managed-runtime semantics,
//!   absorbing inputs and branch-implied values
//! - **Target fusion** - BIC / ORN / EON and vector multiply-accumulate on
//!   arm64, ANDN / BLSR / BLSMSK on x86, SHxADD on riscv64
//! - **Loop policy** - per-target peeling and unrolling decisions
//! - **Alias analysis** - heap locations, escape facts and array range overlap
//! - **GC barrier elision** - redundant write barriers dropped, adjacent read
//!   barriers merged
//!
//! ## Quick Start
//!
//! ```rust
//! use optigraph::prelude::*;
//!
//! let mut graph = Graph::new("answer");
//! let six = graph.int_constant(6)?;
//! let seven = graph.int_constant(7)?;
//! let entry = graph.entry_block();
//! let product = graph.append(entry, InstructionKind::Binary(BinaryOp::Mul), DataType::Int32, vec![six, seven])?;
//! graph.append(entry, InstructionKind::Return, DataType::Void, vec![product])?;
//! graph.set_exit_block(entry);
//! graph.rebuild_analyses()?;
//!
//! let target = TargetConfig::arm64();
//! let config = PipelineConfig::default();
//! let mut ctx = PassContext::new(target, config.clone());
//! let report = Pipeline::for_target(&target, &config).run(&mut graph, &mut ctx)?;
//!
//! assert!(report.changed());
//! assert_eq!(ctx.events.count_kind(EventKind::ConstantFolded), 1);
//! # Ok::<(), optigraph::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - the graph, its instructions and derived dominance and loop data
//! - [`analysis`] - loop statistics and policies, load/store alias analysis
//! - [`compiler`] - the pass trait, the passes, the pipeline and statistics
//! - [`target`] - instruction set, ISA features and collector configuration
//! - [`Error`] and [`Result`] - graph invariant and configuration errors
//!
//! ## Error Handling
//!
//! Passes never fail because an optimization does not apply; they report
//! "no change" instead. An [`Error`] means the graph is inconsistent and must
//! be discarded:
//!
//! ```rust
//! use optigraph::{ir::Graph, Error};
//!
//! let mut graph = Graph::new("stale");
//! let entry = graph.entry_block();
//! let next = graph.add_block();
//! graph.add_edge(entry, next)?;
//! assert_eq!(graph.check_analyses(), Err(Error::StaleAnalysis));
//! # Ok::<(), optigraph::Error>(())
//! ```
//!
//! ## Logging
//!
//! Diagnostics go through [`tracing`]: one span per method and pipeline run,
//! `debug` events per pass and for analyses that do not apply, `trace` events
//! per rewrite. Transformations are additionally counted in the
//! [`compiler::EventLog`].

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use optigraph::prelude::*;
///
/// let pipeline = Pipeline::from_names("constant_folding,licg")?;
/// assert_eq!(pipeline.len(), 2);
/// # Ok::<(), optigraph::Error>(())
/// ```
pub mod prelude;

pub mod analysis;
pub mod compiler;
pub mod ir;
pub mod target;
pub mod utils;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust
/// use optigraph::{ir::Graph, Result};
///
/// fn checked(graph: &Graph) -> Result<()> {
///     graph.check_analyses()?;
///     graph.verify()
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `optigraph` Error type
///
/// Raised for broken graph invariants and impossible pipeline
/// configurations.
pub use error::Error;
