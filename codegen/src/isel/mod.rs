//! Instruction selection.
//!
//! Per-block DAGs of target-neutral operations are built from the IR
//! ([`build`]), covered by minimum-cost target patterns and emitted as
//! machine IR ([`select`]). Targets describe their patterns with
//! [`pattern::Pattern`] tables.

pub mod build;
pub mod common;
pub mod dag;
pub mod pattern;
pub mod select;

pub use self::build::DagBuilder;
pub use self::dag::{Dag, Node, NodeData, NodeKind, NodePayload};
pub use self::pattern::{MatchArgs, Pattern, PatternTable};
pub use self::select::Isel;
