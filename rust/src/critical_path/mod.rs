//! Critical path method over a validated dependency graph.
//!
//! A forward pass in topological order yields early dates, a backward pass in
//! reverse order yields late dates; float and criticality follow from both.

mod calculation;
mod chain;
mod types;

pub use calculation::calculate_critical_path;
pub(crate) use calculation::activities_by_node;
pub use chain::extract_critical_chain;
pub use types::{ActivityTiming, CriticalPathResult};
