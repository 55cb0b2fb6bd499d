//! The job engine: a worker-pool executor plus hazard-aware job-graph
//! execution.
//!
//! The ECS scheduler is a pure client of this module. It posts individual
//! jobs ([`Executor::spawn`]), waits on their receipts
//! ([`Executor::complete`]), and submits whole frames of work as job graphs
//! ([`Executor::execute_graph`]) where every job carries the read/write masks
//! of the system it wraps. The graph executor - not the scheduler - decides
//! which jobs may physically overlap.

mod executor;
mod graph;

pub use executor::{Executor, JobError, JobFuture, Scope};
pub use graph::Job;
