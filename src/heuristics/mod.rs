//! Heuristics module for the trip planner.
//!
//! This module exports the first-solution strategies, the local search
//! operators and the metaheuristics built on top of them.

pub mod construction;
pub mod local_search;
pub mod metaheuristics;

pub use construction::*;
pub use local_search::*;
pub use metaheuristics::*;
