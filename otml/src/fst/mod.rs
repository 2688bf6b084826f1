//! The weighted finite-state transducer algebra: cost vectors, the
//! transducer data type, and the optimal-paths reduction that realizes OT's
//! ranking semantics over an automaton.

pub mod cost;
pub mod ops;
pub mod transducer;

pub use cost::CostVector;
pub use ops::optimal_paths;
pub use transducer::{Arc, StateId, Transducer};
