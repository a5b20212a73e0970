pub mod estimator;
pub mod pairs;

pub use estimator::{Estimate, ResponseTimeEstimator, WeightedPair};
pub use pairs::{ResponsePair, ResponsePairBuilder};
