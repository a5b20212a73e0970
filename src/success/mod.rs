pub mod aggregate;
pub mod scorer;
pub mod weights;

pub use aggregate::{CategoryAggregate, CategoryAggregator, CategoryStats, ServiceAggregate};
pub use scorer::{
    BaseScore, CategoryBreakdown, ServiceCounts, SubScores, SuccessBreakdown, SuccessOutcome,
    SuccessRateScorer,
};
pub use weights::{CancellationPolicy, SignalWeights};
