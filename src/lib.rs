pub mod calendar;
pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod record;
pub mod response;
pub mod stats;
pub mod store;
pub mod success;
pub mod trace;

pub use calendar::BusinessCalendar;
pub use collector::{Message, MessageCollector};
pub use config::MetricsConfig;
pub use engine::{MetricsEngine, ResponseTimeResult, SuccessRateResult};
pub use error::StoreError;
pub use identity::IdentityResolver;
pub use response::{ResponsePair, ResponsePairBuilder, ResponseTimeEstimator};
pub use success::{SuccessBreakdown, SuccessRateScorer};
pub use trace::DebugTrace;
