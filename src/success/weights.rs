use serde::{Deserialize, Serialize};

/// Weights of the seven sub-scores in the base score. They sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub rating: f64,
    pub repeat_clients: f64,
    pub cancellation: f64,
    pub completion: f64,
    pub responsiveness: f64,
    pub revenue: f64,
    pub disputes: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            rating: 0.35,
            repeat_clients: 0.20,
            cancellation: 0.15,
            completion: 0.10,
            responsiveness: 0.10,
            revenue: 0.05,
            disputes: 0.05,
        }
    }
}

impl SignalWeights {
    pub fn total(&self) -> f64 {
        self.rating
            + self.repeat_clients
            + self.cancellation
            + self.completion
            + self.responsiveness
            + self.revenue
            + self.disputes
    }
}

/// Which cancelled bookings count against a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancellationPolicy {
    /// Every cancellation, whoever initiated it.
    #[default]
    All,
    /// Only cancellations attributed to the professional. Cancellations with
    /// no recorded actor still count.
    Professional,
}

impl CancellationPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" | "any" | "blended" => Some(CancellationPolicy::All),
            "professional" | "pro" | "provider" => Some(CancellationPolicy::Professional),
            _ => None,
        }
    }

    pub fn counts(self, cancelled_by: Option<&str>) -> bool {
        match self {
            CancellationPolicy::All => true,
            CancellationPolicy::Professional => {
                let actor = cancelled_by.unwrap_or_default().trim().to_ascii_lowercase();
                actor.is_empty() || actor.contains("pro")
            }
        }
    }
}
