use std::cmp::Ordering;

pub const MINUTES_PER_DAY: f64 = 24.0 * 60.0;

/// Percentile over an ascending slice, interpolating linearly between the
/// two nearest order statistics.
pub fn percentile(sorted: &[f64], fraction: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        len => {
            let index = (len - 1) as f64 * fraction.clamp(0.0, 1.0);
            let lower = index.floor() as usize;
            let upper = index.ceil() as usize;
            if lower == upper {
                return Some(sorted[lower]);
            }
            let weight = index - lower as f64;
            Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
        }
    }
}

/// Sorted copy of the finite, non-negative entries.
pub fn sorted_non_negative(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values
        .iter()
        .copied()
        .filter(|value| value.is_finite() && *value >= 0.0)
        .collect();
    sorted.sort_by(cmp_f64);
    sorted
}

pub fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// `0.5^(age / half_life)`. Negative or non-finite ages count as fresh.
pub fn exponential_weight(age_days: f64, half_life_days: f64) -> f64 {
    if !age_days.is_finite() || age_days < 0.0 {
        return 1.0;
    }
    if !half_life_days.is_finite() || half_life_days <= 0.0 {
        return 1.0;
    }
    0.5_f64.powf(age_days / half_life_days)
}

/// Lower bound of the Wilson score interval for an observed ratio `p` over
/// `n` trials. Zero whenever there are no trials.
pub fn wilson_lower_bound(p: f64, n: f64, z: f64) -> f64 {
    if !p.is_finite() || !n.is_finite() || !z.is_finite() || n <= 0.0 {
        return 0.0;
    }
    let p = p.clamp(0.0, 1.0);
    if p == 0.0 {
        return 0.0;
    }
    let z_squared = z * z;
    let denominator = 1.0 + z_squared / n;
    let centre = p + z_squared / (2.0 * n);
    let margin = z * ((p * (1.0 - p) + z_squared / (4.0 * n)) / n).sqrt();
    let lower = (centre - margin) / denominator;
    if !lower.is_finite() {
        return 0.0;
    }
    clamp01(lower)
}

/// Recency-weighted mean of `(value, age_days)` observations. `None` when the
/// weights sum to zero or overflow.
pub fn weighted_mean<I>(observations: I, half_life_days: f64) -> Option<WeightedMean>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (value, age_days) in observations {
        let weight = 0.5_f64.powf(age_days / half_life_days);
        if !weight.is_finite() || weight <= 0.0 || !value.is_finite() {
            continue;
        }
        numerator += weight * value;
        denominator += weight;
    }
    if denominator <= 0.0 || !denominator.is_finite() {
        return None;
    }
    let value = numerator / denominator;
    value.is_finite().then_some(WeightedMean {
        value,
        numerator,
        denominator,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct WeightedMean {
    pub value: f64,
    pub numerator: f64,
    pub denominator: f64,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
