//! Statistics over latency samples (whole milliseconds).
//!
//! All functions are pure and accept empty or single-element input.

pub fn mean(samples: &[u64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64
}

/// Sample variance (divisor n - 1). Zero when there are fewer than two samples.
pub fn variance(samples: &[u64]) -> f64 {
    let n = samples.len();
    if n <= 1 {
        return 0.0;
    }
    let avg = mean(samples);
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let delta = s as f64 - avg;
            delta * delta
        })
        .sum();
    sum_sq / (n - 1) as f64
}

pub fn std_dev(samples: &[u64]) -> f64 {
    variance(samples).sqrt()
}

/// Drops zero readings, then keeps samples no more than one standard deviation above the mean.
///
/// Only spikes are removed; samples below the mean always survive. Order is preserved.
pub fn remove_upper_outliers(samples: &[u64]) -> Vec<u64> {
    let valid: Vec<u64> = samples.iter().copied().filter(|&s| s > 0).collect();
    let avg = mean(&valid);
    let sd = std_dev(&valid);

    valid
        .into_iter()
        .filter(|&s| s as f64 - avg <= sd)
        .collect()
}

pub fn min(samples: &[u64]) -> u64 {
    samples.iter().copied().min().unwrap_or(0)
}

pub fn max(samples: &[u64]) -> u64 {
    samples.iter().copied().max().unwrap_or(0)
}
