//! Reading quality classification
//!
//! Two levels of assessment:
//!
//! - [`assess_quality`]: per-reading grade against device thresholds, assigned
//!   before any reading reaches a handler
//! - [`assess_window`]: statistics over a window of recent scalar samples
//!   (SNR, stability, completeness, IQR outliers)
//!
//! # Per-reading rule
//!
//! | Condition (on `|value|`)                     | Grade     |
//! |----------------------------------------------|-----------|
//! | not finite                                   | INVALID   |
//! | `< min_value` or `> max_value`               | POOR      |
//! | `> excellent_threshold`                      | EXCELLENT |
//! | `> good_threshold`                           | GOOD      |
//! | otherwise                                    | FAIR      |
//!
//! The bounds check runs first: an out-of-range value is POOR even when it
//! clears `excellent_threshold`.

use crate::core::types::{DataQuality, QualityThresholds, RawValue};
use serde::Serialize;

/// Grade a single magnitude
pub fn classify(value: f64, thresholds: &QualityThresholds) -> DataQuality {
    if !value.is_finite() {
        return DataQuality::Invalid;
    }
    let magnitude = value.abs();
    if magnitude < thresholds.min_value || magnitude > thresholds.max_value {
        DataQuality::Poor
    } else if magnitude > thresholds.excellent_threshold {
        DataQuality::Excellent
    } else if magnitude > thresholds.good_threshold {
        DataQuality::Good
    } else {
        DataQuality::Fair
    }
}

/// Grade a reading value; sequences take their worst element
pub fn assess_quality(value: &RawValue, thresholds: &QualityThresholds) -> DataQuality {
    match value {
        RawValue::Scalar(v) => classify(*v, thresholds),
        RawValue::Sequence(vs) if vs.is_empty() => DataQuality::Invalid,
        RawValue::Sequence(vs) => vs
            .iter()
            .map(|v| classify(*v, thresholds))
            .fold(DataQuality::Excellent, DataQuality::worst),
    }
}

/// SNR assigned when the noise estimate is zero (dB)
const MAX_SNR_DB: f64 = 60.0;
/// SNR treated as full score (dB)
const FULL_SCORE_SNR_DB: f64 = 40.0;

/// Statistics over a window of samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowReport {
    pub overall_quality: DataQuality,
    pub signal_to_noise_ratio: f64,
    pub stability: f64,
    pub completeness: f64,
    pub outlier_percentage: f64,
    pub outlier_indices: Vec<usize>,
    pub sample_count: usize,
    pub recommendations: Vec<String>,
}

/// Assess a window of samples
///
/// Non-finite samples count against completeness and are excluded from
/// the other statistics.
pub fn assess_window(samples: &[f64]) -> WindowReport {
    let finite: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();

    let snr = signal_to_noise_db(&finite);
    let stability = stability(&finite);
    let completeness = if samples.is_empty() {
        0.0
    } else {
        finite.len() as f64 / samples.len() as f64
    };
    let outlier_indices = outliers(samples);
    let outlier_percentage = if samples.is_empty() {
        0.0
    } else {
        outlier_indices.len() as f64 / samples.len() as f64 * 100.0
    };

    let score = 0.4 * (snr / FULL_SCORE_SNR_DB).min(1.0) + 0.3 * stability + 0.3 * completeness;
    let overall_quality = if score >= 0.9 {
        DataQuality::Excellent
    } else if score >= 0.75 {
        DataQuality::Good
    } else if score >= 0.6 {
        DataQuality::Fair
    } else if score >= 0.4 {
        DataQuality::Poor
    } else {
        DataQuality::Invalid
    };

    let recommendations = recommendations(snr, stability, completeness, outlier_percentage);

    WindowReport {
        overall_quality,
        signal_to_noise_ratio: snr,
        stability,
        completeness,
        outlier_percentage,
        outlier_indices,
        sample_count: samples.len(),
        recommendations,
    }
}

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population variance
fn variance(data: &[f64]) -> f64 {
    let m = mean(data);
    data.iter().map(|v| (v - m).powi(2)).sum::<f64>() / data.len() as f64
}

fn signal_to_noise_db(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let signal_power = variance(data);

    // Noise from first differences once there is enough data
    let noise_power = if data.len() > 10 {
        let diffs: Vec<f64> = data.windows(2).map(|w| w[1] - w[0]).collect();
        variance(&diffs) / 2.0
    } else {
        signal_power * 0.1
    };

    let snr = if noise_power > 0.0 {
        10.0 * (signal_power / noise_power).log10()
    } else {
        MAX_SNR_DB
    };
    if snr.is_finite() { snr.max(0.0) } else { 0.0 }
}

fn stability(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let std = variance(data).sqrt();
    if m != 0.0 {
        1.0 / (1.0 + std / m.abs())
    } else if std < 1e-6 {
        1.0
    } else {
        0.0
    }
}

/// Percentile with linear interpolation between closest ranks
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Indices outside 1.5 x IQR of the finite samples
fn outliers(samples: &[f64]) -> Vec<usize> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.len() < 4 {
        return Vec::new();
    }
    sorted.sort_by(f64::total_cmp);

    let q1 = percentile(&sorted, 25.0);
    let q3 = percentile(&sorted, 75.0);
    let iqr = q3 - q1;
    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;

    samples
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite() && (**v < lower || **v > upper))
        .map(|(i, _)| i)
        .collect()
}

fn recommendations(snr: f64, stability: f64, completeness: f64, outlier_pct: f64) -> Vec<String> {
    let mut out = Vec::new();
    if snr < 20.0 {
        out.push("Low signal-to-noise ratio: check sensor contact and shielding".to_string());
    }
    if stability < 0.8 {
        out.push("Unstable signal: check sensor mounting and environmental interference".to_string());
    }
    if completeness < 0.9 {
        out.push("Incomplete data: check transport link and sampling configuration".to_string());
    }
    if outlier_pct > 5.0 {
        out.push("Frequent outliers: recalibrate sensor and check measurement setup".to_string());
    }
    if out.is_empty() {
        out.push("Signal quality nominal".to_string());
    }
    out
}
