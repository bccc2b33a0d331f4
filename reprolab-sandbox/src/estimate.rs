//! Runtime estimation from script text
//!
//! Signals are naive substring counts and also match inside comments and
//! string literals.

use serde::{Deserialize, Serialize};

/// Estimate used when the design stage supplied none
pub const DEFAULT_BASE_MINUTES: f64 = 5.0;

/// Recommended timeouts allow twice the estimated runtime
pub const TIMEOUT_SAFETY_FACTOR: f64 = 2.0;

const VECTOR3_TOKEN: &str = "Vector3(";
const VECTOR3_MIN_OCCURRENCES: usize = 3;
const THREE_D_FACTOR: f64 = 10.0;

const LOOP_TOKEN: &str = "for ";
const SWEEP_TOKENS: &[&str] = &["range(", "linspace("];
const SWEEP_FACTOR: f64 = 5.0;

const NEAR2FAR_TOKEN: &str = "near2far";
const NEAR2FAR_FACTOR: f64 = 2.0;

pub const FEATURE_3D: &str = "3D simulation";
pub const FEATURE_SWEEP: &str = "parameter sweep";
pub const FEATURE_NEAR2FAR: &str = "near-to-far field transformation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeEstimate {
    pub estimated_minutes: f64,
    pub recommended_timeout_seconds: u64,
    pub features_detected: Vec<String>,
}

/// Estimate how long `code` will run.
///
/// Starts from `design_estimate_minutes` (or [`DEFAULT_BASE_MINUTES`]) and
/// multiplies in a fixed factor per detected signal.
pub fn estimate_runtime(code: &str, design_estimate_minutes: Option<f64>) -> RuntimeEstimate {
    let mut estimated_minutes = design_estimate_minutes.unwrap_or(DEFAULT_BASE_MINUTES);
    let mut features_detected = Vec::new();

    if code.matches(VECTOR3_TOKEN).count() >= VECTOR3_MIN_OCCURRENCES {
        estimated_minutes *= THREE_D_FACTOR;
        features_detected.push(FEATURE_3D.to_string());
    }

    if code.contains(LOOP_TOKEN) && SWEEP_TOKENS.iter().any(|token| code.contains(token)) {
        estimated_minutes *= SWEEP_FACTOR;
        features_detected.push(FEATURE_SWEEP.to_string());
    }

    if code.contains(NEAR2FAR_TOKEN) {
        estimated_minutes *= NEAR2FAR_FACTOR;
        features_detected.push(FEATURE_NEAR2FAR.to_string());
    }

    let recommended_timeout_seconds =
        (estimated_minutes * 60.0 * TIMEOUT_SAFETY_FACTOR).floor().max(0.0) as u64;

    RuntimeEstimate {
        estimated_minutes,
        recommended_timeout_seconds,
        features_detected,
    }
}
