use std::collections::HashMap;

use crate::models::RiskFactors;

/// Defaults applied when a metric is absent from the snapshot. These are the
/// healthy-machine baselines, not the 0.0 used by feature extraction.
const DEFAULT_VIBRATION: f64 = 0.0;
const DEFAULT_OIL_LEVEL: f64 = 100.0;
const DEFAULT_TEMPERATURE: f64 = 25.0;
const DEFAULT_PRESSURE: f64 = 50.0;
const DEFAULT_RPM: f64 = 1500.0;

/// Compute per-metric risk contributions via fixed monotonic step functions.
/// Deterministic and stateless; runs on every scoring call regardless of
/// whether a trained classifier produces the headline risk.
pub fn calculate_risk_factors(metrics: &HashMap<String, f64>) -> RiskFactors {
    let get = |name: &str, default: f64| metrics.get(name).copied().unwrap_or(default);

    RiskFactors {
        vibration: vibration_risk(get("vibration", DEFAULT_VIBRATION)),
        oil_level: oil_level_risk(get("oil_level", DEFAULT_OIL_LEVEL)),
        temperature: temperature_risk(get("temperature", DEFAULT_TEMPERATURE)),
        pressure: pressure_risk(get("pressure", DEFAULT_PRESSURE)),
        rpm: rpm_risk(get("rpm", DEFAULT_RPM)),
    }
}

fn vibration_risk(value: f64) -> f64 {
    if value > 90.0 {
        1.0
    } else if value > 70.0 {
        0.7
    } else if value > 50.0 {
        0.4
    } else {
        0.1
    }
}

fn oil_level_risk(value: f64) -> f64 {
    if value < 10.0 {
        1.0
    } else if value < 25.0 {
        0.8
    } else if value < 50.0 {
        0.5
    } else {
        0.0
    }
}

fn temperature_risk(value: f64) -> f64 {
    if value > 100.0 {
        1.0
    } else if value > 80.0 {
        0.6
    } else if value > 60.0 {
        0.3
    } else {
        0.0
    }
}

fn pressure_risk(value: f64) -> f64 {
    if value > 150.0 || value < 20.0 {
        0.8
    } else if value > 120.0 || value < 30.0 {
        0.4
    } else {
        0.0
    }
}

fn rpm_risk(value: f64) -> f64 {
    if value > 3000.0 || value < 500.0 {
        0.6
    } else if value > 2500.0 || value < 800.0 {
        0.3
    } else {
        0.0
    }
}
