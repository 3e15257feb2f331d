use serde::{Deserialize, Serialize};

/// Latest air-side reading reported by the device. Superseded wholesale by the
/// next ingest, never merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimateReading {
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Latest soil-side reading. Moisture is a percentage on the 0-100 scale; the
/// 0.0-1.0 scale some sensors report is not accepted or converted anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilReading {
    pub moisture: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// One history entry: the full station snapshot taken when a moisture-bearing
/// ingest arrived. Climate fields are zero when no climate reading exists yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub temperature: f64,
    pub humidity: f64,
    pub moisture: f64,
    pub pump_active: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpSource {
    Manual,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PumpState {
    pub active: bool,
    pub source: PumpSource,
    pub last_changed: chrono::DateTime<chrono::Utc>,
}

impl PumpState {
    /// Initial state after process start: pump off, owned by the auto rule.
    pub fn initial() -> Self {
        PumpState {
            active: false,
            source: PumpSource::Auto,
            last_changed: chrono::Utc::now(),
        }
    }

    /// Leveled command string for the device pull channel.
    pub fn command(&self) -> &'static str {
        if self.active {
            "ON"
        } else {
            "OFF"
        }
    }
}

/// Everything the status endpoint returns. Climate and soil stay `null` until
/// the first ingest; the endpoint itself always answers 200.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub climate: Option<ClimateReading>,
    pub soil: Option<SoilReading>,
    pub pump_status: PumpState,
    pub history: Vec<SensorReading>,
}

/// The threshold rule: the pump should run when moisture drops below the
/// threshold. Exclusive boundary, purely reactive, no hysteresis.
pub fn pump_demand(moisture: f64, threshold: f64) -> bool {
    moisture < threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_boundary_is_exclusive() {
        assert!(pump_demand(39.0, 40.0));
        assert!(!pump_demand(40.0, 40.0));
        assert!(!pump_demand(41.0, 40.0));
    }

    #[test]
    fn threshold_is_configurable() {
        assert!(pump_demand(59.9, 60.0));
        assert!(!pump_demand(60.0, 60.0));
    }

    #[test]
    fn pump_command_is_leveled() {
        let mut pump = PumpState::initial();
        assert_eq!(pump.command(), "OFF");
        pump.active = true;
        assert_eq!(pump.command(), "ON");
    }

    #[test]
    fn pump_source_serializes_lowercase() {
        let value = serde_json::to_value(PumpSource::Manual).unwrap();
        assert_eq!(value, serde_json::json!("manual"));
        let value = serde_json::to_value(PumpSource::Auto).unwrap();
        assert_eq!(value, serde_json::json!("auto"));
    }
}
