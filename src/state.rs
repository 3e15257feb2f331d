use std::collections;
use std::sync;
use std::time;

use slog::{debug, info};

use crate::model;

/// All process-wide station state, explicitly owned and handed to handlers
/// behind an `Arc` so tests can spin up isolated instances. Nothing here is
/// durable; dropping the `Station` (or restarting the process) loses it all.
pub struct Station {
    log: slog::Logger,
    threshold: f64,
    history_capacity: usize,
    started: time::Instant,
    inner: sync::Mutex<Inner>,
}

struct Inner {
    climate: Option<model::ClimateReading>,
    soil: Option<model::SoilReading>,
    pump: model::PumpState,
    history: collections::VecDeque<model::SensorReading>,
}

impl Station {
    pub fn new(log: slog::Logger, threshold: f64, history_capacity: usize) -> Self {
        Station {
            log,
            threshold,
            history_capacity,
            started: time::Instant::now(),
            inner: sync::Mutex::new(Inner {
                climate: None,
                soil: None,
                pump: model::PumpState::initial(),
                history: collections::VecDeque::with_capacity(history_capacity),
            }),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Replaces the current climate reading. Climate alone carries no moisture,
    /// so the pump and the history are left untouched.
    pub fn record_climate(&self, temperature: f64, humidity: f64) -> model::ClimateReading {
        let reading = model::ClimateReading {
            temperature,
            humidity,
            timestamp: chrono::Utc::now(),
        };
        let mut inner = self.lock();
        inner.climate = Some(reading.clone());
        debug!(self.log, "climate reading stored";
               "temperature" => temperature, "humidity" => humidity);
        reading
    }

    /// Replaces the current soil reading, re-derives the pump from the
    /// threshold rule and appends a snapshot to the history.
    pub fn record_soil(&self, moisture: f64) -> (model::SoilReading, model::PumpState) {
        let now = chrono::Utc::now();
        let reading = model::SoilReading {
            moisture,
            timestamp: now,
        };
        let mut inner = self.lock();
        inner.soil = Some(reading.clone());
        let pump = self.apply_threshold(&mut inner, moisture, now);
        self.push_history(&mut inner, now);
        (reading, pump)
    }

    /// Combined device ingest: replaces climate and soil together, then runs
    /// the same pump recompute and history append as a soil ingest.
    pub fn record_sensors(
        &self,
        temperature: f64,
        humidity: f64,
        moisture: f64,
    ) -> model::SensorReading {
        let now = chrono::Utc::now();
        let mut inner = self.lock();
        inner.climate = Some(model::ClimateReading {
            temperature,
            humidity,
            timestamp: now,
        });
        inner.soil = Some(model::SoilReading {
            moisture,
            timestamp: now,
        });
        let pump = self.apply_threshold(&mut inner, moisture, now);
        self.push_history(&mut inner, now);
        model::SensorReading {
            temperature,
            humidity,
            moisture,
            pump_active: pump.active,
            timestamp: now,
        }
    }

    /// Manual pump command. Holds until the next moisture-bearing ingest hands
    /// control back to the threshold rule.
    pub fn set_pump_manual(&self, active: bool) -> model::PumpState {
        let mut inner = self.lock();
        if inner.pump.active != active || inner.pump.source != model::PumpSource::Manual {
            inner.pump = model::PumpState {
                active,
                source: model::PumpSource::Manual,
                last_changed: chrono::Utc::now(),
            };
            info!(self.log, "pump switched manually"; "active" => active);
        }
        inner.pump.clone()
    }

    pub fn pump(&self) -> model::PumpState {
        self.lock().pump.clone()
    }

    pub fn snapshot(&self) -> model::StatusSnapshot {
        let inner = self.lock();
        model::StatusSnapshot {
            climate: inner.climate.clone(),
            soil: inner.soil.clone(),
            pump_status: inner.pump.clone(),
            history: inner.history.iter().cloned().collect(),
        }
    }

    fn apply_threshold(
        &self,
        inner: &mut Inner,
        moisture: f64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> model::PumpState {
        let demand = model::pump_demand(moisture, self.threshold);
        if inner.pump.active != demand || inner.pump.source != model::PumpSource::Auto {
            info!(self.log, "pump recomputed from threshold";
                  "moisture" => moisture, "threshold" => self.threshold, "active" => demand);
            inner.pump = model::PumpState {
                active: demand,
                source: model::PumpSource::Auto,
                last_changed: now,
            };
        }
        inner.pump.clone()
    }

    fn push_history(&self, inner: &mut Inner, now: chrono::DateTime<chrono::Utc>) {
        let entry = model::SensorReading {
            temperature: inner.climate.as_ref().map_or(0.0, |c| c.temperature),
            humidity: inner.climate.as_ref().map_or(0.0, |c| c.humidity),
            moisture: inner.soil.as_ref().map_or(0.0, |s| s.moisture),
            pump_active: inner.pump.active,
            timestamp: now,
        };
        inner.history.push_back(entry);
        while inner.history.len() > self.history_capacity {
            inner.history.pop_front();
        }
    }

    fn lock(&self) -> sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock poisons it; the state is still
        // internally consistent, so keep serving rather than wedging.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use slog::o;

    use super::*;
    use crate::model::PumpSource;

    fn station() -> Station {
        Station::new(slog::Logger::root(slog::Discard, o!()), 40.0, 24)
    }

    #[test]
    fn fresh_station_has_empty_readings_and_pump_off() {
        let station = station();
        let snapshot = station.snapshot();
        assert!(snapshot.climate.is_none());
        assert!(snapshot.soil.is_none());
        assert!(!snapshot.pump_status.active);
        assert_eq!(snapshot.pump_status.source, PumpSource::Auto);
        assert!(snapshot.history.is_empty());
    }

    #[test]
    fn soil_ingest_drives_pump_through_threshold() {
        let station = station();
        let (_, pump) = station.record_soil(39.0);
        assert!(pump.active);
        let (_, pump) = station.record_soil(40.0);
        assert!(!pump.active);
    }

    #[test]
    fn soil_ingest_replaces_previous_reading() {
        let station = station();
        station.record_soil(80.0);
        station.record_soil(25.0);
        let snapshot = station.snapshot();
        assert_eq!(snapshot.soil.map(|s| s.moisture), Some(25.0));
        assert!(snapshot.pump_status.active);
    }

    #[test]
    fn climate_ingest_leaves_pump_and_history_alone() {
        let station = station();
        station.record_climate(21.5, 60.0);
        let snapshot = station.snapshot();
        assert_eq!(snapshot.climate.map(|c| c.temperature), Some(21.5));
        assert!(snapshot.soil.is_none());
        assert!(snapshot.history.is_empty());
    }

    #[test]
    fn history_is_capped_and_evicts_oldest_first() {
        let station = station();
        for i in 0..25 {
            station.record_sensors(20.0, 50.0, f64::from(i));
        }
        let snapshot = station.snapshot();
        assert_eq!(snapshot.history.len(), 24);
        // After 25 ingests the oldest retained entry is the 2nd one posted.
        assert_eq!(snapshot.history[0].moisture, 1.0);
        assert_eq!(snapshot.history[23].moisture, 24.0);
    }

    #[test]
    fn manual_command_holds_until_next_ingest() {
        let station = station();
        let pump = station.set_pump_manual(true);
        assert!(pump.active);
        assert_eq!(pump.source, PumpSource::Manual);

        // Next moisture ingest hands the pump back to the auto rule.
        let (_, pump) = station.record_soil(80.0);
        assert!(!pump.active);
        assert_eq!(pump.source, PumpSource::Auto);
    }

    #[test]
    fn last_changed_only_moves_on_actual_change() {
        let station = station();
        let (_, first) = station.record_soil(10.0);
        let (_, second) = station.record_soil(12.0);
        // Still on, still auto: the change timestamp must not move.
        assert_eq!(first.last_changed, second.last_changed);
    }

    #[test]
    fn history_entry_carries_climate_when_present() {
        let station = station();
        station.record_climate(30.0, 45.0);
        station.record_soil(55.0);
        let snapshot = station.snapshot();
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].temperature, 30.0);
        assert_eq!(snapshot.history[0].humidity, 45.0);
        assert_eq!(snapshot.history[0].moisture, 55.0);
        assert!(!snapshot.history[0].pump_active);
    }
}
