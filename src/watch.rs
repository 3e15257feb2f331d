use std::time;

use rand::Rng;
use slog::{info, warn};

use crate::config;
use crate::model;

/// Fixed-interval status poller, the terminal stand-in for the browser
/// dashboard. No backoff: a failed tick logs a warning, re-renders the cached
/// snapshot if one exists, and simply tries again next tick. If no real data
/// ever arrives within the grace period, fabricated mock values are shown.
pub async fn run(log: slog::Logger, config: &config::WatchConfig) -> Result<(), failure::Error> {
    let client = reqwest::Client::builder()
        .timeout(time::Duration::from_secs(config.timeout_secs))
        .build()?;
    let url = format!("{}/api/status", config.url.trim_end_matches('/'));
    let mock_after = time::Duration::from_secs(config.mock_after_secs);

    info!(log, "watching station"; "url" => &url, "interval_secs" => config.interval_secs);

    let started = time::Instant::now();
    let mut ticker = tokio::time::interval(time::Duration::from_secs(config.interval_secs));
    let mut last: Option<model::StatusSnapshot> = None;

    loop {
        ticker.tick().await;
        match fetch_status(&client, &url).await {
            Ok(snapshot) => {
                render(&log, &snapshot, "live");
                last = Some(snapshot);
            }
            Err(e) => {
                warn!(log, "status fetch failed"; "url" => &url, "error" => %e);
                if let Some(snapshot) = &last {
                    render(&log, snapshot, "cached");
                } else if started.elapsed() >= mock_after {
                    render(&log, &mock_snapshot(), "mock");
                }
            }
        }
    }
}

async fn fetch_status(
    client: &reqwest::Client,
    url: &str,
) -> Result<model::StatusSnapshot, failure::Error> {
    let snapshot = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<model::StatusSnapshot>()
        .await?;
    Ok(snapshot)
}

fn render(log: &slog::Logger, snapshot: &model::StatusSnapshot, origin: &'static str) {
    info!(log, "station status";
          "origin" => origin,
          "temperature" => snapshot.climate.as_ref().map(|c| c.temperature),
          "humidity" => snapshot.climate.as_ref().map(|c| c.humidity),
          "moisture" => snapshot.soil.as_ref().map(|s| s.moisture),
          "pump" => snapshot.pump_status.active,
          "pump_source" => ?snapshot.pump_status.source,
          "history_len" => snapshot.history.len());
}

/// Plausible baselines with a little jitter, the same trick the original
/// dashboard plays when the backend never answers.
fn mock_snapshot() -> model::StatusSnapshot {
    let mut rng = rand::thread_rng();
    let now = chrono::Utc::now();
    let temperature = 26.0 + rng.gen_range(-1.0..1.0);
    let humidity = 65.0 + rng.gen_range(-3.0..3.0);
    let moisture = 45.0 + rng.gen_range(-5.0..5.0);
    let active = model::pump_demand(moisture, 40.0);
    model::StatusSnapshot {
        climate: Some(model::ClimateReading {
            temperature,
            humidity,
            timestamp: now,
        }),
        soil: Some(model::SoilReading {
            moisture,
            timestamp: now,
        }),
        pump_status: model::PumpState {
            active,
            source: model::PumpSource::Auto,
            last_changed: now,
        },
        history: Vec::new(),
    }
}
