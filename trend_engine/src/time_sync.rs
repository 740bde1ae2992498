use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use crate::error::EngineResult;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerTimeResponse {
    server_time: i64,
}

/// Offset between local clock and Binance server time, for signed requests.
#[derive(Debug, Clone, Default)]
pub struct TimeSync {
    offset_ms: i64,
}

impl TimeSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sync with Binance server time (`GET /fapi/v1/time`).
    pub async fn sync(&mut self, client: &Client, base_url: &str) -> EngineResult<()> {
        let url = format!("{}/fapi/v1/time", base_url);

        let local_before = Utc::now().timestamp_millis();
        let response: ServerTimeResponse = client.get(&url).send().await?.json().await?;
        let local_after = Utc::now().timestamp_millis();

        self.offset_ms = estimate_offset(local_before, local_after, response.server_time);
        info!(offset_ms = self.offset_ms, "time sync");
        Ok(())
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    /// Server-synced timestamp in milliseconds.
    pub fn timestamp_ms(&self) -> i64 {
        Utc::now().timestamp_millis() + self.offset_ms
    }
}

/// server_time − local midpoint of the round trip.
fn estimate_offset(local_before: i64, local_after: i64, server_time: i64) -> i64 {
    let round_trip = local_after - local_before;
    server_time - (local_before + round_trip / 2)
}
