//! data.rs: Binance Futures kline client
//!
//! `GET /fapi/v1/klines?symbol=..&interval=..&limit=..` returns an array of
//! arrays: `[open_time, "open", "high", "low", "close", "volume", close_time, ...]`.
//! Prices and volumes arrive as strings.

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::exchange::MarketDataSource;
use crate::models::Candle;

/// Binance caps `limit` at 1500 for futures klines.
pub const MAX_KLINE_LIMIT: usize = 1500;

#[derive(Debug, Clone)]
pub struct BinanceDataClient {
    client:   Client,
    base_url: String,
}

impl BinanceDataClient {
    pub fn new(base_url: &str) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    pub async fn fetch_klines(&self, symbol: &str, interval: &str, limit: usize) -> EngineResult<Vec<Candle>> {
        let limit = limit.clamp(1, MAX_KLINE_LIMIT);
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if status != StatusCode::OK {
            return Err(EngineError::Exchange(format!(
                "klines HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let rows: Vec<Vec<Value>> = serde_json::from_str(&body)?;
        let candles = parse_klines(&rows);
        debug!(symbol, interval, rows = rows.len(), candles = candles.len(), "fetched klines");
        Ok(candles)
    }
}

impl MarketDataSource for BinanceDataClient {
    async fn get_recent_candles(&self, symbol: &str, interval: &str, limit: usize) -> EngineResult<Vec<Candle>> {
        self.fetch_klines(symbol, interval, limit).await
    }
}

/// Parse raw kline rows, dropping malformed ones, then sort by `open_time`
/// and drop duplicates so the result is strictly increasing.
pub fn parse_klines(rows: &[Vec<Value>]) -> Vec<Candle> {
    let mut candles: Vec<Candle> = rows
        .iter()
        .filter_map(|row| match parse_row(row) {
            Some(c) => Some(c),
            None => {
                warn!(?row, "skipping malformed kline");
                None
            }
        })
        .collect();
    candles.sort_by_key(|c| c.open_time);
    candles.dedup_by_key(|c| c.open_time);
    candles
}

fn parse_row(row: &[Value]) -> Option<Candle> {
    let num = |i: usize| -> Option<f64> {
        match row.get(i)? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    };
    let candle = Candle {
        open_time: row.first()?.as_i64()?,
        open:      num(1)?,
        high:      num(2)?,
        low:       num(3)?,
        close:     num(4)?,
        volume:    num(5)?,
    };
    let valid = candle.open_time > 0
        && candle.close > 0.0
        && candle.volume >= 0.0
        && [candle.open, candle.high, candle.low, candle.close, candle.volume]
            .iter()
            .all(|v| v.is_finite());
    valid.then_some(candle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(t: i64, close: &str) -> Vec<Value> {
        json!([t, "100.0", "101.5", "99.0", close, "12.5", t + 59_999, "1250.0", 10])
            .as_array()
            .cloned()
            .unwrap()
    }

    #[test]
    fn parses_binance_rows() {
        let candles = parse_klines(&[row(1_000, "100.5")]);
        assert_eq!(candles.len(), 1);
        let c = candles[0];
        assert_eq!(c.open_time, 1_000);
        assert_eq!(c.high, 101.5);
        assert_eq!(c.close, 100.5);
        assert_eq!(c.volume, 12.5);
    }

    #[test]
    fn drops_malformed_and_non_positive_rows() {
        let rows = vec![
            row(1_000, "100.5"),
            row(2_000, "0"),
            row(3_000, "abc"),
            vec![json!(4_000)],
        ];
        let candles = parse_klines(&rows);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open_time, 1_000);
    }

    #[test]
    fn output_is_strictly_increasing() {
        let rows = vec![row(3_000, "3"), row(1_000, "1"), row(2_000, "2"), row(2_000, "2")];
        let times: Vec<i64> = parse_klines(&rows).iter().map(|c| c.open_time).collect();
        assert_eq!(times, vec![1_000, 2_000, 3_000]);
    }
}
