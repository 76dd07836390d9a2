//! One-shot REST helpers.

use crate::error::{StreamError, StreamResult};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

/// Map an interval length to the exchange's kline interval tag.
fn interval_tag(interval_sec: u32) -> String {
    match interval_sec {
        60 => "1m".to_string(),
        900 => "15m".to_string(),
        3600 => "1h".to_string(),
        14_400 => "4h".to_string(),
        86_400 => "1d".to_string(),
        other => format!("{}m", other / 60),
    }
}

/// Fetch the current interval's open price for each symbol.
///
/// Returns `{symbol -> (open_price, interval_start_ms)}`. A symbol that
/// fails to fetch is skipped with a warning; the tracker bootstraps its
/// candle from the first trade instead.
pub async fn fetch_interval_opens(
    client: &reqwest::Client,
    base_url: &str,
    symbols: &[String],
    interval_sec: u32,
) -> StreamResult<HashMap<String, (f64, i64)>> {
    let tag = interval_tag(interval_sec);
    let mut opens = HashMap::new();

    for symbol in symbols {
        let url = format!(
            "{base_url}/api/v3/klines?symbol={symbol}&interval={tag}&limit=1"
        );
        match fetch_one(client, &url).await {
            Ok((open, start_ms)) => {
                info!(symbol = %symbol, open, start_ms, "candle open fetched");
                opens.insert(symbol.clone(), (open, start_ms));
            }
            Err(e) => {
                warn!(?e, symbol = %symbol, "candle open fetch failed");
            }
        }
    }

    Ok(opens)
}

async fn fetch_one(client: &reqwest::Client, url: &str) -> StreamResult<(f64, i64)> {
    let response: Value = client
        .get(url)
        .timeout(Duration::from_secs(10))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    parse_kline_open(&response)
}

/// Extract `(open, open_time_ms)` from a kline response:
/// `[[openTime, "open", "high", "low", "close", ...]]`.
pub fn parse_kline_open(response: &Value) -> StreamResult<(f64, i64)> {
    let kline = response
        .as_array()
        .and_then(|rows| rows.first())
        .and_then(Value::as_array)
        .ok_or_else(|| StreamError::Malformed("kline response is not a row array".to_string()))?;

    let start_ms = kline
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| StreamError::Malformed("kline open time missing".to_string()))?;
    let open: f64 = kline
        .get(1)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StreamError::Malformed("kline open price missing".to_string()))?;

    Ok((open, start_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_kline_open() {
        let response = json!([[
            1_706_000_000_000_i64,
            "42150.50",
            "42300.00",
            "42100.00",
            "42250.00",
            "1234.5",
            1_706_003_599_999_i64
        ]]);
        let (open, start_ms) = parse_kline_open(&response).unwrap();
        assert_eq!(open, 42_150.50);
        assert_eq!(start_ms, 1_706_000_000_000);
    }

    #[test]
    fn test_parse_kline_rejects_bad_shapes() {
        assert!(parse_kline_open(&json!([])).is_err());
        assert!(parse_kline_open(&json!({"error": "nope"})).is_err());
        assert!(parse_kline_open(&json!([[1, 2]])).is_err());
    }

    #[test]
    fn test_interval_tags() {
        assert_eq!(interval_tag(3600), "1h");
        assert_eq!(interval_tag(900), "15m");
        assert_eq!(interval_tag(300), "5m");
    }
}
