//! On-chain oracle aggregator poller.
//!
//! Reads `latestRoundData` from the aggregator contract over JSON-RPC at
//! a fixed interval and emits a `PriceUpdate` only when the round id
//! advances. Rate limits back off linearly; repeated hard errors rotate
//! through the configured RPC endpoints.

use crate::error::{StreamError, StreamResult};
use crate::health::StreamHealth;
use lagbot_core::{PriceUpdate, StreamSource};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// `latestRoundData()` function selector.
const LATEST_ROUND_DATA_SELECTOR: &str = "0xfeaf968c";
/// `decimals()` function selector.
const DECIMALS_SELECTOR: &str = "0x313ce567";

/// Oracle RPC poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRpcConfig {
    /// RPC endpoints, tried in order; rotation advances on repeated
    /// non-rate-limit errors.
    pub rpc_urls: Vec<String>,
    /// Aggregator contract address.
    #[serde(default = "default_aggregator_address")]
    pub aggregator_address: String,
    /// Symbol tag for emitted updates.
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_aggregator_address() -> String {
    // BTC/USD aggregator on Polygon.
    "0xc907E116054Ad103354f2D350FD2514433D57F6f".to_string()
}

fn default_symbol() -> String {
    "BTCUSD".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

/// One decoded aggregator round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundData {
    pub round_id: u128,
    /// Raw answer, scaled by `10^decimals`.
    pub answer: u128,
    /// Round update time, Unix seconds.
    pub updated_at: u64,
}

impl RoundData {
    #[must_use]
    pub fn price(&self, decimals: u8) -> f64 {
        self.answer as f64 / 10f64.powi(i32::from(decimals))
    }
}

/// Decode the hex return data of `latestRoundData`.
///
/// Five 32-byte words: roundId, answer, startedAt, updatedAt,
/// answeredInRound.
pub fn decode_latest_round_data(result: &str) -> StreamResult<RoundData> {
    let bytes = decode_hex(result)?;
    if bytes.len() < 160 {
        return Err(StreamError::Malformed(format!(
            "latestRoundData returned {} bytes, expected 160",
            bytes.len()
        )));
    }

    Ok(RoundData {
        round_id: be_u128(&bytes[16..32]),
        answer: be_u128(&bytes[48..64]),
        updated_at: be_u128(&bytes[112..128]) as u64,
    })
}

/// Decode the hex return data of `decimals()`.
pub fn decode_decimals(result: &str) -> StreamResult<u8> {
    let bytes = decode_hex(result)?;
    let last = bytes
        .last()
        .ok_or_else(|| StreamError::Malformed("empty decimals response".to_string()))?;
    Ok(*last)
}

fn decode_hex(result: &str) -> StreamResult<Vec<u8>> {
    let stripped = result.strip_prefix("0x").unwrap_or(result);
    hex::decode(stripped).map_err(|e| StreamError::Malformed(format!("bad hex: {e}")))
}

fn be_u128(bytes: &[u8]) -> u128 {
    bytes.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b))
}

/// On-chain oracle poller adapter.
pub struct OracleRpcPoller {
    config: OracleRpcConfig,
    tx: mpsc::Sender<PriceUpdate>,
    health: Arc<StreamHealth>,
    client: reqwest::Client,
}

impl OracleRpcPoller {
    #[must_use]
    pub fn new(config: OracleRpcConfig, tx: mpsc::Sender<PriceUpdate>) -> Self {
        Self {
            config,
            tx,
            health: Arc::new(StreamHealth::new()),
            client: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn health(&self) -> Arc<StreamHealth> {
        Arc::clone(&self.health)
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self, cancel: CancellationToken) {
        if self.config.rpc_urls.is_empty() {
            error!("oracle poller has no RPC endpoints configured");
            return;
        }

        let mut url_index: usize = 0;
        let mut decimals: Option<u8> = None;
        let mut last_round: Option<u128> = None;
        let mut consecutive_errors: u32 = 0;
        let mut backoff_sec: u64 = 0;

        info!(
            interval_ms = self.config.poll_interval_ms,
            endpoints = self.config.rpc_urls.len(),
            "oracle poller starting"
        );
        self.health.set_connected(true);

        loop {
            if backoff_sec > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(backoff_sec)) => {}
                }
                backoff_sec = 0;
            }

            let url = &self.config.rpc_urls[url_index];
            match self.poll_once(url, &mut decimals, &mut last_round).await {
                Ok(()) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    if e.is_rate_limit() {
                        // Linear backoff, capped at 30 s.
                        backoff_sec = (10 * u64::from(consecutive_errors)).min(30);
                        warn!(
                            backoff_sec,
                            errors = consecutive_errors,
                            "oracle poller rate limited"
                        );
                    } else {
                        error!(?e, url = %url, "oracle poll error");
                        if consecutive_errors >= 3 {
                            url_index = (url_index + 1) % self.config.rpc_urls.len();
                            decimals = None;
                            consecutive_errors = 0;
                            self.health.record_reconnect();
                            warn!(url = %self.config.rpc_urls[url_index], "oracle poller rotating endpoint");
                        }
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)) => {}
            }
        }
    }

    async fn poll_once(
        &self,
        url: &str,
        decimals: &mut Option<u8>,
        last_round: &mut Option<u128>,
    ) -> StreamResult<()> {
        let scale = match decimals {
            Some(d) => *d,
            None => {
                let d = decode_decimals(&self.eth_call(url, DECIMALS_SELECTOR).await?)?;
                info!(decimals = d, url = %url, "oracle aggregator decimals");
                *decimals = Some(d);
                d
            }
        };

        let round =
            decode_latest_round_data(&self.eth_call(url, LATEST_ROUND_DATA_SELECTOR).await?)?;

        // Deduplicate by round id, not timestamp.
        if *last_round == Some(round.round_id) {
            return Ok(());
        }
        *last_round = Some(round.round_id);

        let price = round.price(scale);
        let timestamp_ms = round.updated_at as i64 * 1000;
        debug!(price, round_id = round.round_id, "oracle round advanced");
        self.health.record_update(price, timestamp_ms);

        // The aggregator round within the current phase, for sequencing.
        let sequence = round.round_id as u64;
        let update = PriceUpdate::new(
            StreamSource::ChainOracle,
            &self.config.symbol,
            price,
            timestamp_ms,
        )
        .with_sequence(sequence);

        let _ = self.tx.send(update).await;
        Ok(())
    }

    async fn eth_call(&self, url: &str, data: &str) -> StreamResult<String> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                {"to": self.config.aggregator_address, "data": data},
                "latest",
            ],
        });

        let response: Value = self
            .client
            .post(url)
            .json(&request)
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.get("error") {
            return Err(StreamError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        response
            .get("result")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StreamError::Malformed("missing result field".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_round(round_id: u128, answer: u128, updated_at: u64) -> String {
        let mut words = [[0u8; 32]; 5];
        words[0][16..].copy_from_slice(&round_id.to_be_bytes());
        words[1][16..].copy_from_slice(&answer.to_be_bytes());
        words[3][24..].copy_from_slice(&updated_at.to_be_bytes());
        words[4][16..].copy_from_slice(&round_id.to_be_bytes());
        let flat: Vec<u8> = words.concat();
        format!("0x{}", hex::encode(flat))
    }

    #[test]
    fn test_decode_latest_round_data() {
        // Phase 2 round id: exceeds u64.
        let round_id = (2u128 << 64) | 12_345;
        let encoded = encode_round(round_id, 7_848_394_000_000, 1_770_077_127);

        let round = decode_latest_round_data(&encoded).expect("decodes");
        assert_eq!(round.round_id, round_id);
        assert_eq!(round.answer, 7_848_394_000_000);
        assert_eq!(round.updated_at, 1_770_077_127);
        // 8 decimals: $78,483.94.
        assert!((round.price(8) - 78_483.94).abs() < 1e-6);
    }

    #[test]
    fn test_decode_short_data_rejected() {
        assert!(decode_latest_round_data("0x1234").is_err());
        assert!(decode_latest_round_data("0xzzzz").is_err());
    }

    #[test]
    fn test_decode_decimals() {
        let word = format!("0x{:064x}", 8);
        assert_eq!(decode_decimals(&word).unwrap(), 8);
    }

    #[test]
    fn test_rate_limit_classification() {
        let rate_limited = StreamError::Rpc {
            code: -32090,
            message: "slow down".to_string(),
        };
        assert!(rate_limited.is_rate_limit());

        let by_message = StreamError::Rpc {
            code: -32000,
            message: "Rate limit exceeded".to_string(),
        };
        assert!(by_message.is_rate_limit());

        let hard_error = StreamError::Rpc {
            code: -32601,
            message: "method not found".to_string(),
        };
        assert!(!hard_error.is_rate_limit());
    }
}
