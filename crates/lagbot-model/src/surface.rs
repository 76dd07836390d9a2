//! Empirical probability surface.
//!
//! P(UP | deviation, time_remaining, vol_regime, session), bucketed over
//! deviation bands (default 0.1% from -2% to +2%, with two open-ended
//! sentinel bands outside the range), the time-remaining values observed
//! in the fit data, volatility terciles plus "all", and five trading
//! sessions plus "all".
//!
//! The surface is fitted offline; this module only loads, queries, and
//! re-serializes the frozen representation.

use crate::error::{ModelError, ModelResult};
use lagbot_core::{TradingSession, VolRegime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Buckets with at least this many samples are reliable.
pub const MIN_SAMPLES_RELIABLE: u32 = 30;
/// Buckets with at least this many samples are usable.
pub const MIN_SAMPLES_USABLE: u32 = 10;

/// Statistics for a single bucket of the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityBucket {
    /// Lower deviation bound. `f64::NEG_INFINITY` for the below-range sentinel.
    pub deviation_min: f64,
    /// Upper deviation bound. `f64::INFINITY` for the above-range sentinel.
    pub deviation_max: f64,
    /// Time remaining in minutes.
    pub time_remaining: u32,
    pub vol_regime: VolRegime,
    pub session: TradingSession,

    pub sample_size: u32,
    pub win_count: u32,
    pub win_rate: f64,

    // Wilson score interval
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub ci_width: f64,

    pub is_reliable: bool,
    pub is_usable: bool,
}

/// Result of a probability lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceEstimate {
    pub win_rate: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub is_reliable: bool,
    /// Sample size of the bucket that served this estimate (0 for the prior).
    pub sample_size: u32,
}

impl SurfaceEstimate {
    /// The uniform prior served when no bucket covers the query.
    #[must_use]
    pub fn prior() -> Self {
        Self {
            win_rate: 0.5,
            ci_lower: 0.0,
            ci_upper: 1.0,
            is_reliable: false,
            sample_size: 0,
        }
    }

    #[must_use]
    pub fn ci_width(&self) -> f64 {
        self.ci_upper - self.ci_lower
    }
}

/// Deviation bucket index.
///
/// `-1` is the open-ended band below the range, `n_bins` the band above;
/// indices in `[0, n_bins)` are the regular step-width bands. Integer keys
/// avoid hashing the float bounds.
type DevIdx = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BucketKey {
    dev_idx: DevIdx,
    time_remaining: u32,
    vol_regime: VolRegime,
    session: TradingSession,
}

/// On-disk bucket record. Bounds live in the map key, not the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BucketRecord {
    sample_size: u32,
    win_count: u32,
    win_rate: f64,
    ci_lower: f64,
    ci_upper: f64,
    ci_width: f64,
    is_reliable: bool,
    is_usable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SurfaceFileConfig {
    deviation_step: f64,
    deviation_range: [f64; 2],
    confidence_level: f64,
}

/// On-disk representation of the surface.
///
/// Bucket keys are `"{dev_min}|{dev_max}|{time_remaining}|{vol}|{session}"`
/// with `-inf` / `inf` tokens for the sentinel bands. A legacy four-field
/// key (no session) loads with `session = "all"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SurfaceFile {
    config: SurfaceFileConfig,
    deviation_bins: Vec<f64>,
    time_bins: Vec<u32>,
    vol_regimes: Vec<String>,
    sessions: Vec<String>,
    buckets: HashMap<String, BucketRecord>,
}

/// Frozen empirical probability surface.
pub struct ProbabilitySurface {
    deviation_step: f64,
    deviation_range: (f64, f64),
    confidence_level: f64,
    n_bins: i32,
    time_bins: Vec<u32>,
    buckets: HashMap<BucketKey, ProbabilityBucket>,
}

impl ProbabilitySurface {
    /// Load a surface from its frozen JSON file.
    pub fn load(path: &Path) -> ModelResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: SurfaceFile = serde_json::from_str(&raw)?;
        let surface = Self::from_file(file)?;
        info!(
            path = %path.display(),
            buckets = surface.buckets.len(),
            time_bins = surface.time_bins.len(),
            "probability surface loaded"
        );
        Ok(surface)
    }

    /// Build a surface from parsed JSON (exposed for tests and tooling).
    pub fn from_json(value: serde_json::Value) -> ModelResult<Self> {
        let file: SurfaceFile = serde_json::from_value(value)?;
        Self::from_file(file)
    }

    fn from_file(file: SurfaceFile) -> ModelResult<Self> {
        let step = file.config.deviation_step;
        let range = (file.config.deviation_range[0], file.config.deviation_range[1]);
        if step <= 0.0 || range.1 <= range.0 {
            return Err(ModelError::InvalidConfig(format!(
                "deviation_step={step} deviation_range={range:?}"
            )));
        }
        let n_bins = ((range.1 - range.0) / step).round() as i32;

        let mut time_bins = file.time_bins;
        time_bins.sort_unstable();
        time_bins.dedup();

        let mut surface = Self {
            deviation_step: step,
            deviation_range: range,
            confidence_level: file.config.confidence_level,
            n_bins,
            time_bins,
            buckets: HashMap::with_capacity(file.buckets.len()),
        };

        for (key_str, record) in file.buckets {
            let (dev_min, dev_max, time_remaining, vol_regime, session) =
                surface.parse_key(&key_str)?;
            let key = BucketKey {
                dev_idx: surface.dev_idx_for_bounds(dev_min, dev_max),
                time_remaining,
                vol_regime,
                session,
            };
            surface.buckets.insert(
                key,
                ProbabilityBucket {
                    deviation_min: dev_min,
                    deviation_max: dev_max,
                    time_remaining,
                    vol_regime,
                    session,
                    sample_size: record.sample_size,
                    win_count: record.win_count,
                    win_rate: record.win_rate,
                    ci_lower: record.ci_lower,
                    ci_upper: record.ci_upper,
                    ci_width: record.ci_width,
                    is_reliable: record.is_reliable,
                    is_usable: record.is_usable,
                },
            );
        }

        Ok(surface)
    }

    fn parse_key(
        &self,
        key: &str,
    ) -> ModelResult<(f64, f64, u32, VolRegime, TradingSession)> {
        let parts: Vec<&str> = key.split('|').collect();
        let (dev_min_s, dev_max_s, time_s, vol_s, session_s) = match parts.as_slice() {
            // Legacy format without session.
            [a, b, c, d] => (*a, *b, *c, *d, "all"),
            [a, b, c, d, e] => (*a, *b, *c, *d, *e),
            _ => {
                return Err(ModelError::InvalidKey {
                    key: key.to_string(),
                    reason: format!("expected 4 or 5 fields, got {}", parts.len()),
                })
            }
        };

        let dev_min = parse_bound(dev_min_s).ok_or_else(|| ModelError::InvalidKey {
            key: key.to_string(),
            reason: format!("bad deviation_min '{dev_min_s}'"),
        })?;
        let dev_max = parse_bound(dev_max_s).ok_or_else(|| ModelError::InvalidKey {
            key: key.to_string(),
            reason: format!("bad deviation_max '{dev_max_s}'"),
        })?;
        let time_remaining: u32 = time_s.parse().map_err(|_| ModelError::InvalidKey {
            key: key.to_string(),
            reason: format!("bad time_remaining '{time_s}'"),
        })?;
        let vol_regime: VolRegime = vol_s.parse()?;
        let session: TradingSession = session_s.parse()?;

        Ok((dev_min, dev_max, time_remaining, vol_regime, session))
    }

    fn dev_idx_for_bounds(&self, dev_min: f64, dev_max: f64) -> DevIdx {
        if dev_min.is_infinite() {
            return -1;
        }
        if dev_max.is_infinite() {
            return self.n_bins;
        }
        ((dev_min - self.deviation_range.0) / self.deviation_step).round() as DevIdx
    }

    /// Deviation bucket index for a query value: floor within the range,
    /// sentinel indices outside it.
    fn dev_idx_for_value(&self, deviation: f64) -> DevIdx {
        if deviation < self.deviation_range.0 {
            return -1;
        }
        if deviation >= self.deviation_range.1 {
            return self.n_bins;
        }
        let idx = ((deviation - self.deviation_range.0) / self.deviation_step).floor() as DevIdx;
        idx.clamp(0, self.n_bins - 1)
    }

    /// Snap a queried time-remaining to the nearest observed bin.
    fn snap_time(&self, time_remaining: u32) -> Option<u32> {
        self.time_bins
            .iter()
            .copied()
            .min_by_key(|t| (i64::from(*t) - i64::from(time_remaining)).unsigned_abs())
    }

    /// Look up P(UP) with the fallback chain:
    /// requested session -> "all" session -> "all" regime -> uniform prior.
    #[must_use]
    pub fn get_probability(
        &self,
        deviation_pct: f64,
        time_remaining: u32,
        vol_regime: VolRegime,
        session: TradingSession,
    ) -> SurfaceEstimate {
        match self.get_bucket(deviation_pct, time_remaining, vol_regime, session) {
            Some(bucket) => SurfaceEstimate {
                win_rate: bucket.win_rate,
                ci_lower: bucket.ci_lower,
                ci_upper: bucket.ci_upper,
                is_reliable: bucket.is_reliable,
                sample_size: bucket.sample_size,
            },
            None => SurfaceEstimate::prior(),
        }
    }

    /// The bucket that would serve a lookup, following the fallback chain.
    /// `None` means the uniform prior applies.
    #[must_use]
    pub fn get_bucket(
        &self,
        deviation_pct: f64,
        time_remaining: u32,
        vol_regime: VolRegime,
        session: TradingSession,
    ) -> Option<&ProbabilityBucket> {
        let dev_idx = self.dev_idx_for_value(deviation_pct);
        let time_remaining = self.snap_time(time_remaining)?;

        let mut candidates = vec![(vol_regime, session)];
        if session != TradingSession::All {
            candidates.push((vol_regime, TradingSession::All));
        }
        if vol_regime != VolRegime::All {
            candidates.push((VolRegime::All, TradingSession::All));
        }

        candidates.into_iter().find_map(|(vol, sess)| {
            self.buckets.get(&BucketKey {
                dev_idx,
                time_remaining,
                vol_regime: vol,
                session: sess,
            })
        })
    }

    /// Re-serialize the surface to its JSON representation.
    ///
    /// Loading the result yields an equivalent bucket set (key order may
    /// differ).
    pub fn to_json(&self) -> ModelResult<serde_json::Value> {
        let deviation_bins: Vec<f64> = (0..=self.n_bins)
            .map(|i| round_bound(self.deviation_range.0 + f64::from(i) * self.deviation_step))
            .collect();

        let buckets: HashMap<String, BucketRecord> = self
            .buckets
            .values()
            .map(|b| {
                let key = format!(
                    "{}|{}|{}|{}|{}",
                    format_bound(b.deviation_min),
                    format_bound(b.deviation_max),
                    b.time_remaining,
                    b.vol_regime,
                    b.session
                );
                let record = BucketRecord {
                    sample_size: b.sample_size,
                    win_count: b.win_count,
                    win_rate: b.win_rate,
                    ci_lower: b.ci_lower,
                    ci_upper: b.ci_upper,
                    ci_width: b.ci_width,
                    is_reliable: b.is_reliable,
                    is_usable: b.is_usable,
                };
                (key, record)
            })
            .collect();

        let file = SurfaceFile {
            config: SurfaceFileConfig {
                deviation_step: self.deviation_step,
                deviation_range: [self.deviation_range.0, self.deviation_range.1],
                confidence_level: self.confidence_level,
            },
            deviation_bins,
            time_bins: self.time_bins.clone(),
            vol_regimes: vec![
                "low".to_string(),
                "medium".to_string(),
                "high".to_string(),
                "all".to_string(),
            ],
            sessions: vec![
                "asia".to_string(),
                "europe".to_string(),
                "us_eu_overlap".to_string(),
                "us".to_string(),
                "late_us".to_string(),
                "all".to_string(),
            ],
            buckets,
        };

        Ok(serde_json::to_value(file)?)
    }

    /// Save the surface back to disk.
    pub fn save(&self, path: &Path) -> ModelResult<()> {
        let value = self.to_json()?;
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
        Ok(())
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn time_bins(&self) -> &[u32] {
        &self.time_bins
    }

    #[must_use]
    pub fn deviation_step(&self) -> f64 {
        self.deviation_step
    }

    #[must_use]
    pub fn deviation_range(&self) -> (f64, f64) {
        self.deviation_range
    }
}

fn parse_bound(s: &str) -> Option<f64> {
    match s {
        "-inf" => Some(f64::NEG_INFINITY),
        "inf" => Some(f64::INFINITY),
        other => other.parse().ok(),
    }
}

fn format_bound(v: f64) -> String {
    if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if v == f64::INFINITY {
        "inf".to_string()
    } else {
        format!("{}", round_bound(v))
    }
}

/// Round a bucket boundary to suppress accumulated float error in keys.
fn round_bound(v: f64) -> f64 {
    (v * 1e10).round() / 1e10
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bucket_json(n: u32, wins: u32) -> serde_json::Value {
        let win_rate = if n > 0 { f64::from(wins) / f64::from(n) } else { 0.5 };
        json!({
            "sample_size": n,
            "win_count": wins,
            "win_rate": win_rate,
            "ci_lower": (win_rate - 0.1).max(0.0),
            "ci_upper": (win_rate + 0.1).min(1.0),
            "ci_width": 0.2,
            "is_reliable": n >= MIN_SAMPLES_RELIABLE,
            "is_usable": n >= MIN_SAMPLES_USABLE,
        })
    }

    fn test_surface() -> ProbabilitySurface {
        ProbabilitySurface::from_json(json!({
            "config": {
                "deviation_step": 0.001,
                "deviation_range": [-0.02, 0.02],
                "confidence_level": 0.95,
            },
            "deviation_bins": [],
            "time_bins": [5, 10, 30],
            "vol_regimes": ["low", "medium", "high", "all"],
            "sessions": ["asia", "europe", "us_eu_overlap", "us", "late_us", "all"],
            "buckets": {
                // dev in [0.002, 0.003), 10 min, high vol, all sessions
                "0.002|0.003|10|high|all": bucket_json(50, 33),
                // same band, all/all
                "0.002|0.003|10|all|all": bucket_json(200, 120),
                // asia-specific bucket at 5 min
                "0.002|0.003|5|high|asia": bucket_json(40, 30),
                // sentinel band below -2%
                "-inf|-0.02|10|all|all": bucket_json(35, 5),
                // legacy 4-field key loads with session = all
                "0.005|0.006|10|medium": bucket_json(45, 27),
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_exact_lookup() {
        let surface = test_surface();
        let est = surface.get_probability(0.0025, 10, VolRegime::High, TradingSession::All);
        assert_eq!(est.sample_size, 50);
        assert!((est.win_rate - 0.66).abs() < 1e-9);
        assert!(est.is_reliable);
    }

    #[test]
    fn test_session_fallback_prefers_all_session_bucket() {
        let surface = test_surface();
        // No (high, asia) bucket at 10 min, but (high, all) exists: the
        // fallback must serve it rather than the uniform prior.
        let est = surface.get_probability(0.0025, 10, VolRegime::High, TradingSession::Asia);
        assert_eq!(est.sample_size, 50);
        assert!((est.win_rate - 0.66).abs() < 1e-9);
    }

    #[test]
    fn test_vol_fallback_to_all_all() {
        let surface = test_surface();
        // No (low, *) bucket in the band; falls through to (all, all).
        let est = surface.get_probability(0.0025, 10, VolRegime::Low, TradingSession::Europe);
        assert_eq!(est.sample_size, 200);
        assert!((est.win_rate - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_prior_on_total_miss() {
        let surface = test_surface();
        let est = surface.get_probability(-0.0105, 10, VolRegime::All, TradingSession::All);
        assert_eq!(est, SurfaceEstimate::prior());
        assert!(!est.is_reliable);
        assert!(est.ci_lower <= est.win_rate && est.win_rate <= est.ci_upper);
    }

    #[test]
    fn test_out_of_range_deviation_hits_sentinel() {
        let surface = test_surface();
        let est = surface.get_probability(-0.05, 10, VolRegime::All, TradingSession::All);
        assert_eq!(est.sample_size, 35);
    }

    #[test]
    fn test_time_snaps_to_nearest_bin() {
        let surface = test_surface();
        // 12 minutes snaps to the 10-minute bin.
        let est = surface.get_probability(0.0025, 12, VolRegime::High, TradingSession::All);
        assert_eq!(est.sample_size, 50);
        // 25 minutes snaps to 30, where no bucket exists -> prior.
        let est = surface.get_probability(0.0025, 25, VolRegime::High, TradingSession::All);
        assert_eq!(est, SurfaceEstimate::prior());
    }

    #[test]
    fn test_legacy_key_loads_with_all_session() {
        let surface = test_surface();
        let est = surface.get_probability(0.0055, 10, VolRegime::Medium, TradingSession::Us);
        // Served through the session fallback by the legacy bucket.
        assert_eq!(est.sample_size, 45);
    }

    #[test]
    fn test_ci_ordering_invariant() {
        let surface = test_surface();
        for dev in [-0.05, -0.0105, 0.0025, 0.0055, 0.05] {
            for t in [5, 10, 30] {
                let est = surface.get_probability(dev, t, VolRegime::All, TradingSession::All);
                assert!(0.0 <= est.ci_lower);
                assert!(est.ci_lower <= est.win_rate);
                assert!(est.win_rate <= est.ci_upper);
                assert!(est.ci_upper <= 1.0);
            }
        }
    }

    #[test]
    fn test_roundtrip_preserves_bucket_set() {
        let surface = test_surface();
        let reloaded = ProbabilitySurface::from_json(surface.to_json().unwrap()).unwrap();

        assert_eq!(reloaded.bucket_count(), surface.bucket_count());
        for bucket in surface.buckets.values() {
            let again = reloaded
                .get_bucket(
                    // Query by a point inside the band.
                    if bucket.deviation_min.is_infinite() {
                        bucket.deviation_max - 1.0
                    } else if bucket.deviation_max.is_infinite() {
                        bucket.deviation_min + 1.0
                    } else {
                        (bucket.deviation_min + bucket.deviation_max) / 2.0
                    },
                    bucket.time_remaining,
                    bucket.vol_regime,
                    bucket.session,
                )
                .unwrap();
            assert_eq!(again.sample_size, bucket.sample_size);
            assert_eq!(again.win_count, bucket.win_count);
            assert!((again.win_rate - bucket.win_rate).abs() < 1e-12);
        }
    }
}
