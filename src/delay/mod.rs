//! Delay simulation
//!
//! Five delay families can be requested. They are mutually exclusive and
//! checked in a fixed priority order: fixed delay, jitter, random range,
//! exponential backoff, latency. The first value that parses wins; values
//! that fail to parse are skipped without error.
//!
//! Every computed delay is clamped to [`MAX_DELAY_MS`].

use crate::directive::ResolvedDirectives;
use crate::rng::{uniform_inclusive, RandomSource};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Upper bound for any simulated delay (five minutes)
pub const MAX_DELAY_MS: u64 = 300_000;

/// A fixed delay or an inclusive range, written `N`, `Nms` or `N-Mms`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelaySpec {
    Fixed(u64),
    Range { min: u64, max: u64 },
}

impl DelaySpec {
    /// Draw a concrete delay in milliseconds, clamped to the ceiling
    pub fn millis(&self, rng: &dyn RandomSource) -> u64 {
        match *self {
            DelaySpec::Fixed(ms) => ms.min(MAX_DELAY_MS),
            DelaySpec::Range { min, max } => uniform_range(rng, min, max),
        }
    }

    pub fn duration(&self, rng: &dyn RandomSource) -> Duration {
        Duration::from_millis(self.millis(rng))
    }
}

impl FromStr for DelaySpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('-') {
            Some((min, max)) => {
                let min = parse_millis(min).ok_or_else(|| format!("invalid delay range: {}", s))?;
                let max = parse_millis(max).ok_or_else(|| format!("invalid delay range: {}", s))?;
                if min > max {
                    return Err(format!("delay range minimum exceeds maximum: {}", s));
                }
                Ok(DelaySpec::Range { min, max })
            }
            None => parse_millis(s)
                .map(DelaySpec::Fixed)
                .ok_or_else(|| format!("invalid delay: {}", s)),
        }
    }
}

impl fmt::Display for DelaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelaySpec::Fixed(ms) => write!(f, "{}ms", ms),
            DelaySpec::Range { min, max } => write!(f, "{}-{}ms", min, max),
        }
    }
}

impl Serialize for DelaySpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DelaySpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a non-negative millisecond count with an optional `ms` suffix
pub fn parse_millis(s: &str) -> Option<u64> {
    let s = s.trim();
    let s = s.strip_suffix("ms").unwrap_or(s).trim();
    s.parse().ok()
}

/// Parse `a,b` into two non-negative integers
fn parse_pair(s: &str) -> Option<(u64, u64)> {
    let (a, b) = s.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// The delay selected for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPlan {
    Fixed(u64),
    Jitter { base: u64, variance: u64 },
    Random { min: u64, max: u64 },
    Exponential { base: u64, attempt: u64 },
    Latency(DelaySpec),
}

impl DelayPlan {
    /// Pick the highest-priority delay family whose value parses
    pub fn select(directives: &ResolvedDirectives) -> Option<DelayPlan> {
        if let Some(ms) = nonempty(&directives.delay).and_then(parse_millis) {
            return Some(DelayPlan::Fixed(ms));
        }

        if let Some((base, variance)) = nonempty(&directives.jitter).and_then(parse_pair) {
            return Some(DelayPlan::Jitter { base, variance });
        }

        if let Some((min, max)) = nonempty(&directives.random_delay).and_then(parse_pair) {
            if min <= max {
                return Some(DelayPlan::Random { min, max });
            }
        }

        if let Some((base, attempt)) = nonempty(&directives.exponential).and_then(parse_pair) {
            if attempt >= 1 {
                return Some(DelayPlan::Exponential { base, attempt });
            }
        }

        nonempty(&directives.latency)
            .and_then(|v| v.parse().ok())
            .map(DelayPlan::Latency)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DelayPlan::Fixed(_) => "fixed",
            DelayPlan::Jitter { .. } => "jitter",
            DelayPlan::Random { .. } => "random",
            DelayPlan::Exponential { .. } => "exponential",
            DelayPlan::Latency(_) => "latency",
        }
    }

    /// Concrete delay in milliseconds, always within `[0, MAX_DELAY_MS]`
    pub fn millis(&self, rng: &dyn RandomSource) -> u64 {
        match *self {
            DelayPlan::Fixed(ms) => ms.min(MAX_DELAY_MS),
            DelayPlan::Jitter { base, variance } => {
                let variance = variance.min(i64::MAX as u64 / 4) as i64;
                let offset = uniform_inclusive(rng, -variance, variance);
                clamp_signed(base as i128 + offset as i128)
            }
            DelayPlan::Random { min, max } => uniform_range(rng, min, max),
            DelayPlan::Exponential { base, attempt } => {
                let factor = 1u64.checked_shl((attempt - 1).min(64) as u32).unwrap_or(u64::MAX);
                let delay = base.saturating_mul(factor).min(MAX_DELAY_MS);
                let spread = (delay / 4) as i64;
                let offset = uniform_inclusive(rng, -spread, spread);
                clamp_signed(delay as i128 + offset as i128)
            }
            DelayPlan::Latency(spec) => spec.millis(rng),
        }
    }

    pub fn duration(&self, rng: &dyn RandomSource) -> Duration {
        Duration::from_millis(self.millis(rng))
    }
}

fn nonempty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

fn uniform_range(rng: &dyn RandomSource, min: u64, max: u64) -> u64 {
    if max <= min {
        return min.min(MAX_DELAY_MS);
    }
    let span = (max - min).saturating_add(1);
    min.saturating_add(rng.below(span)).min(MAX_DELAY_MS)
}

fn clamp_signed(ms: i128) -> u64 {
    ms.clamp(0, MAX_DELAY_MS as i128) as u64
}

/// Select, compute and sleep out the delay for a request.
///
/// Returns the delay that was applied, if any. The sleep is not tied to the
/// client connection.
pub async fn simulate(directives: &ResolvedDirectives, rng: &dyn RandomSource) -> Option<Duration> {
    let plan = DelayPlan::select(directives)?;
    let delay = plan.duration(rng);
    debug!(kind = plan.kind(), delay_ms = delay.as_millis() as u64, "Applying delay");
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    Some(delay)
}
