//! Property-based tests for Mirage
//!
//! These tests use proptest to verify properties hold for arbitrary inputs.

use bytes::Bytes;
use http::Request;
use mirage::delay::{DelayPlan, DelaySpec, MAX_DELAY_MS};
use mirage::replay::{HistoryStore, RequestRecord};
use mirage::rng::SharedRng;
use mirage::scenario::{ScenarioDefinition, ScenarioResponse, ScenarioStore};
use proptest::prelude::*;

fn record(id: usize) -> RequestRecord {
    let request = Request::builder()
        .uri(format!("/r/{}", id))
        .header("x-request-id", format!("id-{}", id))
        .body(Bytes::new())
        .unwrap();
    RequestRecord::capture(&request)
}

// ============================================================================
// Delay Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Jitter stays within base ± variance and never leaves [0, MAX]
    #[test]
    fn prop_jitter_bounds(base in 0u64..400_000, variance in 0u64..400_000, seed: u64) {
        let rng = SharedRng::seeded(seed);
        let ms = DelayPlan::Jitter { base, variance }.millis(&rng);
        let lo = base.saturating_sub(variance).min(MAX_DELAY_MS);
        let hi = base.saturating_add(variance).min(MAX_DELAY_MS);
        prop_assert!(ms >= lo && ms <= hi, "{} not in [{}, {}]", ms, lo, hi);
    }

    /// Exponential backoff lands within ±25% of base * 2^(attempt-1)
    #[test]
    fn prop_exponential_bounds(base in 0u64..10_000, attempt in 1u64..12, seed: u64) {
        let rng = SharedRng::seeded(seed);
        let ms = DelayPlan::Exponential { base, attempt }.millis(&rng);
        let nominal = (base << (attempt - 1)).min(MAX_DELAY_MS);
        let spread = nominal / 4;
        prop_assert!(ms >= nominal - spread);
        prop_assert!(ms <= (nominal + spread).min(MAX_DELAY_MS));
    }

    /// Ranges draw within [min, max], capped at the ceiling
    #[test]
    fn prop_range_bounds(min in 0u64..500_000, width in 0u64..500_000, seed: u64) {
        let max = min + width;
        let spec: DelaySpec = format!("{}-{}ms", min, max).parse().unwrap();
        let ms = spec.millis(&SharedRng::seeded(seed));
        prop_assert!(ms >= min.min(MAX_DELAY_MS));
        prop_assert!(ms <= max.min(MAX_DELAY_MS));
    }

    /// Parsing a displayed delay gives it back
    #[test]
    fn prop_delay_spec_display_parses(min in 0u64..1_000_000, width in 0u64..1_000) {
        for spec in [DelaySpec::Fixed(min), DelaySpec::Range { min, max: min + width }] {
            let parsed: DelaySpec = spec.to_string().parse().unwrap();
            prop_assert_eq!(parsed, spec);
        }
    }

    /// Arbitrary text never panics the delay parser
    #[test]
    fn prop_delay_parse_total(input in ".{0,40}") {
        let _ = input.parse::<DelaySpec>();
    }
}

// ============================================================================
// Scenario Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The cursor always stays inside the response list and visits loop
    #[test]
    fn prop_scenario_cursor_in_range(len in 1usize..10, visits in 0usize..50) {
        let store = ScenarioStore::new();
        let responses = (0..len)
            .map(|i| ScenarioResponse { status: 200 + i as u16, delay: None, body: String::new() })
            .collect();
        store.install(vec![ScenarioDefinition { path: "/p".to_string(), responses }]).unwrap();

        for visit in 0..visits {
            let cursor = store.cursor("/p").unwrap();
            prop_assert!(cursor < len);
            let served = store.next("/p").unwrap();
            prop_assert_eq!(served.status as usize, 200 + visit % len);
        }
    }
}

// ============================================================================
// History Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// After N records with capacity K, exactly the last min(N, K) remain
    #[test]
    fn prop_history_keeps_newest(capacity in 0usize..20, count in 0usize..60) {
        let history = HistoryStore::new(capacity);
        for i in 0..count {
            history.record(record(i));
        }

        let kept: Vec<String> = history.list().into_iter().map(|r| r.id).collect();
        let expected: Vec<String> = (count.saturating_sub(capacity)..count)
            .map(|i| format!("id-{}", i))
            .collect();
        prop_assert_eq!(kept, expected);
    }
}
