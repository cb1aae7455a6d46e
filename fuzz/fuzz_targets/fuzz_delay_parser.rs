#![no_main]

use libfuzzer_sys::fuzz_target;
use mirage::delay::{DelayPlan, DelaySpec, MAX_DELAY_MS};
use mirage::directive::ResolvedDirectives;
use mirage::rng::SharedRng;

fuzz_target!(|data: &[u8]| {
    // Fuzz delay directive parsing and computation
    if let Ok(s) = std::str::from_utf8(data) {
        let rng = SharedRng::seeded(0);

        if let Ok(spec) = s.parse::<DelaySpec>() {
            assert!(spec.millis(&rng) <= MAX_DELAY_MS);
        }

        let directives = ResolvedDirectives {
            jitter: s.to_string(),
            exponential: s.to_string(),
            random_delay: s.to_string(),
            latency: s.to_string(),
            ..Default::default()
        };
        if let Some(plan) = DelayPlan::select(&directives) {
            assert!(plan.millis(&rng) <= MAX_DELAY_MS);
        }
    }
});
