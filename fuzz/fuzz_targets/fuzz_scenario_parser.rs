#![no_main]

use libfuzzer_sys::fuzz_target;
use mirage::scenario::{parse_definitions, ScenarioStore};

fuzz_target!(|data: &[u8]| {
    // Fuzz scenario payloads in both accepted formats
    for content_type in [Some("application/json"), Some("application/yaml"), None] {
        if let Ok(definitions) = parse_definitions(data, content_type) {
            let store = ScenarioStore::new();
            if store.install(definitions).is_ok() {
                for definition in store.list() {
                    let _ = store.next(&definition.path);
                }
            }
        }
    }
});
