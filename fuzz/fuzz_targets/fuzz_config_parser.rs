#![no_main]

use libfuzzer_sys::fuzz_target;
use mirage::config::{parse_config, validate_config};
use std::path::Path;

fuzz_target!(|data: &[u8]| {
    // Fuzz YAML and TOML config parsing
    if let Ok(s) = std::str::from_utf8(data) {
        for name in ["fuzz.yaml", "fuzz.toml"] {
            if let Ok(config) = parse_config(s, Path::new(name)) {
                let _ = validate_config(&config);
            }
        }
    }
});
