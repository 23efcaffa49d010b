#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsing and validation may reject anything, but must never panic.
    if let Ok(cfg) = focus_config::load_toml(data) {
        if cfg.validate().is_ok() {
            let (min, max) = cfg.focus_range();
            assert!(min < max);
        }
    }
});
