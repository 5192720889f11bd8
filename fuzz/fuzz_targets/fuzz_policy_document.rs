// Fuzz target feeding arbitrary YAML/JSON into the policy loader.
#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use rideshear_rules::{parse_policies, PolicyTable};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(policies) = parse_policies(text, Path::new("fuzz.yaml")) {
        let _ = PolicyTable::from_policies(policies);
    }
});
