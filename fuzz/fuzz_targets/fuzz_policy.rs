// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use toolgate::config::parse_policy;
use toolgate::engine::evaluator::PolicyEvaluator;
use toolgate::engine::firewall::ContextFirewall;

fuzz_target!(|data: &[u8]| {
    let Ok(yaml) = std::str::from_utf8(data) else {
        return;
    };
    // A policy that passes validation must build a working gate
    if let Ok(policy) = parse_policy(yaml) {
        let evaluator = PolicyEvaluator::new(&policy);
        assert!(evaluator.rules().len() >= policy.rules.len());
        assert!(ContextFirewall::new(&policy.firewall).is_ok());
    }
});
