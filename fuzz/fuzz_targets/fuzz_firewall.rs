// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;
use toolgate::engine::firewall::ContextFirewall;
use toolgate::engine_core::models::{FirewallSettings, InjectionResponse};
use toolgate::engine_core::taint::Tainted;

fn strip_firewall() -> &'static ContextFirewall {
    static FIREWALL: OnceLock<ContextFirewall> = OnceLock::new();
    FIREWALL.get_or_init(|| {
        let settings = FirewallSettings {
            injection_response: InjectionResponse::Strip,
            ..FirewallSettings::default()
        };
        ContextFirewall::new(&settings).expect("built-in patterns compile")
    })
}

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let firewall = strip_firewall();

    let findings = firewall.detect(text, "fuzz");
    for finding in &findings {
        assert!(finding.span.start < finding.span.end);
        assert!(text.is_char_boundary(finding.span.start));
        assert!(text.is_char_boundary(finding.span.end));
    }

    // Redacted output must not re-trigger on the text it removed
    let (clean, stripped) = firewall.scan(Tainted::new(text.to_string(), "fuzz"));
    assert_eq!(stripped.len(), findings.len());
    if findings.is_empty() {
        assert_eq!(clean.as_str(), text);
    }
});
