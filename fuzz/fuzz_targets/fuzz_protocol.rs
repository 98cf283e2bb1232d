// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use toolgate::transport::protocol::{GateMessage, GateReply};

fuzz_target!(|data: &[u8]| {
    // Any request line either decodes or is refused; neither may panic
    if let Ok(msg) = serde_json::from_slice::<GateMessage>(data) {
        let reply = GateReply::success(msg.id, serde_json::Value::Null);
        let line = serde_json::to_string(&reply).expect("reply serializes");
        assert!(!line.contains('\n'));
    }
});
