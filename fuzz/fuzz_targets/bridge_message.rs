//! Fuzz test for bridge message parsing.
//!
//! The reader loop feeds every line the bridge emits into these decoders;
//! none of them may panic on malformed or adversarial input.

#![no_main]

use integration_monitor_lib::aggregate::{aggregate, IntegrationStatusRecord};
use integration_monitor_lib::ipc::types::{IncomingMessage, Notification, RequestId, Response};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Only test valid UTF-8 strings since JSON-RPC uses text
    if let Ok(s) = std::str::from_utf8(data) {
        // The main wire entry point
        let _ = serde_json::from_str::<IncomingMessage>(s);

        // Individual message types
        let _ = serde_json::from_str::<Response>(s);
        let _ = serde_json::from_str::<Notification>(s);
        let _ = serde_json::from_str::<RequestId>(s);

        // Status payload decoding must never reject a batch outright, and
        // aggregation must be total over whatever decodes
        if let Ok(records) = serde_json::from_str::<Vec<IntegrationStatusRecord>>(s) {
            let status = aggregate(records);
            let _ = status.counter_text();
        }
    }

    // Raw bytes too; serde_json must safely handle invalid UTF-8
    let _ = serde_json::from_slice::<IncomingMessage>(data);
    let _ = serde_json::from_slice::<Vec<IntegrationStatusRecord>>(data);
});
