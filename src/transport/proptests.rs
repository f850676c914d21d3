//! Property-based tests for request correlation
//!
//! However many requests are in flight, the handler sees them in send order
//! and every caller gets back the reply to its own payload.

use super::*;
use crate::channel::{ContextId, MemoryBus};
use crate::error::LabError;
use futures::future::join_all;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Echoes every payload, failing the ones marked `fail`
struct Recorder {
    seen: Mutex<Vec<Value>>,
}

impl MessageHandler for Recorder {
    fn on_message(&self, _origin: ContextId, payload: Value, responder: Responder) {
        self.seen.lock().unwrap().push(payload.clone());
        if payload["fail"] == json!(true) {
            responder.respond(Err(json!({ "message": format!("failed {}", payload["n"]) })));
        } else {
            responder.respond(Ok(payload));
        }
    }
}

async fn run(failures: Vec<bool>) {
    let bus = MemoryBus::new();
    let recorder = Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
    });
    let handler: Arc<dyn MessageHandler> = recorder.clone();
    let client = MessageProcessor::new("lab-1", Arc::new(bus.endpoint("lab")), Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
    }));
    let server = MessageProcessor::new("lab-1", Arc::new(bus.endpoint("host")), handler);
    client.start().unwrap();
    server.start().unwrap();

    let payloads: Vec<Value> = failures
        .iter()
        .enumerate()
        .map(|(n, fail)| json!({ "n": n, "fail": fail }))
        .collect();
    let target = ContextId::from("host");
    let replies = join_all(
        payloads
            .iter()
            .map(|payload| client.request(&target, payload.clone())),
    )
    .await;

    for ((payload, reply), fail) in payloads.iter().zip(replies).zip(&failures) {
        if *fail {
            let expected = format!("failed {}", payload["n"]);
            assert!(matches!(reply, Err(LabError::Host(message)) if message == expected));
        } else {
            assert_eq!(&reply.unwrap(), payload);
        }
    }
    assert_eq!(*recorder.seen.lock().unwrap(), payloads);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_replies_reach_their_own_request(failures in prop::collection::vec(any::<bool>(), 0..16)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(failures));
    }
}
