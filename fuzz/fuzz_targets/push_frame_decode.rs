//! Fuzz target for PushFrame::decode
//!
//! Push frames arrive from the network as untrusted text. This fuzzer feeds
//! arbitrary strings to the decoder to find:
//! - Panics on malformed JSON or unexpected shapes
//! - Frames that decode but fail to re-encode
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use chatline_proto::PushFrame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|text: &str| {
    if let Ok(frame) = PushFrame::decode(text) {
        let encoded = frame.encode().expect("decoded frame must re-encode");
        let again = PushFrame::decode(&encoded).expect("re-encoded frame must decode");
        assert_eq!(frame, again);
    }
});
