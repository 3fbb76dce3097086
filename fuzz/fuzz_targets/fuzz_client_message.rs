#![no_main]

use libfuzzer_sys::fuzz_target;
use playroom_client::protocol::ClientMessage;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(msg) = serde_json::from_str::<ClientMessage>(s) {
        // Anything that decodes must encode again.
        let encoded = serde_json::to_string(&msg).expect("re-encode");
        let again: ClientMessage = serde_json::from_str(&encoded).expect("decode re-encoded");
        assert_eq!(msg, again);
    }
});
