#![no_main]

use libfuzzer_sys::fuzz_target;
use playroom_client::protocol::ServerMessage;
use playroom_client::BoardReconciler;

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = serde_json::from_slice::<ServerMessage>(data) else {
        return;
    };

    // Whatever decodes must reconcile without panicking, bound or not.
    let mut unbound = BoardReconciler::default();
    let _ = unbound.reconcile(msg.clone());

    let mut bound = BoardReconciler::default().with_local_player("p1");
    if let Some(id) = msg.session_id() {
        bound.bind(id.to_string());
    }
    let _ = bound.reconcile(msg);
    for index in 0..10 {
        let _ = bound.attempt_local_move(index);
    }
});
