use crate::AgentId;
#[cfg(feature = "debug")]
use serde_json::json;

#[cfg(feature = "debug")]
thread_local!(
    static DEBUG_FRAME: std::cell::RefCell<Vec<serde_json::Value>> = Default::default();
);

/// Records the lead obstacle chosen for an agent this step.
#[allow(unused)]
pub fn debug_lead(follower: AgentId, kind: &str, net_distance: f64, velocity: f64) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        frame.borrow_mut().push(json!({
            "type": "lead",
            "follower": format!("{:?}", follower),
            "kind": kind,
            "net_distance": net_distance,
            "velocity": velocity,
        }))
    })
}

/// Records an agent leaving the network.
#[allow(unused)]
pub fn debug_exit(agent: AgentId, pos: f64) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        frame.borrow_mut().push(json!({
            "type": "exit",
            "agent": format!("{:?}", agent),
            "pos": pos,
        }))
    })
}

#[cfg(feature = "debug")]
pub fn take_debug_frame() -> serde_json::Value {
    json!(DEBUG_FRAME.with(|frame| frame.take()))
}
