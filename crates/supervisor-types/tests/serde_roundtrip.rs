use supervisor_types::{AgentId, ExecutionState, ExecutionStatus};

#[test]
fn agent_id_roundtrips_through_json() {
    let id = AgentId::from("web-1");
    let json = serde_json::to_string(&id).expect("serialization failed");
    let decoded: AgentId = serde_json::from_str(&json).expect("deserialization failed");
    assert_eq!(id, decoded);
}

#[test]
fn execution_state_roundtrips_through_json() {
    for state in [
        ExecutionState::Idle,
        ExecutionState::Starting,
        ExecutionState::Running,
        ExecutionState::Completed,
        ExecutionState::Failed,
        ExecutionState::Timeout,
        ExecutionState::Cancelled,
        ExecutionState::Cleanup,
    ] {
        let json = serde_json::to_string(&state).unwrap();
        let decoded: ExecutionState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, decoded);
    }
}

#[test]
fn execution_status_from_terminal_state_covers_all_terminal_states() {
    assert_eq!(
        ExecutionStatus::from_terminal_state(ExecutionState::Completed),
        Some(ExecutionStatus::Success)
    );
    assert_eq!(
        ExecutionStatus::from_terminal_state(ExecutionState::Failed),
        Some(ExecutionStatus::Failure)
    );
    assert_eq!(
        ExecutionStatus::from_terminal_state(ExecutionState::Timeout),
        Some(ExecutionStatus::Timeout)
    );
    assert_eq!(
        ExecutionStatus::from_terminal_state(ExecutionState::Cancelled),
        Some(ExecutionStatus::Cancelled)
    );
    assert_eq!(
        ExecutionStatus::from_terminal_state(ExecutionState::Running),
        None
    );
}
