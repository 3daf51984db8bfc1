use super::states::AgentState;

/// Whether `from -> to` is an edge in the agent lifecycle graph.
///
/// The graph: `Inactive -> Starting -> Active <-> Busy <-> Idle`, with
/// `Active <-> Maintenance`, an error loop reachable from any non-terminal
/// state (`* -> Error -> Recovering -> Active | Resetting -> Starting`), and a
/// graceful stop path from any non-terminal state (`* -> Stopping ->
/// Shutdown`). Self-transitions are rejected; callers treat an already-held
/// target state as an idempotent no-op before asking.
pub fn is_valid_transition(from: AgentState, to: AgentState) -> bool {
    use AgentState::*;

    if from == to || from.is_terminal() {
        return false;
    }

    // Error and Stopping are reachable from every non-terminal state.
    if matches!(to, Error | Stopping) {
        return true;
    }

    match (from, to) {
        (Inactive, Starting) => true,
        (Starting, Active) => true,

        // Operational band cycles freely.
        (Active | Busy | Idle, Active | Busy | Idle) => true,

        (Active, Maintenance) | (Maintenance, Active) => true,

        // Recovery loop. Recovery-by-heartbeat allows Error -> Active directly.
        (Error, Recovering) | (Error, Active) => true,
        (Recovering, Active) | (Recovering, Resetting) => true,
        (Resetting, Starting) => true,

        (Stopping, Shutdown) => true,

        _ => false,
    }
}

/// States the heartbeat monitor evaluates for liveness. Terminal agents and
/// agents in planned maintenance are exempt from staleness escalation.
pub fn is_liveness_monitored(state: AgentState) -> bool {
    !state.is_terminal() && !matches!(state, AgentState::Maintenance | AgentState::Inactive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use AgentState::*;

    #[test]
    fn test_lifecycle_path() {
        assert!(is_valid_transition(Inactive, Starting));
        assert!(is_valid_transition(Starting, Active));
        assert!(is_valid_transition(Active, Busy));
        assert!(is_valid_transition(Busy, Idle));
        assert!(is_valid_transition(Idle, Active));
    }

    #[test]
    fn test_maintenance_round_trip() {
        assert!(is_valid_transition(Active, Maintenance));
        assert!(is_valid_transition(Maintenance, Active));
        assert!(!is_valid_transition(Busy, Maintenance));
    }

    #[test]
    fn test_error_reachable_from_any_non_terminal() {
        for from in [Inactive, Starting, Active, Busy, Idle, Maintenance, Recovering, Stopping] {
            assert!(is_valid_transition(from, Error), "{from} -> error");
        }
        assert!(!is_valid_transition(Shutdown, Error));
    }

    #[test]
    fn test_recovery_loop() {
        assert!(is_valid_transition(Error, Recovering));
        assert!(is_valid_transition(Error, Active));
        assert!(is_valid_transition(Recovering, Active));
        assert!(is_valid_transition(Recovering, Resetting));
        assert!(is_valid_transition(Resetting, Starting));
        assert!(!is_valid_transition(Resetting, Active));
    }

    #[test]
    fn test_shutdown_is_terminal() {
        assert!(is_valid_transition(Stopping, Shutdown));
        assert!(!is_valid_transition(Shutdown, Starting));
        assert!(!is_valid_transition(Shutdown, Stopping));
    }

    #[test]
    fn test_no_self_transitions() {
        for state in [Inactive, Active, Error, Shutdown] {
            assert!(!is_valid_transition(state, state));
        }
    }

    #[test]
    fn test_liveness_exemptions() {
        assert!(is_liveness_monitored(Active));
        assert!(is_liveness_monitored(Error));
        assert!(!is_liveness_monitored(Maintenance));
        assert!(!is_liveness_monitored(Inactive));
        assert!(!is_liveness_monitored(Shutdown));
    }
}
