use serde::{Deserialize, Serialize};

/// Lifecycle of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalState {
    Idle,
    BuildingPrompt,
    AwaitingResponse,
    Parsing,
    Scoring,
    Done,
    Failed,
}

impl EvalState {
    /// Whether `next` may follow `self`.
    ///
    /// `Scoring -> BuildingPrompt` covers the next sub-batch.
    pub fn allows(self, next: EvalState) -> bool {
        use EvalState::*;
        matches!(
            (self, next),
            (Idle, BuildingPrompt)
                | (Idle, Done)
                | (BuildingPrompt, AwaitingResponse)
                | (AwaitingResponse, Parsing)
                | (AwaitingResponse, Failed)
                | (Parsing, Scoring)
                | (Parsing, Failed)
                | (Scoring, BuildingPrompt)
                | (Scoring, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EvalState::Done | EvalState::Failed)
    }
}

#[derive(Debug)]
pub(super) struct StateTracker {
    current: EvalState,
}

impl StateTracker {
    pub(super) fn new() -> Self {
        Self {
            current: EvalState::Idle,
        }
    }

    #[cfg(test)]
    pub(super) fn current(&self) -> EvalState {
        self.current
    }

    pub(super) fn advance(&mut self, next: EvalState) {
        let allowed = self.current.allows(next);
        debug_assert!(allowed, "illegal transition {:?} -> {next:?}", self.current);
        if !allowed {
            log::error!("illegal evaluator transition {:?} -> {next:?}", self.current);
        }
        log::debug!("evaluator state {:?} -> {next:?}", self.current);
        self.current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::EvalState::*;
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [Idle, BuildingPrompt, AwaitingResponse, Parsing, Scoring, Done];
        assert!(path.windows(2).all(|w| w[0].allows(w[1])));
    }

    #[test]
    fn failure_only_from_response_or_parsing() {
        for state in [Idle, BuildingPrompt, Scoring, Done, Failed] {
            assert!(!state.allows(Failed), "{state:?} must not fail");
        }
        assert!(AwaitingResponse.allows(Failed));
        assert!(Parsing.allows(Failed));
    }

    #[test]
    fn terminal_states_are_final() {
        for next in [Idle, BuildingPrompt, AwaitingResponse, Parsing, Scoring, Done, Failed] {
            assert!(!Done.allows(next));
            assert!(!Failed.allows(next));
        }
        assert!(Done.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn tracker_follows_transitions() {
        let mut tracker = StateTracker::new();
        tracker.advance(Done);
        assert_eq!(tracker.current(), Done);
    }
}
