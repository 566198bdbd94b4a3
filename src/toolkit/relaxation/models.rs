use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};


#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FallbackStage {
    Primary,
    Relaxed,
    Broadened,
    NearestCached,
    LocalModel,
    Failed,
    Done,
}

impl FallbackStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Done)
    }

    /// Every non-terminal transition strictly increases this.
    fn rank(&self) -> u8 {
        match self {
            Self::Primary => 0,
            Self::NearestCached => 1,
            Self::LocalModel => 2,
            Self::Relaxed => 3,
            Self::Broadened => 4,
            Self::Failed | Self::Done => 5,
        }
    }

    pub fn strategy(&self) -> FallbackStrategy {
        match self {
            Self::Relaxed => FallbackStrategy::RelaxTerms,
            Self::Broadened => FallbackStrategy::BroadenGrammar,
            Self::NearestCached => FallbackStrategy::NearestCached,
            Self::LocalModel => FallbackStrategy::LocalModel,
            Self::Primary | Self::Failed | Self::Done => FallbackStrategy::None,
        }
    }
}


#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FallbackStrategy {
    #[default]
    None,
    RelaxTerms,
    BroadenGrammar,
    NearestCached,
    LocalModel,
}


#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FallbackReason {
    #[default]
    None,
    ThinResults,
    ExpansionFailed,
    NoCachedMatch,
    LocalModelFailed,
    ExecutionFailed,
    BudgetExceeded,
    BuildFailed,
    Unexpected,
}


/// Observations that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackSignal {
    Enough,
    ThinResults,
    ExpansionFailed,
    NoCachedMatch,
    LocalModelFailed,
    ExecutionFailed,
    BudgetExceeded,
    /// Nothing could be built from the expansion; go straight to the floor.
    BuildFailed,
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackState {
    pub attempt_index: u32,
    pub stage: FallbackStage,
    pub strategy: FallbackStrategy,
    pub reason: FallbackReason,
    pub history: Vec<FallbackStage>,
}

impl Default for FallbackState {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackState {
    pub fn new() -> Self {
        Self {
            attempt_index: 0,
            stage: FallbackStage::Primary,
            strategy: FallbackStrategy::None,
            reason: FallbackReason::None,
            history: vec![FallbackStage::Primary],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    fn relaxations_used(&self) -> usize {
        self.history
            .iter()
            .filter(|s| matches!(s, FallbackStage::Relaxed | FallbackStage::Broadened))
            .count()
    }

    /// Applies one observation. Terminal stages absorb every signal.
    pub fn advance(&mut self, signal: FallbackSignal, max_relaxations: usize) -> FallbackStage {
        use FallbackSignal as S;
        use FallbackStage as St;

        if self.stage.is_terminal() {
            return self.stage;
        }

        let relax_left = self.relaxations_used() < max_relaxations;
        let (next, reason) = match (self.stage, signal) {
            (_, S::Enough) => (St::Done, self.reason),
            (_, S::ExecutionFailed) => (St::Failed, FallbackReason::ExecutionFailed),
            (_, S::BudgetExceeded) => (St::Failed, FallbackReason::BudgetExceeded),
            (_, S::BuildFailed) => (St::Failed, FallbackReason::BuildFailed),

            (St::Primary | St::NearestCached | St::LocalModel, S::ThinResults) if relax_left => {
                (St::Relaxed, FallbackReason::ThinResults)
            }
            (St::Relaxed, S::ThinResults) if relax_left => (St::Broadened, FallbackReason::ThinResults),
            (_, S::ThinResults) => (St::Failed, FallbackReason::ThinResults),

            (St::Primary, S::ExpansionFailed) => (St::NearestCached, FallbackReason::ExpansionFailed),
            (St::NearestCached, S::NoCachedMatch) => (St::LocalModel, FallbackReason::NoCachedMatch),
            (St::LocalModel, S::LocalModelFailed) => (St::Failed, FallbackReason::LocalModelFailed),
            _ => (St::Failed, FallbackReason::Unexpected),
        };

        debug_assert!(next.rank() > self.stage.rank());
        self.attempt_index += 1;
        self.stage = next;
        self.reason = reason;
        if !next.is_terminal() {
            self.strategy = next.strategy();
        }
        self.history.push(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_thin_then_enough() {
        let mut state = FallbackState::new();
        assert_eq!(state.advance(FallbackSignal::ThinResults, 2), FallbackStage::Relaxed);
        assert_eq!(state.advance(FallbackSignal::Enough, 2), FallbackStage::Done);
        assert_eq!(
            state.history,
            vec![FallbackStage::Primary, FallbackStage::Relaxed, FallbackStage::Done]
        );
        assert_eq!(state.strategy, FallbackStrategy::RelaxTerms);
        assert_eq!(state.attempt_index, 2);
    }

    #[test]
    fn test_relaxation_budget() {
        let mut state = FallbackState::new();
        state.advance(FallbackSignal::ThinResults, 2);
        assert_eq!(state.advance(FallbackSignal::ThinResults, 2), FallbackStage::Broadened);
        assert_eq!(state.advance(FallbackSignal::ThinResults, 2), FallbackStage::Failed);

        let mut none = FallbackState::new();
        assert_eq!(none.advance(FallbackSignal::ThinResults, 0), FallbackStage::Failed);
    }

    #[test]
    fn test_expansion_failure_chain() {
        let mut state = FallbackState::new();
        assert_eq!(state.advance(FallbackSignal::ExpansionFailed, 2), FallbackStage::NearestCached);
        assert_eq!(state.advance(FallbackSignal::NoCachedMatch, 2), FallbackStage::LocalModel);
        assert_eq!(state.advance(FallbackSignal::LocalModelFailed, 2), FallbackStage::Failed);
        assert_eq!(state.reason, FallbackReason::LocalModelFailed);
        assert_eq!(state.advance(FallbackSignal::Enough, 2), FallbackStage::Failed);
    }

    #[test]
    fn test_budget_exceeded_goes_to_failed() {
        let mut state = FallbackState::new();
        assert_eq!(state.advance(FallbackSignal::BudgetExceeded, 2), FallbackStage::Failed);
        assert_eq!(state.reason, FallbackReason::BudgetExceeded);
    }

    fn signal() -> impl Strategy<Value = FallbackSignal> {
        prop_oneof![
            Just(FallbackSignal::Enough),
            Just(FallbackSignal::ThinResults),
            Just(FallbackSignal::ExpansionFailed),
            Just(FallbackSignal::NoCachedMatch),
            Just(FallbackSignal::LocalModelFailed),
            Just(FallbackSignal::ExecutionFailed),
            Just(FallbackSignal::BudgetExceeded),
            Just(FallbackSignal::BuildFailed),
        ]
    }

    proptest! {
        #[test]
        fn prop_never_revisits_primary_and_terminates(
            signals in prop::collection::vec(signal(), 6..12),
            max_relaxations in 0usize..4,
        ) {
            let mut state = FallbackState::new();
            for signal in signals {
                state.advance(signal, max_relaxations);
            }
            prop_assert!(state.is_terminal());
            prop_assert!(!state.history[1..].contains(&FallbackStage::Primary));
            prop_assert!(state.attempt_index <= 5);
        }
    }
}
