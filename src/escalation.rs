//! Strategy escalation state machine
//!
//! `NormalAttempt -> NormalWithProxyAttempt -> StealthAttempt ->
//! StealthWithProxyAttempt`, advancing only on an obstruction
//! (blocked / rate limited). An `error` outcome is terminal wherever it
//! happens. The whole policy is [`next_stage`].

use crate::types::{FetchStatus, FetchStrategy};

/// One attempt stage of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Up to `max_retries` normal tries with backoff on connectivity errors
    Normal,
    NormalProxy,
    Stealth,
    StealthProxy,
}

impl Stage {
    pub fn strategy(self) -> FetchStrategy {
        match self {
            Stage::Normal => FetchStrategy::Normal,
            Stage::NormalProxy => FetchStrategy::NormalProxy,
            Stage::Stealth => FetchStrategy::Stealth,
            Stage::StealthProxy => FetchStrategy::StealthProxy,
        }
    }

    pub fn needs_proxy(self) -> bool {
        self.strategy().uses_proxy()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next(Stage),
    Terminal,
}

/// Transition table. `proxy_available` is whether a geo-targeted proxy can
/// be built for this request.
pub fn next_stage(stage: Stage, outcome: FetchStatus, proxy_available: bool) -> Transition {
    use FetchStatus::*;
    use Stage::*;

    match (stage, outcome) {
        (_, Ok) => Transition::Terminal,

        (Normal, Blocked | RateLimited) if proxy_available => Transition::Next(NormalProxy),
        (Normal, Blocked | RateLimited) => Transition::Next(Stealth),
        (Normal, Error | Empty) => Transition::Terminal,

        (NormalProxy, Blocked | RateLimited | Empty) => Transition::Next(Stealth),
        (NormalProxy, Error) => Transition::Terminal,

        (Stealth, Blocked | RateLimited) if proxy_available => Transition::Next(StealthProxy),
        (Stealth, _) => Transition::Terminal,

        (StealthProxy, _) => Transition::Terminal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [FetchStatus; 5] = [
        FetchStatus::Ok,
        FetchStatus::Blocked,
        FetchStatus::RateLimited,
        FetchStatus::Error,
        FetchStatus::Empty,
    ];

    #[test]
    fn test_ok_always_terminal() {
        for stage in [Stage::Normal, Stage::NormalProxy, Stage::Stealth, Stage::StealthProxy] {
            for proxy in [true, false] {
                assert_eq!(next_stage(stage, FetchStatus::Ok, proxy), Transition::Terminal);
            }
        }
    }

    #[test]
    fn test_normal_escalates_only_on_obstruction() {
        assert_eq!(
            next_stage(Stage::Normal, FetchStatus::Blocked, false),
            Transition::Next(Stage::Stealth)
        );
        assert_eq!(
            next_stage(Stage::Normal, FetchStatus::RateLimited, true),
            Transition::Next(Stage::NormalProxy)
        );
        assert_eq!(
            next_stage(Stage::Normal, FetchStatus::Error, true),
            Transition::Terminal
        );
        assert_eq!(
            next_stage(Stage::Normal, FetchStatus::Empty, true),
            Transition::Terminal
        );
    }

    #[test]
    fn test_normal_proxy_falls_through_to_stealth() {
        for outcome in [FetchStatus::Blocked, FetchStatus::RateLimited, FetchStatus::Empty] {
            assert_eq!(
                next_stage(Stage::NormalProxy, outcome, true),
                Transition::Next(Stage::Stealth)
            );
        }
        assert_eq!(
            next_stage(Stage::NormalProxy, FetchStatus::Error, true),
            Transition::Terminal
        );
    }

    #[test]
    fn test_stealth_proxy_needs_proxy_and_obstruction() {
        assert_eq!(
            next_stage(Stage::Stealth, FetchStatus::Blocked, true),
            Transition::Next(Stage::StealthProxy)
        );
        assert_eq!(
            next_stage(Stage::Stealth, FetchStatus::Blocked, false),
            Transition::Terminal
        );
        assert_eq!(
            next_stage(Stage::Stealth, FetchStatus::Error, true),
            Transition::Terminal
        );
    }

    #[test]
    fn test_stealth_proxy_is_last() {
        for outcome in ALL {
            assert_eq!(
                next_stage(Stage::StealthProxy, outcome, true),
                Transition::Terminal
            );
        }
    }

    #[test]
    fn test_stage_strategy() {
        assert!(Stage::NormalProxy.needs_proxy());
        assert!(!Stage::Stealth.needs_proxy());
        assert_eq!(Stage::StealthProxy.strategy(), FetchStrategy::StealthProxy);
    }
}
