//! 备用模型状态机
//!
//! ```text
//! Idle -> AttemptPrimary -> Succeeded
//!                        -> AttemptFallback -> Succeeded | Failed
//!                        -> Failed
//! ```
//!
//! 只有 `AttemptPrimary` 能进入 `AttemptFallback`，`AttemptFallback` 之后只有终态，
//! 所以每个请求最多一次备用尝试，与配置的重试次数无关。

use crate::services::ErrorClassification;

/// 备用切换策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub enabled: bool,
    pub has_fallback_model: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteState {
    Idle,
    AttemptPrimary,
    AttemptFallback {
        primary_failure: ErrorClassification,
    },
    Succeeded {
        attempts: u8,
        fallback_used: bool,
    },
    Failed {
        attempts: u8,
        fallback_used: bool,
        last_failure: ErrorClassification,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteEvent {
    Start,
    AttemptSucceeded,
    AttemptFailed(ErrorClassification),
}

impl RouteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RouteState::Succeeded { .. } | RouteState::Failed { .. })
    }
}

/// 状态转移
///
/// 非法事件（例如终态收到新事件）保持原状态。
pub fn transition(state: RouteState, event: RouteEvent, policy: &FallbackPolicy) -> RouteState {
    match (state, event) {
        (RouteState::Idle, RouteEvent::Start) => RouteState::AttemptPrimary,

        (RouteState::AttemptPrimary, RouteEvent::AttemptSucceeded) => RouteState::Succeeded {
            attempts: 1,
            fallback_used: false,
        },
        (RouteState::AttemptPrimary, RouteEvent::AttemptFailed(failure)) => {
            if policy.enabled && policy.has_fallback_model && failure.retryable {
                RouteState::AttemptFallback {
                    primary_failure: failure,
                }
            } else {
                RouteState::Failed {
                    attempts: 1,
                    fallback_used: false,
                    last_failure: failure,
                }
            }
        }

        (RouteState::AttemptFallback { .. }, RouteEvent::AttemptSucceeded) => {
            RouteState::Succeeded {
                attempts: 2,
                fallback_used: true,
            }
        }
        (RouteState::AttemptFallback { .. }, RouteEvent::AttemptFailed(failure)) => {
            RouteState::Failed {
                attempts: 2,
                fallback_used: true,
                last_failure: failure,
            }
        }

        (state, _) => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn retryable() -> ErrorClassification {
        ErrorClassification {
            retryable: true,
            reason: "provider_unavailable".into(),
            code: ErrorCode::ProviderError,
        }
    }

    fn fatal() -> ErrorClassification {
        ErrorClassification {
            retryable: false,
            reason: "authentication_failed".into(),
            code: ErrorCode::AuthError,
        }
    }

    const ON: FallbackPolicy = FallbackPolicy {
        enabled: true,
        has_fallback_model: true,
    };

    #[test]
    fn test_primary_success() {
        let s = transition(RouteState::Idle, RouteEvent::Start, &ON);
        let s = transition(s, RouteEvent::AttemptSucceeded, &ON);
        assert_eq!(
            s,
            RouteState::Succeeded {
                attempts: 1,
                fallback_used: false
            }
        );
    }

    #[test]
    fn test_exactly_one_fallback_even_if_both_retryable() {
        let s = transition(RouteState::AttemptPrimary, RouteEvent::AttemptFailed(retryable()), &ON);
        assert!(matches!(s, RouteState::AttemptFallback { .. }));
        let s = transition(s, RouteEvent::AttemptFailed(retryable()), &ON);
        assert!(s.is_terminal());
        match &s {
            RouteState::Failed {
                attempts,
                fallback_used,
                ..
            } => {
                assert_eq!(*attempts, 2);
                assert!(*fallback_used);
            }
            other => panic!("unexpected {other:?}"),
        }
        // 终态吸收所有事件
        let again = transition(s.clone(), RouteEvent::AttemptFailed(retryable()), &ON);
        assert_eq!(again, s);
    }

    #[test]
    fn test_no_fallback_when_ineligible() {
        let s = transition(RouteState::AttemptPrimary, RouteEvent::AttemptFailed(fatal()), &ON);
        assert!(matches!(s, RouteState::Failed { attempts: 1, .. }));

        let disabled = FallbackPolicy {
            enabled: false,
            has_fallback_model: true,
        };
        let s = transition(
            RouteState::AttemptPrimary,
            RouteEvent::AttemptFailed(retryable()),
            &disabled,
        );
        assert!(matches!(s, RouteState::Failed { attempts: 1, .. }));

        let no_model = FallbackPolicy {
            enabled: true,
            has_fallback_model: false,
        };
        let s = transition(
            RouteState::AttemptPrimary,
            RouteEvent::AttemptFailed(retryable()),
            &no_model,
        );
        assert!(matches!(s, RouteState::Failed { attempts: 1, .. }));
    }

    #[test]
    fn test_fallback_success() {
        let s = transition(RouteState::AttemptPrimary, RouteEvent::AttemptFailed(retryable()), &ON);
        let s = transition(s, RouteEvent::AttemptSucceeded, &ON);
        assert_eq!(
            s,
            RouteState::Succeeded {
                attempts: 2,
                fallback_used: true
            }
        );
    }
}
