//! Error taxonomy shared by every flow and combinator.
//!
//! Combinators never swallow errors unless their contract says so
//! (`recover`, `parallel_successful`); everything else forwards the first
//! failure downstream and cancels sibling work. A pipeline run therefore
//! yields either its complete result or exactly one `FlowError`.

use std::time::Duration;

/// Failure kinds raised uniformly across the engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlowError {
    /// Invalid combinator or factory arguments. Raised by constructors,
    /// never observed while a stream is running.
    #[error("invalid flow configuration: {0}")]
    Configuration(String),

    /// A wrapped flow's processing logic failed.
    #[error("flow execution failed: {0}")]
    Execution(String),

    /// A deadline elapsed before the next item arrived.
    #[error("flow timed out after {0:?}")]
    Timeout(Duration),

    /// Every retry attempt failed; carries the final underlying cause.
    #[error("retries exhausted after {attempts} attempts")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        cause: Box<FlowError>,
    },

    /// Call rejected without invoking the wrapped flow: the breaker is open.
    #[error("circuit breaker open; call rejected")]
    CircuitOpen,

    /// Malformed input item rejected before processing.
    #[error("invalid input item: {0}")]
    Validation(String),
}

impl FlowError {
    /// Shorthand for a configuration failure.
    pub fn configuration(message: impl Into<String>) -> Self {
        FlowError::Configuration(message.into())
    }

    /// Shorthand for an execution failure.
    pub fn execution(message: impl Into<String>) -> Self {
        FlowError::Execution(message.into())
    }

    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        FlowError::Validation(message.into())
    }

    /// Wrap the final failure of a retry loop.
    pub fn exhausted_retries(attempts: u32, cause: FlowError) -> Self {
        FlowError::ExhaustedRetries {
            attempts,
            cause: Box::new(cause),
        }
    }

    /// True when the error terminates a stream without the wrapped flow
    /// having run at all.
    pub fn is_rejection(&self) -> bool {
        matches!(self, FlowError::CircuitOpen | FlowError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_kind() {
        let err = FlowError::execution("boom");
        assert_eq!(err.to_string(), "flow execution failed: boom");

        let err = FlowError::Timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn exhausted_retries_keeps_the_cause() {
        let err = FlowError::exhausted_retries(3, FlowError::execution("flaky"));
        let FlowError::ExhaustedRetries { attempts, cause } = &err else {
            panic!("expected ExhaustedRetries, got {err:?}");
        };
        assert_eq!(*attempts, 3);
        assert!(matches!(cause.as_ref(), FlowError::Execution(_)));
    }
}
