//! Error taxonomy shared by every layer.
//!
//! Three classes of failure flow through the stack:
//! - layer sentinels (`CircuitOpen`, `BulkheadFull`, `Timeout`, ...) — unit
//!   variants, comparable with `==`;
//! - cancellation errors (`Canceled`, `DeadlineExceeded`) — surfaced unchanged
//!   from the deepest blocking wait;
//! - operation errors (`Inner(E)`) — whatever the wrapped operation returned,
//!   propagated verbatim so callers can match on their own error values.

use std::fmt;

/// Unified error type returned by every resilience layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResilienceError<E> {
    /// The circuit breaker refused admission.
    CircuitOpen,
    /// The bulkhead's active set and waiting queue are both full.
    BulkheadFull,
    /// Reserved for hosts that wrap `RateLimiter::allow() == false` as an
    /// error; the crate itself signals rate limiting via the bool.
    RateLimitExceeded,
    /// The timeout layer's deadline expired before the operation finished.
    Timeout,
    /// Reserved. The retry layer returns the last operation error instead of
    /// this sentinel; see [`crate::Retry`].
    MaxRetriesExceeded,
    /// The cancellation handle was explicitly cancelled.
    Canceled,
    /// The cancellation handle's deadline passed.
    DeadlineExceeded,
    /// The wrapped operation failed with its own error.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen => write!(f, "circuit breaker is open"),
            Self::BulkheadFull => write!(f, "bulkhead at capacity"),
            Self::RateLimitExceeded => write!(f, "rate limit exceeded"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::MaxRetriesExceeded => write!(f, "max retries exceeded"),
            Self::Canceled => write!(f, "operation canceled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> ResilienceError<E> {
    /// Check if this is the circuit-open sentinel.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }

    /// Check if this is the bulkhead-full sentinel.
    pub fn is_bulkhead_full(&self) -> bool {
        matches!(self, Self::BulkheadFull)
    }

    /// Check if this is the rate-limit sentinel.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded)
    }

    /// Check if this is the timeout sentinel.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Check if this error came from the cancellation handle, either an
    /// explicit cancel or a deadline expiry.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }

    /// Check if this error wraps an operation error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Borrow the operation error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Extract the operation error if this is an `Inner` variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyError(&'static str);

    impl fmt::Display for DummyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for DummyError {}

    #[test]
    fn sentinels_compare_by_identity() {
        assert_eq!(ResilienceError::<DummyError>::CircuitOpen, ResilienceError::CircuitOpen);
        assert_ne!(ResilienceError::<DummyError>::CircuitOpen, ResilienceError::BulkheadFull);
        assert_ne!(ResilienceError::<DummyError>::Canceled, ResilienceError::DeadlineExceeded);
    }

    #[test]
    fn display_messages_name_the_layer() {
        let open: ResilienceError<io::Error> = ResilienceError::CircuitOpen;
        assert!(open.to_string().contains("circuit breaker"));

        let full: ResilienceError<io::Error> = ResilienceError::BulkheadFull;
        assert!(full.to_string().contains("bulkhead"));

        let timeout: ResilienceError<io::Error> = ResilienceError::Timeout;
        assert!(timeout.to_string().contains("timed out"));
    }

    #[test]
    fn inner_display_is_verbatim() {
        let err = ResilienceError::Inner(DummyError("connection refused"));
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn source_points_at_operation_error() {
        let err: ResilienceError<DummyError> = ResilienceError::Inner(DummyError("boom"));
        assert!(err.source().is_some());

        let sentinel: ResilienceError<DummyError> = ResilienceError::Timeout;
        assert!(sentinel.source().is_none());
    }

    #[test]
    fn predicates_cover_all_variants() {
        assert!(ResilienceError::<DummyError>::CircuitOpen.is_circuit_open());
        assert!(ResilienceError::<DummyError>::BulkheadFull.is_bulkhead_full());
        assert!(ResilienceError::<DummyError>::RateLimitExceeded.is_rate_limited());
        assert!(ResilienceError::<DummyError>::Timeout.is_timeout());
        assert!(ResilienceError::<DummyError>::Canceled.is_cancellation());
        assert!(ResilienceError::<DummyError>::DeadlineExceeded.is_cancellation());
        assert!(ResilienceError::Inner(DummyError("x")).is_inner());
        assert!(!ResilienceError::<DummyError>::Timeout.is_cancellation());
    }

    #[test]
    fn inner_accessors_extract_operation_error() {
        let err = ResilienceError::Inner(DummyError("x"));
        assert_eq!(err.as_inner(), Some(&DummyError("x")));
        assert_eq!(err.into_inner(), Some(DummyError("x")));

        let sentinel: ResilienceError<DummyError> = ResilienceError::CircuitOpen;
        assert!(sentinel.as_inner().is_none());
        assert!(sentinel.into_inner().is_none());
    }
}
