//! Scheduler error types

use std::time::Duration;
use thiserror::Error;

/// Errors returned by the scheduler submission API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error("No tokio runtime available to host the scheduler")]
    NoRuntime,

    #[error("Loop capacity exhausted ({max_loops} loops running)")]
    CapacityExhausted { max_loops: usize },
}

/// Validate an interval before it is enqueued
pub fn validate_interval(interval: Duration) -> Result<Duration, SchedulerError> {
    if interval.is_zero() {
        return Err(SchedulerError::InvalidInterval("interval must be greater than zero".to_string()));
    }
    Ok(interval)
}

/// Build an interval from fractional seconds, rejecting non-positive and non-finite values
pub fn interval_from_secs_f64(secs: f64) -> Result<Duration, SchedulerError> {
    if !secs.is_finite() {
        return Err(SchedulerError::InvalidInterval(format!("{} is not a finite number of seconds", secs)));
    }
    if secs <= 0.0 {
        return Err(SchedulerError::InvalidInterval(format!("{} seconds is not positive", secs)));
    }
    let interval = Duration::try_from_secs_f64(secs)
        .map_err(|e| SchedulerError::InvalidInterval(format!("{} seconds: {}", secs, e)))?;
    validate_interval(interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_rejected() {
        let err = validate_interval(Duration::ZERO).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInterval(_)));
    }

    #[test]
    fn test_positive_interval_accepted() {
        assert_eq!(
            validate_interval(Duration::from_millis(1)).unwrap(),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn test_interval_from_secs() {
        assert_eq!(interval_from_secs_f64(1.5).unwrap(), Duration::from_millis(1500));
        assert!(interval_from_secs_f64(0.0).is_err());
        assert!(interval_from_secs_f64(-3.0).is_err());
        assert!(interval_from_secs_f64(f64::NAN).is_err());
        assert!(interval_from_secs_f64(f64::INFINITY).is_err());
        assert!(interval_from_secs_f64(1e300).is_err());
    }

    #[test]
    fn test_sub_nanosecond_interval_rejected() {
        // Rounds down to Duration::ZERO
        assert!(interval_from_secs_f64(1e-12).is_err());
    }

    #[test]
    fn test_error_display() {
        let err = SchedulerError::CapacityExhausted { max_loops: 4 };
        assert_eq!(err.to_string(), "Loop capacity exhausted (4 loops running)");
    }
}
