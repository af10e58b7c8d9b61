//! Error types and validation functions for change-point analysis.
//!
//! Validation failures are raised before any sampling work begins. Convergence problems are
//! never errors: they travel as [`crate::diagnostics::ConvergenceWarning`]s on the result.

use chrono::NaiveDate;
use thiserror::Error;

/// Error types for change-point analysis operations.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ChangePointError {
    /// Series is too short for the requested analysis.
    #[error("Insufficient data: need more than {required} observations, got {actual}")]
    InsufficientData {
        /// Length the series must exceed
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// Number of change points is too large for the series length.
    #[error(
        "Too many change points: K = {num_change_points} needs more than {required} observations, got {actual}"
    )]
    TooManyChangePoints {
        /// Requested number of change points
        num_change_points: usize,
        /// Length the series must exceed
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// Invalid parameter value for analysis configuration.
    #[error("Invalid parameter: {parameter} = {value}, expected {constraint}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value provided
        value: f64,
        /// Valid range or constraint description
        constraint: String,
    },

    /// Dates are not strictly increasing.
    #[error("Dates must be strictly increasing: {previous} followed by {current} at position {index}")]
    NonMonotonicDates {
        /// Position of the offending observation
        index: usize,
        /// Date of the preceding observation
        previous: NaiveDate,
        /// Date of the offending observation
        current: NaiveDate,
    },

    /// A value is NaN or infinite.
    #[error("{name} contains non-finite value at index {index}: {value}")]
    NonFiniteValue {
        /// Name of the offending input
        name: String,
        /// Position of the value
        index: usize,
        /// The value itself
        value: f64,
    },

    /// Log returns were requested for a series with a non-positive price.
    #[error("Non-positive price at index {index}: {value}")]
    NonPositivePrice {
        /// Position of the price
        index: usize,
        /// The price
        value: f64,
    },

    /// Posterior density is non-finite everywhere the sampler could start.
    #[error("Numerical instability: {message}")]
    NumericalInstability {
        /// Description of the instability
        message: String,
    },

    /// No series registered under the requested name.
    #[error("Series not found: {name}")]
    SeriesNotFound {
        /// Requested name
        name: String,
    },
}

impl ChangePointError {
    /// Whether this error belongs to the validation family (raised before sampling).
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. }
                | Self::TooManyChangePoints { .. }
                | Self::InvalidParameter { .. }
                | Self::NonMonotonicDates { .. }
                | Self::NonFiniteValue { .. }
                | Self::NonPositivePrice { .. }
        )
    }
}

/// Result type for change-point analysis operations.
pub type ChangePointResult<T> = Result<T, ChangePointError>;

/// Validates that data has at least `min_required` points.
///
/// # Example
/// ```rust
/// use bayes_breaks::errors::validate_data_length;
///
/// let data = vec![1.0, 2.0, 3.0];
/// assert!(validate_data_length(&data, 2).is_ok());
/// assert!(validate_data_length(&data, 5).is_err());
/// ```
pub fn validate_data_length(data: &[f64], min_required: usize) -> ChangePointResult<()> {
    if data.len() < min_required {
        Err(ChangePointError::InsufficientData {
            required: min_required.saturating_sub(1),
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}

/// Validates that a parameter lies within `[min, max]`.
///
/// # Example
/// ```rust
/// use bayes_breaks::errors::validate_parameter;
///
/// assert!(validate_parameter(1.05, 1.0, 2.0, "max_rhat").is_ok());
/// assert!(validate_parameter(0.5, 1.0, 2.0, "max_rhat").is_err());
/// ```
pub fn validate_parameter(value: f64, min: f64, max: f64, name: &str) -> ChangePointResult<()> {
    if value.is_nan() {
        return Err(ChangePointError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: "must not be NaN".to_string(),
        });
    }

    if value < min || value > max {
        Err(ChangePointError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: format!("[{}, {}]", min, max),
        })
    } else {
        Ok(())
    }
}

/// Validates that a parameter is strictly positive and finite.
pub fn validate_positive(value: f64, name: &str) -> ChangePointResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ChangePointError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: "finite and > 0".to_string(),
        })
    }
}

/// Validates that all values in a slice are finite, reporting the first offender.
///
/// # Example
/// ```rust
/// use bayes_breaks::errors::validate_all_finite;
///
/// assert!(validate_all_finite(&[1.0, 2.0], "prices").is_ok());
/// assert!(validate_all_finite(&[1.0, f64::NAN], "prices").is_err());
/// ```
pub fn validate_all_finite(data: &[f64], name: &str) -> ChangePointResult<()> {
    match data.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        Some((index, &value)) => Err(ChangePointError::NonFiniteValue {
            name: name.to_string(),
            index,
            value,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_data_length() {
        let data = vec![1.0, 2.0];
        match validate_data_length(&data, 5) {
            Err(ChangePointError::InsufficientData { required, actual }) => {
                assert_eq!(required, 4);
                assert_eq!(actual, 2);
            }
            other => panic!("Expected InsufficientData, got {:?}", other),
        }
        assert!(validate_data_length(&data, 2).is_ok());
    }

    #[test]
    fn test_validate_parameter_bounds() {
        assert!(validate_parameter(0.0, 0.0, 1.0, "p").is_ok());
        assert!(validate_parameter(1.0, 0.0, 1.0, "p").is_ok());

        match validate_parameter(1.5, 0.0, 1.0, "credible_mass") {
            Err(ChangePointError::InvalidParameter {
                parameter,
                value,
                constraint,
            }) => {
                assert_eq!(parameter, "credible_mass");
                assert_eq!(value, 1.5);
                assert_eq!(constraint, "[0, 1]");
            }
            other => panic!("Expected InvalidParameter, got {:?}", other),
        }

        assert!(validate_parameter(f64::NAN, 0.0, 1.0, "p").is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(0.1, "scale").is_ok());
        assert!(validate_positive(0.0, "scale").is_err());
        assert!(validate_positive(f64::INFINITY, "scale").is_err());
    }

    #[test]
    fn test_validate_all_finite_reports_first_offender() {
        let data = vec![1.0, f64::INFINITY, f64::NAN];
        match validate_all_finite(&data, "returns") {
            Err(ChangePointError::NonFiniteValue { name, index, .. }) => {
                assert_eq!(name, "returns");
                assert_eq!(index, 1);
            }
            other => panic!("Expected NonFiniteValue, got {:?}", other),
        }
        assert!(validate_all_finite(&[], "empty").is_ok());
    }

    #[test]
    fn test_validation_family() {
        let err = ChangePointError::InsufficientData {
            required: 100,
            actual: 10,
        };
        assert!(err.is_validation_error());
        assert!(format!("{}", err).contains("need more than 100"));

        let err = ChangePointError::NumericalInstability {
            message: "all chains".to_string(),
        };
        assert!(!err.is_validation_error());
    }
}
