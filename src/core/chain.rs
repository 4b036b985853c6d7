//! Validator and applier chains registered per configuration name.

use crate::error::{ApplyError, ValidationError};
use std::sync::Arc;

/// Checks a candidate configuration against the one it would replace.
///
/// `prior` is `None` on the first load of a name, which lets a validator
/// enforce immutability only once a value has been committed.
///
/// Implemented for every `Fn(Option<&T>, &T) -> Vec<ValidationError>`.
///
/// # Examples
///
/// ```rust
/// use livecfg::core::Validator;
/// use livecfg::error::ValidationError;
///
/// #[derive(Clone)]
/// struct Limits { max: u32 }
///
/// let validator = |prior: Option<&Limits>, next: &Limits| {
///     let mut errors = Vec::new();
///     if next.max > 100 {
///         errors.push(ValidationError::invalid_field("max", "must be <= 100"));
///     }
///     if prior.is_some_and(|p| p.max != next.max) {
///         errors.push(ValidationError::immutable("max"));
///     }
///     errors
/// };
///
/// assert_eq!(validator.validate(None, &Limits { max: 10 }).len(), 0);
/// assert_eq!(validator.validate(Some(&Limits { max: 10 }), &Limits { max: 200 }).len(), 2);
/// ```
pub trait Validator<T>: Send + Sync {
    /// Return every problem found; an empty vector accepts the candidate.
    fn validate(&self, prior: Option<&T>, candidate: &T) -> Vec<ValidationError>;
}

impl<T, F> Validator<T> for F
where
    F: Fn(Option<&T>, &T) -> Vec<ValidationError> + Send + Sync,
{
    fn validate(&self, prior: Option<&T>, candidate: &T) -> Vec<ValidationError> {
        self(prior, candidate)
    }
}

/// Makes a validated candidate take effect.
///
/// Appliers may record outcomes on the candidate; later appliers in the chain
/// observe them. `prior` is `None` on the first load.
///
/// Implemented for every `Fn(Option<&T>, &mut T) -> Result<(), ApplyError>`.
pub trait Applier<T>: Send + Sync {
    /// Perform the side effects of switching from `prior` to `candidate`.
    ///
    /// # Errors
    ///
    /// An error aborts the reload; appliers after this one do not run.
    fn apply(&self, prior: Option<&T>, candidate: &mut T) -> Result<(), ApplyError>;
}

impl<T, F> Applier<T> for F
where
    F: Fn(Option<&T>, &mut T) -> Result<(), ApplyError> + Send + Sync,
{
    fn apply(&self, prior: Option<&T>, candidate: &mut T) -> Result<(), ApplyError> {
        self(prior, candidate)
    }
}

/// Ordered validators and appliers for one configuration name.
pub struct Chain<T> {
    validators: Vec<Arc<dyn Validator<T>>>,
    appliers: Vec<Arc<dyn Applier<T>>>,
}

impl<T> Chain<T> {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
            appliers: Vec::new(),
        }
    }

    /// Append a validator.
    pub fn push_validator(&mut self, validator: Arc<dyn Validator<T>>) {
        self.validators.push(validator);
    }

    /// Append an applier.
    pub fn push_applier(&mut self, applier: Arc<dyn Applier<T>>) {
        self.appliers.push(applier);
    }

    /// Number of registered validators.
    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Number of registered appliers.
    pub fn applier_count(&self) -> usize {
        self.appliers.len()
    }

    /// Run every validator and collect all of their errors.
    pub fn validate(&self, prior: Option<&T>, candidate: &T) -> Vec<ValidationError> {
        self.validators
            .iter()
            .flat_map(|validator| validator.validate(prior, candidate))
            .collect()
    }

    /// Run the appliers in registration order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing applier.
    pub fn apply(&self, prior: Option<&T>, candidate: &mut T) -> Result<(), ApplyError> {
        for applier in &self.appliers {
            applier.apply(prior, candidate)?;
        }
        Ok(())
    }
}

impl<T> Default for Chain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Chain<T> {
    fn clone(&self) -> Self {
        Self {
            validators: self.validators.clone(),
            appliers: self.appliers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct TestConfig {
        value: i32,
        trail: Vec<&'static str>,
    }

    fn config(value: i32) -> TestConfig {
        TestConfig {
            value,
            trail: Vec::new(),
        }
    }

    #[test]
    fn test_validators_collect_all_errors() {
        let mut chain: Chain<TestConfig> = Chain::new();
        for i in 0..3 {
            chain.push_validator(Arc::new(move |_: Option<&TestConfig>, _: &TestConfig| {
                vec![ValidationError::custom(format!("validator {}", i))]
            }));
        }

        let errors = chain.validate(None, &config(1));
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[2], ValidationError::custom("validator 2"));
    }

    #[test]
    fn test_first_load_sentinel() {
        let mut chain: Chain<TestConfig> = Chain::new();
        chain.push_validator(Arc::new(|prior: Option<&TestConfig>, next: &TestConfig| {
            match prior {
                Some(prior) if prior.value != next.value => vec![ValidationError::immutable("value")],
                _ => Vec::new(),
            }
        }));

        assert!(chain.validate(None, &config(2)).is_empty());
        assert_eq!(chain.validate(Some(&config(1)), &config(2)).len(), 1);
    }

    #[test]
    fn test_all_appliers_run_in_order() {
        let mut chain: Chain<TestConfig> = Chain::new();
        chain.push_applier(Arc::new(|_: Option<&TestConfig>, next: &mut TestConfig| -> Result<(), ApplyError> {
            next.trail.push("first");
            Ok(())
        }));
        chain.push_applier(Arc::new(|_: Option<&TestConfig>, next: &mut TestConfig| -> Result<(), ApplyError> {
            // sees the effect of the first applier
            assert_eq!(next.trail, vec!["first"]);
            next.trail.push("second");
            Ok(())
        }));

        let mut candidate = config(1);
        chain.apply(None, &mut candidate).unwrap();
        assert_eq!(candidate.trail, vec!["first", "second"]);
    }

    #[test]
    fn test_apply_stops_at_first_failure() {
        let mut chain: Chain<TestConfig> = Chain::new();
        chain.push_applier(Arc::new(|_: Option<&TestConfig>, _: &mut TestConfig| -> Result<(), ApplyError> {
            Err(ApplyError::new("boom"))
        }));
        chain.push_applier(Arc::new(|_: Option<&TestConfig>, next: &mut TestConfig| -> Result<(), ApplyError> {
            next.trail.push("unreachable");
            Ok(())
        }));

        let mut candidate = config(1);
        let err = chain.apply(None, &mut candidate).unwrap_err();
        assert_eq!(err.message(), "boom");
        assert!(candidate.trail.is_empty());
    }

    #[test]
    fn test_clone_shares_entries() {
        let mut chain: Chain<TestConfig> = Chain::default();
        chain.push_validator(Arc::new(|_: Option<&TestConfig>, _: &TestConfig| Vec::<ValidationError>::new()));
        let cloned = chain.clone();
        assert_eq!(cloned.validator_count(), 1);
        assert_eq!(cloned.applier_count(), 0);
    }
}
