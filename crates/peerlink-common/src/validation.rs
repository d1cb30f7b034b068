//! Configuration validation
//!
//! Providers validate their configuration with a [`ValidationChain`] before
//! touching the network. A chain either stops at the first violation
//! (`fail_fast`) or collects every violation into
//! [`ValidationError::Multiple`].

use regex::Regex;

use crate::error::ValidationError;
use crate::utils::split_host_port;

/// A single validation rule
pub trait Validator: Send + Sync {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Ordered list of validators evaluated together
#[derive(Default)]
pub struct ValidationChain {
    fail_fast: bool,
    validators: Vec<Box<dyn Validator>>,
}

impl ValidationChain {
    /// Create a chain that collects all violations
    pub fn all_errors() -> Self {
        Self::default()
    }

    /// Create a chain that stops at the first violation
    pub fn fail_fast() -> Self {
        Self {
            fail_fast: true,
            validators: Vec::new(),
        }
    }

    pub fn add_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn add_assertion(self, is_true: bool, message: impl Into<String>) -> Self {
        self.add_validator(BooleanValidator::new(is_true, message))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        for validator in &self.validators {
            if let Err(e) = validator.validate() {
                if self.fail_fast {
                    return Err(e);
                }
                violations.push(e);
            }
        }

        match violations.len() {
            0 => Ok(()),
            1 => Err(violations.remove(0)),
            _ => Err(ValidationError::Multiple(violations)),
        }
    }
}

impl Validator for ValidationChain {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationChain::validate(self)
    }
}

/// Fails when the field value is empty
pub struct EmptyStringValidator {
    field_name: String,
    field_value: String,
}

impl EmptyStringValidator {
    pub fn new(field_name: impl Into<String>, field_value: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            field_value: field_value.into(),
        }
    }
}

impl Validator for EmptyStringValidator {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.field_value.is_empty() {
            return Err(ValidationError::Required {
                field: self.field_name.clone(),
            });
        }
        Ok(())
    }
}

/// Validates a `host:port` TCP address
pub struct TcpAddressValidator {
    address: String,
}

impl TcpAddressValidator {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Validator for TcpAddressValidator {
    fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidAddress {
            address: self.address.clone(),
            reason,
        };

        let (host, port) = split_host_port(self.address.trim()).map_err(invalid)?;
        let port: u32 = port
            .parse()
            .map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?;

        if host.is_empty() || port > u16::MAX as u32 {
            return Err(invalid("invalid address".to_string()));
        }
        Ok(())
    }
}

/// Fails with the given message when the condition is false
pub struct BooleanValidator {
    check: bool,
    message: String,
}

impl BooleanValidator {
    pub fn new(check: bool, message: impl Into<String>) -> Self {
        Self {
            check,
            message: message.into(),
        }
    }
}

impl Validator for BooleanValidator {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.check {
            return Err(ValidationError::Assertion(self.message.clone()));
        }
        Ok(())
    }
}

/// Runs the inner validator only when the condition holds
pub struct ConditionalValidator<V> {
    condition: bool,
    validator: V,
}

impl<V: Validator> ConditionalValidator<V> {
    pub fn new(condition: bool, validator: V) -> Self {
        Self {
            condition,
            validator,
        }
    }
}

impl<V: Validator> Validator for ConditionalValidator<V> {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.condition {
            return self.validator.validate();
        }
        Ok(())
    }
}

/// Matches an expression against a regular expression
pub struct PatternValidator {
    pattern: String,
    expression: String,
    message: Option<String>,
}

impl PatternValidator {
    pub fn new(pattern: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            expression: expression.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Validator for PatternValidator {
    fn validate(&self) -> Result<(), ValidationError> {
        let matched = Regex::new(&self.pattern)
            .map(|re| re.is_match(&self.expression))
            .unwrap_or(false);
        if matched {
            return Ok(());
        }
        match &self.message {
            Some(message) => Err(ValidationError::Assertion(message.clone())),
            None => Err(ValidationError::Pattern(self.expression.clone())),
        }
    }
}
