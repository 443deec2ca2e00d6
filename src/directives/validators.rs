use std::sync::RwLock;

use regex::Regex;
use serde_json::Value;

use super::changes::{SimpleChange, SimpleChanges};
use super::{read_state, write_state};
use crate::form::{
    Callback, FormResult, Pattern, ValidationErrors, Validator, ValidatorFn, Validators,
    numeric_value,
};

/// A validator whose behaviour can change over time and that announces it.
pub trait ValidatorDirective: Validator {
    /// Single slot: the last registration wins.
    fn register_on_validator_change(&self, callback: Callback);
}

/// Describes one attribute-driven validator: which input it watches, how the
/// raw input is normalised, when the normalised input turns the validator on,
/// and how the validator is built from it.
pub struct AttributeConfig<T> {
    pub input_name: &'static str,
    pub normalize: fn(Option<&Value>) -> T,
    pub enabled: fn(&T) -> bool,
    pub build: fn(&T) -> FormResult<ValidatorFn>,
}

impl<T> Clone for AttributeConfig<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttributeConfig<T> {}

struct AttributeState {
    raw: Option<Value>,
    seen_input: bool,
    enabled: bool,
    validator: ValidatorFn,
    on_change: Option<Callback>,
}

pub struct AttributeValidator<T> {
    config: AttributeConfig<T>,
    state: RwLock<AttributeState>,
}

pub type MaxValidator = AttributeValidator<Option<f64>>;
pub type MinValidator = AttributeValidator<Option<f64>>;
pub type MinLengthValidator = AttributeValidator<Option<usize>>;
pub type MaxLengthValidator = AttributeValidator<Option<usize>>;
pub type RequiredValidator = AttributeValidator<bool>;
pub type CheckboxRequiredValidator = AttributeValidator<bool>;
pub type EmailValidator = AttributeValidator<Option<Value>>;
pub type PatternValidator = AttributeValidator<Option<Pattern>>;

impl<T> AttributeValidator<T> {
    /// Starts disabled with the null validator until the first input arrives.
    pub fn new(config: AttributeConfig<T>) -> Self {
        Self {
            config,
            state: RwLock::new(AttributeState {
                raw: None,
                seen_input: false,
                enabled: false,
                validator: Validators::null_validator(),
                on_change: None,
            }),
        }
    }

    pub fn with_input(config: AttributeConfig<T>, raw: impl Into<Value>) -> FormResult<Self> {
        let directive = Self::new(config);
        directive.set_input(Some(raw.into()))?;
        Ok(directive)
    }

    pub fn input_name(&self) -> &'static str {
        self.config.input_name
    }

    pub fn is_enabled(&self) -> bool {
        read_state(&self.state).enabled
    }

    pub fn raw_input(&self) -> Option<Value> {
        read_state(&self.state).raw.clone()
    }

    /// Reacts only when the watched input is part of `changes`.
    pub fn on_changes(&self, changes: &SimpleChanges) -> FormResult<()> {
        let Some(change) = changes.get(self.config.input_name) else {
            return Ok(());
        };
        let input = (self.config.normalize)(change.current_value.as_ref());
        self.apply(change.current_value.clone(), &input)
    }

    /// Feeds a new raw value for the watched input, as the host would on a binding update.
    pub fn set_input(&self, raw: Option<Value>) -> FormResult<()> {
        let change = {
            let state = read_state(&self.state);
            SimpleChange::new(state.raw.clone(), raw, !state.seen_input)
        };
        self.on_changes(&SimpleChanges::new().with(self.config.input_name, change))
    }

    fn apply(&self, raw: Option<Value>, input: &T) -> FormResult<()> {
        let enabled = (self.config.enabled)(input);
        let validator = if enabled {
            (self.config.build)(input)?
        } else {
            Validators::null_validator()
        };
        let listener = {
            let mut state = write_state(&self.state);
            state.raw = raw;
            state.seen_input = true;
            state.enabled = enabled;
            state.validator = validator;
            state.on_change.clone()
        };
        tracing::trace!(input = self.config.input_name, enabled, "attribute validator updated");
        if let Some(listener) = listener {
            listener();
        }
        Ok(())
    }
}

impl<T> Validator for AttributeValidator<T> {
    fn validate(&self, value: &Value) -> Option<ValidationErrors> {
        let validator = read_state(&self.state).validator.clone();
        validator.validate(value)
    }
}

impl<T> ValidatorDirective for AttributeValidator<T> {
    fn register_on_validator_change(&self, callback: Callback) {
        write_state(&self.state).on_change = Some(callback);
    }
}

fn present<T>(input: &Option<T>) -> bool {
    input.is_some()
}

fn is_on(input: &bool) -> bool {
    *input
}

fn normalize_float(raw: Option<&Value>) -> Option<f64> {
    let raw = raw.filter(|raw| !raw.is_null())?;
    let bound = numeric_value(raw).filter(|bound| bound.is_finite());
    if bound.is_none() {
        tracing::warn!(input = %raw, "ignoring non-numeric validator bound");
    }
    bound
}

fn normalize_integer(raw: Option<&Value>) -> Option<usize> {
    let raw = raw.filter(|raw| !raw.is_null())?;
    let bound = match raw {
        Value::Number(number) => number.as_u64().map(|bound| bound as usize).or_else(|| {
            number
                .as_f64()
                .filter(|bound| bound.is_finite() && *bound >= 0.0)
                .map(|bound| bound.trunc() as usize)
        }),
        Value::String(text) => text.trim().parse::<usize>().ok(),
        _ => None,
    };
    if bound.is_none() {
        tracing::warn!(input = %raw, "ignoring non-integer length bound");
    }
    bound
}

/// HTML boolean attribute semantics: present means on unless it reads `false`.
pub fn boolean_attribute(raw: Option<&Value>) -> bool {
    match raw {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text != "false",
        Some(_) => true,
    }
}

fn normalize_raw(raw: Option<&Value>) -> Option<Value> {
    raw.cloned()
}

/// `email`, `email=""`, `email="true"` and a bound `true` switch the check on.
fn email_enabled(input: &Option<Value>) -> bool {
    match input {
        Some(Value::String(text)) => text.is_empty() || text == "true",
        Some(Value::Bool(flag)) => *flag,
        _ => false,
    }
}

fn normalize_pattern(raw: Option<&Value>) -> Option<Pattern> {
    match raw {
        None | Some(Value::Null) => None,
        Some(Value::String(source)) => Some(Pattern::Source(source.clone())),
        Some(other) => Some(Pattern::Source(other.to_string())),
    }
}

fn build_max(bound: &Option<f64>) -> FormResult<ValidatorFn> {
    Ok(bound.map_or_else(Validators::null_validator, Validators::max))
}

fn build_min(bound: &Option<f64>) -> FormResult<ValidatorFn> {
    Ok(bound.map_or_else(Validators::null_validator, Validators::min))
}

fn build_min_length(bound: &Option<usize>) -> FormResult<ValidatorFn> {
    Ok(bound.map_or_else(Validators::null_validator, Validators::min_length))
}

fn build_max_length(bound: &Option<usize>) -> FormResult<ValidatorFn> {
    Ok(bound.map_or_else(Validators::null_validator, Validators::max_length))
}

fn build_required(_input: &bool) -> FormResult<ValidatorFn> {
    Ok(Validators::required())
}

fn build_required_true(_input: &bool) -> FormResult<ValidatorFn> {
    Ok(Validators::required_true())
}

fn build_email(_input: &Option<Value>) -> FormResult<ValidatorFn> {
    Ok(Validators::email())
}

fn build_pattern(pattern: &Option<Pattern>) -> FormResult<ValidatorFn> {
    match pattern {
        Some(pattern) => Validators::pattern(pattern.clone()),
        None => Ok(Validators::null_validator()),
    }
}

const MAX: AttributeConfig<Option<f64>> = AttributeConfig {
    input_name: "max",
    normalize: normalize_float,
    enabled: present,
    build: build_max,
};

const MIN: AttributeConfig<Option<f64>> = AttributeConfig {
    input_name: "min",
    normalize: normalize_float,
    enabled: present,
    build: build_min,
};

const MIN_LENGTH: AttributeConfig<Option<usize>> = AttributeConfig {
    input_name: "minlength",
    normalize: normalize_integer,
    enabled: present,
    build: build_min_length,
};

const MAX_LENGTH: AttributeConfig<Option<usize>> = AttributeConfig {
    input_name: "maxlength",
    normalize: normalize_integer,
    enabled: present,
    build: build_max_length,
};

const REQUIRED: AttributeConfig<bool> = AttributeConfig {
    input_name: "required",
    normalize: boolean_attribute,
    enabled: is_on,
    build: build_required,
};

const CHECKBOX_REQUIRED: AttributeConfig<bool> = AttributeConfig {
    input_name: "required",
    normalize: boolean_attribute,
    enabled: is_on,
    build: build_required_true,
};

const EMAIL: AttributeConfig<Option<Value>> = AttributeConfig {
    input_name: "email",
    normalize: normalize_raw,
    enabled: email_enabled,
    build: build_email,
};

const PATTERN: AttributeConfig<Option<Pattern>> = AttributeConfig {
    input_name: "pattern",
    normalize: normalize_pattern,
    enabled: present,
    build: build_pattern,
};

impl AttributeValidator<Option<f64>> {
    pub fn max(bound: impl Into<Value>) -> FormResult<Self> {
        Self::with_input(MAX, bound)
    }

    pub fn min(bound: impl Into<Value>) -> FormResult<Self> {
        Self::with_input(MIN, bound)
    }
}

impl AttributeValidator<Option<usize>> {
    pub fn min_length(bound: impl Into<Value>) -> FormResult<Self> {
        Self::with_input(MIN_LENGTH, bound)
    }

    pub fn max_length(bound: impl Into<Value>) -> FormResult<Self> {
        Self::with_input(MAX_LENGTH, bound)
    }
}

impl AttributeValidator<bool> {
    /// Attached as a bare `required` attribute.
    pub fn required() -> FormResult<Self> {
        Self::with_input(REQUIRED, "")
    }

    pub fn checkbox_required() -> FormResult<Self> {
        Self::with_input(CHECKBOX_REQUIRED, "")
    }
}

impl AttributeValidator<Option<Value>> {
    /// Attached as a bare `email` attribute.
    pub fn email() -> FormResult<Self> {
        Self::with_input(EMAIL, "")
    }
}

impl AttributeValidator<Option<Pattern>> {
    pub fn pattern(source: impl Into<String>) -> FormResult<Self> {
        Self::with_input(PATTERN, Value::String(source.into()))
    }

    pub fn pattern_regex(regex: Regex) -> FormResult<Self> {
        let directive = Self::new(PATTERN);
        let raw = Value::String(regex.as_str().to_string());
        directive.apply(Some(raw), &Some(Pattern::Regex(regex)))?;
        Ok(directive)
    }
}
