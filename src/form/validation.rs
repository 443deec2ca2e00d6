use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures::future::BoxFuture;
use futures_timer::Delay;
use regex::Regex;
use serde_json::{Map, Value, json};

use super::tree::{
    ControlId, ControlStatus, FormError, FormResult, FormTree, UpdateOptions, ValidationTicket,
    ValidatorId,
};

/// Error-key to payload. Validators return `None` on success, never an empty map.
pub type ValidationErrors = Map<String, Value>;

pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value) -> Option<ValidationErrors>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> Option<ValidationErrors> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Option<ValidationErrors> {
        (self)(value)
    }
}

pub type ValidatorFn = Arc<dyn Validator>;

pub type AsyncValidationFuture = BoxFuture<'static, Option<ValidationErrors>>;

pub trait AsyncValidator: Send + Sync {
    fn validate(&self, value: Value) -> AsyncValidationFuture;
}

impl<F> AsyncValidator for F
where
    F: Fn(Value) -> AsyncValidationFuture + Send + Sync,
{
    fn validate(&self, value: Value) -> AsyncValidationFuture {
        (self)(value)
    }
}

#[derive(Clone)]
pub(super) struct AsyncValidatorEntry {
    pub(super) debounce: Duration,
    pub(super) validator: Arc<dyn AsyncValidator>,
}

impl AsyncValidatorEntry {
    pub(super) fn new(validator: Arc<dyn AsyncValidator>) -> Self {
        Self {
            debounce: Duration::ZERO,
            validator,
        }
    }
}

/// Folds `next` into `acc`; later keys win.
pub fn merge_errors(
    acc: Option<ValidationErrors>,
    next: Option<ValidationErrors>,
) -> Option<ValidationErrors> {
    match (acc, next) {
        (None, next) => next,
        (acc, None) => acc,
        (Some(mut acc), Some(next)) => {
            acc.extend(next);
            Some(acc)
        }
    }
}

pub(super) fn run_validators<'a>(
    validators: impl IntoIterator<Item = &'a ValidatorFn>,
    value: &Value,
) -> Option<ValidationErrors> {
    validators
        .into_iter()
        .fold(None, |acc, validator| merge_errors(acc, validator.validate(value)))
        .filter(|errors| !errors.is_empty())
}

fn error(key: &str, payload: Value) -> Option<ValidationErrors> {
    let mut errors = Map::new();
    errors.insert(key.to_string(), payload);
    Some(errors)
}

/// `null`, an empty string and an empty array count as "no value".
/// `0` and `false` are values.
pub fn is_empty_input_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn value_length(value: &Value) -> Option<usize> {
    match value {
        Value::String(text) => Some(text.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Strict numeric reading: numbers pass through, strings must parse in full.
/// Integral bounds are reported as integers, so `min(3.0)` reports `3`.
fn bound_value(bound: f64) -> Value {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if bound.fract() == 0.0 && bound.abs() <= EXACT {
        Value::from(bound as i64)
    } else {
        json!(bound)
    }
}

pub(crate) fn numeric_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|number| !number.is_nan())
}

// Total length 1..=254 and local part 1..=64 are checked separately.
static EMAIL_REGEXP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r##"^[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+)*@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"##,
    )
    .expect("email pattern compiles")
});

fn is_email(text: &str) -> bool {
    let length = text.chars().count();
    if !(1..=254).contains(&length) {
        return false;
    }
    match text.find('@') {
        Some(at) if (1..=64).contains(&text[..at].chars().count()) => EMAIL_REGEXP.is_match(text),
        _ => false,
    }
}

pub fn null_validator(_value: &Value) -> Option<ValidationErrors> {
    None
}

pub fn required_validator(value: &Value) -> Option<ValidationErrors> {
    if is_empty_input_value(value) {
        error("required", json!(true))
    } else {
        None
    }
}

pub fn required_true_validator(value: &Value) -> Option<ValidationErrors> {
    if value == &Value::Bool(true) {
        None
    } else {
        error("required", json!(true))
    }
}

/// Empty values pass so that `email` composes with `required`.
pub fn email_validator(value: &Value) -> Option<ValidationErrors> {
    if is_empty_input_value(value) {
        return None;
    }
    match value.as_str() {
        Some(text) if is_email(text) => None,
        _ => error("email", json!(true)),
    }
}

/// Pattern input: a source string (anchored to the full value) or a compiled regex.
#[derive(Clone, Debug)]
pub enum Pattern {
    Source(String),
    Regex(Regex),
}

impl From<&str> for Pattern {
    fn from(source: &str) -> Self {
        Pattern::Source(source.to_string())
    }
}

impl From<String> for Pattern {
    fn from(source: String) -> Self {
        Pattern::Source(source)
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern::Regex(regex)
    }
}

impl Pattern {
    /// Returns the full-match regex and the pattern text reported in errors,
    /// or `None` for an empty source.
    fn compile(&self) -> FormResult<Option<(Regex, String)>> {
        let source = match self {
            Pattern::Source(source) if source.is_empty() => return Ok(None),
            Pattern::Source(source) => source.as_str(),
            Pattern::Regex(regex) => regex.as_str(),
        };
        let required = match self {
            Pattern::Source(source) => {
                let mut anchored = String::with_capacity(source.len() + 2);
                if !source.starts_with('^') {
                    anchored.push('^');
                }
                anchored.push_str(source);
                if !source.ends_with('$') {
                    anchored.push('$');
                }
                anchored
            }
            Pattern::Regex(regex) => regex.as_str().to_string(),
        };
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|error| {
            FormError::InvalidPattern {
                pattern: source.to_string(),
                reason: error.to_string(),
            }
        })?;
        Ok(Some((regex, required)))
    }
}

pub struct Validators;

impl Validators {
    pub fn null_validator() -> ValidatorFn {
        Arc::new(null_validator)
    }

    pub fn required() -> ValidatorFn {
        Arc::new(required_validator)
    }

    pub fn required_true() -> ValidatorFn {
        Arc::new(required_true_validator)
    }

    pub fn email() -> ValidatorFn {
        Arc::new(email_validator)
    }

    /// A non-finite bound never triggers.
    pub fn min(min: f64) -> ValidatorFn {
        Arc::new(move |value: &Value| {
            if !min.is_finite() || is_empty_input_value(value) {
                return None;
            }
            match numeric_value(value) {
                Some(actual) if actual < min => {
                    error("min", json!({ "min": bound_value(min), "actual": value }))
                }
                _ => None,
            }
        })
    }

    /// A non-finite bound never triggers.
    pub fn max(max: f64) -> ValidatorFn {
        Arc::new(move |value: &Value| {
            if !max.is_finite() || is_empty_input_value(value) {
                return None;
            }
            match numeric_value(value) {
                Some(actual) if actual > max => {
                    error("max", json!({ "max": bound_value(max), "actual": value }))
                }
                _ => None,
            }
        })
    }

    pub fn min_length(min_length: usize) -> ValidatorFn {
        Arc::new(move |value: &Value| {
            if is_empty_input_value(value) {
                return None;
            }
            match value_length(value) {
                Some(actual) if actual < min_length => error(
                    "minlength",
                    json!({ "requiredLength": min_length, "actualLength": actual }),
                ),
                _ => None,
            }
        })
    }

    pub fn max_length(max_length: usize) -> ValidatorFn {
        Arc::new(move |value: &Value| match value_length(value) {
            Some(actual) if actual > max_length => error(
                "maxlength",
                json!({ "requiredLength": max_length, "actualLength": actual }),
            ),
            _ => None,
        })
    }

    pub fn pattern(pattern: impl Into<Pattern>) -> FormResult<ValidatorFn> {
        let Some((regex, required)) = pattern.into().compile()? else {
            return Ok(Self::null_validator());
        };
        Ok(Arc::new(move |value: &Value| {
            if is_empty_input_value(value) {
                return None;
            }
            let matched = match value {
                Value::String(text) => regex.is_match(text),
                Value::Number(number) => regex.is_match(&number.to_string()),
                Value::Bool(flag) => regex.is_match(&flag.to_string()),
                _ => false,
            };
            if matched {
                None
            } else {
                error(
                    "pattern",
                    json!({ "requiredPattern": required, "actualValue": value }),
                )
            }
        }))
    }

    /// Merges every validator into one; `None` when there is nothing to compose.
    pub fn compose(validators: impl IntoIterator<Item = ValidatorFn>) -> Option<ValidatorFn> {
        let validators = validators.into_iter().collect::<Vec<_>>();
        if validators.is_empty() {
            return None;
        }
        Some(Arc::new(move |value: &Value| {
            run_validators(validators.iter(), value)
        }))
    }
}

impl FormTree {
    pub fn add_validator<V>(&self, id: ControlId, validator: V) -> FormResult<ValidatorId>
    where
        V: Validator + 'static,
    {
        self.add_validator_fn(id, Arc::new(validator))
    }

    /// Registers without recomputing; call `update_value_and_validity` afterwards.
    pub fn add_validator_fn(&self, id: ControlId, validator: ValidatorFn) -> FormResult<ValidatorId> {
        self.mutate("registering validator", |state, _| {
            let validator_id = ValidatorId(state.allocate());
            state.node_mut(id)?.validators.push((validator_id, validator));
            Ok(validator_id)
        })
    }

    pub fn remove_validator(&self, id: ControlId, validator: ValidatorId) -> FormResult<bool> {
        self.mutate("removing validator", |state, _| {
            let node = state.node_mut(id)?;
            let before = node.validators.len() + node.async_validators.len();
            node.validators.retain(|(existing, _)| *existing != validator);
            node.async_validators
                .retain(|(existing, _)| *existing != validator);
            Ok(before != node.validators.len() + node.async_validators.len())
        })
    }

    pub fn set_validators(
        &self,
        id: ControlId,
        validators: impl IntoIterator<Item = ValidatorFn>,
    ) -> FormResult<Vec<ValidatorId>> {
        let validators = validators.into_iter().collect::<Vec<_>>();
        self.mutate("replacing validators", |state, _| {
            let mut registered = Vec::with_capacity(validators.len());
            let mut entries = Vec::with_capacity(validators.len());
            for validator in validators {
                let validator_id = ValidatorId(state.allocate());
                registered.push(validator_id);
                entries.push((validator_id, validator));
            }
            state.node_mut(id)?.validators = entries;
            Ok(registered)
        })
    }

    pub fn clear_validators(&self, id: ControlId) -> FormResult<()> {
        self.mutate("clearing validators", |state, _| {
            state.node_mut(id)?.validators.clear();
            Ok(())
        })
    }

    pub fn add_async_validator<V>(&self, id: ControlId, validator: V) -> FormResult<ValidatorId>
    where
        V: AsyncValidator + 'static,
    {
        self.add_async_validator_with_debounce(id, 0, validator)
    }

    pub fn add_async_validator_with_debounce<V>(
        &self,
        id: ControlId,
        debounce_ms: u64,
        validator: V,
    ) -> FormResult<ValidatorId>
    where
        V: AsyncValidator + 'static,
    {
        let entry = AsyncValidatorEntry {
            debounce: Duration::from_millis(debounce_ms),
            validator: Arc::new(validator),
        };
        self.mutate("registering async validator", |state, _| {
            let validator_id = ValidatorId(state.allocate());
            state.node_mut(id)?.async_validators.push((validator_id, entry));
            Ok(validator_id)
        })
    }

    /// Runs the async validators of a pending control. Returns the ticket whose
    /// result was applied, or `None` when the control was not pending or a newer
    /// recompute superseded this run.
    pub async fn validate_async(&self, id: ControlId) -> FormResult<Option<ValidationTicket>> {
        let started = self.read("starting async validation", |state| {
            let node = state.node(id)?;
            if node.status != ControlStatus::Pending || node.async_validators.is_empty() {
                return Ok(None);
            }
            let entries = node
                .async_validators
                .iter()
                .map(|(_, entry)| entry.clone())
                .collect::<Vec<_>>();
            Ok(Some((node.ticket, node.value.clone(), entries)))
        })?;
        let Some((ticket, value, entries)) = started else {
            return Ok(None);
        };

        let debounce = entries
            .iter()
            .map(|entry| entry.debounce)
            .max()
            .unwrap_or_default();
        if !debounce.is_zero() {
            Delay::new(debounce).await;
            if !self.is_latest_ticket(id, ticket)? {
                return Ok(None);
            }
        }

        let mut errors = None;
        for entry in entries {
            errors = merge_errors(errors, entry.validator.validate(value.clone()).await);
        }

        self.mutate("finishing async validation", |state, out| {
            if state.node(id)?.ticket != ticket {
                tracing::trace!(control = %id, "dropping stale async validation result");
                return Ok(None);
            }
            state.node_mut(id)?.errors = errors.filter(|errors| !errors.is_empty());
            state.update_controls_errors(id, true, out)?;
            Ok(Some(ticket))
        })
    }

    /// Resolves every pending control under `root`, deepest first.
    pub async fn validate_all_async(&self, root: ControlId) -> FormResult<ControlStatus> {
        let mut pending = self.read("collecting pending controls", |state| state.subtree(root))?;
        pending.reverse();
        for id in pending {
            self.validate_async(id).await?;
        }
        self.status(root)
    }

    fn is_latest_ticket(&self, id: ControlId, ticket: ValidationTicket) -> FormResult<bool> {
        self.read("checking latest validation ticket", |state| {
            Ok(state.node(id)?.ticket == ticket)
        })
    }

    /// Re-runs validation for `id` and every ancestor.
    pub fn revalidate(&self, id: ControlId) -> FormResult<ControlStatus> {
        self.update_value_and_validity(id, UpdateOptions::default())?;
        self.status(id)
    }
}
