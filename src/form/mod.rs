mod array;
mod builder;
mod control;
mod group;
mod node;
mod tree;
mod validation;


pub use calmforms_derive::FormModel;
pub use serde_json::Value;

pub use array::FormArray;
pub use builder::{FieldKey, FormBuilder, FormModel};
pub use control::{AbstractControl, ControlOptions, ControlRef, FormControl};
pub use group::{FormGroup, FormRecord};
pub use tree::{
    Callback, ChildKey, ControlId, ControlStatus, DisabledListener, FormError, FormResult,
    FormTree, StatusListener, SubscriptionId, UpdateOptions, ValidationTicket, ValidatorId,
    ValueListener, WeakFormTree,
};
pub use validation::{
    AsyncValidationFuture, AsyncValidator, Pattern, ValidationErrors, Validator, ValidatorFn,
    Validators, email_validator, is_empty_input_value, merge_errors, null_validator,
    required_true_validator, required_validator,
};

pub(crate) use validation::numeric_value;
