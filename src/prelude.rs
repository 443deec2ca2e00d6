pub use crate::directives::{
    ControlValueAccessor, RadioControlRegistry, RadioControlValueAccessor, RadioInputs,
    SimpleChange, SimpleChanges, ValidatorDirective,
};
pub use crate::form::{
    AbstractControl, ControlId, ControlOptions, ControlStatus, FieldKey, FormArray, FormBuilder,
    FormControl, FormError, FormGroup, FormModel, FormRecord, FormResult, FormTree, UpdateOptions,
    ValidationErrors, Validator, ValidatorFn, Validators, Value,
};
