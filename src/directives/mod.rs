mod accessor;
mod changes;
mod radio;
mod validators;

#[cfg(test)]
mod tests;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use accessor::{AccessorBinding, ChangeFn, ControlValueAccessor};
pub use changes::{SimpleChange, SimpleChanges};
pub use radio::{RadioControlRegistry, RadioControlValueAccessor, RadioInputs};
pub use validators::{
    AttributeConfig, AttributeValidator, CheckboxRequiredValidator, EmailValidator,
    MaxLengthValidator, MaxValidator, MinLengthValidator, MinValidator, PatternValidator,
    RequiredValidator, ValidatorDirective, boolean_attribute,
};

// Directive state is plain data; a panic in a listener must not wedge the directive.
fn read_state<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_state<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
