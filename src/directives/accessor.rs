use std::sync::Arc;

use serde_json::Value;

use super::validators::ValidatorDirective;
use crate::form::{
    Callback, ControlId, ControlStatus, FormResult, FormTree, SubscriptionId, UpdateOptions,
    ValidatorId,
};

pub type ChangeFn = Arc<dyn Fn(Value) + Send + Sync>;

/// The tree-side hooks installed by [`FormTree::bind_accessor`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AccessorBinding {
    control: ControlId,
    model_change: SubscriptionId,
    disabled_change: SubscriptionId,
}

impl AccessorBinding {
    pub fn control(&self) -> ControlId {
        self.control
    }
}

/// Bridge between a control and the view element that renders it.
pub trait ControlValueAccessor: Send + Sync {
    /// Model to view.
    fn write_value(&self, value: &Value);

    /// Receives the callback the view calls when the user changes the value.
    fn register_on_change(&self, on_change: ChangeFn);

    fn register_on_touched(&self, _on_touched: Callback) {}

    fn set_disabled_state(&self, _disabled: bool) {}
}

impl FormTree {
    /// Wires `accessor` to the control in both directions and pushes the current value into it.
    pub fn bind_accessor<A>(&self, id: ControlId, accessor: Arc<A>) -> FormResult<AccessorBinding>
    where
        A: ControlValueAccessor + 'static,
    {
        accessor.write_value(&self.value(id)?);

        let tree = self.downgrade();
        accessor.register_on_change(Arc::new(move |value| {
            let Some(tree) = tree.upgrade() else {
                return;
            };
            let applied = tree.mark_as_dirty(id, false).and_then(|_| {
                tree.set_value(
                    id,
                    value,
                    UpdateOptions {
                        emit_model_to_view_change: false,
                        ..UpdateOptions::default()
                    },
                )
            });
            if let Err(error) = applied {
                tracing::warn!(control = %id, %error, "failed to apply view change");
            }
        }));

        let tree = self.downgrade();
        accessor.register_on_touched(Arc::new(move || {
            let Some(tree) = tree.upgrade() else {
                return;
            };
            if let Err(error) = tree.mark_as_touched(id, false) {
                tracing::warn!(control = %id, %error, "failed to mark control as touched");
            }
        }));

        let view = accessor.clone();
        let model_change =
            self.register_on_change(id, Arc::new(move |value: &Value| view.write_value(value)))?;

        if self.status(id)? == ControlStatus::Disabled {
            accessor.set_disabled_state(true);
        }
        let view = accessor;
        let disabled_change = self.register_on_disabled_change(
            id,
            Arc::new(move |disabled| view.set_disabled_state(disabled)),
        )?;
        tracing::debug!(control = %id, "bound value accessor");
        Ok(AccessorBinding {
            control: id,
            model_change,
            disabled_change,
        })
    }

    /// Stops model-to-view and disabled-state writes into the accessor behind `binding`.
    pub fn unbind_accessor(&self, binding: AccessorBinding) -> FormResult<()> {
        self.unsubscribe(binding.control, binding.model_change)?;
        self.unsubscribe(binding.control, binding.disabled_change)?;
        tracing::debug!(control = %binding.control, "unbound value accessor");
        Ok(())
    }

    /// Adds `directive` to the control's validators and revalidates the control whenever the
    /// directive reports a change of its inputs.
    pub fn attach_validator<D>(&self, id: ControlId, directive: Arc<D>) -> FormResult<ValidatorId>
    where
        D: ValidatorDirective + 'static,
    {
        let validating = directive.clone();
        let validator_id =
            self.add_validator_fn(id, Arc::new(move |value: &Value| validating.validate(value)))?;

        let tree = self.downgrade();
        directive.register_on_validator_change(Arc::new(move || {
            let Some(tree) = tree.upgrade() else {
                return;
            };
            if let Err(error) = tree.update_value_and_validity(id, UpdateOptions::default()) {
                tracing::warn!(control = %id, %error, "failed to revalidate control");
            }
        }));

        self.update_value_and_validity(id, UpdateOptions::default())?;
        Ok(validator_id)
    }

    pub fn detach_validator<D>(
        &self,
        id: ControlId,
        directive: &D,
        validator: ValidatorId,
    ) -> FormResult<()>
    where
        D: ValidatorDirective,
    {
        directive.register_on_validator_change(Arc::new(|| {}));
        if self.remove_validator(id, validator)? {
            self.update_value_and_validity(id, UpdateOptions::default())?;
        }
        Ok(())
    }
}
