use std::sync::Arc;

use serde_json::Value;

use super::array::FormArray;
use super::group::FormGroup;
use super::node::{ControlNode, NodeKind, unbox_form_state};
use super::tree::{
    ControlId, ControlStatus, FormResult, FormTree, SubscriptionId, UpdateOptions, ValueListener,
};
use super::validation::{AsyncValidator, AsyncValidatorEntry, ValidationErrors, ValidatorFn};

/// Construction-time configuration shared by every control kind.
#[derive(Clone, Default)]
pub struct ControlOptions {
    pub validators: Vec<ValidatorFn>,
    pub async_validators: Vec<Arc<dyn AsyncValidator>>,
    /// Reset falls back to the initial value instead of `null`.
    pub non_nullable: bool,
}

impl ControlOptions {
    pub fn validators(mut self, validators: impl IntoIterator<Item = ValidatorFn>) -> Self {
        self.validators.extend(validators);
        self
    }

    pub fn async_validator(mut self, validator: Arc<dyn AsyncValidator>) -> Self {
        self.async_validators.push(validator);
        self
    }

    pub fn non_nullable(mut self, non_nullable: bool) -> Self {
        self.non_nullable = non_nullable;
        self
    }
}

/// Shared surface of leaf and composite controls.
pub trait AbstractControl {
    fn tree(&self) -> &FormTree;
    fn id(&self) -> ControlId;

    fn value(&self) -> FormResult<Value> {
        self.tree().value(self.id())
    }

    fn raw_value(&self) -> FormResult<Value> {
        self.tree().raw_value(self.id())
    }

    fn status(&self) -> FormResult<ControlStatus> {
        self.tree().status(self.id())
    }

    fn valid(&self) -> FormResult<bool> {
        Ok(self.status()? == ControlStatus::Valid)
    }

    fn invalid(&self) -> FormResult<bool> {
        Ok(self.status()? == ControlStatus::Invalid)
    }

    fn pending(&self) -> FormResult<bool> {
        Ok(self.status()? == ControlStatus::Pending)
    }

    fn disabled(&self) -> FormResult<bool> {
        Ok(self.status()? == ControlStatus::Disabled)
    }

    fn enabled(&self) -> FormResult<bool> {
        Ok(self.status()? != ControlStatus::Disabled)
    }

    fn errors(&self) -> FormResult<Option<ValidationErrors>> {
        self.tree().errors(self.id())
    }

    fn has_error(&self, code: &str) -> FormResult<bool> {
        Ok(self.errors()?.is_some_and(|errors| errors.contains_key(code)))
    }

    fn get_error(&self, code: &str) -> FormResult<Option<Value>> {
        Ok(self.errors()?.and_then(|mut errors| errors.remove(code)))
    }

    fn parent(&self) -> FormResult<Option<ControlId>> {
        self.tree().parent(self.id())
    }

    fn pristine(&self) -> FormResult<bool> {
        self.tree().is_pristine(self.id())
    }

    fn dirty(&self) -> FormResult<bool> {
        Ok(!self.pristine()?)
    }

    fn touched(&self) -> FormResult<bool> {
        self.tree().is_touched(self.id())
    }

    fn set_value(&self, value: impl Into<Value>) -> FormResult<()>
    where
        Self: Sized,
    {
        self.tree()
            .set_value(self.id(), value.into(), UpdateOptions::default())
    }

    fn set_value_with(&self, value: impl Into<Value>, options: UpdateOptions) -> FormResult<()>
    where
        Self: Sized,
    {
        self.tree().set_value(self.id(), value.into(), options)
    }

    fn patch_value(&self, value: impl Into<Value>) -> FormResult<()>
    where
        Self: Sized,
    {
        self.tree()
            .patch_value(self.id(), value.into(), UpdateOptions::default())
    }

    fn reset(&self) -> FormResult<()> {
        self.tree()
            .reset(self.id(), None, UpdateOptions::default())
    }

    fn reset_to(&self, value: impl Into<Value>) -> FormResult<()>
    where
        Self: Sized,
    {
        self.tree()
            .reset(self.id(), Some(value.into()), UpdateOptions::default())
    }

    fn update_value_and_validity(&self) -> FormResult<()> {
        self.tree()
            .update_value_and_validity(self.id(), UpdateOptions::default())
    }

    fn enable(&self) -> FormResult<()> {
        self.tree().enable(self.id(), UpdateOptions::default())
    }

    fn disable(&self) -> FormResult<()> {
        self.tree().disable(self.id(), UpdateOptions::default())
    }

    fn mark_as_touched(&self) -> FormResult<()> {
        self.tree().mark_as_touched(self.id(), false)
    }

    fn mark_all_as_touched(&self) -> FormResult<()> {
        self.tree().mark_all_as_touched(self.id())
    }

    fn mark_as_untouched(&self) -> FormResult<()> {
        self.tree().mark_as_untouched(self.id(), false)
    }

    fn mark_as_dirty(&self) -> FormResult<()> {
        self.tree().mark_as_dirty(self.id(), false)
    }

    fn mark_as_pristine(&self) -> FormResult<()> {
        self.tree().mark_as_pristine(self.id(), false)
    }

    fn value_changes(
        &self,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId>
    where
        Self: Sized,
    {
        self.tree().subscribe_value_changes(self.id(), listener)
    }

    fn status_changes(
        &self,
        listener: impl Fn(ControlStatus) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId>
    where
        Self: Sized,
    {
        self.tree().subscribe_status_changes(self.id(), listener)
    }

    fn find(&self, path: &str) -> FormResult<Option<ControlId>> {
        self.tree().find(self.id(), path)
    }
}

/// Typed view over any node of a [`FormTree`].
#[derive(Clone)]
pub enum ControlRef {
    Control(FormControl),
    Group(FormGroup),
    Array(FormArray),
}

impl AbstractControl for ControlRef {
    fn tree(&self) -> &FormTree {
        match self {
            ControlRef::Control(control) => control.tree(),
            ControlRef::Group(group) => group.tree(),
            ControlRef::Array(array) => array.tree(),
        }
    }

    fn id(&self) -> ControlId {
        match self {
            ControlRef::Control(control) => control.id(),
            ControlRef::Group(group) => group.id(),
            ControlRef::Array(array) => array.id(),
        }
    }
}

#[derive(Clone)]
pub struct FormControl {
    tree: FormTree,
    id: ControlId,
}

impl AbstractControl for FormControl {
    fn tree(&self) -> &FormTree {
        &self.tree
    }

    fn id(&self) -> ControlId {
        self.id
    }
}

impl FormControl {
    pub fn default_value(&self) -> FormResult<Value> {
        self.tree.read("reading default value", |state| {
            match &state.node(self.id)?.kind {
                NodeKind::Control { default_value } => Ok(default_value.clone()),
                _ => Ok(Value::Null),
            }
        })
    }

    pub fn register_on_change(
        &self,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        let listener: ValueListener = Arc::new(listener);
        self.tree.register_on_change(self.id, listener)
    }
}

impl FormTree {
    pub fn control(&self, form_state: impl Into<Value>) -> FormResult<FormControl> {
        self.control_with(form_state, ControlOptions::default())
    }

    /// Creates a detached leaf control. A `{value, disabled}` object is
    /// unboxed into the initial value and disabled state.
    pub fn control_with(
        &self,
        form_state: impl Into<Value>,
        options: ControlOptions,
    ) -> FormResult<FormControl> {
        let (value, disabled) = unbox_form_state(form_state.into());
        let default_value = if options.non_nullable {
            value.clone()
        } else {
            Value::Null
        };
        let id = self.insert_node(
            ControlNode::new(NodeKind::Control { default_value }, value),
            options,
            disabled.unwrap_or(false),
        )?;
        Ok(FormControl {
            tree: self.clone(),
            id,
        })
    }

    pub fn handle(&self, id: ControlId) -> FormResult<ControlRef> {
        self.read("resolving control handle", |state| {
            Ok(match state.node(id)?.kind {
                NodeKind::Control { .. } => ControlRef::Control(FormControl {
                    tree: self.clone(),
                    id,
                }),
                NodeKind::Group(_) => ControlRef::Group(FormGroup::from_parts(self.clone(), id)),
                NodeKind::Array(_) => ControlRef::Array(FormArray::from_parts(self.clone(), id)),
            })
        })
    }

    pub fn control_handle(&self, id: ControlId) -> FormResult<Option<FormControl>> {
        Ok(match self.handle(id)? {
            ControlRef::Control(control) => Some(control),
            _ => None,
        })
    }

    pub(super) fn insert_node(
        &self,
        mut node: ControlNode,
        options: ControlOptions,
        disabled: bool,
    ) -> FormResult<ControlId> {
        let async_validators = options.async_validators;
        self.mutate("creating control", |state, out| {
            for validator in options.validators {
                node.validators
                    .push((super::tree::ValidatorId(state.allocate()), validator));
            }
            for validator in async_validators {
                node.async_validators.push((
                    super::tree::ValidatorId(state.allocate()),
                    AsyncValidatorEntry::new(validator),
                ));
            }
            if disabled {
                node.status = ControlStatus::Disabled;
            }
            let id = state.insert(node);
            state.update_value_and_validity(id, UpdateOptions::silent().for_child(), out)?;
            tracing::debug!(control = %id, "created control");
            Ok(id)
        })
    }
}
