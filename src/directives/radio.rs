use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;

use super::accessor::{AccessorBinding, ChangeFn, ControlValueAccessor};
use super::{read_state, write_state};
use crate::form::{Callback, ControlId, FormError, FormResult, FormTree};

pub type CheckedListener = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RadioInputs {
    pub name: Option<String>,
    pub form_control_name: Option<String>,
}

impl RadioInputs {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            form_control_name: None,
        }
    }

    pub fn form_control_name(mut self, form_control_name: impl Into<String>) -> Self {
        self.form_control_name = Some(form_control_name.into());
        self
    }
}

struct RadioPair {
    control: Option<ControlId>,
    accessor: Arc<RadioControlValueAccessor>,
}

/// Keeps radio buttons of one group mutually exclusive.
///
/// Two buttons belong to the same group when their controls share a parent
/// and the buttons carry the same name. Registration order is kept and the
/// same accessor may be registered more than once.
pub struct RadioControlRegistry {
    tree: FormTree,
    accessors: RwLock<Vec<RadioPair>>,
}

impl RadioControlRegistry {
    pub fn new(tree: &FormTree) -> Arc<Self> {
        Arc::new(Self {
            tree: tree.clone(),
            accessors: RwLock::new(Vec::new()),
        })
    }

    pub fn tree(&self) -> &FormTree {
        &self.tree
    }

    pub fn len(&self) -> usize {
        read_state(&self.accessors).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&self, control: Option<ControlId>, accessor: Arc<RadioControlValueAccessor>) {
        write_state(&self.accessors).push(RadioPair { control, accessor });
    }

    /// Removes the most recent registration of `accessor`. Returns false when it was not registered.
    pub fn remove(&self, accessor: &RadioControlValueAccessor) -> bool {
        let mut accessors = write_state(&self.accessors);
        let Some(index) = accessors
            .iter()
            .rposition(|pair| std::ptr::eq(Arc::as_ptr(&pair.accessor), accessor))
        else {
            return false;
        };
        accessors.remove(index);
        true
    }

    /// Unchecks every other button of `accessor`'s group.
    pub fn select(&self, accessor: &RadioControlValueAccessor) {
        let siblings = read_state(&self.accessors)
            .iter()
            .filter(|pair| !std::ptr::eq(Arc::as_ptr(&pair.accessor), accessor))
            .filter(|pair| self.is_same_group(pair, accessor))
            .map(|pair| pair.accessor.clone())
            .collect::<Vec<_>>();
        tracing::trace!(
            name = accessor.name().as_deref().unwrap_or_default(),
            siblings = siblings.len(),
            "radio selected"
        );
        for sibling in siblings {
            sibling.fire_uncheck(accessor.value());
        }
    }

    fn is_same_group(&self, pair: &RadioPair, accessor: &RadioControlValueAccessor) -> bool {
        let (Some(control), Some(other)) = (pair.control, accessor.control()) else {
            return false;
        };
        let (Ok(parent), Ok(other_parent)) = (self.tree.parent(control), self.tree.parent(other))
        else {
            return false;
        };
        parent == other_parent && pair.accessor.name() == accessor.name()
    }
}

#[derive(Default)]
struct RadioState {
    name: Option<String>,
    form_control_name: Option<String>,
    control: Option<ControlId>,
    binding: Option<AccessorBinding>,
    checked: bool,
    disabled: bool,
    on_change: Option<ChangeFn>,
    on_touched: Option<Callback>,
    on_checked_change: Option<CheckedListener>,
}

/// One radio button. Checked when the control's value equals the button's value.
pub struct RadioControlValueAccessor {
    value: Value,
    registry: Weak<RadioControlRegistry>,
    state: RwLock<RadioState>,
}

impl RadioControlValueAccessor {
    pub fn new(
        registry: &Arc<RadioControlRegistry>,
        value: impl Into<Value>,
        inputs: RadioInputs,
    ) -> Arc<Self> {
        Arc::new(Self {
            value: value.into(),
            registry: Arc::downgrade(registry),
            state: RwLock::new(RadioState {
                name: inputs.name,
                form_control_name: inputs.form_control_name,
                ..RadioState::default()
            }),
        })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn name(&self) -> Option<String> {
        read_state(&self.state).name.clone()
    }

    pub fn set_name(&self, name: Option<String>) {
        write_state(&self.state).name = name;
    }

    pub fn control(&self) -> Option<ControlId> {
        read_state(&self.state).control
    }

    pub fn is_checked(&self) -> bool {
        read_state(&self.state).checked
    }

    pub fn is_disabled(&self) -> bool {
        read_state(&self.state).disabled
    }

    /// Observes the rendered checked state; fired on every model-to-view write.
    pub fn on_checked_change(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        write_state(&self.state).on_checked_change = Some(Arc::new(listener));
    }

    /// Binds the button to `control` and registers it with the registry.
    pub fn init(self: &Arc<Self>, control: ControlId) -> FormResult<()> {
        self.check_name()?;
        let registry = self.registry.upgrade().ok_or(FormError::RegistryReleased)?;
        let stale = {
            let mut state = write_state(&self.state);
            state.control = Some(control);
            state.binding.take()
        };
        if let Some(stale) = stale {
            unbind(&registry, stale);
        }
        let binding = registry.tree().bind_accessor(control, self.clone())?;
        write_state(&self.state).binding = Some(binding);
        registry.add(Some(control), self.clone());
        tracing::debug!(control = %control, name = ?self.name(), "radio button registered");
        Ok(())
    }

    /// The user picked this button. The view already shows it checked, so the checked
    /// listener is not fired for it.
    pub fn on_change(&self) {
        let on_change = {
            let mut state = write_state(&self.state);
            state.checked = true;
            state.on_change.clone()
        };
        if let Some(on_change) = on_change {
            on_change(self.value.clone());
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.select(self);
        }
    }

    pub fn on_blur(&self) {
        let on_touched = read_state(&self.state).on_touched.clone();
        if let Some(on_touched) = on_touched {
            on_touched();
        }
    }

    /// Called by the registry when another button of the group was picked.
    pub fn fire_uncheck(&self, value: &Value) {
        self.write_value(value);
    }

    /// Detaches the button from its control and leaves the registry.
    pub fn destroy(&self) {
        let binding = {
            let mut state = write_state(&self.state);
            state.on_change = None;
            state.on_touched = None;
            state.binding.take()
        };
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        if let Some(binding) = binding {
            unbind(&registry, binding);
        }
        registry.remove(self);
    }

    fn check_name(&self) -> FormResult<()> {
        let mut state = write_state(&self.state);
        let name = state.name.clone().filter(|name| !name.is_empty());
        let form_control_name = state
            .form_control_name
            .clone()
            .filter(|form_control_name| !form_control_name.is_empty());
        match (name, form_control_name) {
            (Some(name), Some(form_control_name)) if name != form_control_name => {
                Err(FormError::RadioNameMismatch {
                    name,
                    form_control_name,
                })
            }
            (None, Some(form_control_name)) => {
                state.name = Some(form_control_name);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn unbind(registry: &RadioControlRegistry, binding: AccessorBinding) {
    if let Err(error) = registry.tree().unbind_accessor(binding) {
        tracing::warn!(control = %binding.control(), %error, "failed to unbind radio button");
    }
}

impl ControlValueAccessor for RadioControlValueAccessor {
    fn write_value(&self, value: &Value) {
        let checked = *value == self.value;
        let listener = {
            let mut state = write_state(&self.state);
            state.checked = checked;
            state.on_checked_change.clone()
        };
        if let Some(listener) = listener {
            listener(checked);
        }
    }

    fn register_on_change(&self, on_change: ChangeFn) {
        write_state(&self.state).on_change = Some(on_change);
    }

    fn register_on_touched(&self, on_touched: Callback) {
        write_state(&self.state).on_touched = Some(on_touched);
    }

    fn set_disabled_state(&self, disabled: bool) {
        write_state(&self.state).disabled = disabled;
    }
}
