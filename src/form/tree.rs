use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde_json::Value;

use super::node::{ControlNode, NodeKind};
use super::validation::ValidationErrors;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ControlId(pub(crate) u64);

impl ControlId {
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for ControlId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "control#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidatorId(pub u64);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

impl ValidationTicket {
    pub(super) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ControlStatus {
    Valid,
    Invalid,
    Pending,
    Disabled,
}

impl ControlStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ControlStatus::Valid => "VALID",
            ControlStatus::Invalid => "INVALID",
            ControlStatus::Pending => "PENDING",
            ControlStatus::Disabled => "DISABLED",
        }
    }
}

impl Display for ControlStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controls how far a mutation propagates and whether listeners hear about it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UpdateOptions {
    pub only_self: bool,
    pub emit_event: bool,
    pub emit_model_to_view_change: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            only_self: false,
            emit_event: true,
            emit_model_to_view_change: true,
        }
    }
}

impl UpdateOptions {
    pub fn only_self() -> Self {
        Self {
            only_self: true,
            ..Self::default()
        }
    }

    pub fn silent() -> Self {
        Self {
            emit_event: false,
            ..Self::default()
        }
    }

    pub(super) fn for_child(self) -> Self {
        Self {
            only_self: true,
            ..self
        }
    }
}

/// Key of a child inside a composite: a name for groups, a position for arrays.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ChildKey {
    Name(String),
    Index(usize),
}

impl Display for ChildKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChildKey::Name(name) => write!(f, "name: '{name}'"),
            ChildKey::Index(index) => write!(f, "index: {index}"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FormError {
    StatePoisoned(&'static str),
    UnknownControl(ControlId),
    NotAComposite(ControlId),
    StillAttached(ControlId),
    CyclicParent { child: ControlId, parent: ControlId },
    NoControls,
    MissingControl(ChildKey),
    MissingValue(ChildKey),
    ValueShapeMismatch { expected: &'static str },
    IndexOutOfRange { index: usize, len: usize },
    RadioNameMismatch { name: String, form_control_name: String },
    InvalidPattern { pattern: String, reason: String },
    RegistryReleased,
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::StatePoisoned(context) => {
                write!(f, "form tree lock poisoned while {context}")
            }
            FormError::UnknownControl(id) => write!(f, "{id} is not part of this form tree"),
            FormError::NotAComposite(id) => write!(f, "{id} has no child controls"),
            FormError::StillAttached(id) => {
                write!(f, "{id} is still attached to a parent and cannot be disposed")
            }
            FormError::CyclicParent { child, parent } => {
                write!(f, "registering {child} under {parent} would create a cycle")
            }
            FormError::NoControls => f.write_str(
                "there are no form controls registered with this composite yet; \
                 add controls before calling set_value",
            ),
            FormError::MissingControl(key) => {
                write!(f, "cannot find form control with {key}")
            }
            FormError::MissingValue(key) => {
                write!(f, "must supply a value for form control with {key}")
            }
            FormError::ValueShapeMismatch { expected } => {
                write!(f, "expected {expected} value for composite control")
            }
            FormError::IndexOutOfRange { index, len } => {
                write!(f, "index {index} is out of range for form array of length {len}")
            }
            FormError::RadioNameMismatch {
                name,
                form_control_name,
            } => write!(
                f,
                "if you define both a name and a form_control_name attribute on your radio \
                 button, their values must match (name: '{name}', form_control_name: \
                 '{form_control_name}')"
            ),
            FormError::InvalidPattern { pattern, reason } => {
                write!(f, "invalid pattern '{pattern}': {reason}")
            }
            FormError::RegistryReleased => {
                f.write_str("the radio registry was dropped before the accessor was initialised")
            }
        }
    }
}

impl std::error::Error for FormError {}

pub type FormResult<T> = Result<T, FormError>;

pub type Callback = Arc<dyn Fn() + Send + Sync>;
pub type ValueListener = Arc<dyn Fn(&Value) + Send + Sync>;
pub type StatusListener = Arc<dyn Fn(ControlStatus) + Send + Sync>;
pub type DisabledListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Listener invocations queued while the tree lock is held.
#[derive(Default)]
pub(super) struct Outbox {
    pending: Vec<Box<dyn FnOnce() + Send>>,
}

impl Outbox {
    pub(super) fn push(&mut self, notify: impl FnOnce() + Send + 'static) {
        self.pending.push(Box::new(notify));
    }

    fn dispatch(self) {
        for notify in self.pending {
            notify();
        }
    }
}

pub(super) struct TreeState {
    next_id: u64,
    pub(super) nodes: BTreeMap<ControlId, ControlNode>,
}

impl TreeState {
    pub(super) fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(super) fn insert(&mut self, node: ControlNode) -> ControlId {
        let id = ControlId(self.allocate());
        self.nodes.insert(id, node);
        id
    }

    pub(super) fn node(&self, id: ControlId) -> FormResult<&ControlNode> {
        self.nodes.get(&id).ok_or(FormError::UnknownControl(id))
    }

    pub(super) fn node_mut(&mut self, id: ControlId) -> FormResult<&mut ControlNode> {
        self.nodes.get_mut(&id).ok_or(FormError::UnknownControl(id))
    }
}

/// Arena owning every control of a form.
///
/// Handles such as [`super::FormControl`] are cheap `(tree, id)` pairs; the tree
/// is the only owner of node state, so parent links never keep anything alive.
#[derive(Clone)]
pub struct FormTree {
    pub(super) state: Arc<RwLock<TreeState>>,
}

#[derive(Clone)]
pub struct WeakFormTree {
    state: Weak<RwLock<TreeState>>,
}

impl WeakFormTree {
    pub fn upgrade(&self) -> Option<FormTree> {
        self.state.upgrade().map(|state| FormTree { state })
    }
}

impl Default for FormTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FormTree {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(TreeState {
                next_id: 0,
                nodes: BTreeMap::new(),
            })),
        }
    }

    pub fn downgrade(&self) -> WeakFormTree {
        WeakFormTree {
            state: Arc::downgrade(&self.state),
        }
    }

    pub fn ptr_eq(&self, other: &FormTree) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub fn len(&self) -> FormResult<usize> {
        Ok(read_lock(&self.state, "counting controls")?.nodes.len())
    }

    pub fn is_empty(&self) -> FormResult<bool> {
        Ok(self.len()? == 0)
    }

    pub(super) fn read<R>(
        &self,
        context: &'static str,
        f: impl FnOnce(&TreeState) -> FormResult<R>,
    ) -> FormResult<R> {
        let state = read_lock(&self.state, context)?;
        f(&state)
    }

    /// Runs `f` under the write lock and dispatches queued listeners after releasing it.
    pub(super) fn mutate<R>(
        &self,
        context: &'static str,
        f: impl FnOnce(&mut TreeState, &mut Outbox) -> FormResult<R>,
    ) -> FormResult<R> {
        let mut outbox = Outbox::default();
        let result = {
            let mut state = write_lock(&self.state, context)?;
            f(&mut state, &mut outbox)
        };
        outbox.dispatch();
        result
    }

    pub fn contains_control(&self, id: ControlId) -> FormResult<bool> {
        self.read("checking control membership", |state| {
            Ok(state.nodes.contains_key(&id))
        })
    }

    pub fn value(&self, id: ControlId) -> FormResult<Value> {
        self.read("reading control value", |state| Ok(state.node(id)?.value.clone()))
    }

    pub fn raw_value(&self, id: ControlId) -> FormResult<Value> {
        self.read("reading raw value", |state| state.raw_value(id))
    }

    pub fn status(&self, id: ControlId) -> FormResult<ControlStatus> {
        self.read("reading control status", |state| Ok(state.node(id)?.status))
    }

    pub fn errors(&self, id: ControlId) -> FormResult<Option<ValidationErrors>> {
        self.read("reading control errors", |state| {
            Ok(state.node(id)?.errors.clone())
        })
    }

    pub fn parent(&self, id: ControlId) -> FormResult<Option<ControlId>> {
        self.read("reading control parent", |state| Ok(state.node(id)?.parent))
    }

    pub fn root(&self, id: ControlId) -> FormResult<ControlId> {
        self.read("resolving root control", |state| {
            let mut current = id;
            while let Some(parent) = state.node(current)?.parent {
                current = parent;
            }
            Ok(current)
        })
    }

    pub fn is_pristine(&self, id: ControlId) -> FormResult<bool> {
        self.read("reading pristine flag", |state| Ok(state.node(id)?.pristine))
    }

    pub fn is_touched(&self, id: ControlId) -> FormResult<bool> {
        self.read("reading touched flag", |state| Ok(state.node(id)?.touched))
    }

    pub fn children(&self, id: ControlId) -> FormResult<Vec<(ChildKey, ControlId)>> {
        self.read("listing child controls", |state| {
            Ok(state.node(id)?.keyed_children())
        })
    }

    /// Resolves a dotted path such as `"address.lines.0"` relative to `id`.
    pub fn find(&self, id: ControlId, path: &str) -> FormResult<Option<ControlId>> {
        self.read("resolving control path", |state| {
            let mut current = id;
            for segment in path.split('.').filter(|segment| !segment.is_empty()) {
                let next = match &state.node(current)?.kind {
                    NodeKind::Control { .. } => None,
                    NodeKind::Group(children) => children.get(segment).copied(),
                    NodeKind::Array(children) => segment
                        .parse::<usize>()
                        .ok()
                        .and_then(|index| children.get(index).copied()),
                };
                let Some(next) = next else {
                    return Ok(None);
                };
                current = next;
            }
            Ok(Some(current))
        })
    }

    /// Re-points the parent link of `id`. A composite that still lists `id` lets go of it
    /// first; `parent` itself does not gain a child entry.
    pub fn set_parent(&self, id: ControlId, parent: Option<ControlId>) -> FormResult<()> {
        self.mutate("setting control parent", |state, out| {
            if let Some(parent) = parent {
                state.node(parent)?;
                state.ensure_acyclic(parent, id)?;
            }
            if state.node(id)?.parent != parent {
                state.release_from_parent(id, None, out)?;
            }
            state.node_mut(id)?.parent = parent;
            Ok(())
        })
    }

    pub fn update_value_and_validity(&self, id: ControlId, options: UpdateOptions) -> FormResult<()> {
        self.mutate("updating value and validity", |state, out| {
            state.update_value_and_validity(id, options, out)
        })
    }

    pub fn set_value(&self, id: ControlId, value: Value, options: UpdateOptions) -> FormResult<()> {
        self.mutate("setting control value", |state, out| {
            state.set_value(id, value, options, out)
        })
    }

    pub fn patch_value(
        &self,
        id: ControlId,
        value: Value,
        options: UpdateOptions,
    ) -> FormResult<()> {
        self.mutate("patching control value", |state, out| {
            state.patch_value(id, value, options, out)
        })
    }

    pub fn reset(
        &self,
        id: ControlId,
        form_state: Option<Value>,
        options: UpdateOptions,
    ) -> FormResult<()> {
        self.mutate("resetting control", |state, out| {
            state.reset(id, form_state, options, out)
        })
    }

    pub fn enable(&self, id: ControlId, options: UpdateOptions) -> FormResult<()> {
        self.mutate("enabling control", |state, out| state.enable(id, options, out))
    }

    pub fn disable(&self, id: ControlId, options: UpdateOptions) -> FormResult<()> {
        self.mutate("disabling control", |state, out| state.disable(id, options, out))
    }

    pub fn mark_as_touched(&self, id: ControlId, only_self: bool) -> FormResult<()> {
        self.mutate("marking control touched", |state, _| {
            state.mark_as_touched(id, only_self)
        })
    }

    pub fn mark_all_as_touched(&self, id: ControlId) -> FormResult<()> {
        self.mutate("marking subtree touched", |state, _| {
            for descendant in state.subtree(id)? {
                state.node_mut(descendant)?.touched = true;
            }
            state.mark_as_touched(id, true)
        })
    }

    pub fn mark_as_untouched(&self, id: ControlId, only_self: bool) -> FormResult<()> {
        self.mutate("marking control untouched", |state, _| {
            state.mark_as_untouched(id, only_self)
        })
    }

    pub fn mark_as_dirty(&self, id: ControlId, only_self: bool) -> FormResult<()> {
        self.mutate("marking control dirty", |state, _| {
            state.mark_as_dirty(id, only_self)
        })
    }

    pub fn mark_as_pristine(&self, id: ControlId, only_self: bool) -> FormResult<()> {
        self.mutate("marking control pristine", |state, _| {
            state.mark_as_pristine(id, only_self)
        })
    }

    /// Overrides the error map without running validators, then refreshes ancestor status.
    pub fn set_errors(
        &self,
        id: ControlId,
        errors: Option<ValidationErrors>,
        emit_event: bool,
    ) -> FormResult<()> {
        self.mutate("setting control errors", |state, out| {
            state.node_mut(id)?.errors = errors;
            state.update_controls_errors(id, emit_event, out)
        })
    }

    pub fn subscribe_value_changes(
        &self,
        id: ControlId,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        self.mutate("subscribing to value changes", |state, _| {
            let subscription = SubscriptionId(state.allocate());
            state
                .node_mut(id)?
                .listeners
                .value
                .insert(subscription, Arc::new(listener));
            Ok(subscription)
        })
    }

    pub fn subscribe_status_changes(
        &self,
        id: ControlId,
        listener: impl Fn(ControlStatus) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        self.mutate("subscribing to status changes", |state, _| {
            let subscription = SubscriptionId(state.allocate());
            state
                .node_mut(id)?
                .listeners
                .status
                .insert(subscription, Arc::new(listener));
            Ok(subscription)
        })
    }

    pub fn unsubscribe(&self, id: ControlId, subscription: SubscriptionId) -> FormResult<bool> {
        self.mutate("removing subscription", |state, _| {
            let listeners = &mut state.node_mut(id)?.listeners;
            Ok(listeners.value.remove(&subscription).is_some()
                || listeners.status.remove(&subscription).is_some()
                || listeners.model_change.remove(&subscription).is_some()
                || listeners.disabled_change.remove(&subscription).is_some())
        })
    }

    /// Model-to-view hook: invoked with the new value whenever `set_value` asks for it.
    /// Pass the returned id to [`FormTree::unsubscribe`] to drop the hook.
    pub fn register_on_change(
        &self,
        id: ControlId,
        listener: ValueListener,
    ) -> FormResult<SubscriptionId> {
        self.mutate("registering model change listener", |state, _| {
            let subscription = SubscriptionId(state.allocate());
            state
                .node_mut(id)?
                .listeners
                .model_change
                .insert(subscription, listener);
            Ok(subscription)
        })
    }

    pub fn register_on_disabled_change(
        &self,
        id: ControlId,
        listener: DisabledListener,
    ) -> FormResult<SubscriptionId> {
        self.mutate("registering disabled change listener", |state, _| {
            let subscription = SubscriptionId(state.allocate());
            state
                .node_mut(id)?
                .listeners
                .disabled_change
                .insert(subscription, listener);
            Ok(subscription)
        })
    }

    /// Single slot: the last registration wins.
    pub fn register_on_collection_change(
        &self,
        id: ControlId,
        listener: Callback,
    ) -> FormResult<()> {
        self.mutate("registering collection change listener", |state, _| {
            state.node_mut(id)?.listeners.collection_change = Some(listener);
            Ok(())
        })
    }

    /// Drops a detached control and its whole subtree from the arena.
    pub fn dispose(&self, id: ControlId) -> FormResult<usize> {
        self.mutate("disposing control", |state, _| {
            if state.node(id)?.parent.is_some() {
                return Err(FormError::StillAttached(id));
            }
            let subtree = state.subtree(id)?;
            for descendant in &subtree {
                state.nodes.remove(descendant);
            }
            tracing::debug!(control = %id, removed = subtree.len(), "disposed control subtree");
            Ok(subtree.len())
        })
    }
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
