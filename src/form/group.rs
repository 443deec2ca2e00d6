use std::collections::BTreeMap;

use serde_json::Value;

use super::control::{AbstractControl, ControlOptions, ControlRef};
use super::node::{ControlNode, NodeKind};
use super::tree::{
    ChildKey, ControlId, FormError, FormResult, FormTree, Outbox, TreeState, UpdateOptions,
};

/// Composite control keyed by name.
#[derive(Clone)]
pub struct FormGroup {
    tree: FormTree,
    id: ControlId,
}

/// A group whose keys are only known at runtime. Same node kind as [`FormGroup`].
pub type FormRecord = FormGroup;

impl AbstractControl for FormGroup {
    fn tree(&self) -> &FormTree {
        &self.tree
    }

    fn id(&self) -> ControlId {
        self.id
    }
}

impl FormTree {
    pub fn group<K>(&self, controls: impl IntoIterator<Item = (K, ControlId)>) -> FormResult<FormGroup>
    where
        K: Into<String>,
    {
        self.group_with(controls, ControlOptions::default())
    }

    pub fn group_with<K>(
        &self,
        controls: impl IntoIterator<Item = (K, ControlId)>,
        options: ControlOptions,
    ) -> FormResult<FormGroup>
    where
        K: Into<String>,
    {
        let controls = controls
            .into_iter()
            .map(|(name, id)| (name.into(), id))
            .collect::<Vec<_>>();
        let id = self.insert_node(
            ControlNode::new(NodeKind::Group(BTreeMap::new()), Value::Object(Default::default())),
            options,
            false,
        )?;
        self.mutate("setting up group controls", |state, out| {
            for (name, child) in controls {
                state.register_group_child(id, name, child, out)?;
            }
            state.update_value_and_validity(id, UpdateOptions::silent().for_child(), out)
        })?;
        Ok(FormGroup::from_parts(self.clone(), id))
    }
}

impl FormGroup {
    pub(super) fn from_parts(tree: FormTree, id: ControlId) -> Self {
        Self { tree, id }
    }

    pub fn controls(&self) -> FormResult<BTreeMap<String, ControlId>> {
        self.tree.read("reading group controls", |state| {
            Ok(state.group_children(self.id)?.clone())
        })
    }

    pub fn len(&self) -> FormResult<usize> {
        Ok(self.controls()?.len())
    }

    pub fn is_empty(&self) -> FormResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, name: &str) -> FormResult<Option<ControlId>> {
        self.tree.read("looking up group control", |state| {
            Ok(state.group_children(self.id)?.get(name).copied())
        })
    }

    pub fn get_handle(&self, name: &str) -> FormResult<Option<ControlRef>> {
        self.get(name)?.map(|id| self.tree.handle(id)).transpose()
    }

    pub fn get_field(&self, key: super::builder::FieldKey) -> FormResult<Option<ControlId>> {
        self.get(key.as_str())
    }

    /// Registered and enabled; a disabled child counts as absent.
    pub fn contains(&self, name: &str) -> FormResult<bool> {
        self.tree.read("checking group membership", |state| {
            let Some(child) = state.group_children(self.id)?.get(name) else {
                return Ok(false);
            };
            Ok(state.node(*child)?.enabled())
        })
    }

    /// Adds `control` under `name` without recomputing. If the name is taken,
    /// the existing control is kept and returned.
    pub fn register_control(&self, name: impl Into<String>, control: ControlId) -> FormResult<ControlId> {
        let name = name.into();
        self.tree.mutate("registering group control", |state, out| {
            state.register_group_child(self.id, name, control, out)
        })
    }

    pub fn add_control(&self, name: impl Into<String>, control: ControlId) -> FormResult<()> {
        self.add_control_with(name, control, UpdateOptions::default())
    }

    pub fn add_control_with(
        &self,
        name: impl Into<String>,
        control: ControlId,
        options: UpdateOptions,
    ) -> FormResult<()> {
        let name = name.into();
        self.tree.mutate("adding group control", |state, out| {
            state.register_group_child(self.id, name, control, out)?;
            state.update_value_and_validity(self.id, options, out)?;
            state.emit_collection_change(self.id, out)
        })
    }

    /// Missing names are ignored.
    pub fn remove_control(&self, name: &str) -> FormResult<()> {
        self.remove_control_with(name, UpdateOptions::default())
    }

    pub fn remove_control_with(&self, name: &str, options: UpdateOptions) -> FormResult<()> {
        self.tree.mutate("removing group control", |state, out| {
            if state.detach_group_child(self.id, name)?.is_none() {
                tracing::trace!(group = %self.id, name, "remove_control on unknown name");
                return Ok(());
            }
            state.update_value_and_validity(self.id, options, out)?;
            state.emit_collection_change(self.id, out)
        })
    }

    /// Replaces (or inserts) the control registered under `name`.
    pub fn set_control(&self, name: impl Into<String>, control: ControlId) -> FormResult<()> {
        self.set_control_with(name, control, UpdateOptions::default())
    }

    pub fn set_control_with(
        &self,
        name: impl Into<String>,
        control: ControlId,
        options: UpdateOptions,
    ) -> FormResult<()> {
        let name = name.into();
        self.tree.mutate("replacing group control", |state, out| {
            state.node(control)?;
            state.ensure_acyclic(self.id, control)?;
            state.detach_group_child(self.id, &name)?;
            state.register_group_child(self.id, name, control, out)?;
            state.update_value_and_validity(self.id, options, out)?;
            state.emit_collection_change(self.id, out)
        })
    }

    pub fn on_collection_change(&self, listener: impl Fn() + Send + Sync + 'static) -> FormResult<()> {
        self.tree
            .register_on_collection_change(self.id, std::sync::Arc::new(listener))
    }
}

impl TreeState {
    pub(super) fn group_children(&self, id: ControlId) -> FormResult<&BTreeMap<String, ControlId>> {
        match &self.node(id)?.kind {
            NodeKind::Group(children) => Ok(children),
            _ => Err(FormError::NotAComposite(id)),
        }
    }

    fn group_children_mut(&mut self, id: ControlId) -> FormResult<&mut BTreeMap<String, ControlId>> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Group(children) => Ok(children),
            _ => Err(FormError::NotAComposite(id)),
        }
    }

    pub(super) fn register_group_child(
        &mut self,
        group: ControlId,
        name: String,
        child: ControlId,
        out: &mut Outbox,
    ) -> FormResult<ControlId> {
        if let Some(existing) = self.group_children(group)?.get(&name) {
            return Ok(*existing);
        }
        self.node(child)?;
        self.ensure_acyclic(group, child)?;
        self.release_from_parent(child, Some(group), out)?;
        self.node_mut(child)?.parent = Some(group);
        tracing::debug!(group = %group, child = %child, name = %name, "registered group control");
        self.group_children_mut(group)?.insert(name, child);
        Ok(child)
    }

    fn detach_group_child(&mut self, group: ControlId, name: &str) -> FormResult<Option<ControlId>> {
        let Some(child) = self.group_children_mut(group)?.remove(name) else {
            return Ok(None);
        };
        if let Ok(node) = self.node_mut(child) {
            node.parent = None;
            node.listeners.collection_change = None;
        }
        tracing::debug!(group = %group, child = %child, name, "detached group control");
        Ok(Some(child))
    }

    /// Strict write: every registered name must be supplied and every supplied
    /// name must be registered. Nothing is written when the check fails.
    pub(super) fn set_group_value(
        &mut self,
        id: ControlId,
        value: Value,
        options: UpdateOptions,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let Value::Object(mut values) = value else {
            return Err(FormError::ValueShapeMismatch { expected: "object" });
        };
        let children = self.group_children(id)?.clone();
        for name in children.keys() {
            if !values.contains_key(name) {
                return Err(FormError::MissingValue(ChildKey::Name(name.clone())));
            }
        }
        for name in values.keys() {
            if children.is_empty() {
                return Err(FormError::NoControls);
            }
            if !children.contains_key(name) {
                return Err(FormError::MissingControl(ChildKey::Name(name.clone())));
            }
        }
        for (name, child) in children {
            let child_value = values.remove(&name).unwrap_or(Value::Null);
            self.set_value(child, child_value, options.for_child(), out)?;
        }
        self.update_value_and_validity(id, options, out)
    }

    pub(super) fn patch_group_value(
        &mut self,
        id: ControlId,
        value: Value,
        options: UpdateOptions,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let Value::Object(values) = value else {
            tracing::trace!(group = %id, "patch_value without an object is a no-op");
            return Ok(());
        };
        let children = self.group_children(id)?.clone();
        for (name, child_value) in values {
            if child_value.is_null() {
                continue;
            }
            if let Some(child) = children.get(&name) {
                self.patch_value(*child, child_value, options.for_child(), out)?;
            }
        }
        self.update_value_and_validity(id, options, out)
    }
}
