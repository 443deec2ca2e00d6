use serde_json::Value;

use super::control::{AbstractControl, ControlOptions, ControlRef};
use super::node::{ControlNode, NodeKind};
use super::tree::{
    ChildKey, ControlId, FormError, FormResult, FormTree, Outbox, TreeState, UpdateOptions,
};

/// Composite control keyed by position.
#[derive(Clone)]
pub struct FormArray {
    tree: FormTree,
    id: ControlId,
}

impl AbstractControl for FormArray {
    fn tree(&self) -> &FormTree {
        &self.tree
    }

    fn id(&self) -> ControlId {
        self.id
    }
}

impl FormTree {
    pub fn array(&self, controls: impl IntoIterator<Item = ControlId>) -> FormResult<FormArray> {
        self.array_with(controls, ControlOptions::default())
    }

    pub fn array_with(
        &self,
        controls: impl IntoIterator<Item = ControlId>,
        options: ControlOptions,
    ) -> FormResult<FormArray> {
        let controls = controls.into_iter().collect::<Vec<_>>();
        let id = self.insert_node(
            ControlNode::new(NodeKind::Array(Vec::new()), Value::Array(Vec::new())),
            options,
            false,
        )?;
        self.mutate("setting up array controls", |state, out| {
            for child in controls {
                let len = state.array_children(id)?.len();
                state.insert_array_child(id, len, child, out)?;
            }
            state.update_value_and_validity(id, UpdateOptions::silent().for_child(), out)
        })?;
        Ok(FormArray::from_parts(self.clone(), id))
    }
}

impl FormArray {
    pub(super) fn from_parts(tree: FormTree, id: ControlId) -> Self {
        Self { tree, id }
    }

    pub fn controls(&self) -> FormResult<Vec<ControlId>> {
        self.tree.read("reading array controls", |state| {
            Ok(state.array_children(self.id)?.clone())
        })
    }

    pub fn len(&self) -> FormResult<usize> {
        Ok(self.controls()?.len())
    }

    pub fn is_empty(&self) -> FormResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn at(&self, index: usize) -> FormResult<Option<ControlId>> {
        Ok(self.controls()?.get(index).copied())
    }

    pub fn at_handle(&self, index: usize) -> FormResult<Option<ControlRef>> {
        self.at(index)?.map(|id| self.tree.handle(id)).transpose()
    }

    pub fn push(&self, control: ControlId) -> FormResult<()> {
        self.tree.mutate("pushing array control", |state, out| {
            let len = state.array_children(self.id)?.len();
            state.insert_array_child(self.id, len, control, out)?;
            state.update_value_and_validity(self.id, UpdateOptions::default(), out)?;
            state.emit_collection_change(self.id, out)
        })
    }

    pub fn insert(&self, index: usize, control: ControlId) -> FormResult<()> {
        self.tree.mutate("inserting array control", |state, out| {
            let len = state.array_children(self.id)?.len();
            if index > len {
                return Err(FormError::IndexOutOfRange { index, len });
            }
            state.insert_array_child(self.id, index, control, out)?;
            state.update_value_and_validity(self.id, UpdateOptions::default(), out)?;
            state.emit_collection_change(self.id, out)
        })
    }

    /// Out-of-range indices are ignored.
    pub fn remove_at(&self, index: usize) -> FormResult<()> {
        self.tree.mutate("removing array control", |state, out| {
            if state.detach_array_child(self.id, index)?.is_none() {
                return Ok(());
            }
            state.update_value_and_validity(self.id, UpdateOptions::default(), out)?;
            state.emit_collection_change(self.id, out)
        })
    }

    pub fn set_control(&self, index: usize, control: ControlId) -> FormResult<()> {
        self.tree.mutate("replacing array control", |state, out| {
            let len = state.array_children(self.id)?.len();
            if index >= len {
                return Err(FormError::IndexOutOfRange { index, len });
            }
            state.node(control)?;
            state.ensure_acyclic(self.id, control)?;
            state.detach_array_child(self.id, index)?;
            state.insert_array_child(self.id, index, control, out)?;
            state.update_value_and_validity(self.id, UpdateOptions::default(), out)?;
            state.emit_collection_change(self.id, out)
        })
    }

    pub fn clear(&self) -> FormResult<()> {
        self.tree.mutate("clearing array controls", |state, out| {
            let len = state.array_children(self.id)?.len();
            if len == 0 {
                return Ok(());
            }
            for index in (0..len).rev() {
                state.detach_array_child(self.id, index)?;
            }
            state.update_value_and_validity(self.id, UpdateOptions::default(), out)?;
            state.emit_collection_change(self.id, out)
        })
    }
}

impl TreeState {
    pub(super) fn array_children(&self, id: ControlId) -> FormResult<&Vec<ControlId>> {
        match &self.node(id)?.kind {
            NodeKind::Array(children) => Ok(children),
            _ => Err(FormError::NotAComposite(id)),
        }
    }

    fn array_children_mut(&mut self, id: ControlId) -> FormResult<&mut Vec<ControlId>> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Array(children) => Ok(children),
            _ => Err(FormError::NotAComposite(id)),
        }
    }

    /// `index` is clamped when moving `child` within the same array shortened it.
    fn insert_array_child(
        &mut self,
        array: ControlId,
        index: usize,
        child: ControlId,
        out: &mut Outbox,
    ) -> FormResult<()> {
        self.node(child)?;
        self.ensure_acyclic(array, child)?;
        self.release_from_parent(child, Some(array), out)?;
        self.node_mut(child)?.parent = Some(array);
        let children = self.array_children_mut(array)?;
        let index = index.min(children.len());
        children.insert(index, child);
        tracing::debug!(array = %array, child = %child, index, "registered array control");
        Ok(())
    }

    fn detach_array_child(&mut self, array: ControlId, index: usize) -> FormResult<Option<ControlId>> {
        let children = self.array_children_mut(array)?;
        if index >= children.len() {
            return Ok(None);
        }
        let child = children.remove(index);
        if let Ok(node) = self.node_mut(child) {
            node.parent = None;
            node.listeners.collection_change = None;
        }
        Ok(Some(child))
    }

    pub(super) fn set_array_value(
        &mut self,
        id: ControlId,
        value: Value,
        options: UpdateOptions,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let Value::Array(values) = value else {
            return Err(FormError::ValueShapeMismatch { expected: "array" });
        };
        let children = self.array_children(id)?.clone();
        if values.len() < children.len() {
            return Err(FormError::MissingValue(ChildKey::Index(values.len())));
        }
        if values.len() > children.len() {
            if children.is_empty() {
                return Err(FormError::NoControls);
            }
            return Err(FormError::MissingControl(ChildKey::Index(children.len())));
        }
        for (child, child_value) in children.into_iter().zip(values) {
            self.set_value(child, child_value, options.for_child(), out)?;
        }
        self.update_value_and_validity(id, options, out)
    }

    pub(super) fn patch_array_value(
        &mut self,
        id: ControlId,
        value: Value,
        options: UpdateOptions,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let Value::Array(values) = value else {
            tracing::trace!(array = %id, "patch_value without an array is a no-op");
            return Ok(());
        };
        let children = self.array_children(id)?.clone();
        for (child, child_value) in children.into_iter().zip(values) {
            if child_value.is_null() {
                continue;
            }
            self.patch_value(child, child_value, options.for_child(), out)?;
        }
        self.update_value_and_validity(id, options, out)
    }
}
