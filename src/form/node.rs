use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::tree::{
    Callback, ChildKey, ControlId, ControlStatus, DisabledListener, FormError, FormResult,
    Outbox, StatusListener, SubscriptionId, TreeState, UpdateOptions, ValidationTicket,
    ValidatorId, ValueListener,
};
use super::validation::{AsyncValidatorEntry, ValidationErrors, ValidatorFn, run_validators};

pub(super) enum NodeKind {
    Control { default_value: Value },
    Group(BTreeMap<String, ControlId>),
    Array(Vec<ControlId>),
}

#[derive(Default)]
pub(super) struct Listeners {
    pub(super) value: BTreeMap<SubscriptionId, ValueListener>,
    pub(super) status: BTreeMap<SubscriptionId, StatusListener>,
    pub(super) model_change: BTreeMap<SubscriptionId, ValueListener>,
    pub(super) disabled_change: BTreeMap<SubscriptionId, DisabledListener>,
    pub(super) collection_change: Option<Callback>,
}

pub(super) struct ControlNode {
    pub(super) kind: NodeKind,
    pub(super) value: Value,
    pub(super) status: ControlStatus,
    pub(super) errors: Option<ValidationErrors>,
    pub(super) parent: Option<ControlId>,
    pub(super) validators: Vec<(ValidatorId, ValidatorFn)>,
    pub(super) async_validators: Vec<(ValidatorId, AsyncValidatorEntry)>,
    pub(super) pristine: bool,
    pub(super) touched: bool,
    pub(super) ticket: ValidationTicket,
    pub(super) listeners: Listeners,
}

impl ControlNode {
    pub(super) fn new(kind: NodeKind, value: Value) -> Self {
        Self {
            kind,
            value,
            status: ControlStatus::Valid,
            errors: None,
            parent: None,
            validators: Vec::new(),
            async_validators: Vec::new(),
            pristine: true,
            touched: false,
            ticket: ValidationTicket::default(),
            listeners: Listeners::default(),
        }
    }

    pub(super) fn enabled(&self) -> bool {
        self.status != ControlStatus::Disabled
    }

    pub(super) fn children(&self) -> Vec<ControlId> {
        match &self.kind {
            NodeKind::Control { .. } => Vec::new(),
            NodeKind::Group(children) => children.values().copied().collect(),
            NodeKind::Array(children) => children.clone(),
        }
    }

    pub(super) fn keyed_children(&self) -> Vec<(ChildKey, ControlId)> {
        match &self.kind {
            NodeKind::Control { .. } => Vec::new(),
            NodeKind::Group(children) => children
                .iter()
                .map(|(name, id)| (ChildKey::Name(name.clone()), *id))
                .collect(),
            NodeKind::Array(children) => children
                .iter()
                .enumerate()
                .map(|(index, id)| (ChildKey::Index(index), *id))
                .collect(),
        }
    }
}

/// A `{value, disabled}` object with exactly those two keys carries both
/// the value and the initial disabled state.
pub(super) fn is_boxed_value(form_state: &Value) -> bool {
    match form_state {
        Value::Object(map) => {
            map.len() == 2 && map.contains_key("value") && map.contains_key("disabled")
        }
        _ => false,
    }
}

pub(super) fn unbox_form_state(form_state: Value) -> (Value, Option<bool>) {
    if !is_boxed_value(&form_state) {
        return (form_state, None);
    }
    let Value::Object(mut map) = form_state else {
        return (Value::Null, None);
    };
    let disabled = map.get("disabled").and_then(Value::as_bool).unwrap_or(false);
    let value = map.remove("value").unwrap_or(Value::Null);
    (value, Some(disabled))
}

impl TreeState {
    pub(super) fn subtree(&self, id: ControlId) -> FormResult<Vec<ControlId>> {
        let mut ordered = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            ordered.push(current);
            stack.extend(self.node(current)?.children());
        }
        Ok(ordered)
    }

    /// Fails when `child` is `parent` itself or one of its ancestors.
    pub(super) fn ensure_acyclic(&self, parent: ControlId, child: ControlId) -> FormResult<()> {
        let mut current = Some(parent);
        while let Some(id) = current {
            if id == child {
                return Err(FormError::CyclicParent { child, parent });
            }
            current = self.node(id)?.parent;
        }
        Ok(())
    }

    /// Unlinks `child` from the composite that currently lists it. A control lives in at most
    /// one composite, so adopting it elsewhere first takes it out of the old one.
    pub(super) fn release_from_parent(
        &mut self,
        child: ControlId,
        adopter: Option<ControlId>,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let Some(old) = self.node(child)?.parent else {
            return Ok(());
        };
        match &mut self.node_mut(old)?.kind {
            NodeKind::Group(children) => children.retain(|_, id| *id != child),
            NodeKind::Array(children) => children.retain(|id| *id != child),
            NodeKind::Control { .. } => {}
        }
        self.node_mut(child)?.parent = None;
        if adopter != Some(old) {
            tracing::debug!(control = %child, from = %old, "moved control out of its composite");
            self.update_value_and_validity(old, UpdateOptions::default(), out)?;
            self.emit_collection_change(old, out)?;
        }
        Ok(())
    }

    pub(super) fn raw_value(&self, id: ControlId) -> FormResult<Value> {
        let node = self.node(id)?;
        Ok(match &node.kind {
            NodeKind::Control { .. } => node.value.clone(),
            NodeKind::Group(children) => {
                let mut map = Map::new();
                for (name, child) in children {
                    map.insert(name.clone(), self.raw_value(*child)?);
                }
                Value::Object(map)
            }
            NodeKind::Array(children) => Value::Array(
                children
                    .iter()
                    .map(|child| self.raw_value(*child))
                    .collect::<FormResult<Vec<_>>>()?,
            ),
        })
    }

    pub(super) fn all_controls_disabled(&self, id: ControlId) -> FormResult<bool> {
        let node = self.node(id)?;
        if matches!(node.kind, NodeKind::Control { .. }) {
            return Ok(!node.enabled());
        }
        let children = node.children();
        if children.is_empty() {
            return Ok(!node.enabled());
        }
        for child in children {
            if self.node(child)?.enabled() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn set_initial_status(&mut self, id: ControlId) -> FormResult<()> {
        let status = if self.all_controls_disabled(id)? {
            ControlStatus::Disabled
        } else {
            ControlStatus::Valid
        };
        self.node_mut(id)?.status = status;
        Ok(())
    }

    /// Rebuilds a composite's value from its children; the enabled-only
    /// projection unless the composite itself is disabled.
    pub(super) fn update_value(&mut self, id: ControlId) -> FormResult<()> {
        let node = self.node(id)?;
        let include_disabled = !node.enabled();
        let value = match &node.kind {
            NodeKind::Control { .. } => return Ok(()),
            NodeKind::Group(children) => {
                let mut map = Map::new();
                for (name, child) in children {
                    let child = self.node(*child)?;
                    if child.enabled() || include_disabled {
                        map.insert(name.clone(), child.value.clone());
                    }
                }
                Value::Object(map)
            }
            NodeKind::Array(children) => {
                let mut items = Vec::with_capacity(children.len());
                for child in children {
                    let child = self.node(*child)?;
                    if child.enabled() || include_disabled {
                        items.push(child.value.clone());
                    }
                }
                Value::Array(items)
            }
        };
        self.node_mut(id)?.value = value;
        Ok(())
    }

    pub(super) fn calculate_status(&self, id: ControlId) -> FormResult<ControlStatus> {
        if self.all_controls_disabled(id)? {
            return Ok(ControlStatus::Disabled);
        }
        let node = self.node(id)?;
        if node.errors.is_some() {
            return Ok(ControlStatus::Invalid);
        }
        let mut pending = false;
        for child in node.children() {
            match self.node(child)?.status {
                ControlStatus::Invalid => return Ok(ControlStatus::Invalid),
                ControlStatus::Pending => pending = true,
                ControlStatus::Valid | ControlStatus::Disabled => {}
            }
        }
        Ok(if pending {
            ControlStatus::Pending
        } else {
            ControlStatus::Valid
        })
    }

    fn recompute(&mut self, id: ControlId, emit_event: bool, out: &mut Outbox) -> FormResult<()> {
        self.set_initial_status(id)?;
        self.update_value(id)?;

        let node = self.node_mut(id)?;
        node.ticket = node.ticket.next();
        if node.enabled() {
            let errors = run_validators(node.validators.iter().map(|(_, v)| v), &node.value);
            node.errors = errors;
            let status = self.calculate_status(id)?;
            let node = self.node_mut(id)?;
            node.status = status;
            if status == ControlStatus::Valid && !node.async_validators.is_empty() {
                node.status = ControlStatus::Pending;
            }
        }
        tracing::trace!(control = %id, status = %self.node(id)?.status, "recomputed control");

        if emit_event {
            self.emit_value(id, out)?;
            self.emit_status(id, out)?;
        }
        Ok(())
    }

    pub(super) fn update_value_and_validity(
        &mut self,
        id: ControlId,
        options: UpdateOptions,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let mut current = id;
        loop {
            self.recompute(current, options.emit_event, out)?;
            if options.only_self {
                return Ok(());
            }
            match self.node(current)?.parent {
                Some(parent) => current = parent,
                None => return Ok(()),
            }
        }
    }

    /// Status-only refresh after errors were replaced out of band.
    pub(super) fn update_controls_errors(
        &mut self,
        id: ControlId,
        emit_event: bool,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let mut current = Some(id);
        while let Some(id) = current {
            let status = self.calculate_status(id)?;
            self.node_mut(id)?.status = status;
            if emit_event {
                self.emit_status(id, out)?;
            }
            current = self.node(id)?.parent;
        }
        Ok(())
    }

    pub(super) fn emit_value(&self, id: ControlId, out: &mut Outbox) -> FormResult<()> {
        let node = self.node(id)?;
        let listeners = node.listeners.value.values().cloned().collect::<Vec<_>>();
        if !listeners.is_empty() {
            let value = node.value.clone();
            out.push(move || {
                for listener in &listeners {
                    listener(&value);
                }
            });
        }
        Ok(())
    }

    pub(super) fn emit_status(&self, id: ControlId, out: &mut Outbox) -> FormResult<()> {
        let node = self.node(id)?;
        let listeners = node.listeners.status.values().cloned().collect::<Vec<_>>();
        if !listeners.is_empty() {
            let status = node.status;
            out.push(move || {
                for listener in &listeners {
                    listener(status);
                }
            });
        }
        Ok(())
    }

    pub(super) fn emit_collection_change(&self, id: ControlId, out: &mut Outbox) -> FormResult<()> {
        if let Some(listener) = self.node(id)?.listeners.collection_change.clone() {
            out.push(move || listener());
        }
        Ok(())
    }

    fn emit_disabled_change(
        &self,
        id: ControlId,
        disabled: bool,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let listeners = self
            .node(id)?
            .listeners
            .disabled_change
            .values()
            .cloned()
            .collect::<Vec<_>>();
        if !listeners.is_empty() {
            out.push(move || {
                for listener in &listeners {
                    listener(disabled);
                }
            });
        }
        Ok(())
    }

    pub(super) fn set_value(
        &mut self,
        id: ControlId,
        value: Value,
        options: UpdateOptions,
        out: &mut Outbox,
    ) -> FormResult<()> {
        match &self.node(id)?.kind {
            NodeKind::Control { .. } => self.set_control_value(id, value, options, out),
            NodeKind::Group(_) => self.set_group_value(id, value, options, out),
            NodeKind::Array(_) => self.set_array_value(id, value, options, out),
        }
    }

    fn set_control_value(
        &mut self,
        id: ControlId,
        value: Value,
        options: UpdateOptions,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let node = self.node_mut(id)?;
        node.value = value;
        if options.emit_model_to_view_change && !node.listeners.model_change.is_empty() {
            let listeners = node
                .listeners
                .model_change
                .values()
                .cloned()
                .collect::<Vec<_>>();
            let value = node.value.clone();
            out.push(move || {
                for listener in &listeners {
                    listener(&value);
                }
            });
        }
        self.update_value_and_validity(id, options, out)
    }

    pub(super) fn patch_value(
        &mut self,
        id: ControlId,
        value: Value,
        options: UpdateOptions,
        out: &mut Outbox,
    ) -> FormResult<()> {
        match &self.node(id)?.kind {
            NodeKind::Control { .. } => self.set_control_value(id, value, options, out),
            NodeKind::Group(_) => self.patch_group_value(id, value, options, out),
            NodeKind::Array(_) => self.patch_array_value(id, value, options, out),
        }
    }

    pub(super) fn reset(
        &mut self,
        id: ControlId,
        form_state: Option<Value>,
        options: UpdateOptions,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let node = self.node(id)?;
        let NodeKind::Control { default_value } = &node.kind else {
            let children = node.keyed_children();
            for (key, child) in children {
                let child_state = match (&form_state, &key) {
                    (None, _) => None,
                    (Some(Value::Null), _) => Some(Value::Null),
                    (Some(Value::Object(map)), ChildKey::Name(name)) => map.get(name).cloned(),
                    (Some(Value::Array(items)), ChildKey::Index(index)) => {
                        items.get(*index).cloned()
                    }
                    (Some(_), _) => None,
                };
                self.reset(child, child_state, options.for_child(), out)?;
            }
            self.update_pristine(id, options.only_self)?;
            self.update_touched(id, options.only_self)?;
            return self.update_value_and_validity(id, options, out);
        };

        let (value, disabled) = match form_state {
            Some(form_state) => unbox_form_state(form_state),
            None => (default_value.clone(), None),
        };
        match disabled {
            Some(true) => self.disable(id, UpdateOptions::silent().for_child(), out)?,
            Some(false) => self.enable(id, UpdateOptions::silent().for_child(), out)?,
            None => {}
        }
        self.mark_as_pristine(id, options.only_self)?;
        self.mark_as_untouched(id, options.only_self)?;
        self.set_control_value(id, value, options, out)
    }

    /// True when enabling/disabling `id` would leave a dirty parent with no
    /// dirty children; the parent's pristine flag is then left alone.
    fn parent_marked_dirty(&self, id: ControlId, only_self: bool) -> FormResult<bool> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(false);
        };
        let parent_dirty = !self.node(parent)?.pristine;
        Ok(!only_self && parent_dirty && !self.any_controls(parent, |child| !child.pristine)?)
    }

    fn update_ancestors(
        &mut self,
        id: ControlId,
        options: UpdateOptions,
        skip_pristine_check: bool,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        if options.only_self {
            return Ok(());
        }
        self.update_value_and_validity(parent, options, out)?;
        if !skip_pristine_check {
            self.update_pristine(parent, false)?;
        }
        self.update_touched(parent, false)
    }

    pub(super) fn disable(
        &mut self,
        id: ControlId,
        options: UpdateOptions,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let skip_pristine_check = self.parent_marked_dirty(id, options.only_self)?;
        let node = self.node_mut(id)?;
        node.status = ControlStatus::Disabled;
        node.errors = None;
        node.ticket = node.ticket.next();
        for child in node.children() {
            self.disable(child, options.for_child(), out)?;
        }
        self.update_value(id)?;
        if options.emit_event {
            self.emit_value(id, out)?;
            self.emit_status(id, out)?;
        }
        self.update_ancestors(id, options, skip_pristine_check, out)?;
        self.emit_disabled_change(id, true, out)
    }

    pub(super) fn enable(
        &mut self,
        id: ControlId,
        options: UpdateOptions,
        out: &mut Outbox,
    ) -> FormResult<()> {
        let skip_pristine_check = self.parent_marked_dirty(id, options.only_self)?;
        let node = self.node_mut(id)?;
        node.status = ControlStatus::Valid;
        for child in node.children() {
            self.enable(child, options.for_child(), out)?;
        }
        self.update_value_and_validity(id, options.for_child(), out)?;
        self.update_ancestors(id, options, skip_pristine_check, out)?;
        self.emit_disabled_change(id, false, out)
    }

    fn any_controls(
        &self,
        id: ControlId,
        condition: impl Fn(&ControlNode) -> bool,
    ) -> FormResult<bool> {
        for child in self.node(id)?.children() {
            let child = self.node(child)?;
            if child.enabled() && condition(child) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(super) fn update_pristine(&mut self, id: ControlId, only_self: bool) -> FormResult<()> {
        let mut current = Some(id);
        while let Some(id) = current {
            let pristine = !self.any_controls(id, |child| !child.pristine)?;
            let node = self.node_mut(id)?;
            node.pristine = pristine;
            current = if only_self { None } else { node.parent };
        }
        Ok(())
    }

    pub(super) fn update_touched(&mut self, id: ControlId, only_self: bool) -> FormResult<()> {
        let mut current = Some(id);
        while let Some(id) = current {
            let touched = self.any_controls(id, |child| child.touched)?;
            let node = self.node_mut(id)?;
            node.touched = touched;
            current = if only_self { None } else { node.parent };
        }
        Ok(())
    }

    pub(super) fn mark_as_touched(&mut self, id: ControlId, only_self: bool) -> FormResult<()> {
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.node_mut(id)?;
            node.touched = true;
            current = if only_self { None } else { node.parent };
        }
        Ok(())
    }

    pub(super) fn mark_as_untouched(&mut self, id: ControlId, only_self: bool) -> FormResult<()> {
        for descendant in self.subtree(id)? {
            self.node_mut(descendant)?.touched = false;
        }
        match self.node(id)?.parent {
            Some(parent) if !only_self => self.update_touched(parent, false),
            _ => Ok(()),
        }
    }

    pub(super) fn mark_as_dirty(&mut self, id: ControlId, only_self: bool) -> FormResult<()> {
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.node_mut(id)?;
            node.pristine = false;
            current = if only_self { None } else { node.parent };
        }
        Ok(())
    }

    pub(super) fn mark_as_pristine(&mut self, id: ControlId, only_self: bool) -> FormResult<()> {
        for descendant in self.subtree(id)? {
            self.node_mut(descendant)?.pristine = true;
        }
        match self.node(id)?.parent {
            Some(parent) if !only_self => self.update_pristine(parent, false),
            _ => Ok(()),
        }
    }
}
