use std::fmt::{Display, Formatter};

use serde_json::Value;

use super::array::FormArray;
use super::control::{AbstractControl, ControlOptions, FormControl};
use super::group::FormGroup;
use super::tree::{ControlId, FormResult, FormTree};
use super::validation::ValidatorFn;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(&'static str);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(value)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// A struct whose fields map one-to-one onto the controls of a group.
/// Usually derived with `#[derive(FormModel)]`.
pub trait FormModel {
    type Fields;

    fn fields() -> Self::Fields;
    fn field_values(&self) -> Vec<(FieldKey, Value)>;
}

#[derive(Clone)]
pub struct FormBuilder {
    tree: FormTree,
    non_nullable: bool,
}

impl FormBuilder {
    pub fn new(tree: &FormTree) -> Self {
        Self {
            tree: tree.clone(),
            non_nullable: false,
        }
    }

    /// Controls built from here reset to their initial value instead of `null`.
    pub fn non_nullable(mut self) -> Self {
        self.non_nullable = true;
        self
    }

    pub fn tree(&self) -> &FormTree {
        &self.tree
    }

    fn options(&self, validators: Vec<ValidatorFn>) -> ControlOptions {
        ControlOptions::default()
            .validators(validators)
            .non_nullable(self.non_nullable)
    }

    pub fn control(&self, form_state: impl Into<Value>) -> FormResult<FormControl> {
        self.tree.control_with(form_state, self.options(Vec::new()))
    }

    pub fn control_with_validators(
        &self,
        form_state: impl Into<Value>,
        validators: Vec<ValidatorFn>,
    ) -> FormResult<FormControl> {
        self.tree.control_with(form_state, self.options(validators))
    }

    /// One leaf control per entry. Nested groups are built separately and
    /// attached with [`FormGroup::add_control`].
    pub fn group<K, V>(&self, fields: impl IntoIterator<Item = (K, V)>) -> FormResult<FormGroup>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let controls = fields
            .into_iter()
            .map(|(name, value)| Ok((name.into(), self.control(value)?.id())))
            .collect::<FormResult<Vec<(String, ControlId)>>>()?;
        self.tree.group(controls)
    }

    pub fn group_from<M>(&self, model: &M) -> FormResult<FormGroup>
    where
        M: FormModel,
    {
        self.group(
            model
                .field_values()
                .into_iter()
                .map(|(key, value)| (key.as_str(), value)),
        )
    }

    pub fn array<V>(&self, values: impl IntoIterator<Item = V>) -> FormResult<FormArray>
    where
        V: Into<Value>,
    {
        let controls = values
            .into_iter()
            .map(|value| Ok(self.control(value)?.id()))
            .collect::<FormResult<Vec<ControlId>>>()?;
        self.tree.array(controls)
    }
}
