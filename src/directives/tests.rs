use super::*;
use crate::form::{AbstractControl, ControlStatus, FormError, FormTree, Validator};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn change(name: &str, value: Value) -> SimpleChanges {
    SimpleChanges::new().with(name, SimpleChange::first(value))
}

#[test]
fn max_validator_reports_bound_and_actual_value() {
    let directive = MaxValidator::max(4).expect("max directive");

    assert_eq!(directive.validate(&json!(4)), None);
    assert_eq!(directive.validate(&json!("4")), None);
    assert_eq!(
        directive.validate(&json!(4.0001)).map(Value::Object),
        Some(json!({ "max": { "max": 4, "actual": 4.0001 } }))
    );

    let fractional = MaxValidator::max("2.5").expect("max directive");
    assert_eq!(
        fractional.validate(&json!(3)).map(Value::Object),
        Some(json!({ "max": { "max": 2.5, "actual": 3 } }))
    );
}

#[test]
fn non_numeric_bound_disables_validator() {
    let directive = MinValidator::min("ten").expect("min directive");
    assert!(!directive.is_enabled());
    assert_eq!(directive.validate(&json!(-100)), None);

    directive
        .set_input(Some(json!(null)))
        .expect("null input is accepted");
    assert!(!directive.is_enabled());
    assert_eq!(directive.validate(&json!(-100)), None);

    directive.set_input(Some(json!("3"))).expect("numeric string");
    assert!(directive.is_enabled());
    assert!(directive.validate(&json!(2)).is_some());
}

#[test]
fn changes_for_other_inputs_are_ignored() {
    let directive = MaxLengthValidator::max_length(2).expect("maxlength directive");
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = calls.clone();
        directive.register_on_validator_change(Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
        }));
    }

    directive
        .on_changes(&change("minlength", json!(10)))
        .expect("unrelated change");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(directive.raw_input(), Some(json!(2)));

    directive
        .on_changes(&change("maxlength", json!(5)))
        .expect("watched change");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(directive.validate(&json!("abcd")), None);
}

#[test]
fn email_directive_is_gated_by_its_attribute() {
    let directive = EmailValidator::email().expect("email directive");
    assert!(directive.is_enabled());
    assert!(directive.validate(&json!("not-an-email")).is_some());
    assert_eq!(directive.validate(&json!("user@example.com")), None);
    assert_eq!(directive.validate(&json!("")), None);

    directive.set_input(Some(json!("false"))).expect("switch off");
    assert!(!directive.is_enabled());
    assert_eq!(directive.validate(&json!("not-an-email")), None);

    directive.set_input(Some(json!(true))).expect("switch on");
    assert!(directive.is_enabled());
    assert!(directive.validate(&json!("not-an-email")).is_some());
}

#[test]
fn required_directives_follow_boolean_attribute_rules() {
    let required = RequiredValidator::required().expect("required directive");
    assert_eq!(
        required.validate(&json!("")).map(Value::Object),
        Some(json!({ "required": true }))
    );
    assert!(required.validate(&json!([])).is_some());
    assert!(required.validate(&json!(null)).is_some());
    assert_eq!(required.validate(&json!(0)), None);
    assert_eq!(required.validate(&json!(false)), None);

    required.set_input(Some(json!("false"))).expect("switch off");
    assert_eq!(required.validate(&json!("")), None);

    let checkbox = CheckboxRequiredValidator::checkbox_required().expect("checkbox directive");
    assert!(checkbox.validate(&json!(false)).is_some());
    assert_eq!(checkbox.validate(&json!(true)), None);

    assert!(boolean_attribute(Some(&json!(""))));
    assert!(boolean_attribute(Some(&json!("required"))));
    assert!(!boolean_attribute(Some(&json!("false"))));
    assert!(!boolean_attribute(None));
}

#[test]
fn pattern_directive_matches_whole_value() {
    let directive = PatternValidator::pattern("[a-zA-Z ]*").expect("pattern directive");
    assert_eq!(directive.validate(&json!("Hello world")), None);
    assert_eq!(directive.validate(&json!("")), None);
    assert_eq!(
        directive.validate(&json!("Hello 42")).map(Value::Object),
        Some(json!({
            "pattern": { "requiredPattern": "^[a-zA-Z ]*$", "actualValue": "Hello 42" }
        }))
    );

    let invalid = PatternValidator::pattern("(unclosed");
    assert!(matches!(invalid, Err(FormError::InvalidPattern { .. })));

    let regex = regex::Regex::new("[0-9]+").expect("regex compiles");
    let directive = PatternValidator::pattern_regex(regex).expect("regex directive");
    assert_eq!(directive.validate(&json!("123")), None);
    assert!(directive.validate(&json!("12a")).is_some());
}

#[test]
fn attached_directive_revalidates_control_on_input_change() {
    let tree = FormTree::new();
    let control = tree.control("abcdef").expect("control");
    let directive = Arc::new(MaxLengthValidator::max_length(10).expect("directive"));
    tree.attach_validator(control.id(), directive.clone())
        .expect("attach validator");
    assert_eq!(control.status().expect("status"), ControlStatus::Valid);

    directive.set_input(Some(json!(3))).expect("shrink bound");
    assert_eq!(control.status().expect("status"), ControlStatus::Invalid);
    assert!(control.has_error("maxlength").expect("errors"));

    directive.set_input(None).expect("clear bound");
    assert_eq!(control.status().expect("status"), ControlStatus::Valid);
}

#[test]
fn detached_directive_no_longer_validates() {
    let tree = FormTree::new();
    let control = tree.control("").expect("control");
    let directive = Arc::new(RequiredValidator::required().expect("directive"));
    let validator = tree
        .attach_validator(control.id(), directive.clone())
        .expect("attach validator");
    assert!(control.invalid().expect("status"));

    tree.detach_validator(control.id(), directive.as_ref(), validator)
        .expect("detach validator");
    assert!(control.valid().expect("status"));

    directive.set_input(Some(json!(""))).expect("input change");
    assert!(control.valid().expect("status"));
}

struct RadioFixture {
    tree: FormTree,
    registry: Arc<RadioControlRegistry>,
    accessors: Vec<Arc<RadioControlValueAccessor>>,
    counts: Vec<Arc<AtomicUsize>>,
}

fn food_radios() -> RadioFixture {
    let tree = FormTree::new();
    let food = tree.control("chicken").expect("food control");
    tree.group([("food", food.id())]).expect("group");
    let registry = RadioControlRegistry::new(&tree);

    let mut accessors = Vec::new();
    let mut counts = Vec::new();
    for value in ["chicken", "fish", "beef"] {
        let accessor =
            RadioControlValueAccessor::new(&registry, value, RadioInputs::named("food"));
        accessor.init(food.id()).expect("radio init");
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            accessor.on_checked_change(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        accessors.push(accessor);
        counts.push(count);
    }

    RadioFixture {
        tree,
        registry,
        accessors,
        counts,
    }
}

#[test]
fn selecting_radio_unchecks_siblings_once() {
    let fixture = food_radios();
    assert!(fixture.accessors[0].is_checked());
    assert!(!fixture.accessors[1].is_checked());
    assert_eq!(fixture.registry.len(), 3);

    fixture.accessors[1].on_change();

    let counts = fixture
        .counts
        .iter()
        .map(|count| count.load(Ordering::SeqCst))
        .collect::<Vec<_>>();
    assert_eq!(counts, vec![1, 0, 1]);
    assert!(fixture.accessors[1].is_checked());
    assert!(!fixture.accessors[0].is_checked());
    assert!(!fixture.accessors[2].is_checked());

    let control = fixture.accessors[1].control().expect("bound control");
    assert_eq!(fixture.tree.value(control).expect("value"), json!("fish"));
    assert!(!fixture.tree.is_pristine(control).expect("pristine"));
}

#[test]
fn model_writes_reach_every_radio() {
    let fixture = food_radios();
    let control = fixture.accessors[0].control().expect("bound control");

    fixture
        .tree
        .set_value(control, json!("beef"), Default::default())
        .expect("set value");

    let checked = fixture
        .accessors
        .iter()
        .map(|accessor| accessor.is_checked())
        .collect::<Vec<_>>();
    assert_eq!(checked, vec![false, false, true]);
}

#[test]
fn radios_in_other_groups_are_left_alone() {
    let tree = FormTree::new();
    let first = tree.control("a").expect("first control");
    let second = tree.control("a").expect("second control");
    tree.group([("first", first.id())]).expect("first group");
    tree.group([("second", second.id())]).expect("second group");
    let registry = RadioControlRegistry::new(&tree);

    let left = RadioControlValueAccessor::new(&registry, "a", RadioInputs::named("choice"));
    let right = RadioControlValueAccessor::new(&registry, "b", RadioInputs::named("choice"));
    let renamed = RadioControlValueAccessor::new(&registry, "b", RadioInputs::named("other"));
    left.init(first.id()).expect("left init");
    right.init(second.id()).expect("right init");
    renamed.init(first.id()).expect("renamed init");

    renamed.on_change();
    assert!(left.is_checked());
    assert!(!right.is_checked());
}

#[test]
fn removing_unknown_radio_is_noop() {
    let fixture = food_radios();
    let stranger =
        RadioControlValueAccessor::new(&fixture.registry, "pork", RadioInputs::named("food"));

    assert!(!fixture.registry.remove(&stranger));
    assert_eq!(fixture.registry.len(), 3);

    fixture.accessors[0].destroy();
    assert_eq!(fixture.registry.len(), 2);
    fixture.accessors[0].destroy();
    assert_eq!(fixture.registry.len(), 2);

    fixture.accessors[1].on_change();
    assert_eq!(fixture.counts[0].load(Ordering::SeqCst), 0);
}

#[test]
fn destroyed_radio_no_longer_follows_the_model() {
    let fixture = food_radios();
    let control = fixture.accessors[0].control().expect("bound control");
    fixture.accessors[0].destroy();

    fixture
        .tree
        .set_value(control, json!("fish"), Default::default())
        .expect("set value");
    assert_eq!(fixture.counts[0].load(Ordering::SeqCst), 0);
    assert!(fixture.accessors[0].is_checked());
    assert!(fixture.accessors[1].is_checked());

    fixture.accessors[0].on_blur();
    assert!(!fixture.tree.is_touched(control).expect("touched"));

    fixture
        .tree
        .disable(control, Default::default())
        .expect("disable");
    assert!(!fixture.accessors[0].is_disabled());
}

#[test]
fn reinitialised_radio_is_written_once_per_model_change() {
    let tree = FormTree::new();
    let control = tree.control("a").expect("control");
    let registry = RadioControlRegistry::new(&tree);
    let accessor = RadioControlValueAccessor::new(&registry, "a", RadioInputs::named("choice"));
    let writes = Arc::new(AtomicUsize::new(0));
    {
        let writes = writes.clone();
        accessor.on_checked_change(move |_| {
            writes.fetch_add(1, Ordering::SeqCst);
        });
    }

    accessor.init(control.id()).expect("first init");
    accessor.destroy();
    accessor.init(control.id()).expect("second init");
    assert_eq!(registry.len(), 1);

    let before = writes.load(Ordering::SeqCst);
    tree.set_value(control.id(), json!("b"), Default::default())
        .expect("set value");
    assert_eq!(writes.load(Ordering::SeqCst), before + 1);
    assert!(!accessor.is_checked());
}

#[test]
fn empty_radio_names_count_as_absent() {
    let tree = FormTree::new();
    let control = tree.control(Value::Null).expect("control");
    let registry = RadioControlRegistry::new(&tree);

    let unnamed = RadioControlValueAccessor::new(
        &registry,
        "x",
        RadioInputs::named("").form_control_name("drink"),
    );
    unnamed.init(control.id()).expect("empty name inherits");
    assert_eq!(unnamed.name().as_deref(), Some("drink"));

    let named = RadioControlValueAccessor::new(
        &registry,
        "y",
        RadioInputs::named("food").form_control_name(""),
    );
    named.init(control.id()).expect("empty form control name is ignored");
    assert_eq!(named.name().as_deref(), Some("food"));
    assert_eq!(registry.len(), 2);
}

#[test]
fn radio_name_must_match_form_control_name() {
    let tree = FormTree::new();
    let control = tree.control(Value::Null).expect("control");
    let registry = RadioControlRegistry::new(&tree);

    let mismatched = RadioControlValueAccessor::new(
        &registry,
        "x",
        RadioInputs::named("food").form_control_name("drink"),
    );
    assert_eq!(
        mismatched.init(control.id()),
        Err(FormError::RadioNameMismatch {
            name: "food".to_string(),
            form_control_name: "drink".to_string(),
        })
    );
    assert!(registry.is_empty());

    let inherited = RadioControlValueAccessor::new(
        &registry,
        "x",
        RadioInputs::default().form_control_name("drink"),
    );
    inherited.init(control.id()).expect("inherits name");
    assert_eq!(inherited.name().as_deref(), Some("drink"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn radio_tracks_disabled_state_and_blur() {
    let fixture = food_radios();
    let control = fixture.accessors[0].control().expect("bound control");

    fixture
        .tree
        .disable(control, Default::default())
        .expect("disable");
    assert!(fixture.accessors.iter().all(|accessor| accessor.is_disabled()));

    fixture
        .tree
        .enable(control, Default::default())
        .expect("enable");
    assert!(!fixture.accessors[0].is_disabled());

    fixture.accessors[2].on_blur();
    assert!(fixture.tree.is_touched(control).expect("touched"));
}

#[test]
fn init_fails_once_registry_is_dropped() {
    let tree = FormTree::new();
    let control = tree.control("a").expect("control");
    let registry = RadioControlRegistry::new(&tree);
    let accessor = RadioControlValueAccessor::new(&registry, "a", RadioInputs::named("a"));
    drop(registry);

    assert_eq!(accessor.init(control.id()), Err(FormError::RegistryReleased));
}
