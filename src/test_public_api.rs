fn assert_validator<T: crate::form::Validator>() {}

fn assert_directive<T: crate::directives::ValidatorDirective>() {}

fn assert_accessor<T: crate::directives::ControlValueAccessor>() {}

#[test]
fn directives_facade_exports_attribute_validators() {
    assert_directive::<crate::directives::MaxValidator>();
    assert_directive::<crate::directives::MinValidator>();
    assert_directive::<crate::directives::MinLengthValidator>();
    assert_directive::<crate::directives::MaxLengthValidator>();
    assert_directive::<crate::directives::RequiredValidator>();
    assert_directive::<crate::directives::CheckboxRequiredValidator>();
    assert_directive::<crate::directives::EmailValidator>();
    assert_directive::<crate::directives::PatternValidator>();
    assert_accessor::<crate::directives::RadioControlValueAccessor>();
    assert_validator::<crate::directives::AttributeValidator<bool>>();
}

#[test]
fn prelude_smoke_builds_a_form() {
    use crate::prelude::*;

    #[derive(Clone, FormModel)]
    struct Signup {
        name: String,
        food: String,
    }

    let tree = FormTree::new();
    let form = FormBuilder::new(&tree)
        .group_from(&Signup {
            name: "calm".to_string(),
            food: "fish".to_string(),
        })
        .expect("signup group");
    let food = form
        .get_field(Signup::fields().food())
        .expect("lookup")
        .expect("food control");

    let registry = RadioControlRegistry::new(&tree);
    let radio = RadioControlValueAccessor::new(&registry, "fish", RadioInputs::named("food"));
    radio.init(food).expect("radio init");
    assert!(radio.is_checked());

    let required: ValidatorFn = Validators::required();
    tree.add_validator_fn(food, required).expect("validator");
    tree.set_value(food, Value::from(""), UpdateOptions::default())
        .expect("set value");
    assert_eq!(form.status().expect("status"), ControlStatus::Invalid);
    assert!(!radio.is_checked());
}
