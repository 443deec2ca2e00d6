use calmforms::form::{FormBuilder, FormModel, FormTree, Value};

#[derive(Clone, calmforms::form::FormModel)]
struct DemoForm {
    email: String,
    subscribed: bool,
}

fn main() {
    let fields = DemoForm::fields();
    assert_eq!(fields.email().as_str(), "email");
    assert_eq!(fields.subscribed().as_str(), "subscribed");

    let model = DemoForm {
        email: "a@calm.ui".to_string(),
        subscribed: true,
    };
    let values = model.field_values();
    assert_eq!(values[0].1, Value::from("a@calm.ui"));

    let tree = FormTree::new();
    let group = FormBuilder::new(&tree).group_from(&model).expect("group");
    assert!(group.get_field(fields.email()).expect("lookup").is_some());
}
