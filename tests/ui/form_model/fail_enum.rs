use calmforms::form::FormModel;

#[derive(FormModel)]
enum ChoiceForm {
    Email(String),
    Phone(String),
}

fn main() {}
