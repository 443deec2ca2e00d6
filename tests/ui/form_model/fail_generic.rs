use calmforms::form::FormModel;

#[derive(FormModel)]
struct WrappedForm<T> {
    value: T,
}

fn main() {}
