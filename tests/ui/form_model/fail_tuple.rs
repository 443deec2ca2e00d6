use calmforms::form::FormModel;

#[derive(FormModel)]
struct PairForm(String, bool);

fn main() {}
