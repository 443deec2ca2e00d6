pub mod directives;
pub mod form;
pub mod prelude;

pub use form::{FormError, FormResult, FormTree};

#[cfg(test)]
mod test_public_api;
