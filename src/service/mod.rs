//! The operation helper and the declarative field validation it relies on through
//! `Model::full_clean`.

mod operations;
mod validation;
pub use operations::{Extra, ModelOperations, ModelService};
pub use validation::FieldValidator;
