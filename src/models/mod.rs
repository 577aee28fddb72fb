pub mod generation;
pub mod validation;
