//! The service specification: its canonical schema (C3) and the validator
//! that turns a raw YAML/JSON document into a defaulted, checked document
//! or a field-level `ValidationError`.

pub mod model;
pub mod validate;

pub use model::{ServiceSpecDocument, API_VERSION, KIND};
pub use validate::{validate, ContentType};
