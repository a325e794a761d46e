//! Dynamic form template engine: value model, schema compiler, renderer,
//! serializer and the submission flow that ties them to the backend.

pub mod flow;
pub mod render;
pub mod schema;
pub mod serialize;
pub mod template;
pub mod value;

pub use flow::{FlowError, FlowState, SubmissionFlow};
pub use schema::{compile, Schema, ValidationIssue};
pub use serialize::serialize;
pub use template::{FieldDescriptor, FieldType, FormTemplate};
pub use value::{FieldValue, FormValues};
