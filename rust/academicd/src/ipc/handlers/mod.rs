pub mod core;
pub mod flow;
pub mod forms;
pub mod instances;
pub mod setup;
pub mod templates;
