// Data processing pipeline: file parsing, mapping, quality checks and delivery

pub mod processing;
pub mod tasks;

pub use processing::parser;
pub use tasks::{DispatchError, Dispatcher, PipelineJob};
