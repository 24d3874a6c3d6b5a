// Pipeline processing stages, in run order

pub mod parser;
pub mod mapping;
pub mod quality_gate;
pub mod delivery;
