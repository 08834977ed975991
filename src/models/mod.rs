pub mod plan;
pub mod project;
pub mod usage;
