pub mod attributes;
pub mod classify;
pub mod pipeline;
