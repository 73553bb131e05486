pub mod history_core;
pub mod pipeline;
