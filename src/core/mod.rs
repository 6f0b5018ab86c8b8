pub mod actions;
pub mod conditions;
pub mod config;
pub mod diagnostics;
pub mod extraction;
pub mod flex_field;
pub mod graph;
pub mod language_key;
pub mod loop_check;
pub mod pipeline;
pub mod placeholder;
pub mod render;
pub mod steps;
pub mod template;
