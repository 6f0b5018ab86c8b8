//! Dialog Export: template-driven code generation for branching game dialogs.
//!
//! Turns an author-built dialog graph (text lines, choices, conditions,
//! actions, references) into target-language script source by splitting the
//! graph into named functions and filling placeholder templates.

pub mod core;
pub mod schema;
