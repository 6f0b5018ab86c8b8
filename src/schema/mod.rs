pub mod action;
pub mod condition;
pub mod dialog;
pub mod object;
pub mod payload;
