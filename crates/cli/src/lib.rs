//! Shared CLI utilities and types

pub mod args;
pub mod completions;
pub mod display;
pub mod replay;
