//! Resource drivers for object resource sections

pub mod command;

pub use command::{CommandResource, Keywords};
