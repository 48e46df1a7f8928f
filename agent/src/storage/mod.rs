//! Agent storage and settings

pub mod layout;
pub mod settings;
