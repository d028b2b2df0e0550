//! Bot modules.

pub mod ci;
pub mod twrpdtgen;
