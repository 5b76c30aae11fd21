// src/commands/mod.rs
//! Command handlers for the larder CLI

mod cook;
mod info;
mod inspect;

pub use cook::{cmd_cook, cmd_fetch, kitchen_config};
pub use info::cmd_info;
pub use inspect::{cmd_check, cmd_inspect};
