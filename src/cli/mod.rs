mod args;
mod commands;
mod main;

pub use args::BaseArgs;
pub use main::*;
