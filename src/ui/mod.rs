pub mod console;
pub mod render;

pub use console::{drive, run_console, Command};
