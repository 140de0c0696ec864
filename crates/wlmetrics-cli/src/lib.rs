//! wlmetrics command line front end.

pub mod cli;
pub mod io;

pub use cli::{run, run_cli_main, Args};
