//! CLI domain: parse, route and output only.
//! Pipelines do the work; this layer wires clients and prints results.

mod output;
mod parse;
mod route;

pub use output::{format_clone_report, format_push_report, map_error};
pub use parse::{Cli, Commands};
pub use route::RunContext;
