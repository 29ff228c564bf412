//! Console logging bootstrap.
//!
//! The solvers log through the `log` facade; embedding applications usually
//! install their own logger. For standalone use, [`init`] wires up a
//! `simplelog` terminal logger. Calling it more than once is harmless -- the
//! first installed logger wins.

use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

pub fn init(level: &str) {
    let filter = match level {
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" | "none" => LevelFilter::Off,
        _ => LevelFilter::Info,
    };
    let _ = TermLogger::init(filter, Config::default(), TerminalMode::Mixed, ColorChoice::Auto);
}
