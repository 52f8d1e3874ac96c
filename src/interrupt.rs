use anyhow::{Context, Result};
use tracing::info;

use crate::logging;
use crate::terminal::{FAREWELL, Style, paint};

/// Turns Ctrl+C into a farewell and a successful exit.
///
/// Terminal reads block the whole process, so the handler cannot hand control
/// back to the REPL; it finishes the process itself after flushing logs.
pub fn init() -> Result<()> {
    ctrlc::set_handler(|| {
        info!("interrupted by user");
        logging::flush();
        println!("{}", paint(Style::Error, FAREWELL));
        std::process::exit(0);
    })
    .context("Failed to install Ctrl+C handler")
}
