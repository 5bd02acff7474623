//! Pretty-printing messages to the console

use colored::Colorize;
use std::path::Path;

/// Pretty-print an error message to the console
pub fn error(error_message: String) {
    let error_title = "error:".red().bold();
    eprintln!("{} {}", error_title, error_message);
}

/// Pretty-print a warning message to the console
pub fn warning(message: String) {
    let warning_title = "warning:".yellow().bold();
    eprintln!("{} {}", warning_title, message);
}

/// Pretty-print a warning message with its source location
pub fn warning_at(message: &str, file: &Path, line: usize) {
    let warning_title = "warning:".yellow().bold();
    eprintln!("{} {}:{}: {}", warning_title, file.display(), line, message);
}
