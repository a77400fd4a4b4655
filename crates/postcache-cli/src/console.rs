//! CLI console utilities

use colored::*;

/// CLI console for formatted output
pub struct CLIConsole {
    verbose: bool,
}

impl CLIConsole {
    /// Create a new CLI console
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.verbose {
            println!("{} {}", "ℹ".blue().bold(), message);
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        println!("{} {}", "✓".green().bold(), message.green());
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message.yellow());
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message.red());
    }

    /// Print a diagnostic notification
    pub fn notify(&self, message: &str) {
        println!("{} {}", "◆".cyan().bold(), message.cyan());
    }

    /// Print a header
    pub fn print_header(&self, title: &str) {
        println!();
        println!("{}", title.bold().underline());
        println!("{}", "=".repeat(title.chars().count()).dimmed());
    }

    /// Print an aligned label and value
    pub fn print_field(&self, label: &str, value: &str) {
        let label = format!("{:<24}", format!("{}:", label));
        println!("  {} {}", label.dimmed(), value);
    }

    /// Print a separator
    pub fn print_separator(&self) {
        if self.verbose {
            println!("{}", "-".repeat(50).dimmed());
        }
    }
}
