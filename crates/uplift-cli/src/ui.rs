//! Terminal output helpers shared by the subcommands.

use colored::Colorize;

/// Print a section header: ">> Title" in cyan.
pub fn section(title: &str) {
    println!("  {} {}", ">>".bright_cyan().bold(), title.bold());
}

/// Key-value display: "  Label:       value".
pub fn kv(label: &str, value: &str) {
    println!("  {:<13}{}", format!("{label}:"), value);
}

/// Key-value with green value.
pub fn kv_ok(label: &str, value: &str) {
    println!("  {:<13}{}", format!("{label}:"), value.bright_green());
}

/// Key-value with yellow value.
pub fn kv_warn(label: &str, value: &str) {
    println!("  {:<13}{}", format!("{label}:"), value.bright_yellow());
}

pub fn success(msg: &str) {
    println!("  {} {}", "\u{2714}".bright_green(), msg);
}

pub fn error(msg: &str) {
    println!("  {} {}", "\u{2718}".bright_red(), msg.bright_red());
}

/// Hint line in dimmed text.
pub fn hint(msg: &str) {
    println!("  {} {}", "hint:".dimmed(), msg.dimmed());
}

/// Red error + yellow "fix:" suggestion.
pub fn error_with_fix(msg: &str, fix: &str) {
    println!("  {} {}", "\u{2718}".bright_red(), msg.bright_red());
    println!("    {} {}", "fix:".bright_yellow(), fix);
}

/// Yellow warning + "try:" suggestion.
pub fn warn_with_fix(msg: &str, fix: &str) {
    println!("  {} {}", "-".bright_yellow(), msg.yellow());
    println!("    {} {}", "try:".bright_yellow(), fix);
}

/// Colored glyph + text for an agent, task, or approval status.
pub fn status_glyph(status: &str) -> String {
    match status {
        "running" | "approved" | "completed" => {
            format!("{} {status}", "\u{25cf}".bright_green())
        }
        "starting" | "pending" | "stopping" => {
            format!("{} {status}", "\u{25cf}".bright_yellow())
        }
        "failed" | "denied" | "expired" => format!("{} {status}", "\u{25cf}".bright_red()),
        _ => format!("{} {status}", "\u{25cb}".dimmed()),
    }
}

pub fn blank() {
    println!();
}
