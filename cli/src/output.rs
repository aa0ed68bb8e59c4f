use colored::Colorize;
use errors::ValidationIssue;
use serde::Serialize;

pub fn header(title: &str) {
    println!("{}", title.bold().underline());
}

pub fn hint(msg: &str) {
    println!("{} {}", "hint:".cyan().bold(), msg.dimmed());
}

pub fn info(msg: &str) {
    eprintln!("{} {}", "info:".blue().bold(), msg);
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "error:".red().bold(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

pub fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print validator warnings on stderr, one per line.
pub fn warnings(issues: &[ValidationIssue]) {
    for issue in issues {
        warn(&format!("{} ({})", issue, issue.validator));
    }
}

/// `name: value` with the value highlighted and an optional dimmed note.
pub fn field(name: &str, value: &str, note: Option<&str>) {
    match note {
        Some(note) => println!(
            "  {:<24} {} {}",
            format!("{name}:"),
            value.cyan(),
            format!("({note})").dimmed()
        ),
        None => println!("  {:<24} {}", format!("{name}:"), value.cyan()),
    }
}
