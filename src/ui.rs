use colored::Colorize;
use serde::Serialize;

use crate::results::ActionResult;
use daemonapi::Event;

/// Output format of command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    #[default]
    Human,
    Json,
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Color an availability or state word
pub fn state(word: &str) -> String {
    match word {
        "up" | "succeeded" | "rolled back" => word.green().to_string(),
        "down" | "failed" | "rollback failed" => word.red().to_string(),
        "warn" | "skipped" | "rolling back" => word.yellow().to_string(),
        _ => word.dimmed().to_string(),
    }
}

/// Print any serializable value as pretty JSON
pub fn json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print one daemon event: time, kind, then the unit under `label`
pub fn event(event: &Event, label: &str, format: Format) {
    if format == Format::Json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }
    let at = event
        .at
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default();
    let unit = event.label_value(label).unwrap_or_default();
    let reason = event.data.get("error").and_then(|v| v.as_str()).unwrap_or_default();
    println!("{} {} {unit} {}", at.dimmed(), event.kind.cyan(), reason.red());
}

/// Render a batch of results
///
/// Human output prints one line per unit, errors on stderr. `silent`
/// suppresses error lines: the exit code carries the outcome.
pub fn render(results: &[ActionResult], format: Format, silent: bool) -> anyhow::Result<()> {
    if format == Format::Json {
        return json(results);
    }
    for r in results {
        match (&r.error, &r.human) {
            (Some(err), _) => {
                if !silent {
                    error(&format!("{}: {err}", r.unit()));
                }
            }
            (None, Some(human)) => println!("{human}"),
            (None, None) if r.data.is_null() => success(&r.unit()),
            (None, None) => match &r.data {
                serde_json::Value::String(s) => println!("{s}"),
                data => println!("{}: {data}", r.unit()),
            },
        }
    }
    Ok(())
}
