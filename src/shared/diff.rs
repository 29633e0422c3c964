//! Unified diffs of a document against its baseline.

use std::io::{self, Write};

use similar::TextDiff;
use termimad::crossterm::style::{Color, ResetColor, SetForegroundColor};
use termimad::crossterm::tty::IsTty;

/// Lines of unchanged context around each hunk.
const CONTEXT_RADIUS: usize = 3;

/// Print a unified diff to stdout, colored when stdout is a terminal.
/// Ignores BrokenPipe errors (e.g., when piped to `head`).
pub fn print_diff(old: &str, new: &str, old_label: &str, new_label: &str) -> anyhow::Result<()> {
    let use_color = io::stdout().is_tty();
    if let Err(e) = write_diff(&mut io::stdout(), old, new, old_label, new_label, use_color)
        && e.kind() != io::ErrorKind::BrokenPipe
    {
        return Err(e.into());
    }
    Ok(())
}

/// Write a unified diff with `---`/`+++` headers and `@@` hunks.
/// Writes nothing when the texts are equal.
pub fn write_diff<W: Write>(
    writer: &mut W,
    old: &str,
    new: &str,
    old_label: &str,
    new_label: &str,
    use_color: bool,
) -> io::Result<()> {
    let diff = TextDiff::from_lines(old, new);
    let rendered = diff
        .unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .header(old_label, new_label)
        .to_string();

    for line in rendered.split_inclusive('\n') {
        let color = match line.as_bytes().first() {
            _ if line.starts_with("---") || line.starts_with("+++") => None,
            Some(b'-') => Some(Color::Red),
            Some(b'+') => Some(Color::Green),
            Some(b'@') => Some(Color::Cyan),
            _ => None,
        };
        match color {
            Some(c) if use_color => write!(writer, "{}{line}{}", SetForegroundColor(c), ResetColor)?,
            _ => write!(writer, "{line}")?,
        }
    }
    Ok(())
}
