//! Reading Mewofiles from disk.

use std::fs;
use std::io;
use std::path::Path;

/// Reads a Mewofile and splits it into lines.
///
/// # Arguments
///
/// * `path` - Path to the Mewofile
///
/// # Returns
///
/// - `Ok(lines)` - One entry per line, with a trailing `\r` removed
/// - `Err(error)` - An I/O error if the file cannot be read
///
/// # Errors
///
/// Returns an error if the file does not exist, is not valid UTF-8 or
/// cannot be read.
pub fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(split_lines(&content))
}

/// Splits text on `\n`, dropping one trailing `\r` from each line.
pub fn split_lines(content: &str) -> Vec<String> {
    let mut lines: Vec<String> = content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect();
    if content.is_empty() || content.ends_with('\n') {
        lines.pop();
    }
    lines
}
