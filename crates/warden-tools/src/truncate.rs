//! Output truncation: inline caps plus side-file persistence.

use std::io::Write;
use std::path::{Path, PathBuf};

use warden_core::CallId;

/// Maximum inline output size in characters before truncation.
pub const MAX_OUTPUT_CHARS: usize = 30_000;

/// Truncate a string at the nearest char boundary at or before `max_bytes`.
#[must_use]
pub fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    s[..end].to_string()
}

/// Truncate tool output to stay within context limits.
///
/// If `output` exceeds [`MAX_OUTPUT_CHARS`], it is truncated at a char
/// boundary and a notice is appended.
#[must_use]
pub fn truncate_output(output: String) -> String {
    if output.len() <= MAX_OUTPUT_CHARS {
        return output;
    }
    let mut truncated = truncate_at_char_boundary(&output, MAX_OUTPUT_CHARS);
    truncated.push_str("\n\n... (output truncated — exceeded 30000 character limit)");
    truncated
}

/// Size thresholds for shell-tool output.
#[derive(Debug, Clone, Copy)]
pub struct ShellOutputLimits {
    /// Maximum inline bytes.
    pub max_bytes: usize,
    /// Maximum inline lines.
    pub max_lines: usize,
}

impl Default for ShellOutputLimits {
    fn default() -> Self {
        Self {
            max_bytes: 20_000,
            max_lines: 256,
        }
    }
}

impl ShellOutputLimits {
    /// Whether `output` fits inline without truncation.
    #[must_use]
    pub fn fits(&self, output: &str) -> bool {
        output.len() <= self.max_bytes && output.lines().count() <= self.max_lines
    }
}

/// Shell output after the size limits were applied.
#[derive(Debug, Clone)]
pub struct TruncatedOutput {
    /// The inline content, truncated when over the limits.
    pub content: String,
    /// Where the full output was persisted, when truncation applied.
    pub output_file: Option<PathBuf>,
}

/// Apply shell output limits, persisting the full output to a side file
/// when truncation occurs.
///
/// # Errors
///
/// Propagates I/O failures while writing the side file. The caller decides
/// whether to degrade to inline-only truncation.
pub fn write_side_file(
    output: &str,
    limits: &ShellOutputLimits,
    side_dir: &Path,
    call_id: &CallId,
) -> std::io::Result<TruncatedOutput> {
    if limits.fits(output) {
        return Ok(TruncatedOutput {
            content: output.to_string(),
            output_file: None,
        });
    }

    std::fs::create_dir_all(side_dir)?;
    let path = side_dir.join(format!("{}.out", sanitize_file_stem(call_id.as_str())));

    // Write-to-temp-then-rename so observers never see a partial file.
    let mut tmp = tempfile::NamedTempFile::new_in(side_dir)?;
    tmp.write_all(output.as_bytes())?;
    tmp.persist(&path).map_err(|e| e.error)?;

    let mut inline = String::new();
    for line in output.lines().take(limits.max_lines) {
        inline.push_str(line);
        inline.push('\n');
    }
    let mut inline = truncate_at_char_boundary(&inline, limits.max_bytes);
    inline.push_str(&format!(
        "\n... (output truncated; full output at {})",
        path.display()
    ));

    Ok(TruncatedOutput {
        content: inline,
        output_file: Some(path),
    })
}

/// Keep side-file names filesystem-safe regardless of caller-chosen ids.
fn sanitize_file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ---- Inline truncation ----

    #[test]
    fn test_truncate_output_small() {
        let small = "hello".to_string();
        assert_eq!(truncate_output(small.clone()), small);
    }

    #[test]
    fn test_truncate_output_large() {
        let large = "x".repeat(40_000);
        let result = truncate_output(large);
        assert!(result.len() < 40_000);
        assert!(result.contains("output truncated"));
    }

    #[test]
    fn test_boundary_does_not_split_multibyte() {
        let mut s = "x".repeat(198);
        s.push('🦀');
        assert_eq!(truncate_at_char_boundary(&s, 200), "x".repeat(198));
    }

    // ---- Side files ----

    #[test]
    fn test_within_limits_no_side_file() {
        let dir = TempDir::new().unwrap();
        let limits = ShellOutputLimits::default();
        let result =
            write_side_file("short output", &limits, dir.path(), &CallId::new("c1")).unwrap();
        assert_eq!(result.content, "short output");
        assert!(result.output_file.is_none());
    }

    #[test]
    fn test_byte_limit_persists_full_output() {
        let dir = TempDir::new().unwrap();
        let limits = ShellOutputLimits {
            max_bytes: 100,
            max_lines: 1000,
        };
        let output = "y".repeat(500);
        let result = write_side_file(&output, &limits, dir.path(), &CallId::new("c2")).unwrap();

        let path = result.output_file.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), output);
        assert!(result.content.contains("output truncated"));
        assert!(result.content.len() < output.len());
    }

    #[test]
    fn test_line_limit_applies() {
        let dir = TempDir::new().unwrap();
        let limits = ShellOutputLimits {
            max_bytes: 1_000_000,
            max_lines: 3,
        };
        let output = (0..50).map(|i| format!("line {i}\n")).collect::<String>();
        let result = write_side_file(&output, &limits, dir.path(), &CallId::new("c3")).unwrap();

        assert!(result.output_file.is_some());
        assert!(result.content.contains("line 0"));
        assert!(result.content.contains("line 2"));
        assert!(!result.content.contains("line 3\n"));
    }

    #[test]
    fn test_hostile_call_id_sanitized() {
        let dir = TempDir::new().unwrap();
        let limits = ShellOutputLimits {
            max_bytes: 1,
            max_lines: 1,
        };
        let result = write_side_file(
            "too long for the limit",
            &limits,
            dir.path(),
            &CallId::new("../../etc/passwd"),
        )
        .unwrap();

        let path = result.output_file.unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(!path.to_string_lossy().contains(".."));
    }
}
