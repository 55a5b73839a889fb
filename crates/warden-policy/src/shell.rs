//! Quote-aware decomposition of shell command strings.
//!
//! Splitting is syntactic only: a command is divided at unquoted `&&`,
//! `||`, `;`, `|`, `&`, and newlines so each sub-command can be admission
//! checked on its own. Anything the splitter cannot account for (unbalanced
//! quotes, tokens `shlex` rejects) is reported as unparsable, which the
//! engine turns into a forced confirmation rather than a silent allow.

/// Split a command string into its syntactic sub-commands.
///
/// Returns `None` when the command cannot be parsed. Empty segments
/// (doubled separators, trailing `;`) are dropped.
#[must_use]
pub fn split_commands(command: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut prev: Option<char> = None;

    let mut chars = command.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if !in_single => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                prev = Some('\\');
                continue;
            },
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(c);
            },
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            },
            '&' if !in_single && !in_double => {
                // `>&` / `2>&1` are redirection syntax, not separators.
                if prev == Some('>') {
                    current.push(c);
                } else {
                    if chars.peek() == Some(&'&') {
                        chars.next();
                    }
                    push_segment(&mut segments, &mut current);
                }
            },
            '|' if !in_single && !in_double => {
                if chars.peek() == Some(&'|') {
                    chars.next();
                }
                push_segment(&mut segments, &mut current);
            },
            ';' | '\n' if !in_single && !in_double => {
                push_segment(&mut segments, &mut current);
            },
            _ => current.push(c),
        }
        prev = Some(c);
    }

    if in_single || in_double {
        return None;
    }
    push_segment(&mut segments, &mut current);

    // Every segment must tokenize cleanly; shlex rejects what the scanner
    // could not see (e.g. a trailing backslash).
    for segment in &segments {
        shlex::split(segment)?;
    }

    Some(segments)
}

fn push_segment(segments: &mut Vec<String>, current: &mut String) {
    let segment = current.trim();
    if !segment.is_empty() {
        segments.push(segment.to_string());
    }
    current.clear();
}

/// Whether a sub-command contains an unquoted redirection operator.
#[must_use]
pub fn has_redirection(segment: &str) -> bool {
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if !in_single => {
                chars.next();
            },
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '>' | '<' if !in_single && !in_double => return true,
            _ => {},
        }
    }
    false
}

/// The root command of a sub-command: the first token that is not an
/// environment assignment.
#[must_use]
pub fn command_root(segment: &str) -> Option<String> {
    shlex::split(segment)?
        .into_iter()
        .find(|token| !token.contains('='))
}
