//! Registry of tools for lookup and unknown-name suggestions.

use std::collections::HashMap;
use std::sync::Arc;

use crate::Tool;

/// Registry of tools, keyed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a registry with the built-in tools registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::ShellTool));
        registry.register(Arc::new(crate::ReadFileTool));
        registry
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All registered tool names, sorted.
    #[must_use]
    pub fn all_tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Suggest a similar tool name for an unknown one, using prefix
    /// matching and then edit distance.
    #[must_use]
    pub fn suggest(&self, name: &str) -> Option<String> {
        let lower = name.to_lowercase();
        let names = self.all_tool_names();

        for n in &names {
            if n.starts_with(&lower) {
                return Some(n.clone());
            }
        }

        let mut best: Option<(String, usize)> = None;
        for n in &names {
            let dist = levenshtein(&lower, n);
            // Only suggest for plausible typos.
            if dist <= 3 && best.as_ref().is_none_or(|(_, d)| dist < *d) {
                best = Some((n.clone(), dist));
            }
        }
        best.map(|(n, _)| n)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple Levenshtein distance with a rolling row.
// Index arithmetic is bounded by the row length allocated two lines up.
#[allow(clippy::arithmetic_side_effects)]
fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let n = b_chars.len();

    let mut prev_row: Vec<usize> = (0..=n).collect();
    let mut curr_row = vec![0usize; n + 1];

    for (i, a_ch) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_ch) in b_chars.iter().enumerate() {
            let cost = usize::from(a_ch != b_ch);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[n]
}
