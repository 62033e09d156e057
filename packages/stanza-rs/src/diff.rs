use diffy::{DiffOptions, Line, Patch};

pub const DEFAULT_CONTEXT: usize = 3;

/// Renders a unified diff between two file snapshots. Returns an empty string
/// when the snapshots are identical.
pub fn unified_diff(
    before: &str,
    after: &str,
    before_header: &str,
    after_header: &str,
    context: usize,
) -> String {
    if before == after {
        return String::new();
    }

    let mut options = DiffOptions::new();
    options.set_context_len(context);
    let patch = options.create_patch(before, after);
    format_patch(before_header, after_header, &patch)
}

fn format_patch(before_header: &str, after_header: &str, patch: &Patch<'_, str>) -> String {
    let mut output_lines = Vec::new();
    output_lines.push(format!("--- {}", before_header));
    output_lines.push(format!("+++ {}", after_header));

    for hunk in patch.hunks() {
        output_lines.push(format!(
            "@@ -{},{} +{},{} @@",
            hunk.old_range().start(),
            hunk.old_range().len(),
            hunk.new_range().start(),
            hunk.new_range().len()
        ));

        for line in hunk.lines() {
            let (prefix, value) = match line {
                Line::Context(value) => (' ', value),
                Line::Delete(value) => ('-', value),
                Line::Insert(value) => ('+', value),
            };

            let (content, had_newline) = strip_trailing_newline(value);
            output_lines.push(format!("{}{}", prefix, content));
            if !had_newline {
                output_lines.push("\\ No newline at end of file".to_string());
            }
        }
    }

    let mut output = output_lines.join("\n");
    output.push('\n');
    output
}

fn strip_trailing_newline(value: &str) -> (&str, bool) {
    match value.strip_suffix('\n') {
        Some(trimmed) => (trimmed, true),
        None => (value, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_snapshots_render_nothing() {
        assert_eq!(unified_diff("a:\n", "a:\n", "x", "x", DEFAULT_CONTEXT), "");
    }

    #[test]
    fn test_changed_attribute() {
        let before = "fs1:\n\tdev = /dev/hd1\n";
        let after = "fs1:\n\tdev = /dev/hd2\n";
        let result = unified_diff(
            before,
            after,
            "/etc/filesystems (content)",
            "/etc/filesystems (content)",
            DEFAULT_CONTEXT,
        );

        assert!(result.starts_with("--- /etc/filesystems (content)\n+++ /etc/filesystems (content)\n"));
        assert!(result.contains("@@"));
        assert!(result.contains("-\tdev = /dev/hd1"));
        assert!(result.contains("+\tdev = /dev/hd2"));
    }

    #[test]
    fn test_newline_normalization_is_visible() {
        let result = unified_diff("a:", "a:\n", "before", "after", DEFAULT_CONTEXT);
        assert!(result.contains("\\ No newline at end of file"));
    }

    #[test]
    fn test_strip_trailing_newline() {
        assert_eq!(strip_trailing_newline("line\n"), ("line", true));
        assert_eq!(strip_trailing_newline("line"), ("line", false));
    }
}
