//! Removal of markdown fences wrapped around a pasted fragment

const WRAPPER_TAGS: [&str; 5] = ["", "repl", "python", "py", "python3"];

fn is_opening(line: &str) -> bool {
    line.trim()
        .strip_prefix("```")
        .map(|tag| WRAPPER_TAGS.contains(&tag.trim().to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_closing(line: &str) -> bool {
    line.trim() == "```"
}

/// Drop a wrapper fence from the first and last line only.
///
/// Backticks anywhere else (string literals, docstrings) are left alone.
pub fn strip_fences(code: &str) -> String {
    let lines: Vec<&str> = code.trim_matches(|c| c == '\n' || c == '\r').lines().collect();
    if lines.is_empty() {
        return code.to_string();
    }

    let start = usize::from(is_opening(lines[0]));
    let mut end = lines.len();
    if start == 1 && end > start && is_closing(lines[end - 1]) {
        end -= 1;
    }

    if start == 0 && end == lines.len() {
        return code.to_string();
    }
    lines[start..end].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_code_is_unchanged() {
        let code = "x = 1\nprint(x)\n";
        assert_eq!(strip_fences(code), code);
    }

    #[test]
    fn test_strips_known_wrappers() {
        for tag in ["repl", "python", "py", "python3", "", "Python"] {
            let fenced = format!("```{tag}\nx = 1\nprint(x)\n```");
            assert_eq!(strip_fences(&fenced), "x = 1\nprint(x)", "tag {tag:?}");
        }
    }

    #[test]
    fn test_unknown_tag_is_kept() {
        let fenced = "```bash\nls\n```";
        assert_eq!(strip_fences(fenced), fenced);

        let trailing = "x = 1\n```";
        assert_eq!(strip_fences(trailing), trailing);
    }

    #[test]
    fn test_inner_backticks_survive() {
        let code = "```repl\ns = \"```\"\nprint(s)\n```\n";
        assert_eq!(strip_fences(code), "s = \"```\"\nprint(s)");
    }

    #[test]
    fn test_unterminated_opening() {
        assert_eq!(strip_fences("```python\nprint(1)"), "print(1)");
    }
}
