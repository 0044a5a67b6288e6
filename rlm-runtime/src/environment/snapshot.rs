//! Metadata snapshot: the one-line status the model receives each turn

use serde::{Deserialize, Serialize};

/// Leading tag of every snapshot line
pub const SNAPSHOT_TAG: &str = "<user_prompt_metadata";

const ELLIPSIS: &str = "…";
const HEAD_PLACEHOLDER: &str = "...";

/// Widths used when rendering a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Cap for every quoted field, in characters
    pub field_width: usize,
    /// Characters of stdout kept for the snapshot
    pub stdout_tail_chars: usize,
    /// Characters of stderr kept for the snapshot
    pub stderr_tail_chars: usize,
    /// First cut applied to the task context before `field_width`
    pub prompt_head_width: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            field_width: 60,
            stdout_tail_chars: 512,
            stderr_tail_chars: 256,
            prompt_head_width: 120,
        }
    }
}

/// State a snapshot is rendered from
pub(crate) struct Snapshot<'a> {
    pub context: &'a str,
    pub final_set: bool,
    pub last_code: &'a str,
    pub stdout_tail: &'a str,
    pub stderr_tail: &'a str,
}

impl Snapshot<'_> {
    pub fn render(&self, config: &SnapshotConfig) -> String {
        let prompt_head = shorten(self.context, config.prompt_head_width, HEAD_PLACEHOLDER);
        format!(
            "{} prompt_len={} final={} last_code_ran=\"{}\" stdout_tail=\"{}\" stderr_tail=\"{}\" prompt_head=\"{}\">",
            SNAPSHOT_TAG,
            self.context.chars().count(),
            if self.final_set { "set" } else { "unset" },
            fragment(self.last_code, config.field_width),
            fragment(self.stdout_tail, config.field_width),
            fragment(self.stderr_tail, config.field_width),
            fragment(&prompt_head, config.field_width),
        )
    }
}

fn fragment(text: &str, width: usize) -> String {
    shorten(text, width, ELLIPSIS)
}

/// Collapse whitespace and cap `text` at `width` characters.
///
/// Whole words are kept while they fit next to the placeholder; when not even
/// the first word fits the text is cut mid-word. Applying it twice gives the
/// same result as applying it once.
pub fn shorten(text: &str, width: usize, placeholder: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let len = collapsed.chars().count();
    if len <= width {
        return collapsed;
    }

    let placeholder_len = placeholder.chars().count();
    if placeholder_len >= width {
        return placeholder.chars().take(width).collect();
    }
    let budget = width - placeholder_len;

    let mut kept = String::new();
    let mut kept_len = 0;
    for word in collapsed.split(' ') {
        let word_len = word.chars().count();
        let needed = if kept.is_empty() { word_len } else { kept_len + 1 + word_len };
        if needed > budget {
            break;
        }
        if !kept.is_empty() {
            kept.push(' ');
        }
        kept.push_str(word);
        kept_len = needed;
    }

    if kept.is_empty() {
        kept = collapsed.chars().take(budget).collect();
    }
    kept.push_str(placeholder);
    kept
}

/// Last `n` characters of `text`
pub fn tail(text: &str, n: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorten_keeps_whole_words() {
        assert_eq!(shorten("hello world foo bar", 12, "…"), "hello world…");
        assert_eq!(shorten("hello world x", 11, "…"), "hello…");
        assert_eq!(shorten("hello world", 11, "…"), "hello world");
    }

    #[test]
    fn test_shorten_collapses_whitespace() {
        assert_eq!(shorten("  a \n\t b  ", 10, "…"), "a b");
    }

    #[test]
    fn test_shorten_cuts_long_first_word() {
        let out = shorten("abcdefghijklmnopqrstuvwxyz more", 10, "…");
        assert_eq!(out, "abcdefghi…");
        assert_eq!(out.chars().count(), 10);
    }

    #[test]
    fn test_shorten_is_idempotent_and_bounded() {
        let samples = [
            "for i in range(10):\n    print(i)\n",
            "Traceback (most recent call last):\n  File \"<fragment>\", line 1\nNameError: name 'y' is not defined",
            "ééééééééééééééééééééééééééééééééééééééééééééééééééééééééééééééééééééé",
            "short",
            "",
        ];
        for width in [1, 5, 20, 60] {
            for sample in samples {
                let once = shorten(sample, width, "…");
                assert!(once.chars().count() <= width, "{once:?} exceeds {width}");
                assert_eq!(shorten(&once, width, "…"), once);
            }
        }
    }

    #[test]
    fn test_tail_is_char_safe() {
        assert_eq!(tail("héllo", 3), "llo");
        assert_eq!(tail("ab", 10), "ab");
        assert_eq!(tail("日本語テキスト", 2), "スト");
    }

    #[test]
    fn test_render_format() {
        let snapshot = Snapshot {
            context: "What is 2+2?",
            final_set: false,
            last_code: "x = 2 + 2\nprint(x)",
            stdout_tail: "4\n",
            stderr_tail: "",
        };
        assert_eq!(
            snapshot.render(&SnapshotConfig::default()),
            "<user_prompt_metadata prompt_len=12 final=unset last_code_ran=\"x = 2 + 2 print(x)\" \
             stdout_tail=\"4\" stderr_tail=\"\" prompt_head=\"What is 2+2?\">"
        );
    }

    #[test]
    fn test_render_caps_every_field() {
        let long = "word ".repeat(200);
        let snapshot = Snapshot {
            context: &long,
            final_set: true,
            last_code: &long,
            stdout_tail: &long,
            stderr_tail: &long,
        };
        let line = snapshot.render(&SnapshotConfig::default());
        assert!(line.starts_with(SNAPSHOT_TAG));
        assert!(line.contains("prompt_len=1000 final=set"));
        assert!(!line.contains('\n'));
        for field in line.split('"').skip(1).step_by(2) {
            assert!(field.chars().count() <= 60);
        }
    }
}
