use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{EXECUTE_END_TAG, EXECUTE_START_TAG};

static CODE_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)\r?\n?```$").ok());

/// Return the executable region of a payload
///
/// The text strictly between the first start tag and the next end tag, or
/// the whole payload (minus any Markdown fence) when there is no such pair.
pub fn extract_executable(payload: &str) -> &str {
    if let Some(start) = payload.find(EXECUTE_START_TAG) {
        let body_start = start + EXECUTE_START_TAG.len();
        if let Some(len) = payload[body_start..].find(EXECUTE_END_TAG) {
            return &payload[body_start..body_start + len];
        }
    }
    strip_code_fences(payload)
}

/// Wrap code in the execute tags
pub fn wrap_executable(code: &str) -> String {
    format!("{}{}{}", EXECUTE_START_TAG, code, EXECUTE_END_TAG)
}

/// Strip a surrounding Markdown code fence such as ```` ```python ````
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    CODE_FENCE
        .as_ref()
        .and_then(|fence| fence.captures(trimmed))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_between_tags() {
        let payload = "noise <execute_python>\nimport matplotlib\nprint(df.shape)\n</execute_python> trailing";
        assert_eq!(
            extract_executable(payload),
            "\nimport matplotlib\nprint(df.shape)\n"
        );
    }

    #[test]
    fn test_rewrapping_is_byte_identical() {
        for inner in ["", "x = 1", "\n  indented()\n\t", "print('<tag>')\n"] {
            let wrapped = wrap_executable(inner);
            let extracted = extract_executable(&wrapped);
            assert_eq!(extracted, inner);
            assert_eq!(wrap_executable(extracted), wrapped);
        }
    }

    #[test]
    fn test_untagged_payload_is_whole_unit() {
        assert_eq!(extract_executable("print(1)"), "print(1)");
    }

    #[test]
    fn test_unmatched_start_tag_falls_back() {
        let payload = "<execute_python> print(1)";
        assert_eq!(extract_executable(payload), payload);
    }

    #[test]
    fn test_fenced_payload_is_unwrapped() {
        let payload = "```python\nimport pandas as pd\nprint(df.head())\n```";
        assert_eq!(
            extract_executable(payload),
            "import pandas as pd\nprint(df.head())"
        );
    }

    #[test]
    fn test_first_pair_wins() {
        let payload = "<execute_python>a</execute_python><execute_python>b</execute_python>";
        assert_eq!(extract_executable(payload), "a");
    }
}
