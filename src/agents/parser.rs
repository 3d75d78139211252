use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::constants::EXECUTE_START_TAG;
use crate::executor::{strip_code_fences, wrap_executable};

/// Parse a structured result out of free-form model text
///
/// Models wrap their JSON in fences, prepend prose, split it across several
/// objects or leave raw newlines inside strings. Every top-level object found
/// is merged (earlier keys win) and the merge is deserialized as `T`.
pub fn parse_structured<T: DeserializeOwned>(response: &str) -> Result<T, String> {
    let merged = merged_object(response).ok_or_else(|| "no JSON object found".to_string())?;
    serde_json::from_value(merged).map_err(|e| e.to_string())
}

/// Merge every top-level JSON object in `response` into one value
pub fn merged_object(response: &str) -> Option<Value> {
    let text = strip_code_fences(response);
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }

    let objects = extract_json_objects(text);
    if objects.is_empty() {
        return None;
    }

    let mut merged = Map::new();
    for object in objects {
        if let Value::Object(map) = object {
            for (key, value) in map {
                merged.entry(key).or_insert(value);
            }
        }
    }
    Some(Value::Object(merged))
}

/// Find the balanced top-level `{...}` spans of `text` that parse as JSON
pub fn extract_json_objects(text: &str) -> Vec<Value> {
    let bytes = text.as_bytes();
    let mut objects = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find('{') {
        let start = cursor + offset;
        match balanced_end(bytes, start) {
            Some(end) => {
                let candidate = &text[start..=end];
                if let Some(value) = parse_lenient(candidate) {
                    objects.push(value);
                    cursor = end + 1;
                    continue;
                }
                cursor = start + 1;
            }
            None => cursor = start + 1,
        }
    }

    objects
}

/// Code from a result field, or the raw response when the model skipped JSON
/// and answered with tagged code directly
pub fn code_or_raw(parsed: Result<String, String>, response: &str) -> Result<String, String> {
    match parsed {
        Ok(code) => Ok(ensure_execute_tags(&code)),
        Err(e) if response.contains(EXECUTE_START_TAG) => {
            tracing::debug!("using tagged code from unstructured response ({})", e);
            Ok(ensure_execute_tags(response))
        }
        Err(e) => Err(e),
    }
}

/// Normalise code so it is wrapped in the execute tags, without fences
pub fn ensure_execute_tags(text: &str) -> String {
    let code = strip_code_fences(text.trim()).trim();
    if code.contains(EXECUTE_START_TAG) {
        code.to_string()
    } else {
        wrap_executable(&format!("\n{}\n", code))
    }
}

/// Index of the `}` closing the object opened at `start`, skipping string contents
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_lenient(candidate: &str) -> Option<Value> {
    serde_json::from_str(candidate)
        .ok()
        .or_else(|| serde_json::from_str(&escape_raw_controls(candidate)).ok())
}

/// Escape literal newlines and tabs that appear inside JSON strings
fn escape_raw_controls(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::{PythonCodeResult, ReflectResult};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plain_object() {
        let result: PythonCodeResult =
            parse_structured(r#"{"python_code": "<execute_python>print(1)</execute_python>"}"#).unwrap();
        assert_eq!(result.python_code, "<execute_python>print(1)</execute_python>");
    }

    #[test]
    fn test_parse_fenced_object_with_prose() {
        let response = "```json\n{\"python_code\": \"x = {'a': 1}\"}\n```";
        let result: PythonCodeResult = parse_structured(response).unwrap();
        assert_eq!(result.python_code, "x = {'a': 1}");

        let response = "Sure! Here it is:\n{\"python_code\": \"plt.plot()\"}\nHope that helps.";
        let result: PythonCodeResult = parse_structured(response).unwrap();
        assert_eq!(result.python_code, "plt.plot()");
    }

    #[test]
    fn test_split_objects_are_merged() {
        let response = r#"{"feedback": "Axis labels overlap."}
{"python_code": "<execute_python>plt.close()</execute_python>"}"#;
        let result: ReflectResult = parse_structured(response).unwrap();
        assert_eq!(result.feedback, "Axis labels overlap.");
        assert_eq!(result.python_code, "<execute_python>plt.close()</execute_python>");
    }

    #[test]
    fn test_raw_newlines_inside_strings() {
        let response = "{\"python_code\": \"import pandas as pd\n\tprint(df)\"}";
        let result: PythonCodeResult = parse_structured(response).unwrap();
        assert_eq!(result.python_code, "import pandas as pd\n\tprint(df)");
    }

    #[test]
    fn test_unbalanced_prefix_is_skipped() {
        let objects = extract_json_objects("{ broken { \"a\": 1 }");
        assert_eq!(objects, vec![serde_json::json!({"a": 1})]);
    }

    #[test]
    fn test_no_json_is_an_error() {
        assert!(parse_structured::<PythonCodeResult>("I cannot help with that").is_err());
    }

    #[test]
    fn test_code_or_raw_accepts_tagged_text() {
        let response = "<execute_python>print(2)</execute_python>";
        let code = code_or_raw(Err("no JSON object found".to_string()), response).unwrap();
        assert_eq!(code, response);
        assert!(code_or_raw(Err("nope".to_string()), "plain prose").is_err());
    }

    #[test]
    fn test_ensure_execute_tags() {
        assert_eq!(
            ensure_execute_tags("```python\nprint(1)\n```"),
            "<execute_python>\nprint(1)\n</execute_python>"
        );
        assert_eq!(
            ensure_execute_tags("  <execute_python>a</execute_python> "),
            "<execute_python>a</execute_python>"
        );
    }
}
