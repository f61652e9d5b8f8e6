//! Recovery of structured tool calls from free-form model text.
//!
//! The wire syntax is `[EXEC:tool args]` where `args` is absent, a bare
//! token, or a JSON value. Argument scanning tracks string mode (with
//! backslash escapes) plus `{}` and `[]` depths, so a `]` inside a quoted
//! string or a nested JSON array never terminates the tag early.

/// One tool call recovered from model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub tool: String,
    /// Exact substring between the tool token and the matching closing
    /// bracket. Never re-escaped.
    pub args_raw: String,
}

const MARKER: &str = "[EXEC:";

/// Iterator over the well-formed `[EXEC:...]` tags in a piece of text,
/// in left-to-right order. Malformed prefixes are skipped.
pub struct ExecCallParser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> ExecCallParser<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

/// Sub-state while scanning the argument text of one tag.
#[derive(Default)]
struct ArgScan {
    in_string: bool,
    escape: bool,
    brace_depth: u32,
    bracket_depth: u32,
}

impl ArgScan {
    /// Feed one byte; returns true when this byte is the closing `]` of
    /// the tag.
    fn closes_on(&mut self, ch: u8) -> bool {
        if self.in_string {
            if self.escape {
                self.escape = false;
            } else if ch == b'\\' {
                self.escape = true;
            } else if ch == b'"' {
                self.in_string = false;
            }
            return false;
        }
        match ch {
            b'"' => self.in_string = true,
            b'{' => self.brace_depth += 1,
            b'}' => self.brace_depth = self.brace_depth.saturating_sub(1),
            b'[' => self.bracket_depth += 1,
            b']' => {
                if self.brace_depth == 0 && self.bracket_depth == 0 {
                    return true;
                }
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
            }
            _ => {}
        }
        false
    }
}

impl Iterator for ExecCallParser<'_> {
    type Item = ExecCall;

    fn next(&mut self) -> Option<ExecCall> {
        let bytes = self.text.as_bytes();
        loop {
            let idx = self.text.get(self.pos..)?.find(MARKER)?;
            let start = self.pos + idx;
            let mut j = start + MARKER.len();

            // Tool token runs to whitespace or `]`.
            let tool_start = j;
            while j < bytes.len() && !matches!(bytes[j], b' ' | b'\t' | b'\r' | b'\n' | b']') {
                j += 1;
            }
            let tool = self.text[tool_start..j].trim();
            if tool.is_empty() {
                // Discard the tag; rescan right after the marker so a
                // nested tag inside the junk is still found.
                self.pos = start + MARKER.len();
                continue;
            }
            while j < bytes.len() && matches!(bytes[j], b' ' | b'\t') {
                j += 1;
            }
            let args_start = j;

            let mut scan = ArgScan::default();
            while j < bytes.len() {
                if scan.closes_on(bytes[j]) {
                    let args = self.text[args_start..j].trim();
                    self.pos = j + 1;
                    return Some(ExecCall {
                        tool: tool.to_string(),
                        args_raw: args.to_string(),
                    });
                }
                j += 1;
            }

            // Unterminated tag: nothing further can match.
            self.pos = bytes.len();
            return None;
        }
    }
}

/// Extract every well-formed tag from `text`. Returns an empty vec when
/// none are found — callers treat "no calls" uniformly.
pub fn extract_exec_calls(text: &str) -> Vec<ExecCall> {
    ExecCallParser::new(text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(text: &str) -> ExecCall {
        let calls = extract_exec_calls(text);
        assert_eq!(calls.len(), 1, "expected exactly one call in {text:?}");
        calls.into_iter().next().unwrap()
    }

    #[test]
    fn test_simple_json_object() {
        let c = one(r#"before [EXEC:fs.read {"path":"memory/facts.md"}] after"#);
        assert_eq!(c.tool, "fs.read");
        assert_eq!(c.args_raw, r#"{"path":"memory/facts.md"}"#);
    }

    #[test]
    fn test_bare_args() {
        let c = one("[EXEC:fs.read memory/facts.md]");
        assert_eq!(c.tool, "fs.read");
        assert_eq!(c.args_raw, "memory/facts.md");
    }

    #[test]
    fn test_no_args() {
        let c = one("[EXEC:memory.stats]");
        assert_eq!(c.tool, "memory.stats");
        assert_eq!(c.args_raw, "");
    }

    #[test]
    fn test_bracket_inside_quoted_string() {
        let c = one(r#"[EXEC:fs.write {"path":"memory/x.md","content":"a ] b"}]"#);
        assert_eq!(c.tool, "fs.write");
        assert!(c.args_raw.contains("a ] b"));
        let v: serde_json::Value = serde_json::from_str(&c.args_raw).unwrap();
        assert_eq!(v["content"], "a ] b");
    }

    #[test]
    fn test_json_array_argument() {
        let c = one(r#"[EXEC:skill.exec {"skill":"weather","script":"get.sh","args":["Beijing"]}]"#);
        let v: serde_json::Value = serde_json::from_str(&c.args_raw).unwrap();
        assert_eq!(v["args"][0], "Beijing");
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let c = one(r#"[EXEC:fs.write {"content":"say \"hi\" ]"}]"#);
        let v: serde_json::Value = serde_json::from_str(&c.args_raw).unwrap();
        assert_eq!(v["content"], "say \"hi\" ]");
    }

    #[test]
    fn test_multiple_calls_in_order() {
        let text = r#"[EXEC:fs.read a.md] middle [EXEC:fs.read b.md]"#;
        let calls = extract_exec_calls(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args_raw, "a.md");
        assert_eq!(calls[1].args_raw, "b.md");
    }

    #[test]
    fn test_empty_tool_token_discarded() {
        assert!(extract_exec_calls("[EXEC: {\"a\":1}]").is_empty());
        // A nested tag inside the junk is still recovered.
        let calls = extract_exec_calls("[EXEC: [EXEC:fs.read x.md]]");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, "fs.read");
    }

    #[test]
    fn test_unterminated_tag_yields_nothing() {
        assert!(extract_exec_calls(r#"[EXEC:fs.write {"path":"x""#).is_empty());
    }

    #[test]
    fn test_no_calls_is_empty_vec() {
        assert!(extract_exec_calls("plain prose, no tags").is_empty());
        assert!(extract_exec_calls("").is_empty());
    }

    #[test]
    fn test_nested_object_and_array_depths() {
        let c = one(r#"[EXEC:t {"a":{"b":[1,[2,3]],"c":"]"}}]"#);
        let v: serde_json::Value = serde_json::from_str(&c.args_raw).unwrap();
        assert_eq!(v["a"]["b"][1][1], 3);
    }

    #[test]
    fn test_tool_token_ends_at_close_bracket() {
        let c = one("[EXEC:ping]");
        assert_eq!(c.tool, "ping");
        assert_eq!(c.args_raw, "");
    }

    #[test]
    fn test_resumes_after_tag() {
        let text = r#"x [EXEC:a {"v":[1]}][EXEC:b]"#;
        let calls = extract_exec_calls(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool, "a");
        assert_eq!(calls[1].tool, "b");
    }
}
