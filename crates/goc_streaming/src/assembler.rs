//! The row assembler (spec.md §4.4): turns a stream of raw text fragments
//! into complete JSON row objects, tolerating a fragment boundary landing
//! anywhere — mid-object, mid-string, mid-escape. Design Notes §9
//! explicitly rules out a regex approach here; this is a small hand-written
//! bracket-depth state machine instead.
//!
//! Only `{...}` objects are emitted as rows. A provider conventionally wraps
//! its rows in an enclosing `[...]`; array brackets are scanned past (so
//! they never get mistaken for string content or an escape target) but
//! don't participate in the depth count — only nested *object* braces do,
//! since an object can itself contain an array-valued field.

use serde_json::Value;

/// Incremental JSON-object extractor. Feed it fragments with [`push`]; each
/// call returns the rows that completed as a result of that fragment (zero,
/// one, or several, since a single fragment can close more than one
/// object).
#[derive(Debug, Default)]
pub struct RowAssembler {
    object_depth: u32,
    in_string: bool,
    escape: bool,
    object_start: Option<usize>,
    buffer: String,
    /// Byte offset into `buffer` already scanned by a previous `push`. Only
    /// bytes at or after this cursor are re-scanned on the next call — the
    /// state fields above are carried across calls, so re-scanning already-
    /// consumed bytes against *current* state would desynchronize the
    /// machine (e.g. re-entering a `{` while `in_string` from a later
    /// fragment is still true).
    scanned: usize,
}

impl RowAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one text fragment and returns any rows it completed, in
    /// producer order.
    pub fn push(&mut self, fragment: &str) -> Vec<Value> {
        self.buffer.push_str(fragment);
        let mut completed = Vec::new();

        let chars: Vec<(usize, char)> = self.buffer[self.scanned..].char_indices().map(|(i, c)| (i + self.scanned, c)).collect();

        for &(byte_pos, c) in &chars {
            if self.in_string {
                if self.escape {
                    self.escape = false;
                } else if c == '\\' {
                    self.escape = true;
                } else if c == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match c {
                '"' => self.in_string = true,
                '{' => {
                    if self.object_depth == 0 {
                        self.object_start = Some(byte_pos);
                    }
                    self.object_depth += 1;
                }
                '}' => {
                    self.object_depth = self.object_depth.saturating_sub(1);
                    if self.object_depth == 0 {
                        if let Some(start) = self.object_start.take() {
                            let end = byte_pos + c.len_utf8();
                            let candidate = &self.buffer[start..end];
                            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                                completed.push(value);
                            }
                        }
                    }
                }
                _ => {} // '[' / ']' / commas / whitespace outside an object carry no state
            }
        }

        self.scanned = self.buffer.len();

        if let Some(start) = self.object_start {
            // Trim the array/comma noise preceding the in-progress object so
            // the buffer doesn't grow across an entire long-running stream.
            // The scan cursor shifts by the same amount so it still points
            // at "end of buffer" after the drain.
            if start > 0 {
                self.buffer.drain(..start);
                self.object_start = Some(0);
                self.scanned -= start;
            }
        } else {
            self.buffer.clear();
            self.scanned = 0;
        }

        completed
    }

    /// True if a partial object is buffered (a fragment boundary landed
    /// mid-object).
    pub fn has_partial(&self) -> bool {
        self.object_start.is_some()
    }

    /// Forces whatever's buffered to parse, called when a `length`
    /// finish_reason truncates the stream (spec.md §4.4). Closes an open
    /// string and every unmatched `{` with best-effort terminators; returns
    /// `None` if the result still isn't valid JSON.
    pub fn flush(&mut self) -> Option<Value> {
        if !self.has_partial() {
            return None;
        }
        let mut candidate = self.buffer.clone();
        if self.in_string {
            candidate.push('"');
        }
        for _ in 0..self.object_depth {
            candidate.push('}');
        }
        let value = serde_json::from_str::<Value>(&candidate).ok();
        if value.is_some() {
            self.buffer.clear();
            self.scanned = 0;
            self.object_depth = 0;
            self.object_start = None;
            self.in_string = false;
            self.escape = false;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_fragment_completes_one_row() {
        let mut assembler = RowAssembler::new();
        let rows = assembler.push(r#"[{"a": 1}]"#);
        assert_eq!(rows, vec![json!({"a": 1})]);
    }

    #[test]
    fn object_split_across_fragments_completes_on_the_closing_fragment() {
        let mut assembler = RowAssembler::new();
        assert!(assembler.push(r#"[{"a": "hel"#).is_empty());
        let rows = assembler.push(r#"lo"}]"#);
        assert_eq!(rows, vec![json!({"a": "hello"})]);
    }

    #[test]
    fn escaped_quote_inside_string_does_not_close_early() {
        let mut assembler = RowAssembler::new();
        let rows = assembler.push(r#"[{"a": "she said \"hi\""}]"#);
        assert_eq!(rows, vec![json!({"a": "she said \"hi\""})]);
    }

    #[test]
    fn multiple_objects_in_one_fragment_all_complete() {
        let mut assembler = RowAssembler::new();
        let rows = assembler.push(r#"[{"a": 1}, {"a": 2}]"#);
        assert_eq!(rows, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[test]
    fn brace_inside_a_string_value_is_not_a_structural_bracket() {
        let mut assembler = RowAssembler::new();
        let rows = assembler.push(r#"[{"note": "{not json}"}]"#);
        assert_eq!(rows, vec![json!({"note": "{not json}"})]);
    }

    #[test]
    fn nested_array_valued_field_does_not_confuse_object_depth() {
        let mut assembler = RowAssembler::new();
        let rows = assembler.push(r#"[{"tags": ["a", "b"], "n": 1}]"#);
        assert_eq!(rows, vec![json!({"tags": ["a", "b"], "n": 1})]);
    }

    #[test]
    fn partial_object_reports_as_partial_until_closed() {
        let mut assembler = RowAssembler::new();
        assembler.push(r#"[{"a": 1"#);
        assert!(assembler.has_partial());
        assembler.push("}]");
        assert!(!assembler.has_partial());
    }

    #[test]
    fn flush_closes_an_unterminated_object() {
        let mut assembler = RowAssembler::new();
        assembler.push(r#"[{"a": 1"#);
        let flushed = assembler.flush();
        assert_eq!(flushed, Some(json!({"a": 1})));
    }

    #[test]
    fn flush_on_no_partial_data_returns_none() {
        let mut assembler = RowAssembler::new();
        assembler.push(r#"[{"a": 1}]"#);
        assert_eq!(assembler.flush(), None);
    }
}
