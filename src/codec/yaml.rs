//! YAML codec with inline-level collapsing.
//!
//! Decoding goes through `serde_yaml`. Encoding is a small block-style
//! emitter: containers are written as indented blocks until the inline
//! budget runs out, below that they collapse to flow style
//! (`{ a: 1 }`, `[1, 2]`).
//!
//! ```text
//! inline_level = 2
//!
//! server:
//!     listen: { host: localhost, port: 8080 }
//! ```

use std::fmt::Write;

use serde_json::Value;

use super::{Codec, CodecError, Format};

#[derive(Debug, Clone)]
pub struct YamlCodec {
    indent: usize,
    inline_level: usize,
}

impl YamlCodec {
    /// `inline_level` is the nesting depth at which containers switch to
    /// flow style. Zero writes the whole document in flow style.
    pub fn new(indentation_spaces: usize, inline_level: usize) -> Self {
        Self {
            // Block nesting needs at least one column
            indent: indentation_spaces.max(1),
            inline_level,
        }
    }

    fn dump(&self, value: &Value, inline: usize, indent: usize, out: &mut String) {
        let prefix = " ".repeat(indent);

        if inline == 0 || !is_block_container(value) {
            out.push_str(&prefix);
            dump_flow(value, out);
            return;
        }

        match value {
            Value::Array(items) => {
                for item in items {
                    self.dump_entry(&prefix, "-", item, inline - 1, indent, out);
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    let head = format!("{}:", scalar(key, false));
                    self.dump_entry(&prefix, &head, item, inline - 1, indent, out);
                }
            }
            _ => unreachable!("checked by is_block_container"),
        }
    }

    fn dump_entry(
        &self,
        prefix: &str,
        head: &str,
        item: &Value,
        inline: usize,
        indent: usize,
        out: &mut String,
    ) {
        out.push_str(prefix);
        out.push_str(head);

        if inline == 0 || !is_block_container(item) {
            out.push(' ');
            self.dump(item, 0, 0, out);
            out.push('\n');
        } else {
            out.push('\n');
            self.dump(item, inline, indent + self.indent, out);
        }
    }
}

impl Codec for YamlCodec {
    fn format(&self) -> Format {
        Format::Yaml
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_yaml::from_slice(bytes).map_err(|e| CodecError::Decode {
            format: Format::Yaml,
            reason: e.to_string(),
        })
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let mut out = String::new();
        self.dump(value, self.inline_level, 0, &mut out);
        if !out.ends_with('\n') {
            out.push('\n');
        }
        Ok(out.into_bytes())
    }
}

/// Non-empty array or object.
fn is_block_container(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => false,
    }
}

fn dump_flow(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&scalar(s, true)),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                dump_flow(item, out);
            }
            out.push(']');
        }
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Object(map) => {
            out.push_str("{ ");
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&scalar(key, true));
                out.push_str(": ");
                dump_flow(item, out);
            }
            out.push_str(" }");
        }
    }
}

/// Render a string scalar, quoting when plain style would change its meaning.
fn scalar(s: &str, in_flow: bool) -> String {
    if s.chars().any(needs_escape) {
        return double_quoted(s);
    }

    // serde_yaml knows which plain scalars would resolve to another type
    // ("true", "8080", "~", ...) and single-quotes them.
    let rendered = match serde_yaml::to_string(s) {
        Ok(rendered) => rendered.trim_end_matches('\n').to_string(),
        Err(_) => return double_quoted(s),
    };

    let quoted = rendered.starts_with('\'') || rendered.starts_with('"');
    if rendered.contains('\n') || (in_flow && !quoted && has_flow_indicator(&rendered)) {
        return double_quoted(s);
    }

    rendered
}

fn has_flow_indicator(s: &str) -> bool {
    s.contains([',', '[', ']', '{', '}'])
}

/// Characters YAML will not read back verbatim from a plain or quoted scalar:
/// non-printables, plus the line breaks that quoted scalars fold (NEL, LS, PS).
fn needs_escape(c: char) -> bool {
    c.is_control() || matches!(c, '\u{2028}' | '\u{2029}' | '\u{feff}')
}

fn double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if needs_escape(c) => {
                let code = u32::from(c);
                let _ = if code <= 0xff {
                    write!(out, "\\x{code:02X}")
                } else {
                    write!(out, "\\u{code:04X}")
                };
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
