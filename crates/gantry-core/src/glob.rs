//! Path and branch glob patterns.
//!
//! Patterns follow the path-filter conventions of hosted CI services:
//! - `*` matches any run of characters except `/`
//! - `**` matches any run of characters including `/`
//! - `**/` matches zero or more leading directories
//! - `?` matches a single character other than `/`
//! - `[abc]`, `[a-z]`, `[!abc]` match character classes
//!
//! Everything else is literal, so `*.yml` only matches top-level files while
//! `sleap/**` matches every file below `sleap/`.

use crate::{Error, Result};
use regex::Regex;
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A compiled glob pattern.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    /// Compile a pattern.
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let source = translate(&pattern)?;
        let regex = Regex::new(&source).map_err(|e| Error::InvalidGlob {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { pattern, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Whether the whole of `text` matches the pattern.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Whether the pattern contains any metacharacters.
    pub fn is_literal(&self) -> bool {
        !self.pattern.contains(['*', '?', '['])
    }
}

/// Compile a list of patterns, failing on the first invalid one.
pub fn compile_all<I, S>(patterns: I) -> Result<Vec<Glob>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    patterns.into_iter().map(Glob::new).collect()
}

fn translate(pattern: &str) -> Result<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let at_segment_start = i == 0 || chars[i - 1] == '/';
                if at_segment_start && chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|offset| i + 1 + offset)
                    .ok_or_else(|| Error::InvalidGlob {
                        pattern: pattern.to_string(),
                        reason: "unterminated character class".to_string(),
                    })?;
                let mut class: String = chars[i + 1..close].iter().collect();
                if let Some(rest) = class.strip_prefix('!') {
                    class = format!("^{}", rest);
                }
                if class.is_empty() || class == "^" {
                    return Err(Error::InvalidGlob {
                        pattern: pattern.to_string(),
                        reason: "empty character class".to_string(),
                    });
                }
                out.push('[');
                out.push_str(&class.replace('\\', "\\\\"));
                out.push(']');
                i = close + 1;
            }
            c => {
                out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
                i += 1;
            }
        }
    }

    out.push('$');
    Ok(out)
}

impl TryFrom<String> for Glob {
    type Error = Error;

    fn try_from(pattern: String) -> Result<Self> {
        Self::new(pattern)
    }
}

impl From<Glob> for String {
    fn from(glob: Glob) -> Self {
        glob.pattern
    }
}

impl PartialEq for Glob {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for Glob {}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Glob").field(&self.pattern).finish()
    }
}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl JsonSchema for Glob {
    fn schema_name() -> String {
        "Glob".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}
