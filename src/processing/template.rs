//! Custom compression command templates.
//!
//! A template such as `pngquant --quality 60-80 -o "{output}" "{input}"` is
//! split into arguments once, then the `{input}` and `{output}` tokens are
//! replaced by literal paths. Nothing is passed through a shell.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::utils::ConfigError;

pub const INPUT_TOKEN: &str = "{input}";
pub const OUTPUT_TOKEN: &str = "{output}";

/// A parsed command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    source: String,
    words: Vec<String>,
}

impl CommandTemplate {
    /// Parse `template`, rejecting it when no word references `{output}`.
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let malformed = || ConfigError::MalformedCommandTemplate(template.to_string());
        let words = split_words(template).ok_or_else(malformed)?;
        if words.is_empty() || !words[1..].iter().any(|w| w.contains(OUTPUT_TOKEN)) {
            return Err(malformed());
        }
        Ok(Self {
            source: template.to_string(),
            words,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Expand into a program and its arguments.
    pub fn expand(&self, input: &Path, output: &Path) -> (PathBuf, Vec<OsString>) {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        let mut words = self
            .words
            .iter()
            .map(|w| w.replace(INPUT_TOKEN, &input).replace(OUTPUT_TOKEN, &output));
        let program = PathBuf::from(words.next().unwrap_or_default());
        (program, words.map(OsString::from).collect())
    }
}

/// Split on whitespace, honouring single and double quotes and backslash
/// escapes inside double quotes. `None` on an unterminated quote.
fn split_words(template: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '\'' => break,
                        ch => current.push(ch),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '"' => break,
                        '\\' if matches!(chars.peek(), Some('"' | '\\')) => current.push(chars.next()?),
                        ch => current.push(ch),
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Some(words)
}
