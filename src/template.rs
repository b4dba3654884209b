//! Placeholder templates resolved against device events
//!
//! A template is compiled once from a config string and rendered many times.
//! Supported syntax:
//! - `${NAME}` expands to the event property `NAME`
//! - `$$` is a literal `$`
//! - any other `$` is kept as-is

use crate::event::DeviceEvent;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static PLACEHOLDER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid placeholder regex"));

/// Template errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated placeholder in `{0}'")]
    Unterminated(String),

    #[error("empty placeholder in `{0}'")]
    EmptyPlaceholder(String),

    #[error("invalid placeholder name `{name}' in `{source_text}'")]
    InvalidName { name: String, source_text: String },

    #[error("unresolved placeholder `{0}'")]
    UnresolvedPlaceholder(String),
}

/// One piece of a compiled template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied verbatim
    Literal(String),

    /// Event property looked up at render time
    Property(String),
}

/// Compiled placeholder template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Compile a raw string
    pub fn compile(raw: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while let Some(pos) = rest.find('$') {
            literal.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(tail) = after.strip_prefix('$') {
                literal.push('$');
                rest = tail;
            } else if let Some(body) = after.strip_prefix('{') {
                let end = body
                    .find('}')
                    .ok_or_else(|| TemplateError::Unterminated(raw.to_string()))?;
                let name = &body[..end];

                if name.is_empty() {
                    return Err(TemplateError::EmptyPlaceholder(raw.to_string()));
                }
                if !PLACEHOLDER_NAME.is_match(name) {
                    return Err(TemplateError::InvalidName {
                        name: name.to_string(),
                        source_text: raw.to_string(),
                    });
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Property(name.to_string()));
                rest = &body[end + 1..];
            } else {
                literal.push('$');
                rest = after;
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Render against an event; every placeholder must resolve
    pub fn render(&self, event: &dyn DeviceEvent) -> Result<String, TemplateError> {
        let mut out = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Property(name) => {
                    let value = event
                        .property(name)
                        .ok_or_else(|| TemplateError::UnresolvedPlaceholder(name.clone()))?;
                    out.push_str(value);
                }
            }
        }

        Ok(out)
    }

    /// Compiled segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of all placeholders, in order of appearance
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Property(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}
