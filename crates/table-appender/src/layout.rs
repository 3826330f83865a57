// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Message layout templates.
//!
//! A layout is a string with `{placeholder}` tokens, parsed once when the
//! appender is built:
//!
//! ```text
//! {level} [{target}] {message}   ->   INFO [app::db] connection opened
//! ```
//!
//! Supported placeholders are `{message}`, `{level}`, `{target}` and
//! `{thread}`. Anything else, including unknown placeholders, is copied
//! through literally.

use std::fmt::{self, Write};

use crate::record::LogLevel;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Message,
    Level,
    Target,
    Thread,
}

/// Values a layout can refer to.
#[derive(Debug, Clone, Copy)]
pub struct LayoutContext<'a> {
    pub message: &'a str,
    pub level: LogLevel,
    pub target: &'a str,
    pub thread: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    segments: Vec<Segment>,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            segments: vec![Segment::Message],
        }
    }
}

impl Layout {
    #[must_use]
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            literal.push_str(&rest[..start]);
            let after = &rest[start..];
            let Some(end) = after.find('}') else {
                // unterminated, keep the rest literally
                literal.push_str(after);
                rest = "";
                break;
            };
            let segment = match &after[1..end] {
                "message" => Some(Segment::Message),
                "level" => Some(Segment::Level),
                "target" => Some(Segment::Target),
                "thread" => Some(Segment::Thread),
                _ => None,
            };
            match segment {
                Some(segment) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                }
                None => literal.push_str(&after[..=end]),
            }
            rest = &after[end + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Layout { segments }
    }

    pub fn render(&self, context: &LayoutContext<'_>) -> Result<String, fmt::Error> {
        let mut out = String::with_capacity(context.message.len() + 32);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Message => out.push_str(context.message),
                Segment::Level => write!(out, "{}", context.level)?,
                Segment::Target => out.push_str(context.target),
                Segment::Thread => write!(out, "{}", context.thread)?,
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(message: &str) -> LayoutContext<'_> {
        LayoutContext {
            message,
            level: LogLevel::Warning,
            target: "app::db",
            thread: 7,
        }
    }

    #[test]
    fn test_default_layout_is_bare_message() {
        let layout = Layout::default();
        assert_eq!(layout, Layout::parse("{message}"));
        assert_eq!(layout.render(&context("hello")).unwrap(), "hello");
    }

    #[test]
    fn test_all_placeholders() {
        let layout = Layout::parse("{level} [{target}] ({thread}) {message}");
        assert_eq!(
            layout.render(&context("disk full")).unwrap(),
            "WARN [app::db] (7) disk full"
        );
    }

    #[test]
    fn test_unknown_and_unterminated_placeholders_are_literal() {
        let layout = Layout::parse("{host} {message} {oops");
        assert_eq!(layout.render(&context("m")).unwrap(), "{host} m {oops");
    }

    #[test]
    fn test_plain_text_layout() {
        let layout = Layout::parse("static");
        assert_eq!(layout.render(&context("ignored")).unwrap(), "static");
    }
}
