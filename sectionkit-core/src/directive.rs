//! Tokenizer for the `section` and `schema` template directives.
//!
//! Both directives are resolved on raw template source, before the template
//! engine parses it:
//!
//! - `{% schema %} ... {% endschema %}` is dropped along with everything in
//!   between. The body is usually raw JSON and is never evaluated.
//! - `{% section 'name' %}` becomes a [`Segment::Section`] carrying the parsed
//!   name, which the renderer expands by rendering the named section file.
//!
//! Every other tag is left in place for the engine. `{% raw %}` regions and
//! `{# ... #}` comments are passed through untouched.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("line {line}: tag opened with `{{%` is never closed")]
    UnterminatedTag { line: usize },

    #[error("line {line}: schema block is never closed with `{{% endschema %}}`")]
    UnclosedSchema { line: usize },

    #[error("line {line}: invalid section argument: {reason}")]
    InvalidSectionArgument { line: usize, reason: String },
}

/// A piece of template source after directive resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Source handed to the engine unchanged
    Text(&'a str),
    Section(SectionDirective),
}

/// A parsed `{% section 'name' %}` tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDirective {
    pub name: String,
    /// Tag was opened with `{%-`
    pub trim_before: bool,
    /// Tag was closed with `-%}`
    pub trim_after: bool,
}

struct Tag<'a> {
    start: usize,
    end: usize,
    name: &'a str,
    args: &'a str,
    trim_before: bool,
    trim_after: bool,
}

/// Split template source into engine text and section directives, dropping
/// schema blocks.
pub fn scan(source: &str) -> Result<Vec<Segment<'_>>, DirectiveError> {
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(tag) = next_tag(source, cursor)? {
        match tag.name {
            "schema" => {
                push_text(&mut segments, &source[text_start..tag.start]);
                let end = find_block_end(source, tag.end, "endschema")?.ok_or(
                    DirectiveError::UnclosedSchema {
                        line: line_of(source, tag.start),
                    },
                )?;
                text_start = end;
                cursor = end;
            }
            "endschema" => {
                push_text(&mut segments, &source[text_start..tag.start]);
                text_start = tag.end;
                cursor = tag.end;
            }
            "section" => {
                push_text(&mut segments, &source[text_start..tag.start]);
                let name = parse_section_argument(tag.args).map_err(|reason| {
                    DirectiveError::InvalidSectionArgument {
                        line: line_of(source, tag.start),
                        reason,
                    }
                })?;
                segments.push(Segment::Section(SectionDirective {
                    name,
                    trim_before: tag.trim_before,
                    trim_after: tag.trim_after,
                }));
                text_start = tag.end;
                cursor = tag.end;
            }
            // An unclosed raw block is the engine's error to report
            "raw" => cursor = find_block_end(source, tag.end, "endraw")?.unwrap_or(tag.end),
            _ => cursor = tag.end,
        }
    }

    push_text(&mut segments, &source[text_start..]);
    Ok(segments)
}

/// Check a section name: non-empty, no leading `.`, and only ASCII
/// alphanumerics, `-`, `_` or `.`.
pub fn validate_section_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("section name is empty".to_string());
    }
    if name.starts_with('.') {
        return Err(format!("section name `{}` may not start with '.'", name));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!(
            "section name `{}` contains invalid character {:?}",
            name, c
        ));
    }
    Ok(())
}

/// Parse the single quoted literal a `section` tag takes.
fn parse_section_argument(args: &str) -> Result<String, String> {
    let quote = match args.chars().next() {
        Some(q @ ('\'' | '"')) => q,
        Some(_) => return Err(format!("expected a quoted name, found `{}`", args)),
        None => return Err("missing section name".to_string()),
    };

    let body = &args[1..];
    let close = body
        .find(quote)
        .ok_or_else(|| format!("unterminated string literal `{}`", args))?;

    let rest = body[close + 1..].trim();
    if !rest.is_empty() {
        return Err(format!("unexpected `{}` after section name", rest));
    }

    let name = &body[..close];
    validate_section_name(name)?;
    Ok(name.to_string())
}

/// Find the next `{% ... %}` tag at or after `from`, skipping `{# ... #}`
/// comments.
fn next_tag(source: &str, from: usize) -> Result<Option<Tag<'_>>, DirectiveError> {
    let mut from = from;
    let start = loop {
        let tag = source[from..].find("{%").map(|offset| from + offset);
        let comment = source[from..].find("{#").map(|offset| from + offset);

        match (tag, comment) {
            (Some(tag), Some(comment)) if comment < tag => {
                // An unclosed comment is the engine's error to report
                let Some(close) = source[comment + 2..].find("#}") else {
                    return Ok(None);
                };
                from = comment + 2 + close + 2;
            }
            (Some(tag), _) => break tag,
            (None, _) => return Ok(None),
        }
    };

    let mut inner_start = start + 2;
    let trim_before = source[inner_start..].starts_with('-');
    if trim_before {
        inner_start += 1;
    }

    let close = find_close(source, inner_start).ok_or(DirectiveError::UnterminatedTag {
        line: line_of(source, start),
    })?;

    let mut inner_end = close;
    let trim_after = inner_end > inner_start && source[..inner_end].ends_with('-');
    if trim_after {
        inner_end -= 1;
    }

    let inner = source[inner_start..inner_end].trim();
    let (name, args) = match inner.find(char::is_whitespace) {
        Some(idx) => (&inner[..idx], inner[idx..].trim()),
        None => (inner, ""),
    };

    Ok(Some(Tag {
        start,
        end: close + 2,
        name,
        args,
        trim_before,
        trim_after,
    }))
}

/// Offset of the `%}` closing a tag, skipping over quoted strings.
fn find_close(source: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut quote: Option<u8> = None;

    for i in from..bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'%' && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            None => {}
        }
    }

    None
}

/// End offset of the first `closing` tag at or after `from`. Tags in between
/// are opaque.
fn find_block_end(
    source: &str,
    from: usize,
    closing: &str,
) -> Result<Option<usize>, DirectiveError> {
    let mut cursor = from;
    while let Some(tag) = next_tag(source, cursor)? {
        if tag.name == closing {
            return Ok(Some(tag.end));
        }
        cursor = tag.end;
    }
    Ok(None)
}

fn push_text<'a>(segments: &mut Vec<Segment<'a>>, text: &'a str) {
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}
