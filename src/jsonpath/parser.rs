// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::{Filter, Segment};
use crate::error::{BindingError, Result};

pub(super) fn parse(expr: &str) -> Result<Vec<Segment>> {
    let invalid = |reason: &str| BindingError::InvalidPath {
        expr: expr.to_string(),
        reason: reason.to_string(),
    };

    let mut body = expr.trim();
    if let Some(inner) = body.strip_prefix('{') {
        body = inner
            .strip_suffix('}')
            .ok_or_else(|| invalid("missing closing brace"))?
            .trim();
    }
    if let Some(rest) = body.strip_prefix('$') {
        body = rest;
    }
    if body.is_empty() {
        return Err(invalid("empty expression"));
    }

    let chars: Vec<char> = body.chars().collect();
    let mut segments = Vec::new();
    let mut pos = 0;

    // A leading bare field (`spec.template`) is accepted like `.spec.template`.
    if chars[0] != '.' && chars[0] != '[' {
        let (field, next) = read_field(&chars, 0);
        segments.push(Segment::Field(field));
        pos = next;
    }

    while pos < chars.len() {
        match chars[pos] {
            '.' => {
                let (field, next) = read_field(&chars, pos + 1);
                if field.is_empty() {
                    return Err(invalid("empty field name"));
                }
                segments.push(Segment::Field(field));
                pos = next;
            }
            '[' => {
                let close = find_bracket_end(&chars, pos + 1)
                    .ok_or_else(|| invalid("unterminated bracket"))?;
                let inner: String = chars[pos + 1..close].iter().collect();
                segments.push(parse_bracket(inner.trim()).map_err(|r| invalid(&r))?);
                pos = close + 1;
            }
            c => return Err(invalid(&format!("unexpected character '{}'", c))),
        }
    }

    Ok(segments)
}

fn read_field(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && chars[end] != '.' && chars[end] != '[' {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

/// Position of the `]` closing a bracket opened just before `start`,
/// skipping over quoted strings.
fn find_bracket_end(chars: &[char], start: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in chars.iter().enumerate().skip(start) {
        match (quote, *c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(*c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_bracket(inner: &str) -> std::result::Result<Segment, String> {
    if inner == "*" {
        return Ok(Segment::Wildcard);
    }
    if let Some(quoted) = unquote(inner) {
        return Ok(Segment::Field(quoted?));
    }
    if let Some(predicate) = inner.strip_prefix("?(").and_then(|p| p.strip_suffix(')')) {
        return parse_filter(predicate.trim()).map(Segment::Filter);
    }
    inner
        .parse::<usize>()
        .map(Segment::Index)
        .map_err(|_| format!("unsupported bracket expression '[{}]'", inner))
}

fn unquote(s: &str) -> Option<std::result::Result<String, String>> {
    let first = s.chars().next()?;
    if first != '\'' && first != '"' {
        return None;
    }
    if s.len() < 2 || !s.ends_with(first) {
        return Some(Err(format!("unterminated string {}", s)));
    }
    Some(Ok(s[1..s.len() - 1].to_string()))
}

fn parse_filter(predicate: &str) -> std::result::Result<Filter, String> {
    let (lhs, rhs) = predicate
        .split_once("==")
        .ok_or_else(|| format!("only equality filters are supported, got '{}'", predicate))?;
    let field = lhs
        .trim()
        .strip_prefix("@.")
        .ok_or_else(|| format!("filter must start with '@.', got '{}'", lhs.trim()))?;
    if field.is_empty() || field.split('.').any(str::is_empty) {
        return Err(format!("invalid filter field '{}'", field));
    }
    let value = match unquote(rhs.trim()) {
        Some(quoted) => quoted?,
        None => rhs.trim().to_string(),
    };
    Ok(Filter {
        field: field.split('.').map(str::to_string).collect(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segments() {
        let segments = parse(r#"{$.spec.containers[?(@.name=="app")].env[0]['a.b']}"#).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Field("spec".to_string()),
                Segment::Field("containers".to_string()),
                Segment::Filter(Filter {
                    field: vec!["name".to_string()],
                    value: "app".to_string(),
                }),
                Segment::Field("env".to_string()),
                Segment::Index(0),
                Segment::Field("a.b".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_bare_leading_field() {
        assert_eq!(
            parse("volumeMounts").unwrap(),
            vec![Segment::Field("volumeMounts".to_string())]
        );
    }

    #[test]
    fn test_bracket_with_closing_bracket_in_quotes() {
        assert_eq!(
            parse(".data['x]y']").unwrap(),
            vec![
                Segment::Field("data".to_string()),
                Segment::Field("x]y".to_string())
            ]
        );
    }
}
