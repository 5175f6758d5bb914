//! Pointer micro-syntax: parsing and resolution.
//!
//! Supported forms:
//!
//! - text range: `#xpointer(string-range(//body,'',LEFT,LENGTH))`
//! - single element: `#id`, `file#id`, `#xpointer(id('id'))`
//! - element range: `#xpointer(id('a')/range-to(id('b')))`
//! - shorthand list: `#a #b file#c`
//!
//! Every form may carry an explicit file before the `#`; without one the
//! reference is resolved against the declaring file's base.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StandoffError};
use crate::registry::{OrderRegistry, QualifiedKey, KEY_SEPARATOR};

const XPOINTER_OPEN: &str = "xpointer(";
const STRING_RANGE_OPEN: &str = "string-range(";
const RANGE_TO: &str = "/range-to(";

/// A parsed reference expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pointer {
    TextRange {
        file: Option<String>,
        left: i64,
        length: i64,
    },
    Element {
        file: Option<String>,
        id: String,
    },
    ElementRange {
        file: Option<String>,
        left: String,
        right: String,
    },
    List(Vec<Pointer>),
}

/// A resolved text range: `length` characters of `file`'s text starting at
/// the 1-based position `left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextTarget {
    pub file: String,
    pub left: i64,
    pub length: i64,
}

/// Output of [`PointerResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Text(TextTarget),
    Elements(Vec<QualifiedKey>),
}

impl Pointer {
    /// Parse a reference string.
    pub fn parse(reference: &str) -> Result<Pointer> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(StandoffError::parse(reference, "empty reference"));
        }
        if trimmed.split_whitespace().nth(1).is_none() {
            return parse_single(trimmed);
        }
        // xpointer expressions may contain blanks inside their argument list,
        // so a list is only tried once the whole string fails to parse.
        let whole = parse_single(trimmed);
        if whole.is_ok() {
            return whole;
        }
        let members = trimmed
            .split_whitespace()
            .map(parse_single)
            .collect::<Result<Vec<_>>>()?;
        if let Some(bad) = members
            .iter()
            .find(|m| !matches!(m, Pointer::Element { .. }))
        {
            return Err(StandoffError::parse(
                reference,
                format!("list members must be single element pointers, found {:?}", bad),
            ));
        }
        Ok(Pointer::List(members))
    }

    /// The independently resolvable parts of this pointer, in textual order.
    pub fn members(&self) -> Vec<&Pointer> {
        match self {
            Pointer::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    /// Files named explicitly by this pointer.
    pub fn explicit_files(&self) -> Vec<&str> {
        match self {
            Pointer::TextRange { file, .. }
            | Pointer::Element { file, .. }
            | Pointer::ElementRange { file, .. } => file.as_deref().into_iter().collect(),
            Pointer::List(items) => items.iter().flat_map(Pointer::explicit_files).collect(),
        }
    }

    fn file_or<'a>(&'a self, base: &'a str) -> &'a str {
        match self {
            Pointer::TextRange { file, .. }
            | Pointer::Element { file, .. }
            | Pointer::ElementRange { file, .. } => file.as_deref().unwrap_or(base),
            Pointer::List(_) => base,
        }
    }
}

fn parse_single(raw: &str) -> Result<Pointer> {
    let (file, fragment) = raw
        .split_once(KEY_SEPARATOR)
        .ok_or_else(|| StandoffError::parse(raw, "missing '#'"))?;
    let file = if file.is_empty() {
        None
    } else {
        Some(file.to_string())
    };

    if let Some(rest) = fragment.strip_prefix(XPOINTER_OPEN) {
        let inner = rest
            .strip_suffix(')')
            .ok_or_else(|| StandoffError::parse(raw, "unterminated xpointer"))?
            .trim();
        return parse_xpointer(raw, file, inner);
    }

    if !is_plain_id(fragment) {
        return Err(StandoffError::parse(raw, "invalid element id"));
    }
    Ok(Pointer::Element {
        file,
        id: fragment.to_string(),
    })
}

fn parse_xpointer(raw: &str, file: Option<String>, inner: &str) -> Result<Pointer> {
    if let Some(args) = inner.strip_prefix(STRING_RANGE_OPEN) {
        let args = args
            .strip_suffix(')')
            .ok_or_else(|| StandoffError::parse(raw, "unterminated string-range"))?;
        let parts: Vec<&str> = args.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(StandoffError::parse(
                raw,
                format!("string-range takes 4 arguments, found {}", parts.len()),
            ));
        }
        let left = parse_offset(raw, parts[2])?;
        let length = parse_offset(raw, parts[3])?;
        return Ok(Pointer::TextRange { file, left, length });
    }

    if let Some((left, right)) = inner.split_once(RANGE_TO) {
        let right = right
            .strip_suffix(')')
            .ok_or_else(|| StandoffError::parse(raw, "unterminated range-to"))?;
        return Ok(Pointer::ElementRange {
            file,
            left: parse_id_call(raw, left)?,
            right: parse_id_call(raw, right)?,
        });
    }

    Ok(Pointer::Element {
        file,
        id: parse_id_call(raw, inner)?,
    })
}

/// `id('x')` -> `x`
fn parse_id_call(raw: &str, expr: &str) -> Result<String> {
    let id = expr
        .trim()
        .strip_prefix("id(")
        .and_then(|s| s.strip_suffix(')'))
        .map(|s| s.trim().trim_matches(|c| c == '\'' || c == '"'))
        .ok_or_else(|| StandoffError::parse(raw, format!("expected id('..'), found '{}'", expr)))?;
    if !is_plain_id(id) {
        return Err(StandoffError::parse(raw, "invalid element id"));
    }
    Ok(id.to_string())
}

fn parse_offset(raw: &str, value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .map_err(|_| StandoffError::parse(raw, format!("offset '{}' is not an integer", value)))
}

fn is_plain_id(id: &str) -> bool {
    !id.is_empty()
        && !id
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"' | ',' | '#'))
}

/// Resolves pointers against the declaration order of a document's files.
pub struct PointerResolver<'a> {
    order: &'a OrderRegistry,
}

impl<'a> PointerResolver<'a> {
    pub fn new(order: &'a OrderRegistry) -> Self {
        Self { order }
    }

    /// Parse and resolve `reference` relative to `base`.
    pub fn resolve(&self, base: &str, reference: &str) -> Result<Resolved> {
        let pointer = Pointer::parse(reference)?;
        match pointer {
            Pointer::TextRange { .. } => Ok(Resolved::Text(self.text_range(base, &pointer)?)),
            _ => Ok(Resolved::Elements(self.expand(base, &pointer)?)),
        }
    }

    /// Resolve a text-range pointer into its `(file, left, length)` triple.
    pub fn text_range(&self, base: &str, pointer: &Pointer) -> Result<TextTarget> {
        match pointer {
            Pointer::TextRange { left, length, .. } => Ok(TextTarget {
                file: pointer.file_or(base).to_string(),
                left: *left,
                length: *length,
            }),
            other => Err(StandoffError::parse(
                &format!("{:?}", other),
                "expected a text range",
            )),
        }
    }

    /// Expand an element pointer into qualified keys. Ranges follow
    /// declaration order, lists follow textual order.
    pub fn expand(&self, base: &str, pointer: &Pointer) -> Result<Vec<QualifiedKey>> {
        match pointer {
            Pointer::Element { id, .. } => {
                let file = pointer.file_or(base);
                if !self.order.knows(file) {
                    return Err(StandoffError::UnresolvedBase {
                        file: file.to_string(),
                        reference: format!("{}{}{}", file, KEY_SEPARATOR, id),
                    });
                }
                Ok(vec![QualifiedKey::new(file, id.clone())])
            }
            Pointer::ElementRange { left, right, .. } => {
                self.expand_range(pointer.file_or(base), left, right)
            }
            Pointer::List(items) => {
                let mut keys = Vec::new();
                for item in items {
                    keys.extend(self.expand(base, item)?);
                }
                Ok(keys)
            }
            Pointer::TextRange { .. } => Err(StandoffError::parse(
                &format!("{:?}", pointer),
                "expected an element pointer, found a text range",
            )),
        }
    }

    fn expand_range(&self, file: &str, left: &str, right: &str) -> Result<Vec<QualifiedKey>> {
        let sequence = self
            .order
            .sequence(file)
            .ok_or_else(|| StandoffError::UnresolvedBase {
                file: file.to_string(),
                reference: format!("{}..{}", left, right),
            })?;
        let left_key = QualifiedKey::new(file, left);
        let right_key = QualifiedKey::new(file, right);

        let mut collecting = false;
        let mut result = Vec::new();
        for key in sequence {
            if *key == left_key {
                collecting = true;
            }
            if collecting {
                result.push(key.clone());
                if *key == right_key {
                    return Ok(result);
                }
            }
        }
        Err(StandoffError::UnresolvedRange {
            file: file.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_with(file: &str, ids: &[&str]) -> OrderRegistry {
        let mut order = OrderRegistry::new();
        for id in ids {
            order.append(file, QualifiedKey::new(file, *id));
        }
        order
    }

    fn ids(keys: &[QualifiedKey]) -> Vec<&str> {
        keys.iter().map(|k| k.id.as_str()).collect()
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            Pointer::parse("#tok_1").unwrap(),
            Pointer::Element {
                file: None,
                id: "tok_1".to_string()
            }
        );
        assert_eq!(
            Pointer::parse("doc.tok.json#tok_1").unwrap(),
            Pointer::Element {
                file: Some("doc.tok.json".to_string()),
                id: "tok_1".to_string()
            }
        );
        assert_eq!(
            Pointer::parse("#xpointer(id('tok_1'))").unwrap(),
            Pointer::Element {
                file: None,
                id: "tok_1".to_string()
            }
        );
        assert_eq!(
            Pointer::parse("#xpointer(string-range(//body,'',1,6))").unwrap(),
            Pointer::TextRange {
                file: None,
                left: 1,
                length: 6
            }
        );
        assert_eq!(
            Pointer::parse("doc.text.json#xpointer(string-range(//body, '', 3, 2))").unwrap(),
            Pointer::TextRange {
                file: Some("doc.text.json".to_string()),
                left: 3,
                length: 2
            }
        );
        assert_eq!(
            Pointer::parse("#xpointer(id('a')/range-to(id('b')))").unwrap(),
            Pointer::ElementRange {
                file: None,
                left: "a".to_string(),
                right: "b".to_string()
            }
        );
    }

    #[test]
    fn test_parse_list() {
        let pointer = Pointer::parse("#tok_1  other.tok.json#tok_2").unwrap();
        let members = pointer.members();
        assert_eq!(members.len(), 2);
        assert_eq!(pointer.explicit_files(), vec!["other.tok.json"]);
    }

    #[test]
    fn test_parse_list_of_xpointer_ids() {
        let pointer = Pointer::parse("#xpointer(id('a')) doc.tok.json#xpointer(id('b'))").unwrap();
        assert_eq!(
            pointer,
            Pointer::List(vec![
                Pointer::Element {
                    file: None,
                    id: "a".to_string()
                },
                Pointer::Element {
                    file: Some("doc.tok.json".to_string()),
                    id: "b".to_string()
                },
            ])
        );

        // blanks inside a single expression do not make it a list
        assert!(matches!(
            Pointer::parse("#xpointer(string-range(//body, '', 1, 6))").unwrap(),
            Pointer::TextRange { left: 1, length: 6, .. }
        ));
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "",
            "tok_1",
            "#",
            "#xpointer(id('a')",
            "#xpointer(string-range(//body,'',x,6))",
            "#xpointer(string-range(//body,'',1))",
            "#xpointer(foo('a'))",
            "#a #xpointer(id('b')/range-to(id('c')))",
        ] {
            let err = Pointer::parse(bad).unwrap_err();
            assert!(matches!(err, StandoffError::Parse { .. }), "{:?}", bad);
        }
    }

    #[test]
    fn test_range_follows_declaration_order() {
        let order = order_with("f", &["a", "x", "y", "b", "z"]);
        let resolver = PointerResolver::new(&order);

        let keys = match resolver
            .resolve("f", "#xpointer(id('a')/range-to(id('b')))")
            .unwrap()
        {
            Resolved::Elements(keys) => keys,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(ids(&keys), vec!["a", "x", "y", "b"]);
    }

    #[test]
    fn test_range_ignores_lexical_order() {
        let order = order_with("f", &["t10", "t2", "t1"]);
        let resolver = PointerResolver::new(&order);
        let pointer = Pointer::parse("#xpointer(id('t10')/range-to(id('t1')))").unwrap();
        assert_eq!(
            ids(&resolver.expand("f", &pointer).unwrap()),
            vec!["t10", "t2", "t1"]
        );
    }

    #[test]
    fn test_degenerate_range() {
        let order = order_with("f", &["a", "b"]);
        let resolver = PointerResolver::new(&order);
        let pointer = Pointer::parse("#xpointer(id('b')/range-to(id('b')))").unwrap();
        assert_eq!(ids(&resolver.expand("f", &pointer).unwrap()), vec!["b"]);
    }

    #[test]
    fn test_unresolved_ranges() {
        let order = order_with("f", &["a", "b", "c"]);
        let resolver = PointerResolver::new(&order);

        for reference in [
            "#xpointer(id('q')/range-to(id('b')))",
            "#xpointer(id('c')/range-to(id('a')))",
            "#xpointer(id('a')/range-to(id('q')))",
        ] {
            let pointer = Pointer::parse(reference).unwrap();
            let err = resolver.expand("f", &pointer).unwrap_err();
            assert!(
                matches!(err, StandoffError::UnresolvedRange { .. }),
                "{}",
                reference
            );
        }
    }

    #[test]
    fn test_unknown_base() {
        let order = order_with("f", &["a"]);
        let resolver = PointerResolver::new(&order);
        let err = resolver.resolve("f", "g#a").unwrap_err();
        assert!(matches!(err, StandoffError::UnresolvedBase { .. }));
    }

    #[test]
    fn test_list_keeps_textual_order() {
        let mut order = order_with("f", &["a", "b"]);
        order.append("g", QualifiedKey::new("g", "c"));
        let resolver = PointerResolver::new(&order);

        let keys = match resolver.resolve("f", "#b g#c #a").unwrap() {
            Resolved::Elements(keys) => keys,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(
            keys,
            vec![
                QualifiedKey::new("f", "b"),
                QualifiedKey::new("g", "c"),
                QualifiedKey::new("f", "a"),
            ]
        );
    }

    #[test]
    fn test_text_range_uses_base() {
        let order = OrderRegistry::new();
        let resolver = PointerResolver::new(&order);
        let resolved = resolver
            .resolve("doc.text.json", "#xpointer(string-range(//body,'',1,6))")
            .unwrap();
        assert_eq!(
            resolved,
            Resolved::Text(TextTarget {
                file: "doc.text.json".to_string(),
                left: 1,
                length: 6
            })
        );
    }
}
