//! Parser for the compact textual type-specifier grammar.
//!
//! ```text
//! b  i8 i16 i32 i64  u8 u16 u32 u64  f  d  s     scalar literals
//! h  h:d:c  h:d:p  h:m  h:s                      handle subtypes
//! ?spec                                          nullable
//! a:spec    aN:spec                              open / fixed-length array
//! r:spec                                         interface request
//! m[keyspec][valuespec]                          map
//! x:Name    x:Namespace.Name                     aggregate reference
//! ```
//!
//! Aggregate references resolve by progressively widening scope: the
//! innermost declaring aggregate first, then each enclosing namespace
//! segment, so an unqualified nested-type reference used inside its own
//! aggregate wins over a same-named top-level type.

use lazy_static::lazy_static;
use regex::Regex;

use wireidl_ir::{IdlError, Kind, Module};

use crate::utils::quote;

lazy_static! {
    static ref FIXED_ARRAY: Regex = Regex::new(r"^a(\d+):").unwrap();
    static ref REFERENCE:   Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap();
}

/// Scope a spec string is parsed in: the module namespace plus the chain of
/// enclosing aggregate names, innermost last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub namespace: String,
    pub parents:   Vec<String>,
}

impl Scope {
    pub fn module(namespace: &str) -> Self {
        Scope { namespace: namespace.to_string(), parents: Vec::new() }
    }

    pub fn nested(&self, aggregate: &str) -> Self {
        let mut parents = self.parents.clone();
        parents.push(aggregate.to_string());
        Scope { namespace: self.namespace.clone(), parents }
    }

    fn display(&self) -> String {
        let mut segments: Vec<&str> = self.namespace.split('.').filter(|s| !s.is_empty()).collect();
        segments.extend(self.parents.iter().map(|p| p.as_str()));
        segments.join(".")
    }
}

/// Parses a spec string into a kind, memoizing the result in the module's
/// spec table so repeated parses of identical text return the identical
/// object.
pub fn parse_spec(module: &mut Module, spec: &str, scope: &Scope) -> Result<Kind, IdlError> {
    // An aggregate reference can resolve differently per scope (and in an
    // empty-namespace module an unqualified name is itself a registered
    // key), so the memo fast-path is skipped whenever an enclosing
    // aggregate could shadow a wider match.
    if scope.parents.is_empty() || !spec.contains("x:") {
        if let Some(kind) = module.lookup_kind(spec) {
            return Ok(kind);
        }
    }
    let kind = parse_inner(module, spec, scope, spec)?;
    // Reference specs are memoized under their canonical (fully qualified)
    // form only; caching `x:Bar` as written would leak one aggregate's scope
    // into another's.
    if kind.spec() == spec {
        module.register_kind(spec, kind.clone());
    }
    Ok(kind)
}

fn parse_inner(module: &mut Module, text: &str, scope: &Scope, full: &str) -> Result<Kind, IdlError> {
    match text {
        "b"   => return Ok(Kind::Bool),
        "i8"  => return Ok(Kind::Int8),
        "i16" => return Ok(Kind::Int16),
        "i32" => return Ok(Kind::Int32),
        "i64" => return Ok(Kind::Int64),
        "u8"  => return Ok(Kind::UInt8),
        "u16" => return Ok(Kind::UInt16),
        "u32" => return Ok(Kind::UInt32),
        "u64" => return Ok(Kind::UInt64),
        "f"   => return Ok(Kind::Float),
        "d"   => return Ok(Kind::Double),
        "s"   => return Ok(Kind::String { nullable: false }),
        "h"   => return Ok(handle(wireidl_ir::HandleSubtype::Generic)),
        "h:d:c" => return Ok(handle(wireidl_ir::HandleSubtype::DataPipeConsumer)),
        "h:d:p" => return Ok(handle(wireidl_ir::HandleSubtype::DataPipeProducer)),
        "h:m" => return Ok(handle(wireidl_ir::HandleSubtype::MessagePipe)),
        "h:s" => return Ok(handle(wireidl_ir::HandleSubtype::SharedBuffer)),
        _ => {}
    }

    if let Some(rest) = text.strip_prefix('?') {
        let inner = parse_inner(module, rest, scope, full)?;
        return inner.make_nullable();
    }

    if let Some(rest) = text.strip_prefix("a:") {
        let element = parse_inner(module, rest, scope, full)?;
        return Ok(Kind::array(element, None));
    }

    if let Some(captures) = FIXED_ARRAY.captures(text) {
        let digits = &captures[1];
        let length: u32 = digits.parse().map_err(|_| IdlError::ParseError {
            path: full.to_string(),
            msg:  format!("invalid array length {}", quote(digits)),
        })?;
        let element = parse_inner(module, &text[captures[0].len()..], scope, full)?;
        return Ok(Kind::array(element, Some(length)));
    }

    if let Some(rest) = text.strip_prefix("r:") {
        let inner = parse_inner(module, rest, scope, full)?;
        return match inner {
            Kind::Interface { def, .. } => Ok(Kind::InterfaceRequest { def, nullable: false }),
            other => Err(IdlError::InvariantViolation {
                path: full.to_string(),
                msg:  format!("interface request of non-interface kind {:?}", other),
            }),
        };
    }

    if let Some(rest) = text.strip_prefix("m[") {
        let (key_text, value_text) = split_map(rest, full)?;
        let key = parse_inner(module, key_text, scope, full)?;
        let value = parse_inner(module, value_text, scope, full)?;
        return Kind::map(key, value);
    }

    if let Some(name) = text.strip_prefix("x:") {
        return resolve(module, name, scope, full);
    }

    Err(IdlError::ParseError {
        path: full.to_string(),
        msg:  format!("unknown type token {}", quote(text)),
    })
}

fn handle(subtype: wireidl_ir::HandleSubtype) -> Kind {
    Kind::Handle { subtype, nullable: false }
}

/// Splits `keyspec][valuespec]` into its two bracketed sub-specs by matching
/// brackets, so a bracket belonging to the value side (e.g. a map-of-arrays
/// value) never terminates the key side early.
fn split_map<'a>(rest: &'a str, full: &str) -> Result<(&'a str, &'a str), IdlError> {
    let unbalanced = || IdlError::ParseError {
        path: full.to_string(),
        msg:  "unbalanced brackets in map spec".to_string(),
    };

    let key_end = matching_bracket(rest).ok_or_else(unbalanced)?;
    let after_key = &rest[key_end + 1..];
    let value_part = after_key.strip_prefix('[').ok_or_else(unbalanced)?;
    let value_end = matching_bracket(value_part).ok_or_else(unbalanced)?;
    if value_end + 1 != value_part.len() {
        return Err(IdlError::ParseError {
            path: full.to_string(),
            msg:  format!("unexpected trailing text {}", quote(&value_part[value_end + 1..])),
        });
    }
    Ok((&rest[..key_end], &value_part[..value_end]))
}

/// Index of the `]` closing the bracket group that `text` starts inside.
fn matching_bracket(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'[' => depth += 1,
            b']' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

fn resolve(module: &Module, name: &str, scope: &Scope, full: &str) -> Result<Kind, IdlError> {
    if !REFERENCE.is_match(name) {
        return Err(IdlError::ParseError {
            path: full.to_string(),
            msg:  format!("malformed type reference {}", quote(name)),
        });
    }

    let mut segments: Vec<&str> = scope.namespace.split('.').filter(|s| !s.is_empty()).collect();
    segments.extend(scope.parents.iter().map(|p| p.as_str()));

    for depth in (0..=segments.len()).rev() {
        let candidate = if depth == 0 {
            format!("x:{}", name)
        } else {
            format!("x:{}.{}", segments[..depth].join("."), name)
        };
        if let Some(kind) = module.lookup_kind(&candidate) {
            return Ok(kind);
        }
    }

    Err(IdlError::ResolutionError {
        path: full.to_string(),
        msg:  format!("{} not found in scope {}", quote(name), quote(&scope.display())),
    })
}
