use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::defs::{EnumDef, InterfaceDef, StructDef, UnionDef};
use crate::error::IdlError;

pub type StructPtr = Rc<RefCell<StructDef>>;
pub type UnionPtr = Rc<RefCell<UnionDef>>;
pub type EnumPtr = Rc<RefCell<EnumDef>>;
pub type InterfacePtr = Rc<RefCell<InterfaceDef>>;

/// Subtype of a transferable handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleSubtype {
    Generic,
    DataPipeConsumer,
    DataPipeProducer,
    MessagePipe,
    SharedBuffer,
}

impl HandleSubtype {
    pub fn spec(&self) -> &'static str {
        match self {
            HandleSubtype::Generic          => "h",
            HandleSubtype::DataPipeConsumer => "h:d:c",
            HandleSubtype::DataPipeProducer => "h:d:p",
            HandleSubtype::MessagePipe      => "h:m",
            HandleSubtype::SharedBuffer     => "h:s",
        }
    }
}

/// One node in the type graph. Closed taxonomy: every query in the compiler
/// dispatches on the shape of a kind, never on a name.
///
/// The nullable and non-nullable variant of one declared aggregate share a
/// single `Rc<RefCell<..Def>>` backing record, so a mutation through either
/// variant is observed through the other.
#[derive(Clone)]
pub enum Kind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    String { nullable: bool },
    Handle { subtype: HandleSubtype, nullable: bool },
    Array { element: Box<Kind>, length: Option<u32>, nullable: bool },
    Map { key: Box<Kind>, value: Box<Kind>, nullable: bool },
    Struct { def: StructPtr, nullable: bool },
    Union { def: UnionPtr, nullable: bool },
    Enum { def: EnumPtr },
    Interface { def: InterfacePtr, nullable: bool },
    InterfaceRequest { def: InterfacePtr, nullable: bool },
}

impl Kind {
    /// Canonical spec string for this kind (the memoization and persistence
    /// key, e.g. `a4:i32` or `?x:geometry.Point`).
    pub fn spec(&self) -> String {
        match self {
            Kind::Bool   => "b".to_string(),
            Kind::Int8   => "i8".to_string(),
            Kind::Int16  => "i16".to_string(),
            Kind::Int32  => "i32".to_string(),
            Kind::Int64  => "i64".to_string(),
            Kind::UInt8  => "u8".to_string(),
            Kind::UInt16 => "u16".to_string(),
            Kind::UInt32 => "u32".to_string(),
            Kind::UInt64 => "u64".to_string(),
            Kind::Float  => "f".to_string(),
            Kind::Double => "d".to_string(),
            Kind::String { nullable } => prefix(*nullable, "s".to_string()),
            Kind::Handle { subtype, nullable } => prefix(*nullable, subtype.spec().to_string()),
            Kind::Array { element, length, nullable } => {
                let inner = match length {
                    Some(n) => format!("a{}:{}", n, element.spec()),
                    None    => format!("a:{}", element.spec()),
                };
                prefix(*nullable, inner)
            }
            Kind::Map { key, value, nullable } => {
                prefix(*nullable, format!("m[{}][{}]", key.spec(), value.spec()))
            }
            Kind::Struct { def, nullable } => prefix(*nullable, format!("x:{}", def.borrow().qualified)),
            Kind::Union { def, nullable } => prefix(*nullable, format!("x:{}", def.borrow().qualified)),
            Kind::Enum { def } => format!("x:{}", def.borrow().qualified),
            Kind::Interface { def, nullable } => prefix(*nullable, format!("x:{}", def.borrow().qualified)),
            Kind::InterfaceRequest { def, nullable } => {
                prefix(*nullable, format!("r:x:{}", def.borrow().qualified))
            }
        }
    }

    /// Construct a map kind, validating the key kind eagerly. Keys must be
    /// non-nullable scalars, strings, or enums: anything else either lacks a
    /// stable identity/ordering or cannot be a map key in every target
    /// language.
    pub fn map(key: Kind, value: Kind) -> Result<Kind, IdlError> {
        if !key.is_valid_map_key() {
            return Err(IdlError::InvariantViolation {
                path: key.spec(),
                msg:  format!("kind {:?} is not allowed as a map key", key),
            });
        }
        Ok(Kind::Map { key: Box::new(key), value: Box::new(value), nullable: false })
    }

    pub fn array(element: Kind, length: Option<u32>) -> Kind {
        Kind::Array { element: Box::new(element), length, nullable: false }
    }

    /// The nullable counterpart of this kind. Primitive reference kinds map
    /// to their canonical nullable form; composite kinds get a fresh variant
    /// that shares the backing definition with `self`. Value kinds have no
    /// nullable form, and a kind cannot be made nullable twice.
    pub fn make_nullable(&self) -> Result<Kind, IdlError> {
        if self.is_nullable() {
            return Err(IdlError::InvariantViolation {
                path: self.spec(),
                msg:  "kind is already nullable".to_string(),
            });
        }
        let nullable = match self {
            Kind::String { .. } => Kind::String { nullable: true },
            Kind::Handle { subtype, .. } => Kind::Handle { subtype: *subtype, nullable: true },
            Kind::Array { element, length, .. } => {
                Kind::Array { element: element.clone(), length: *length, nullable: true }
            }
            Kind::Map { key, value, .. } => {
                Kind::Map { key: key.clone(), value: value.clone(), nullable: true }
            }
            Kind::Struct { def, .. } => Kind::Struct { def: Rc::clone(def), nullable: true },
            Kind::Union { def, .. } => Kind::Union { def: Rc::clone(def), nullable: true },
            Kind::Interface { def, .. } => Kind::Interface { def: Rc::clone(def), nullable: true },
            Kind::InterfaceRequest { def, .. } => {
                Kind::InterfaceRequest { def: Rc::clone(def), nullable: true }
            }
            _ => {
                return Err(IdlError::InvariantViolation {
                    path: self.spec(),
                    msg:  format!("kind {:?} has no nullable form", self),
                })
            }
        };
        Ok(nullable)
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            Kind::String { nullable }
            | Kind::Handle { nullable, .. }
            | Kind::Array { nullable, .. }
            | Kind::Map { nullable, .. }
            | Kind::Struct { nullable, .. }
            | Kind::Union { nullable, .. }
            | Kind::Interface { nullable, .. }
            | Kind::InterfaceRequest { nullable, .. } => *nullable,
            _ => false,
        }
    }

    /// Object kinds are encoded behind a pointer on the wire.
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Kind::String { .. }
                | Kind::Array { .. }
                | Kind::Map { .. }
                | Kind::Struct { .. }
                | Kind::Union { .. }
        )
    }

    /// Reference kinds have a null wire representation available.
    pub fn is_reference(&self) -> bool {
        self.is_object()
            || matches!(
                self,
                Kind::Handle { .. } | Kind::Interface { .. } | Kind::InterfaceRequest { .. }
            )
    }

    pub fn is_any_handle(&self) -> bool {
        matches!(self, Kind::Handle { .. })
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, Kind::Enum { .. })
    }

    /// Move-only kinds transfer ownership when accessed: any handle,
    /// interface, interface request, or non-string object kind.
    pub fn is_move_only(&self) -> bool {
        match self {
            Kind::Handle { .. } | Kind::Interface { .. } | Kind::InterfaceRequest { .. } => true,
            Kind::String { .. } => false,
            k => k.is_object(),
        }
    }

    /// A kind is cloneable when no reachable field or element kind is a
    /// handle, interface, or interface request. Struct fields may be
    /// mutually or self-recursive, so the walk keeps a visited set keyed by
    /// backing-cell identity.
    pub fn is_cloneable(&self) -> bool {
        self.cloneable_inner(&mut HashSet::new())
    }

    fn cloneable_inner(&self, seen: &mut HashSet<usize>) -> bool {
        match self {
            Kind::Handle { .. } | Kind::Interface { .. } | Kind::InterfaceRequest { .. } => false,
            Kind::Array { element, .. } => element.cloneable_inner(seen),
            Kind::Map { key, value, .. } => {
                key.cloneable_inner(seen) && value.cloneable_inner(seen)
            }
            Kind::Struct { def, .. } => {
                if !seen.insert(Rc::as_ptr(def) as usize) {
                    return true;
                }
                def.borrow().fields.iter().all(|f| f.kind.cloneable_inner(seen))
            }
            Kind::Union { def, .. } => {
                if !seen.insert(Rc::as_ptr(def) as usize) {
                    return true;
                }
                def.borrow().fields.iter().all(|f| f.kind.cloneable_inner(seen))
            }
            _ => true,
        }
    }

    /// Valid map keys: non-nullable scalars, strings, and enums.
    pub fn is_valid_map_key(&self) -> bool {
        match self {
            Kind::Bool
            | Kind::Int8
            | Kind::Int16
            | Kind::Int32
            | Kind::Int64
            | Kind::UInt8
            | Kind::UInt16
            | Kind::UInt32
            | Kind::UInt64
            | Kind::Float
            | Kind::Double
            | Kind::Enum { .. } => true,
            Kind::String { nullable } => !nullable,
            _ => false,
        }
    }
}

fn prefix(nullable: bool, spec: String) -> String {
    if nullable {
        format!("?{}", spec)
    } else {
        spec
    }
}

// The spec string is the canonical identity of a kind within a module.
// Comparing and printing through it also keeps both operations safe on
// self-recursive type graphs.
impl PartialEq for Kind {
    fn eq(&self, other: &Self) -> bool {
        self.spec() == other.spec()
    }
}

impl Eq for Kind {}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kind({})", self.spec())
    }
}
