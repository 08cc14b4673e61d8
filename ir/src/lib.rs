//! wireidl-ir
//!
//! Type-system data model for the wireidl compiler:
//!  1) The closed `Kind` taxonomy (primitives, handles, arrays, maps,
//!     structs, unions, enums, interfaces, interface requests) with
//!     structural predicates,
//!  2) Aggregate definitions (`StructDef`, `UnionDef`, `EnumDef`,
//!     `InterfaceDef`) shared between a kind's nullable and non-nullable
//!     variants through one backing cell,
//!  3) `Module`: namespace, aggregate collections, spec-string memo table,
//!     and cross-module import by deep copy,
//!  4) The `IdlError` taxonomy shared with the compiler passes.
//!
//! The model is a pure, single-threaded value; nothing here does I/O. The
//! `Rc<RefCell<..>>` backing cells are intentionally not `Send`, which keeps
//! the one aliasing relationship in the design scoped to one module.

pub mod defs;
pub mod error;
pub mod kind;
pub mod module;

pub use defs::{
    Attributes, Constant, ConstantValue, EnumDef, EnumValue, Field, FieldPlacement, InterfaceDef,
    Method, Parameter, StructDef, StructLayout, UnionDef, UnionLayout, VersionInfo,
    MIN_VERSION_ATTRIBUTE,
};
pub use error::IdlError;
pub use kind::{EnumPtr, HandleSubtype, InterfacePtr, Kind, StructPtr, UnionPtr};
pub use module::{Import, Module};
