//! wireidl-compiler
//!
//! Compiler passes over the `wireidl-ir` type graph:
//!  1) `specs`: parser for the compact type-specifier grammar with scoped
//!     name resolution (`parse_spec`),
//!  2) `pack`: deterministic struct/union field packing with versioned
//!     sizes (`pack_fields`, `pack_module`),
//!  3) `dict`: order-preserving dictionary round-trip for caching compiled
//!     modules (`to_dict` / `from_dict`),
//!  4) `descriptor`: the per-kind codec contract consumed by target
//!     emitters (`describe`).

pub mod descriptor;
pub mod dict;
pub mod pack;
pub mod specs;
pub mod utils;

pub use descriptor::{describe, ArrayValidateParams, CodecDescriptor, MapValidateParams, WireCategory};
pub use dict::{from_dict, to_dict};
pub use pack::{pack_fields, pack_module, pack_struct, pack_union, HEADER_SIZE, UNION_SIZE};
pub use specs::{parse_spec, Scope};
