//! Codec descriptors: everything a target emitter needs to select an
//! encode/decode method for a kind, without ever reaching into the IR.

use wireidl_ir::{ConstantValue, HandleSubtype, Kind};

use crate::utils::quote;

/// Encode/decode method selection key, one per wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireCategory {
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
    Str,
    Handle(HandleSubtype),
    Struct,
    Union,
    Array,
    Map,
    /// Backed by a 32-bit signed integer on the wire.
    Enum,
    Interface,
    InterfaceRequest,
}

/// Element-validation parameters for one array dimension: the expected
/// element count (fixed length or unbounded), element nullability, and the
/// parameters of the next dimension for arrays of arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayValidateParams {
    pub expected_length:  Option<u32>,
    pub element_nullable: bool,
    pub element:          Option<Box<ArrayValidateParams>>,
}

/// Maps validate as two parallel arrays of keys and values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapValidateParams {
    pub keys:   ArrayValidateParams,
    pub values: ArrayValidateParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodecDescriptor {
    pub wire_category:         WireCategory,
    pub nullable:              bool,
    pub array_validate_params: Option<ArrayValidateParams>,
    pub map_validate_params:   Option<MapValidateParams>,
    /// Language-neutral literal a generated accessor starts out with.
    pub default_value_expr:    String,
}

/// Builds the codec descriptor for a kind, honoring a field's declared
/// default when one exists.
pub fn describe(kind: &Kind, default: Option<&ConstantValue>) -> CodecDescriptor {
    CodecDescriptor {
        wire_category:         wire_category(kind),
        nullable:              kind.is_nullable(),
        array_validate_params: match kind {
            Kind::Array { element, length, .. } => Some(array_params(element, *length)),
            _ => None,
        },
        map_validate_params:   match kind {
            Kind::Map { key, value, .. } => Some(MapValidateParams {
                keys:   element_params(key),
                values: element_params(value),
            }),
            _ => None,
        },
        default_value_expr:    default_value_expr(kind, default),
    }
}

fn wire_category(kind: &Kind) -> WireCategory {
    match kind {
        Kind::Bool => WireCategory::Bool,
        Kind::Int8 => WireCategory::Int8,
        Kind::Int16 => WireCategory::Int16,
        Kind::Int32 => WireCategory::Int32,
        Kind::Int64 => WireCategory::Int64,
        Kind::UInt8 => WireCategory::UInt8,
        Kind::UInt16 => WireCategory::UInt16,
        Kind::UInt32 => WireCategory::UInt32,
        Kind::UInt64 => WireCategory::UInt64,
        Kind::Float => WireCategory::Float,
        Kind::Double => WireCategory::Double,
        Kind::String { .. } => WireCategory::Str,
        Kind::Handle { subtype, .. } => WireCategory::Handle(*subtype),
        Kind::Array { .. } => WireCategory::Array,
        Kind::Map { .. } => WireCategory::Map,
        Kind::Struct { .. } => WireCategory::Struct,
        Kind::Union { .. } => WireCategory::Union,
        Kind::Enum { .. } => WireCategory::Enum,
        Kind::Interface { .. } => WireCategory::Interface,
        Kind::InterfaceRequest { .. } => WireCategory::InterfaceRequest,
    }
}

fn array_params(element: &Kind, length: Option<u32>) -> ArrayValidateParams {
    ArrayValidateParams {
        expected_length:  length,
        element_nullable: element.is_nullable(),
        element:          match element {
            Kind::Array { element: inner, length: inner_length, .. } => {
                Some(Box::new(array_params(inner, *inner_length)))
            }
            _ => None,
        },
    }
}

fn element_params(element: &Kind) -> ArrayValidateParams {
    ArrayValidateParams {
        expected_length:  None,
        element_nullable: element.is_nullable(),
        element:          match element {
            Kind::Array { element: inner, length, .. } => Some(Box::new(array_params(inner, *length))),
            _ => None,
        },
    }
}

fn default_value_expr(kind: &Kind, default: Option<&ConstantValue>) -> String {
    if let Some(value) = default {
        return match value {
            ConstantValue::Bool(b) => b.to_string(),
            ConstantValue::Int(i) => i.to_string(),
            ConstantValue::Double(d) => format!("{:?}", d),
            ConstantValue::Str(s) => quote(s),
        };
    }
    if kind.is_nullable() {
        return "null".to_string();
    }
    match kind {
        Kind::Bool => "false".to_string(),
        Kind::Int8
        | Kind::Int16
        | Kind::Int32
        | Kind::Int64
        | Kind::UInt8
        | Kind::UInt16
        | Kind::UInt32
        | Kind::UInt64 => "0".to_string(),
        Kind::Float | Kind::Double => "0.0".to_string(),
        Kind::String { .. } => quote(""),
        Kind::Enum { def } => {
            let def = def.borrow();
            match def.values.first() {
                Some(first) => format!("{}.{}", def.qualified, first.name),
                None => "0".to_string(),
            }
        }
        // Pointers, handles, and endpoints start out unset.
        _ => "null".to_string(),
    }
}
