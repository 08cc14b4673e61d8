//! wireidl
//!
//! Façade over the wireidl IR and compiler passes:
//!
//! - the `Kind` taxonomy, `Module` builder, and `IdlError` (re-exported from
//!   `wireidl-ir`)
//! - spec parsing, field packing, dict round-trip, and codec descriptors
//!   (re-exported from `wireidl-compiler`)
//! - JSON convenience wrappers around the dict encoding

pub use wireidl_compiler::{
    describe, from_dict, pack_fields, pack_module, parse_spec, to_dict, CodecDescriptor, Scope,
    WireCategory,
};
pub use wireidl_ir::{
    Attributes, Constant, ConstantValue, Field, HandleSubtype, IdlError, Kind, Method, Module,
    Parameter, StructLayout, VersionInfo,
};

/// Encodes a module's dict form as pretty-printed JSON.
pub fn module_to_json(module: &Module) -> Result<String, IdlError> {
    let dict = wireidl_compiler::to_dict(module)?;
    serde_json::to_string_pretty(&dict).map_err(|e| IdlError::ParseError {
        path: module.name.clone(),
        msg:  format!("failed to render module JSON: {}", e),
    })
}

/// Reconstructs a packed module from its JSON dict form.
pub fn module_from_json(text: &str) -> Result<Module, IdlError> {
    let dict: serde_json::Value = serde_json::from_str(text).map_err(|e| IdlError::ParseError {
        path: "module".to_string(),
        msg:  format!("malformed module JSON: {}", e),
    })?;
    wireidl_compiler::from_dict(&dict)
}

pub mod error {
    pub use wireidl_ir::IdlError;
}

pub mod ir {
    pub use wireidl_ir::*;
}

pub mod compiler {
    pub use wireidl_compiler::*;
}
