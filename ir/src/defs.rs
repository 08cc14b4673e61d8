use crate::error::IdlError;
use crate::kind::{EnumPtr, Kind};

/// Literal value carried by constants, defaults, and attribute arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
}

/// Order-preserving attribute list (`[Name=value]` annotations).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attributes(Vec<(String, ConstantValue)>);

/// Attribute naming the struct/interface revision a declaration appeared in.
pub const MIN_VERSION_ATTRIBUTE: &str = "MinVersion";

impl Attributes {
    pub fn new() -> Self {
        Attributes(Vec::new())
    }

    pub fn get(&self, name: &str) -> Option<&ConstantValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Sets or replaces one attribute, keeping insertion order.
    pub fn set(&mut self, name: &str, value: ConstantValue) {
        match self.0.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, ConstantValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name:       String,
    pub kind:       Kind,
    pub ordinal:    Option<u32>,
    pub default:    Option<ConstantValue>,
    pub attributes: Attributes,
}

impl Field {
    pub fn new(name: &str, kind: Kind) -> Self {
        Field {
            name:       name.to_string(),
            kind,
            ordinal:    None,
            default:    None,
            attributes: Attributes::new(),
        }
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    pub fn with_min_version(mut self, version: i64) -> Self {
        self.attributes.set(MIN_VERSION_ATTRIBUTE, ConstantValue::Int(version));
        self
    }
}

pub type Parameter = Field;

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name:          String,
    /// Namespace-qualified name used in spec strings (`geometry.Point`).
    pub qualified:     String,
    pub imported_from: Option<String>,
    pub fields:        Vec<Field>,
    /// Enums declared inside this struct's scope.
    pub enums:         Vec<EnumPtr>,
    pub attributes:    Attributes,
    /// Derived layout, cached once the packer has run.
    pub layout:        Option<StructLayout>,
}

impl StructDef {
    pub fn new(name: &str, qualified: &str, attributes: Attributes) -> Self {
        StructDef {
            name:          name.to_string(),
            qualified:     qualified.to_string(),
            imported_from: None,
            fields:        Vec::new(),
            enums:         Vec::new(),
            attributes,
            layout:        None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionDef {
    pub name:          String,
    pub qualified:     String,
    pub imported_from: Option<String>,
    pub fields:        Vec<Field>,
    pub attributes:    Attributes,
    pub layout:        Option<UnionLayout>,
}

impl UnionDef {
    pub fn new(name: &str, qualified: &str, attributes: Attributes) -> Self {
        UnionDef {
            name:          name.to_string(),
            qualified:     qualified.to_string(),
            imported_from: None,
            fields:        Vec::new(),
            attributes,
            layout:        None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub name:       String,
    pub value:      Option<i64>,
    pub attributes: Attributes,
}

/// Enums are backed by a 32-bit signed integer on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name:          String,
    pub qualified:     String,
    pub imported_from: Option<String>,
    pub values:        Vec<EnumValue>,
    pub attributes:    Attributes,
}

impl EnumDef {
    pub fn new(name: &str, qualified: &str, attributes: Attributes) -> Self {
        EnumDef {
            name:          name.to_string(),
            qualified:     qualified.to_string(),
            imported_from: None,
            values:        Vec::new(),
            attributes,
        }
    }

    /// Numeric value of each member: explicit, or previous value plus one.
    pub fn resolved_values(&self) -> Vec<i64> {
        let mut out = Vec::with_capacity(self.values.len());
        let mut next = 0;
        for v in &self.values {
            let n = v.value.unwrap_or(next);
            next = n + 1;
            out.push(n);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name:                String,
    pub ordinal:             Option<u32>,
    pub parameters:          Vec<Parameter>,
    /// Present for request/response calls, absent for fire-and-forget.
    pub response_parameters: Option<Vec<Parameter>>,
    pub attributes:          Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDef {
    pub name:          String,
    pub qualified:     String,
    pub imported_from: Option<String>,
    pub methods:       Vec<Method>,
    pub attributes:    Attributes,
}

impl InterfaceDef {
    pub fn new(name: &str, qualified: &str, attributes: Attributes) -> Self {
        InterfaceDef {
            name:          name.to_string(),
            qualified:     qualified.to_string(),
            imported_from: None,
            methods:       Vec::new(),
            attributes,
        }
    }

    /// Wire dispatch id of each method: explicit ordinal, or assigned
    /// sequentially after the previous one.
    pub fn resolved_ordinals(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.methods.len());
        let mut next = 0;
        for m in &self.methods {
            let o = m.ordinal.unwrap_or(next);
            next = o + 1;
            out.push(o);
        }
        out
    }

    /// Appends a method, rejecting a dispatch ordinal already taken within
    /// this interface.
    pub fn add_method(&mut self, method: Method) -> Result<(), IdlError> {
        let name = method.name.clone();
        self.methods.push(method);
        let ordinals = self.resolved_ordinals();
        let new = *ordinals.last().unwrap_or(&0);
        if ordinals[..ordinals.len() - 1].contains(&new) {
            self.methods.pop();
            return Err(IdlError::InvariantViolation {
                path: format!("{}.{}", self.qualified, name),
                msg:  format!("method ordinal {} is already used in this interface", new),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub name:  String,
    pub kind:  Kind,
    pub value: ConstantValue,
}

/// Placement of one field inside a packed aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPlacement {
    /// Index of the field in the aggregate's declaration list.
    pub field_index: usize,
    pub ordinal:     u32,
    pub offset:      u32,
    /// Bit index within the byte at `offset`, for boolean fields.
    pub bit:         Option<u8>,
    pub size_bytes:  u32,
    pub min_version: u32,
}

/// Struct payload size as of one declared version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version:    u32,
    pub num_fields: u32,
    /// Header plus payload, padded to an 8-byte boundary.
    pub num_bytes:  u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    /// Placements ordered by (offset, bit).
    pub placements:   Vec<FieldPlacement>,
    pub payload_size: u32,
    /// 8-byte version header plus payload, padded to an 8-byte boundary.
    pub total_size:   u32,
    pub padding:      u32,
    pub versions:     Vec<VersionInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionLayout {
    /// Wire tag of each field, by declaration index.
    pub tags:       Vec<(usize, u32)>,
    /// Unions occupy a fixed 16 bytes inline: 8-byte size+tag header and an
    /// 8-byte payload slot.
    pub total_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_preserve_insertion_order() {
        let mut attrs = Attributes::new();
        attrs.set("Stable", ConstantValue::Bool(true));
        attrs.set("MinVersion", ConstantValue::Int(2));
        attrs.set("Stable", ConstantValue::Bool(false));
        let names: Vec<&str> = attrs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Stable", "MinVersion"]);
        assert_eq!(attrs.get("Stable"), Some(&ConstantValue::Bool(false)));
    }

    #[test]
    fn enum_values_auto_increment_after_explicit() {
        let mut def = EnumDef::new("E", "ns.E", Attributes::new());
        def.values.push(EnumValue { name: "A".into(), value: None, attributes: Attributes::new() });
        def.values.push(EnumValue { name: "B".into(), value: Some(5), attributes: Attributes::new() });
        def.values.push(EnumValue { name: "C".into(), value: None, attributes: Attributes::new() });
        assert_eq!(def.resolved_values(), vec![0, 5, 6]);
    }

    #[test]
    fn duplicate_method_ordinals_are_rejected() {
        let mut def = InterfaceDef::new("Svc", "ns.Svc", Attributes::new());
        let method = |name: &str, ordinal| Method {
            name:                name.to_string(),
            ordinal,
            parameters:          vec![],
            response_parameters: None,
            attributes:          Attributes::new(),
        };
        def.add_method(method("First", None)).unwrap();
        def.add_method(method("Second", Some(4))).unwrap();
        def.add_method(method("Third", None)).unwrap();
        assert_eq!(def.resolved_ordinals(), vec![0, 4, 5]);

        let err = def.add_method(method("Clash", Some(4))).unwrap_err();
        assert!(matches!(err, IdlError::InvariantViolation { .. }));
        // The rejected method must not linger.
        assert_eq!(def.methods.len(), 3);
    }
}
