//! Order-preserving dictionary encoding of a resolved module, used to cache
//! compiled IDL across incremental build invocations.
//!
//! Kinds always serialize as the spec-string grammar; reconstruction runs in
//! two passes so forward and sibling references resolve: pass 1 registers
//! every named aggregate, pass 2 expands fields, methods, and parameters.
//! `to_dict(from_dict(d)?)? == d` for every valid dict `d`.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use wireidl_ir::{
    Attributes, Constant, ConstantValue, EnumDef, EnumValue, Field, IdlError, Import, InterfaceDef,
    Method, Module, StructDef, UnionDef,
};

use crate::pack::pack_module;
use crate::specs::{parse_spec, Scope};

type JsonMap = Map<String, Value>;

#[derive(Serialize, Deserialize)]
struct ModuleData {
    name:       String,
    #[serde(default)]
    namespace:  String,
    #[serde(default)]
    imports:    Vec<ImportData>,
    #[serde(default)]
    structs:    Vec<StructData>,
    #[serde(default)]
    unions:     Vec<UnionData>,
    #[serde(default)]
    interfaces: Vec<InterfaceData>,
    #[serde(default)]
    enums:      Vec<EnumData>,
    #[serde(default)]
    constants:  Vec<ConstantData>,
    #[serde(default)]
    attributes: JsonMap,
}

#[derive(Serialize, Deserialize)]
struct ImportData {
    module_name: String,
    namespace:   String,
}

#[derive(Serialize, Deserialize)]
struct StructData {
    name:          String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imported_from: Option<String>,
    fields:        Vec<FieldData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    enums:         Vec<EnumData>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attributes:    JsonMap,
}

#[derive(Serialize, Deserialize)]
struct UnionData {
    name:          String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imported_from: Option<String>,
    fields:        Vec<FieldData>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attributes:    JsonMap,
}

#[derive(Serialize, Deserialize)]
struct FieldData {
    name:       String,
    kind:       String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ordinal:    Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default:    Option<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attributes: JsonMap,
}

#[derive(Serialize, Deserialize)]
struct InterfaceData {
    name:          String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imported_from: Option<String>,
    methods:       Vec<MethodData>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attributes:    JsonMap,
}

#[derive(Serialize, Deserialize)]
struct MethodData {
    name:                String,
    parameters:          Vec<FieldData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_parameters: Option<Vec<FieldData>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ordinal:             Option<u32>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attributes:          JsonMap,
}

#[derive(Serialize, Deserialize)]
struct EnumData {
    name:          String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imported_from: Option<String>,
    values:        Vec<EnumValueData>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attributes:    JsonMap,
}

#[derive(Serialize, Deserialize)]
struct EnumValueData {
    name:       String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value:      Option<i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attributes: JsonMap,
}

#[derive(Serialize, Deserialize)]
struct ConstantData {
    name:  String,
    kind:  String,
    value: Value,
}

fn constant_to_json(value: &ConstantValue, path: &str) -> Result<Value, IdlError> {
    match value {
        ConstantValue::Bool(b) => Ok(Value::Bool(*b)),
        ConstantValue::Int(i) => Ok(Value::from(*i)),
        ConstantValue::Double(d) => {
            serde_json::Number::from_f64(*d).map(Value::Number).ok_or_else(|| {
                IdlError::ParseError {
                    path: path.to_string(),
                    msg:  format!("non-finite value {} cannot be persisted", d),
                }
            })
        }
        ConstantValue::Str(s) => Ok(Value::String(s.clone())),
    }
}

fn json_to_constant(value: &Value, path: &str) -> Result<ConstantValue, IdlError> {
    match value {
        Value::Bool(b) => Ok(ConstantValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(ConstantValue::Int(i))
            } else if let Some(d) = n.as_f64() {
                Ok(ConstantValue::Double(d))
            } else {
                Err(IdlError::ParseError {
                    path: path.to_string(),
                    msg:  format!("unrepresentable number {}", n),
                })
            }
        }
        Value::String(s) => Ok(ConstantValue::Str(s.clone())),
        other => Err(IdlError::ParseError {
            path: path.to_string(),
            msg:  format!("unsupported literal {}", other),
        }),
    }
}

fn attributes_to_json(attributes: &Attributes, path: &str) -> Result<JsonMap, IdlError> {
    let mut map = JsonMap::new();
    for (name, value) in attributes.iter() {
        map.insert(name.clone(), constant_to_json(value, path)?);
    }
    Ok(map)
}

fn attributes_from_json(map: &JsonMap, path: &str) -> Result<Attributes, IdlError> {
    let mut attributes = Attributes::new();
    for (name, value) in map {
        attributes.set(name, json_to_constant(value, path)?);
    }
    Ok(attributes)
}

fn field_data(field: &Field, path: &str) -> Result<FieldData, IdlError> {
    Ok(FieldData {
        name:       field.name.clone(),
        kind:       field.kind.spec(),
        ordinal:    field.ordinal,
        default:    field.default.as_ref().map(|d| constant_to_json(d, path)).transpose()?,
        attributes: attributes_to_json(&field.attributes, path)?,
    })
}

fn enum_data(def: &EnumDef) -> Result<EnumData, IdlError> {
    Ok(EnumData {
        name:          def.name.clone(),
        imported_from: def.imported_from.clone(),
        values:        def
            .values
            .iter()
            .map(|v| {
                Ok(EnumValueData {
                    name:       v.name.clone(),
                    value:      v.value,
                    attributes: attributes_to_json(&v.attributes, &def.qualified)?,
                })
            })
            .collect::<Result<_, IdlError>>()?,
        attributes:    attributes_to_json(&def.attributes, &def.qualified)?,
    })
}

/// Encodes a module as a stable, order-preserving dictionary.
pub fn to_dict(module: &Module) -> Result<Value, IdlError> {
    let data = ModuleData {
        name:       module.name.clone(),
        namespace:  module.namespace.clone(),
        imports:    module
            .imports
            .iter()
            .map(|i| ImportData { module_name: i.module_name.clone(), namespace: i.namespace.clone() })
            .collect(),
        structs:    module
            .structs
            .iter()
            .map(|def| {
                let def = def.borrow();
                Ok(StructData {
                    name:          def.name.clone(),
                    imported_from: def.imported_from.clone(),
                    fields:        def
                        .fields
                        .iter()
                        .map(|f| field_data(f, &def.qualified))
                        .collect::<Result<_, IdlError>>()?,
                    enums:         def
                        .enums
                        .iter()
                        .map(|e| enum_data(&e.borrow()))
                        .collect::<Result<_, IdlError>>()?,
                    attributes:    attributes_to_json(&def.attributes, &def.qualified)?,
                })
            })
            .collect::<Result<_, IdlError>>()?,
        unions:     module
            .unions
            .iter()
            .map(|def| {
                let def = def.borrow();
                Ok(UnionData {
                    name:          def.name.clone(),
                    imported_from: def.imported_from.clone(),
                    fields:        def
                        .fields
                        .iter()
                        .map(|f| field_data(f, &def.qualified))
                        .collect::<Result<_, IdlError>>()?,
                    attributes:    attributes_to_json(&def.attributes, &def.qualified)?,
                })
            })
            .collect::<Result<_, IdlError>>()?,
        interfaces: module
            .interfaces
            .iter()
            .map(|def| {
                let def = def.borrow();
                Ok(InterfaceData {
                    name:          def.name.clone(),
                    imported_from: def.imported_from.clone(),
                    methods:       def
                        .methods
                        .iter()
                        .map(|m| {
                            Ok(MethodData {
                                name:                m.name.clone(),
                                parameters:          m
                                    .parameters
                                    .iter()
                                    .map(|p| field_data(p, &def.qualified))
                                    .collect::<Result<_, IdlError>>()?,
                                response_parameters: m
                                    .response_parameters
                                    .as_ref()
                                    .map(|params| {
                                        params
                                            .iter()
                                            .map(|p| field_data(p, &def.qualified))
                                            .collect::<Result<_, IdlError>>()
                                    })
                                    .transpose()?,
                                ordinal:             m.ordinal,
                                attributes:          attributes_to_json(&m.attributes, &def.qualified)?,
                            })
                        })
                        .collect::<Result<_, IdlError>>()?,
                    attributes:    attributes_to_json(&def.attributes, &def.qualified)?,
                })
            })
            .collect::<Result<_, IdlError>>()?,
        enums:      module
            .enums
            .iter()
            .map(|def| enum_data(&def.borrow()))
            .collect::<Result<_, IdlError>>()?,
        constants:  module
            .constants
            .iter()
            .map(|c| {
                Ok(ConstantData {
                    name:  c.name.clone(),
                    kind:  c.kind.spec(),
                    value: constant_to_json(&c.value, &c.name)?,
                })
            })
            .collect::<Result<_, IdlError>>()?,
        attributes: attributes_to_json(&module.attributes, &module.name)?,
    };

    serde_json::to_value(data).map_err(|e| IdlError::ParseError {
        path: module.name.clone(),
        msg:  format!("failed to encode module dict: {}", e),
    })
}

fn owner_namespace(module: &Module, imported_from: &Option<String>, path: &str) -> Result<String, IdlError> {
    match imported_from {
        None => Ok(module.namespace.clone()),
        Some(exporter) => module
            .imports
            .iter()
            .find(|i| &i.module_name == exporter)
            .map(|i| i.namespace.clone())
            .ok_or_else(|| IdlError::ResolutionError {
                path: path.to_string(),
                msg:  format!("imported_from references unknown import \"{}\"", exporter),
            }),
    }
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

fn field_from_data(
    module: &mut Module,
    data: &FieldData,
    scope: &Scope,
    path: &str,
) -> Result<Field, IdlError> {
    let kind = parse_spec(module, &data.kind, scope)?;
    Ok(Field {
        name:       data.name.clone(),
        kind,
        ordinal:    data.ordinal,
        default:    data.default.as_ref().map(|d| json_to_constant(d, path)).transpose()?,
        attributes: attributes_from_json(&data.attributes, path)?,
    })
}

fn enum_from_data(data: &EnumData, qualified: &str) -> Result<EnumDef, IdlError> {
    let mut def = EnumDef::new(&data.name, qualified, attributes_from_json(&data.attributes, qualified)?);
    def.imported_from = data.imported_from.clone();
    for v in &data.values {
        def.values.push(EnumValue {
            name:       v.name.clone(),
            value:      v.value,
            attributes: attributes_from_json(&v.attributes, qualified)?,
        });
    }
    Ok(def)
}

/// Reconstructs a module from its dictionary encoding and packs it. On any
/// error no partial module is returned.
pub fn from_dict(dict: &Value) -> Result<Module, IdlError> {
    let data: ModuleData = serde_json::from_value(dict.clone()).map_err(|e| IdlError::ParseError {
        path: "module".to_string(),
        msg:  format!("malformed module dict: {}", e),
    })?;

    let mut module = Module::new(&data.name, &data.namespace);
    module.attributes = attributes_from_json(&data.attributes, &data.name)?;
    for import in &data.imports {
        module.imports.push(Import {
            module_name: import.module_name.clone(),
            namespace:   import.namespace.clone(),
        });
    }

    // Pass 1: register every named aggregate by spec so forward and sibling
    // references resolve. Enum members carry no kinds, so they fill in here.
    for sd in &data.structs {
        let namespace = owner_namespace(&module, &sd.imported_from, &sd.name)?;
        let qualified = qualify(&namespace, &sd.name);
        let mut def = StructDef::new(&sd.name, &qualified, attributes_from_json(&sd.attributes, &qualified)?);
        def.imported_from = sd.imported_from.clone();
        for ed in &sd.enums {
            let nested_qualified = format!("{}.{}", qualified, ed.name);
            let nested = enum_from_data(ed, &nested_qualified)?;
            def.enums.push(Rc::new(RefCell::new(nested)));
        }
        module.register_struct(Rc::new(RefCell::new(def)))?;
    }
    for ud in &data.unions {
        let namespace = owner_namespace(&module, &ud.imported_from, &ud.name)?;
        let qualified = qualify(&namespace, &ud.name);
        let mut def = UnionDef::new(&ud.name, &qualified, attributes_from_json(&ud.attributes, &qualified)?);
        def.imported_from = ud.imported_from.clone();
        module.register_union(Rc::new(RefCell::new(def)))?;
    }
    for ed in &data.enums {
        let namespace = owner_namespace(&module, &ed.imported_from, &ed.name)?;
        let qualified = qualify(&namespace, &ed.name);
        let def = enum_from_data(ed, &qualified)?;
        let ptr = Rc::new(RefCell::new(def));
        module.register_enum(Rc::clone(&ptr))?;
        module.enums.push(ptr);
    }
    for id in &data.interfaces {
        let namespace = owner_namespace(&module, &id.imported_from, &id.name)?;
        let qualified = qualify(&namespace, &id.name);
        let mut def = InterfaceDef::new(&id.name, &qualified, attributes_from_json(&id.attributes, &qualified)?);
        def.imported_from = id.imported_from.clone();
        module.register_interface(Rc::new(RefCell::new(def)))?;
    }

    // Pass 2: expand fields, methods, and parameters now that every sibling
    // kind exists.
    for (index, sd) in data.structs.iter().enumerate() {
        let ptr = Rc::clone(&module.structs[index]);
        let qualified = ptr.borrow().qualified.clone();
        let namespace = owner_namespace(&module, &sd.imported_from, &sd.name)?;
        let scope = Scope::module(&namespace).nested(&sd.name);
        let mut fields = Vec::with_capacity(sd.fields.len());
        for fd in &sd.fields {
            fields.push(field_from_data(&mut module, fd, &scope, &qualified)?);
        }
        ptr.borrow_mut().fields = fields;
    }
    for (index, ud) in data.unions.iter().enumerate() {
        let ptr = Rc::clone(&module.unions[index]);
        let qualified = ptr.borrow().qualified.clone();
        let namespace = owner_namespace(&module, &ud.imported_from, &ud.name)?;
        let scope = Scope::module(&namespace).nested(&ud.name);
        let mut fields = Vec::with_capacity(ud.fields.len());
        for fd in &ud.fields {
            fields.push(field_from_data(&mut module, fd, &scope, &qualified)?);
        }
        ptr.borrow_mut().fields = fields;
    }
    for (index, id) in data.interfaces.iter().enumerate() {
        let ptr = Rc::clone(&module.interfaces[index]);
        let qualified = ptr.borrow().qualified.clone();
        let namespace = owner_namespace(&module, &id.imported_from, &id.name)?;
        let scope = Scope::module(&namespace);
        for md in &id.methods {
            let mut parameters = Vec::with_capacity(md.parameters.len());
            for pd in &md.parameters {
                parameters.push(field_from_data(&mut module, pd, &scope, &qualified)?);
            }
            let response_parameters = match &md.response_parameters {
                None => None,
                Some(params) => {
                    let mut out = Vec::with_capacity(params.len());
                    for pd in params {
                        out.push(field_from_data(&mut module, pd, &scope, &qualified)?);
                    }
                    Some(out)
                }
            };
            ptr.borrow_mut().add_method(Method {
                name:                md.name.clone(),
                ordinal:             md.ordinal,
                parameters,
                response_parameters,
                attributes:          attributes_from_json(&md.attributes, &qualified)?,
            })?;
        }
    }
    let module_scope = Scope::module(&data.namespace);
    for cd in &data.constants {
        let kind = parse_spec(&mut module, &cd.kind, &module_scope)?;
        let constant = Constant {
            name:  cd.name.clone(),
            kind,
            value: json_to_constant(&cd.value, &cd.name)?,
        };
        module.add_constant(constant);
    }

    pack_module(&module)?;
    Ok(module)
}
