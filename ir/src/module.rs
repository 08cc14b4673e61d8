use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::defs::{Attributes, Constant, EnumDef, InterfaceDef, StructDef, UnionDef};
use crate::error::IdlError;
use crate::kind::{EnumPtr, InterfacePtr, Kind, StructPtr, UnionPtr};

/// Record of one imported module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module_name: String,
    pub namespace:   String,
}

/// One compiled IDL module: a namespace, its aggregate collections, and the
/// spec-string memo table. All state lives here; there is no process-wide
/// registry, so independent module compilations never share mutable data.
#[derive(Debug)]
pub struct Module {
    pub name:       String,
    pub namespace:  String,
    pub attributes: Attributes,
    pub imports:    Vec<Import>,
    pub structs:    Vec<StructPtr>,
    pub unions:     Vec<UnionPtr>,
    pub enums:      Vec<EnumPtr>,
    pub interfaces: Vec<InterfacePtr>,
    pub constants:  Vec<Constant>,
    kinds:          HashMap<String, Kind>,
}

impl Module {
    pub fn new(name: &str, namespace: &str) -> Self {
        Module {
            name:       name.to_string(),
            namespace:  namespace.to_string(),
            attributes: Attributes::new(),
            imports:    Vec::new(),
            structs:    Vec::new(),
            unions:     Vec::new(),
            enums:      Vec::new(),
            interfaces: Vec::new(),
            constants:  Vec::new(),
            kinds:      HashMap::new(),
        }
    }

    /// Looks up a memoized kind by spec string.
    pub fn lookup_kind(&self, spec: &str) -> Option<Kind> {
        self.kinds.get(spec).cloned()
    }

    /// Memoizes a kind under a spec string. Repeated lookups of the same
    /// spec resolve to one identical object (clones share the backing cell).
    pub fn register_kind(&mut self, spec: &str, kind: Kind) {
        self.kinds.insert(spec.to_string(), kind);
    }

    fn qualify(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.namespace, name)
        }
    }

    fn check_unused(&self, qualified: &str) -> Result<(), IdlError> {
        if self.kinds.contains_key(&format!("x:{}", qualified)) {
            return Err(IdlError::InvariantViolation {
                path: format!("{}.{}", self.name, qualified),
                msg:  "a type with this name is already defined".to_string(),
            });
        }
        Ok(())
    }

    pub fn add_struct(&mut self, name: &str, attributes: Attributes) -> Result<StructPtr, IdlError> {
        let qualified = self.qualify(name);
        let def = Rc::new(RefCell::new(StructDef::new(name, &qualified, attributes)));
        self.register_struct(Rc::clone(&def))?;
        Ok(def)
    }

    pub fn add_union(&mut self, name: &str, attributes: Attributes) -> Result<UnionPtr, IdlError> {
        let qualified = self.qualify(name);
        let def = Rc::new(RefCell::new(UnionDef::new(name, &qualified, attributes)));
        self.register_union(Rc::clone(&def))?;
        Ok(def)
    }

    pub fn add_enum(&mut self, name: &str, attributes: Attributes) -> Result<EnumPtr, IdlError> {
        let qualified = self.qualify(name);
        let def = Rc::new(RefCell::new(EnumDef::new(name, &qualified, attributes)));
        self.register_enum(Rc::clone(&def))?;
        self.enums.push(Rc::clone(&def));
        Ok(def)
    }

    /// Declares an enum nested inside a struct's scope. The enum is owned by
    /// the struct and registered under `x:<ns>.<Struct>.<Enum>`, which is
    /// what makes inner-scope resolution win over a same-named top-level
    /// type.
    pub fn add_nested_enum(
        &mut self,
        parent: &StructPtr,
        name: &str,
        attributes: Attributes,
    ) -> Result<EnumPtr, IdlError> {
        let qualified = format!("{}.{}", parent.borrow().qualified, name);
        self.check_unused(&qualified)?;
        let def = Rc::new(RefCell::new(EnumDef::new(name, &qualified, attributes)));
        self.register_kind(&format!("x:{}", qualified), Kind::Enum { def: Rc::clone(&def) });
        parent.borrow_mut().enums.push(Rc::clone(&def));
        Ok(def)
    }

    pub fn add_interface(
        &mut self,
        name: &str,
        attributes: Attributes,
    ) -> Result<InterfacePtr, IdlError> {
        let qualified = self.qualify(name);
        let def = Rc::new(RefCell::new(InterfaceDef::new(name, &qualified, attributes)));
        self.register_interface(Rc::clone(&def))?;
        Ok(def)
    }

    pub fn add_constant(&mut self, constant: Constant) {
        self.constants.push(constant);
    }

    /// Registers an already-built struct definition under its qualified name.
    pub fn register_struct(&mut self, def: StructPtr) -> Result<(), IdlError> {
        let qualified = def.borrow().qualified.clone();
        self.check_unused(&qualified)?;
        self.register_kind(
            &format!("x:{}", qualified),
            Kind::Struct { def: Rc::clone(&def), nullable: false },
        );
        for nested in &def.borrow().enums {
            let nested_qualified = nested.borrow().qualified.clone();
            self.register_kind(
                &format!("x:{}", nested_qualified),
                Kind::Enum { def: Rc::clone(nested) },
            );
        }
        self.structs.push(def);
        Ok(())
    }

    pub fn register_union(&mut self, def: UnionPtr) -> Result<(), IdlError> {
        let qualified = def.borrow().qualified.clone();
        self.check_unused(&qualified)?;
        self.register_kind(
            &format!("x:{}", qualified),
            Kind::Union { def: Rc::clone(&def), nullable: false },
        );
        self.unions.push(def);
        Ok(())
    }

    pub fn register_enum(&mut self, def: EnumPtr) -> Result<(), IdlError> {
        let qualified = def.borrow().qualified.clone();
        self.check_unused(&qualified)?;
        self.register_kind(&format!("x:{}", qualified), Kind::Enum { def: Rc::clone(&def) });
        Ok(())
    }

    pub fn register_interface(&mut self, def: InterfacePtr) -> Result<(), IdlError> {
        let qualified = def.borrow().qualified.clone();
        self.check_unused(&qualified)?;
        self.register_kind(
            &format!("x:{}", qualified),
            Kind::Interface { def: Rc::clone(&def), nullable: false },
        );
        self.interfaces.push(def);
        Ok(())
    }

    /// Copies every importable aggregate of `exporter` into this module,
    /// stamping each copy with the exporter's name. Backing definitions are
    /// deep-cloned and their internal kind references remapped to the
    /// copies, so edits on the importer's side never alias the exporter's
    /// records and two module compilations never contend on shared state.
    pub fn import_module(&mut self, exporter: &Module) -> Result<(), IdlError> {
        self.imports.push(Import {
            module_name: exporter.name.clone(),
            namespace:   exporter.namespace.clone(),
        });

        let mut remap = KindRemap::new();

        // Pass 1: clone every definition without its fields/methods so that
        // cross-references (including mutually recursive ones) can be
        // remapped in pass 2.
        for def in &exporter.structs {
            let src = def.borrow();
            let mut copy = StructDef::new(&src.name, &src.qualified, src.attributes.clone());
            copy.imported_from = Some(src.imported_from.clone().unwrap_or_else(|| exporter.name.clone()));
            copy.layout = src.layout.clone();
            for nested in &src.enums {
                let nsrc = nested.borrow();
                let mut ncopy = nsrc.clone();
                ncopy.imported_from =
                    Some(nsrc.imported_from.clone().unwrap_or_else(|| exporter.name.clone()));
                let nptr = Rc::new(RefCell::new(ncopy));
                remap.enums.insert(Rc::as_ptr(nested) as usize, Rc::clone(&nptr));
                copy.enums.push(nptr);
            }
            let ptr = Rc::new(RefCell::new(copy));
            remap.structs.insert(Rc::as_ptr(def) as usize, Rc::clone(&ptr));
        }
        for def in &exporter.unions {
            let src = def.borrow();
            let mut copy = UnionDef::new(&src.name, &src.qualified, src.attributes.clone());
            copy.imported_from = Some(src.imported_from.clone().unwrap_or_else(|| exporter.name.clone()));
            copy.layout = src.layout.clone();
            let ptr = Rc::new(RefCell::new(copy));
            remap.unions.insert(Rc::as_ptr(def) as usize, Rc::clone(&ptr));
        }
        for def in &exporter.enums {
            let src = def.borrow();
            let mut copy = src.clone();
            copy.imported_from = Some(src.imported_from.clone().unwrap_or_else(|| exporter.name.clone()));
            let ptr = Rc::new(RefCell::new(copy));
            remap.enums.insert(Rc::as_ptr(def) as usize, Rc::clone(&ptr));
        }
        for def in &exporter.interfaces {
            let src = def.borrow();
            let mut copy = InterfaceDef::new(&src.name, &src.qualified, src.attributes.clone());
            copy.imported_from = Some(src.imported_from.clone().unwrap_or_else(|| exporter.name.clone()));
            let ptr = Rc::new(RefCell::new(copy));
            remap.interfaces.insert(Rc::as_ptr(def) as usize, Rc::clone(&ptr));
        }

        // Pass 2: expand fields and methods, remapping aggregate references
        // to the cloned definitions.
        for def in &exporter.structs {
            let copy = &remap.structs[&(Rc::as_ptr(def) as usize)];
            copy.borrow_mut().fields = def
                .borrow()
                .fields
                .iter()
                .map(|f| {
                    let mut f = f.clone();
                    f.kind = remap.kind(&f.kind);
                    f
                })
                .collect();
        }
        for def in &exporter.unions {
            let copy = &remap.unions[&(Rc::as_ptr(def) as usize)];
            copy.borrow_mut().fields = def
                .borrow()
                .fields
                .iter()
                .map(|f| {
                    let mut f = f.clone();
                    f.kind = remap.kind(&f.kind);
                    f
                })
                .collect();
        }
        for def in &exporter.interfaces {
            let copy = &remap.interfaces[&(Rc::as_ptr(def) as usize)];
            copy.borrow_mut().methods = def
                .borrow()
                .methods
                .iter()
                .map(|m| {
                    let mut m = m.clone();
                    for p in &mut m.parameters {
                        p.kind = remap.kind(&p.kind);
                    }
                    if let Some(response) = &mut m.response_parameters {
                        for p in response {
                            p.kind = remap.kind(&p.kind);
                        }
                    }
                    m
                })
                .collect();
        }

        for def in exporter.structs.iter().map(|d| &remap.structs[&(Rc::as_ptr(d) as usize)]) {
            self.register_struct(Rc::clone(def))?;
        }
        for def in exporter.unions.iter().map(|d| &remap.unions[&(Rc::as_ptr(d) as usize)]) {
            self.register_union(Rc::clone(def))?;
        }
        for def in exporter.enums.iter().map(|d| &remap.enums[&(Rc::as_ptr(d) as usize)]) {
            self.register_enum(Rc::clone(def))?;
            self.enums.push(Rc::clone(def));
        }
        for def in exporter.interfaces.iter().map(|d| &remap.interfaces[&(Rc::as_ptr(d) as usize)]) {
            self.register_interface(Rc::clone(def))?;
        }

        for constant in &exporter.constants {
            let mut c = constant.clone();
            c.kind = remap.kind(&c.kind);
            self.constants.push(c);
        }

        Ok(())
    }
}

/// Pointer map from an exporter's definitions to the importer's clones.
struct KindRemap {
    structs:    HashMap<usize, StructPtr>,
    unions:     HashMap<usize, UnionPtr>,
    enums:      HashMap<usize, EnumPtr>,
    interfaces: HashMap<usize, InterfacePtr>,
}

impl KindRemap {
    fn new() -> Self {
        KindRemap {
            structs:    HashMap::new(),
            unions:     HashMap::new(),
            enums:      HashMap::new(),
            interfaces: HashMap::new(),
        }
    }

    fn kind(&self, kind: &Kind) -> Kind {
        match kind {
            Kind::Array { element, length, nullable } => Kind::Array {
                element:  Box::new(self.kind(element)),
                length:   *length,
                nullable: *nullable,
            },
            Kind::Map { key, value, nullable } => Kind::Map {
                key:      Box::new(self.kind(key)),
                value:    Box::new(self.kind(value)),
                nullable: *nullable,
            },
            Kind::Struct { def, nullable } => Kind::Struct {
                def:      self.structs.get(&(Rc::as_ptr(def) as usize)).cloned().unwrap_or_else(|| Rc::clone(def)),
                nullable: *nullable,
            },
            Kind::Union { def, nullable } => Kind::Union {
                def:      self.unions.get(&(Rc::as_ptr(def) as usize)).cloned().unwrap_or_else(|| Rc::clone(def)),
                nullable: *nullable,
            },
            Kind::Enum { def } => Kind::Enum {
                def: self.enums.get(&(Rc::as_ptr(def) as usize)).cloned().unwrap_or_else(|| Rc::clone(def)),
            },
            Kind::Interface { def, nullable } => Kind::Interface {
                def:      self.interfaces.get(&(Rc::as_ptr(def) as usize)).cloned().unwrap_or_else(|| Rc::clone(def)),
                nullable: *nullable,
            },
            Kind::InterfaceRequest { def, nullable } => Kind::InterfaceRequest {
                def:      self.interfaces.get(&(Rc::as_ptr(def) as usize)).cloned().unwrap_or_else(|| Rc::clone(def)),
                nullable: *nullable,
            },
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::Field;

    #[test]
    fn kinds_are_memoized_per_module() {
        let mut module = Module::new("geometry", "geo");
        let def = module.add_struct("Point", Attributes::new()).unwrap();
        let found = module.lookup_kind("x:geo.Point").unwrap();
        match found {
            Kind::Struct { def: looked_up, .. } => assert!(Rc::ptr_eq(&def, &looked_up)),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn duplicate_type_names_are_rejected() {
        let mut module = Module::new("geometry", "geo");
        module.add_struct("Point", Attributes::new()).unwrap();
        let err = module.add_struct("Point", Attributes::new()).unwrap_err();
        assert!(matches!(err, IdlError::InvariantViolation { .. }));
    }

    #[test]
    fn import_copies_do_not_alias_the_exporter() {
        let mut exporter = Module::new("geometry", "geo");
        let point = exporter.add_struct("Point", Attributes::new()).unwrap();
        point.borrow_mut().fields.push(Field::new("x", Kind::Int32));

        let segment = exporter.add_struct("Segment", Attributes::new()).unwrap();
        let point_kind = exporter.lookup_kind("x:geo.Point").unwrap();
        segment.borrow_mut().fields.push(Field::new("from", point_kind.clone()));
        segment.borrow_mut().fields.push(Field::new("to", point_kind));

        let mut importer = Module::new("drawing", "draw");
        importer.import_module(&exporter).unwrap();

        let imported = importer.lookup_kind("x:geo.Point").unwrap();
        let imported_def = match &imported {
            Kind::Struct { def, .. } => Rc::clone(def),
            other => panic!("unexpected kind {:?}", other),
        };
        assert_eq!(imported_def.borrow().imported_from.as_deref(), Some("geometry"));
        assert!(!Rc::ptr_eq(&imported_def, &point));

        // A mutation on the importer's copy must stay invisible to the
        // exporter.
        imported_def.borrow_mut().fields.push(Field::new("y", Kind::Int32));
        assert_eq!(point.borrow().fields.len(), 1);

        // Internal references are remapped to the copies.
        let segment_copy = match importer.lookup_kind("x:geo.Segment").unwrap() {
            Kind::Struct { def, .. } => def,
            other => panic!("unexpected kind {:?}", other),
        };
        match &segment_copy.borrow().fields[0].kind {
            Kind::Struct { def, .. } => assert!(Rc::ptr_eq(def, &imported_def)),
            other => panic!("unexpected kind {:?}", other),
        };
    }
}
