//! Symbol table over reference units and the program's own types.
//!
//! Reference unit metadata is converted once: type handles are rebased so
//! that every class is identified by a [`ClassRef`] relative to the
//! catalog, whatever unit declared it.

use std::collections::{HashMap, HashSet};

use super::{ClassRef, Ty};
use crate::image::{ModuleImage, Scope, TypeSig};
use crate::reference::ReferenceCatalog;

#[derive(Debug, Clone)]
pub struct TypeSymbol {
    pub class: ClassRef,
    pub namespace: String,
    pub name: String,
    pub is_static: bool,
    pub is_public: bool,
    pub fields: Vec<FieldSymbol>,
    pub methods: Vec<MethodSymbol>,
}

impl TypeSymbol {
    pub fn new(class: ClassRef, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class,
            namespace: namespace.into(),
            name: name.into(),
            is_static: false,
            is_public: true,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    pub fn field(&self, name: &str) -> Option<(u32, &FieldSymbol)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .map(|(i, f)| (i as u32, f))
    }

    /// Callable methods named `name`, with their indices.
    pub fn methods_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = (u32, &'s MethodSymbol)> + 's {
        self.methods
            .iter()
            .enumerate()
            .filter(move |(_, m)| !m.is_special && m.name == name)
            .map(|(i, m)| (i as u32, m))
    }

    pub fn is_local(&self) -> bool {
        matches!(self.class, ClassRef::Local(_))
    }
}

#[derive(Debug, Clone)]
pub struct FieldSymbol {
    pub name: String,
    pub ty: Ty,
    pub is_static: bool,
    pub is_public: bool,
    /// Fields of reference units and `const` fields cannot be assigned.
    pub read_only: bool,
}

#[derive(Debug, Clone)]
pub struct MethodSymbol {
    pub name: String,
    pub params: Vec<Ty>,
    pub ret: Ty,
    pub is_static: bool,
    pub is_public: bool,
    /// Compiler-generated initializer, not callable from source.
    pub is_special: bool,
}

/// Maps the full name of a runtime type to its keyword type, if it has one.
pub fn keyword_type(full_name: &str) -> Option<Ty> {
    let ty = match full_name {
        "System.Void" => Ty::Void,
        "System.Boolean" => Ty::Bool,
        "System.Int32" => Ty::Int,
        "System.Int64" => Ty::Long,
        "System.Double" => Ty::Double,
        "System.String" => Ty::String,
        "System.Object" => Ty::Object,
        _ => return None,
    };
    Some(ty)
}

/// Full name of the runtime type behind a keyword such as `int`.
pub fn keyword_runtime_name(keyword: &str) -> Option<&'static str> {
    let name = match keyword {
        "void" => "System.Void",
        "bool" => "System.Boolean",
        "int" => "System.Int32",
        "long" => "System.Int64",
        "double" => "System.Double",
        "string" => "System.String",
        "object" => "System.Object",
        _ => return None,
    };
    Some(name)
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    types: Vec<TypeSymbol>,
    by_class: HashMap<ClassRef, usize>,
    by_name: HashMap<String, Vec<usize>>,
    namespaces: HashSet<String>,
}

impl SymbolTable {
    /// Builds a table holding the public types of every catalog unit.
    pub fn from_catalog(catalog: &ReferenceCatalog) -> Self {
        let mut table = Self::default();
        for (position, unit) in catalog.iter().enumerate() {
            let image = unit.image();
            for (index, def) in image.types.iter().enumerate() {
                if !def.is_public {
                    continue;
                }
                let class = ClassRef::External {
                    unit: position as u16,
                    index: index as u32,
                };
                let rebase = |sig: TypeSig| rebase_sig(sig, position, image, catalog);
                let mut symbol = TypeSymbol::new(class, def.namespace.clone(), def.name.clone());
                symbol.is_static = def.is_static;
                symbol.fields = def
                    .fields
                    .iter()
                    .map(|f| FieldSymbol {
                        name: f.name.clone(),
                        ty: rebase(f.ty),
                        is_static: f.is_static,
                        is_public: f.is_public,
                        read_only: true,
                    })
                    .collect();
                symbol.methods = def
                    .methods
                    .iter()
                    .map(|m| MethodSymbol {
                        name: m.name.clone(),
                        params: m.params.iter().map(|p| rebase(p.ty)).collect(),
                        ret: rebase(m.ret),
                        is_static: m.is_static,
                        is_public: m.is_public,
                        is_special: m.is_special(),
                    })
                    .collect();
                table.insert(symbol);
            }
        }
        table
    }

    /// Adds a type; local types shadow reference types of the same name.
    pub fn insert(&mut self, symbol: TypeSymbol) {
        let slot = self.types.len();
        let full_name = symbol.full_name();
        let mut prefix = String::new();
        for part in symbol.namespace.split('.').filter(|p| !p.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);
            self.namespaces.insert(prefix.clone());
        }
        self.by_class.insert(symbol.class, slot);
        let entries = self.by_name.entry(full_name).or_default();
        if symbol.is_local() {
            entries.insert(0, slot);
        } else {
            entries.push(slot);
        }
        self.types.push(symbol);
    }

    pub fn get(&self, class: ClassRef) -> Option<&TypeSymbol> {
        self.by_class.get(&class).map(|&slot| &self.types[slot])
    }

    pub fn get_mut(&mut self, class: ClassRef) -> Option<&mut TypeSymbol> {
        let slot = *self.by_class.get(&class)?;
        self.types.get_mut(slot)
    }

    /// Finds a type by namespace-qualified name.
    pub fn lookup(&self, full_name: &str) -> Option<&TypeSymbol> {
        self.by_name
            .get(full_name)
            .and_then(|slots| slots.first())
            .map(|&slot| &self.types[slot])
    }

    pub fn is_namespace(&self, name: &str) -> bool {
        self.namespaces.contains(name)
    }

    /// User-facing name of a type, as used in diagnostics.
    pub fn display(&self, ty: Ty) -> String {
        match ty {
            Ty::Class(class) => self
                .get(class)
                .map(TypeSymbol::full_name)
                .unwrap_or_else(|| "?".to_string()),
            other => other.to_string(),
        }
    }
}

fn rebase_sig(sig: TypeSig, position: usize, image: &ModuleImage, catalog: &ReferenceCatalog) -> Ty {
    match sig {
        TypeSig::Void => Ty::Void,
        TypeSig::Bool => Ty::Bool,
        TypeSig::Int => Ty::Int,
        TypeSig::Long => Ty::Long,
        TypeSig::Double => Ty::Double,
        TypeSig::String => Ty::String,
        TypeSig::Object => Ty::Object,
        TypeSig::Class(handle) => {
            let unit = match handle.scope {
                Scope::Local => Some(position),
                Scope::External(k) => image
                    .references
                    .get(k as usize)
                    .and_then(|name| catalog.position(name)),
            };
            match unit {
                Some(unit) => Ty::Class(ClassRef::External {
                    unit: unit as u16,
                    index: handle.index,
                }),
                None => Ty::Object,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_types_are_indexed() {
        let table = SymbolTable::from_catalog(&ReferenceCatalog::core_only());
        let console = table.lookup("System.Console").unwrap();
        assert!(console.is_static);
        assert!(console.methods_named("WriteLine").count() > 1);
        assert!(table.is_namespace("System"));
        assert!(!table.is_namespace("Sys"));

        let math = table.lookup("System.Math").unwrap();
        assert!(math.methods_named(".cctor").next().is_none());
        let (_, pi) = math.field("PI").unwrap();
        assert!(pi.read_only);
    }

    #[test]
    fn test_local_types_shadow_references() {
        let mut table = SymbolTable::from_catalog(&ReferenceCatalog::core_only());
        table.insert(TypeSymbol::new(ClassRef::Local(0), "System", "Math"));
        let math = table.lookup("System.Math").unwrap();
        assert!(math.is_local());
        assert_eq!(table.display(Ty::Class(ClassRef::Local(0))), "System.Math");
    }

    #[test]
    fn test_keyword_mapping() {
        assert_eq!(keyword_type("System.Int32"), Some(Ty::Int));
        assert_eq!(keyword_runtime_name("string"), Some("System.String"));
        assert_eq!(keyword_type("System.Console"), None);
    }
}
