use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use kiln_classfile::flags;
use smol_str::SmolStr;

pub type Decl = Arc<Declaration>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclKind {
    Package,
    Class,
    Field,
    Method,
    Constructor,
    Local,
    TypeVariable,
    Parameterized,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u16);

impl Modifiers {
    pub const fn from_access_flags(flags: u16) -> Self {
        Self(flags)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub fn is_public(self) -> bool {
        self.0 & flags::ACC_PUBLIC != 0
    }

    pub fn is_static(self) -> bool {
        self.0 & flags::ACC_STATIC != 0
    }

    pub fn is_abstract(self) -> bool {
        self.0 & flags::ACC_ABSTRACT != 0
    }

    pub fn is_final(self) -> bool {
        self.0 & flags::ACC_FINAL != 0
    }

    pub fn is_interface(self) -> bool {
        self.0 & flags::ACC_INTERFACE != 0
    }
}

/// One argument of a parameterized type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeArg {
    Any,
    Exact(Decl),
    Extends(Decl),
    Super(Decl),
}

impl TypeArg {
    pub fn decl(&self) -> Option<&Decl> {
        match self {
            TypeArg::Any => None,
            TypeArg::Exact(d) | TypeArg::Extends(d) | TypeArg::Super(d) => Some(d),
        }
    }

    pub(crate) fn id_fragment(&self) -> String {
        match self {
            TypeArg::Any => "?".to_string(),
            TypeArg::Exact(d) => d.id().to_string(),
            TypeArg::Extends(d) => format!("? extends {}", d.id()),
            TypeArg::Super(d) => format!("? super {}", d.id()),
        }
    }
}

/// A canonical symbol-table entry.
///
/// `owner` depends on the kind: a package owns a top-level class, a class
/// owns its nested classes and members, a method owns its locals, an array
/// is owned by its component and a parameterized type by its base class.
pub struct Declaration {
    pub(crate) id: SmolStr,
    pub(crate) kind: DeclKind,
    pub(crate) name: SmolStr,
    pub(crate) owner: Option<Decl>,
    pub(crate) modifiers: Modifiers,
    /// Erased parameter types of methods and constructors.
    pub(crate) params: Vec<SmolStr>,
    pub(crate) type_args: Vec<TypeArg>,
    pub(crate) array: OnceLock<Decl>,
}

impl Declaration {
    pub(crate) fn new(id: SmolStr, kind: DeclKind, name: SmolStr, owner: Option<Decl>) -> Self {
        Self {
            id,
            kind,
            name,
            owner,
            modifiers: Modifiers::default(),
            params: Vec::new(),
            type_args: Vec::new(),
            array: OnceLock::new(),
        }
    }

    /// Stable canonical identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DeclKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<&Decl> {
        self.owner.as_ref()
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn params(&self) -> &[SmolStr] {
        &self.params
    }

    pub fn type_args(&self) -> &[TypeArg] {
        &self.type_args
    }

    pub fn is_class(&self) -> bool {
        self.kind == DeclKind::Class
    }

    pub fn is_executable(&self) -> bool {
        matches!(self.kind, DeclKind::Method | DeclKind::Constructor)
    }

    /// Binary name for classes (`p.Outer$Inner`), `None` otherwise.
    pub fn qualified_name(&self) -> Option<&str> {
        self.is_class().then_some(self.id.as_str())
    }

    /// Closest enclosing class declaration (itself for classes).
    pub fn enclosing_class(self: &Arc<Self>) -> Option<Decl> {
        let mut current = Some(self.clone());
        while let Some(decl) = current {
            if decl.is_class() {
                return Some(decl);
            }
            current = decl.owner.clone();
        }
        None
    }

    /// Outermost enclosing class (the one a source file defines).
    pub fn root_class(self: &Arc<Self>) -> Option<Decl> {
        let mut root = self.enclosing_class()?;
        while let Some(owner) = root.owner.as_ref().filter(|o| o.is_class()) {
            root = owner.clone();
        }
        Some(root)
    }

    /// Class declarations this declaration is built from: the class itself,
    /// an array's element class, a parameterized type's base and arguments.
    pub fn component_classes(self: &Arc<Self>) -> Vec<Decl> {
        let mut out = Vec::new();
        collect_component_classes(self, &mut out);
        out
    }

    /// Array variant already derived from this declaration, if any.
    pub fn array_variant(&self) -> Option<&Decl> {
        self.array.get()
    }
}

fn collect_component_classes(decl: &Decl, out: &mut Vec<Decl>) {
    match decl.kind {
        DeclKind::Class => out.push(decl.clone()),
        DeclKind::Array => {
            if let Some(component) = &decl.owner {
                collect_component_classes(component, out);
            }
        }
        DeclKind::Parameterized => {
            if let Some(base) = &decl.owner {
                collect_component_classes(base, out);
            }
            for arg in &decl.type_args {
                if let Some(d) = arg.decl() {
                    collect_component_classes(d, out);
                }
            }
        }
        _ => {}
    }
}

impl PartialEq for Declaration {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.id == other.id
    }
}

impl Eq for Declaration {}

impl Hash for Declaration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.id)
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
