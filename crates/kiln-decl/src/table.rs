use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use kiln_classfile::{
    parse_method_descriptor, ClassFile, ClassMember, FieldType, FieldTypeSignature, TypeArgument,
    TypeSignature,
};
use kiln_classpath::ClassFinder;
use kiln_core::{binary_to_internal, internal_to_binary, outer_binary_name, simple_name};
use parking_lot::RwLock;
use smol_str::SmolStr;

use crate::decl::{Decl, DeclKind, Declaration, Modifiers, TypeArg};
use crate::scope::TypeScope;

/// The kinds of input a declaration can be resolved from.
#[derive(Debug, Clone, Copy)]
pub enum DeclSource<'a> {
    /// Binary type name, e.g. `p.Outer$Inner`.
    QualifiedName(&'a str),
    Package(&'a str),
    /// A member handle; `descriptor` starting with `(` selects a method or
    /// constructor, anything else a field.
    Member {
        owner: &'a str,
        name: &'a str,
        descriptor: &'a str,
    },
    Descriptor(&'a FieldType),
    Signature {
        signature: &'a FieldTypeSignature,
        scope: &'a TypeScope,
    },
    Local {
        method: &'a Decl,
        name: &'a str,
        slot: u16,
    },
}

/// Workspace-scoped declaration interner.
///
/// Lookups are lookup-or-create and canonical: concurrent resolution of the
/// same identifier yields the same `Arc`. Type declarations are only created
/// when the class's artifact can be located through the table's
/// [`ClassFinder`]; anything unresolvable yields `None`.
pub struct DeclTable {
    finder: Arc<dyn ClassFinder>,
    decls: RwLock<HashMap<SmolStr, Decl>>,
    classes: RwLock<HashMap<SmolStr, Option<Arc<ClassFile>>>>,
}

impl std::fmt::Debug for DeclTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeclTable")
            .field("decls", &self.decls.read().len())
            .field("classes", &self.classes.read().len())
            .finish()
    }
}

impl DeclTable {
    pub fn new(finder: Arc<dyn ClassFinder>) -> Self {
        Self {
            finder,
            decls: RwLock::new(HashMap::new()),
            classes: RwLock::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, source: DeclSource<'_>) -> Option<Decl> {
        match source {
            DeclSource::QualifiedName(name) => self.class(name),
            DeclSource::Package(name) => Some(self.package(name)),
            DeclSource::Member {
                owner,
                name,
                descriptor,
            } => {
                let owner = self.class(owner)?;
                if !descriptor.starts_with('(') {
                    return self.field(&owner, name);
                }
                let desc = parse_method_descriptor(descriptor).ok()?;
                if name == "<init>" {
                    self.constructor(&owner, &desc.params)
                } else {
                    self.method(&owner, name, &desc.params)
                }
            }
            DeclSource::Descriptor(ty) => self.field_type(ty),
            DeclSource::Signature { signature, scope } => self.signature_type(signature, scope),
            DeclSource::Local { method, name, slot } => Some(self.local(method, name, slot)),
        }
    }

    /// Already-interned declaration with this identifier.
    pub fn get(&self, id: &str) -> Option<Decl> {
        self.decls.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.decls.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.read().is_empty()
    }

    /// Forgets every declaration and cached artifact (classpath change).
    pub fn invalidate_all(&self) {
        self.decls.write().clear();
        self.classes.write().clear();
        tracing::debug!(target = "kiln.decl", "declaration table invalidated");
    }

    /// Drops cached artifact metadata for `binary` and its nested types so the
    /// next lookup re-reads the freshly compiled artifacts.
    pub fn evict_class(&self, binary: &str) {
        self.classes.write().retain(|name, _| {
            !(name == binary
                || name
                    .strip_prefix(binary)
                    .is_some_and(|rest| rest.starts_with('$')))
        });
    }

    /// Decoded artifact for a binary type name, cached (including misses).
    pub fn class_file(&self, binary: &str) -> Option<Arc<ClassFile>> {
        if let Some(entry) = self.classes.read().get(binary) {
            return entry.clone();
        }

        let internal = binary_to_internal(binary);
        let loaded = match self.finder.find_class(&internal) {
            Ok(Some(bytes)) => match ClassFile::parse(&bytes) {
                Ok(class) => Some(Arc::new(class)),
                Err(err) => {
                    tracing::debug!(
                        target = "kiln.decl",
                        class = binary,
                        error = %err,
                        "failed to decode artifact"
                    );
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::debug!(
                    target = "kiln.decl",
                    class = binary,
                    error = %err,
                    "failed to read artifact"
                );
                None
            }
        };

        self.classes
            .write()
            .entry(SmolStr::new(binary))
            .or_insert(loaded)
            .clone()
    }

    fn intern(&self, id: SmolStr, make: impl FnOnce(SmolStr) -> Declaration) -> Decl {
        if let Some(decl) = self.decls.read().get(&id) {
            return decl.clone();
        }
        // First writer wins; `make` must not re-enter the table.
        self.decls
            .write()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(make(id)))
            .clone()
    }

    /// Package declaration, built bottom-up one prefix at a time.
    pub fn package(&self, qualified: &str) -> Decl {
        let mut current = self.intern(SmolStr::default(), |id| {
            Declaration::new(id, DeclKind::Package, SmolStr::default(), None)
        });
        if qualified.is_empty() {
            return current;
        }

        let mut end = 0;
        for segment in qualified.split('.') {
            end += if end == 0 { segment.len() } else { segment.len() + 1 };
            let owner = current.clone();
            current = self.intern(SmolStr::new(&qualified[..end]), |id| {
                Declaration::new(id, DeclKind::Package, SmolStr::new(segment), Some(owner))
            });
        }
        current
    }

    /// Type declaration for a binary name; `None` if no artifact exists.
    pub fn class(&self, binary: &str) -> Option<Decl> {
        if let Some(decl) = self.get(binary).filter(|d| d.is_class()) {
            if self.class_file(binary).is_some() {
                return Some(decl);
            }
            return None;
        }

        let class = self.class_file(binary)?;
        let owner = match outer_binary_name(binary) {
            Some(outer) => self
                .class(outer)
                .unwrap_or_else(|| self.package(kiln_core::package_of(binary))),
            None => self.package(kiln_core::package_of(binary)),
        };
        let flags = class
            .inner_classes
            .iter()
            .find(|info| info.inner_class == class.this_class)
            .map(|info| info.access_flags)
            .unwrap_or(class.access_flags);

        Some(self.intern(SmolStr::new(binary), |id| {
            let mut decl = Declaration::new(
                id,
                DeclKind::Class,
                SmolStr::new(simple_name(binary)),
                Some(owner),
            );
            decl.modifiers = Modifiers::from_access_flags(flags);
            decl
        }))
    }

    /// Walks `start` and its supertypes breadth-first until `matches` finds a
    /// member; returns the declaring class's binary name and the member.
    fn find_member(
        &self,
        start: &Decl,
        include_supertypes: bool,
        select: impl Fn(&ClassFile) -> Option<ClassMember>,
    ) -> Option<(Decl, ClassMember)> {
        let mut queue = VecDeque::from([start.id.to_string()]);
        let mut seen = HashSet::new();
        while let Some(binary) = queue.pop_front() {
            if !seen.insert(binary.clone()) {
                continue;
            }
            let Some(class) = self.class_file(&binary) else {
                continue;
            };
            if let Some(member) = select(class.as_ref()) {
                let owner = self.class(&binary)?;
                return Some((owner, member));
            }
            if !include_supertypes {
                break;
            }
            queue.extend(class.super_class.iter().map(|s| internal_to_binary(s).to_string()));
            queue.extend(class.interfaces.iter().map(|i| internal_to_binary(i).to_string()));
        }
        None
    }

    /// Field named `name` visible from `owner`, searching supertypes.
    pub fn field(&self, owner: &Decl, name: &str) -> Option<Decl> {
        let Some((declaring, member)) = self.find_member(owner, true, |class| {
            class.fields.iter().find(|f| f.name == name).cloned()
        }) else {
            tracing::debug!(target = "kiln.decl", owner = %owner, field = name, "field not found");
            return None;
        };

        let id = SmolStr::new(format!("{}#{}", declaring.id, name));
        Some(self.intern(id, |id| {
            let mut decl =
                Declaration::new(id, DeclKind::Field, SmolStr::new(name), Some(declaring));
            decl.modifiers = Modifiers::from_access_flags(member.access_flags);
            decl
        }))
    }

    /// Method with the given erased parameter types, searching supertypes.
    pub fn method(&self, owner: &Decl, name: &str, params: &[FieldType]) -> Option<Decl> {
        self.executable(owner, name, params, DeclKind::Method)
    }

    /// Constructors are never inherited, so only `owner` itself is searched.
    pub fn constructor(&self, owner: &Decl, params: &[FieldType]) -> Option<Decl> {
        self.executable(owner, "<init>", params, DeclKind::Constructor)
    }

    fn executable(
        &self,
        owner: &Decl,
        name: &str,
        params: &[FieldType],
        kind: DeclKind,
    ) -> Option<Decl> {
        let found = self.find_member(owner, kind == DeclKind::Method, |class| {
            class
                .methods
                .iter()
                .find(|m| {
                    m.name == name
                        && parse_method_descriptor(&m.descriptor)
                            .map(|d| d.params == params)
                            .unwrap_or(false)
                })
                .cloned()
        });
        let Some((declaring, member)) = found else {
            tracing::debug!(
                target = "kiln.decl",
                owner = %owner,
                method = name,
                "method not found"
            );
            return None;
        };

        let rendered: Vec<SmolStr> = params.iter().map(|p| SmolStr::new(p.to_string())).collect();
        let id = SmolStr::new(format!("{}#{}({})", declaring.id, name, rendered.join(",")));
        Some(self.intern(id, |id| {
            let mut decl = Declaration::new(id, kind, SmolStr::new(name), Some(declaring));
            decl.modifiers = Modifiers::from_access_flags(member.access_flags);
            decl.params = rendered;
            decl
        }))
    }

    pub fn type_variable(&self, owner: &Decl, name: &str) -> Decl {
        let id = SmolStr::new(format!("{}!{}", owner.id, name));
        self.intern(id, |id| {
            Declaration::new(id, DeclKind::TypeVariable, SmolStr::new(name), Some(owner.clone()))
        })
    }

    pub fn local(&self, method: &Decl, name: &str, slot: u16) -> Decl {
        let id = SmolStr::new(format!("{}@{}:{}", method.id, name, slot));
        self.intern(id, |id| {
            Declaration::new(id, DeclKind::Local, SmolStr::new(name), Some(method.clone()))
        })
    }

    /// Array declaration with `component` as its element type; attached to
    /// the component so repeated derivation is a field read.
    pub fn array_of(&self, component: &Decl) -> Decl {
        if let Some(array) = component.array.get() {
            return array.clone();
        }
        let id = SmolStr::new(format!("{}[]", component.id));
        let array = self.intern(id, |id| {
            Declaration::new(
                id,
                DeclKind::Array,
                SmolStr::new(format!("{}[]", component.name)),
                Some(component.clone()),
            )
        });
        component.array.get_or_init(|| array).clone()
    }

    pub fn parameterized(&self, base: &Decl, args: Vec<TypeArg>) -> Decl {
        if args.is_empty() {
            return base.clone();
        }
        let rendered: Vec<String> = args.iter().map(TypeArg::id_fragment).collect();
        let id = SmolStr::new(format!("{}<{}>", base.id, rendered.join(",")));
        self.intern(id, |id| {
            let mut decl = Declaration::new(
                id,
                DeclKind::Parameterized,
                base.name.clone(),
                Some(base.clone()),
            );
            decl.type_args = args;
            decl
        })
    }

    /// Declaration for an erased descriptor type; `None` for primitives and
    /// primitive arrays.
    pub fn field_type(&self, ty: &FieldType) -> Option<Decl> {
        match ty {
            FieldType::Base(_) => None,
            FieldType::Object(internal) => self.class(&internal_to_binary(internal)),
            FieldType::Array(component) => {
                let component = self.field_type(component)?;
                Some(self.array_of(&component))
            }
        }
    }

    pub fn type_signature(&self, sig: &TypeSignature, scope: &TypeScope) -> Option<Decl> {
        match sig {
            TypeSignature::Base(_) => None,
            TypeSignature::Reference(sig) => self.signature_type(sig, scope),
        }
    }

    /// Declaration for a generic type signature.
    ///
    /// Unresolvable type arguments degrade to `?` rather than failing the
    /// whole type, so the resolvable parts still count as references.
    pub fn signature_type(&self, sig: &FieldTypeSignature, scope: &TypeScope) -> Option<Decl> {
        match sig {
            FieldTypeSignature::TypeVariable(name) => {
                let owner = scope.owner_of(name)?;
                Some(self.type_variable(owner, name))
            }
            FieldTypeSignature::Array(component) => {
                let component = self.type_signature(component, scope)?;
                Some(self.array_of(&component))
            }
            FieldTypeSignature::Class(class) => {
                let base = self.class(&internal_to_binary(&class.internal_name()))?;
                let args = class
                    .all_type_args()
                    .map(|arg| {
                        let resolve = |sig: &FieldTypeSignature| self.signature_type(sig, scope);
                        match arg {
                            TypeArgument::Any => TypeArg::Any,
                            TypeArgument::Exact(sig) => {
                                resolve(sig).map_or(TypeArg::Any, TypeArg::Exact)
                            }
                            TypeArgument::Extends(sig) => {
                                resolve(sig).map_or(TypeArg::Any, TypeArg::Extends)
                            }
                            TypeArgument::Super(sig) => {
                                resolve(sig).map_or(TypeArg::Any, TypeArg::Super)
                            }
                        }
                    })
                    .collect();
                Some(self.parameterized(&base, args))
            }
        }
    }
}
