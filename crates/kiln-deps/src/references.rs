use std::collections::HashSet;

use kiln_classfile::{
    parse_class_signature, parse_field_descriptor, parse_field_signature, parse_method_descriptor,
    parse_method_signature, ClassFile, ClassMember, FieldTypeSignature, PoolReference, ReturnType,
    TypeParameter,
};
use kiln_core::internal_to_binary;
use kiln_decl::{Decl, DeclTable, TypeScope};

/// Declarations referenced by an encoded artifact.
///
/// Undecodable artifacts contribute no references.
pub fn artifact_references(bytes: &[u8], table: &DeclTable) -> HashSet<Decl> {
    match ClassFile::parse(bytes) {
        Ok(class) => extract_references(&class, table),
        Err(err) => {
            tracing::debug!(target = "kiln.deps", error = %err, "skipping undecodable artifact");
            HashSet::new()
        }
    }
}

/// Every declaration `class` depends on.
///
/// Two sources are merged: the constant pool (symbols the code actually
/// uses) and the structural metadata (supertypes, type parameter bounds,
/// member types, declared exceptions), which must be tracked even when no
/// member of the type is used. References to the class itself or any of its
/// nested types are dropped. Unresolvable symbols are skipped.
pub fn extract_references(class: &ClassFile, table: &DeclTable) -> HashSet<Decl> {
    let mut refs = References {
        class,
        table,
        out: HashSet::new(),
    };
    refs.pool_pass();
    refs.structural_pass();
    refs.out
}

struct References<'a> {
    class: &'a ClassFile,
    table: &'a DeclTable,
    out: HashSet<Decl>,
}

impl References<'_> {
    fn is_self(&self, decl: &Decl) -> bool {
        decl.is_class() && self.class.is_self_or_nested(&kiln_core::binary_to_internal(decl.id()))
    }

    fn add(&mut self, decl: Option<Decl>) {
        let Some(decl) = decl else {
            return;
        };
        for component in decl.component_classes() {
            if !self.is_self(&component) {
                self.out.insert(component);
            }
        }
        if !self.is_self(&decl) {
            self.out.insert(decl);
        }
    }

    fn class_decl(&self, internal: &str) -> Option<Decl> {
        let decl = self.table.class(&internal_to_binary(internal));
        if decl.is_none() {
            tracing::debug!(
                target = "kiln.deps",
                class = %internal_to_binary(&self.class.this_class),
                reference = internal,
                "unresolved type reference"
            );
        }
        decl
    }

    fn pool_pass(&mut self) {
        let references = match self.class.pool_references() {
            Ok(references) => references,
            Err(err) => {
                tracing::debug!(
                    target = "kiln.deps",
                    class = %internal_to_binary(&self.class.this_class),
                    error = %err,
                    "constant pool references unavailable"
                );
                return;
            }
        };

        for reference in references {
            if self.class.is_self_or_nested(reference.owner()) {
                continue;
            }
            let decl = match &reference {
                PoolReference::Type(internal) => self.class_decl(internal),
                PoolReference::Field { owner, name, .. } => self
                    .class_decl(owner)
                    .and_then(|owner| self.table.field(&owner, name)),
                PoolReference::Method {
                    owner,
                    name,
                    descriptor,
                } => parse_method_descriptor(descriptor).ok().and_then(|desc| {
                    let owner = self.class_decl(owner)?;
                    self.table.method(&owner, name, &desc.params)
                }),
                PoolReference::Constructor { owner, descriptor } => {
                    parse_method_descriptor(descriptor).ok().and_then(|desc| {
                        let owner = self.class_decl(owner)?;
                        self.table.constructor(&owner, &desc.params)
                    })
                }
            };
            self.add(decl);
        }
    }

    fn structural_pass(&mut self) {
        let class = self.class;
        let this = self.table.class(&internal_to_binary(&class.this_class));
        let mut scope = this
            .clone()
            .map(|this| TypeScope::new(this, Vec::new()))
            .unwrap_or_default();

        match class.signature.as_deref().map(parse_class_signature) {
            Some(Ok(sig)) => {
                if let Some(this) = this.clone() {
                    scope = TypeScope::new(this, sig.type_params.iter().map(|p| p.name.clone()));
                }
                self.type_params(&sig.type_params, &scope);
                let supertypes = std::iter::once(&sig.super_class).chain(&sig.interfaces);
                for sup in supertypes {
                    let sup = FieldTypeSignature::Class(sup.clone());
                    let decl = self.table.signature_type(&sup, &scope);
                    self.add(decl);
                }
            }
            other => {
                if let Some(Err(err)) = other {
                    tracing::debug!(
                        target = "kiln.deps",
                        class = %internal_to_binary(&class.this_class),
                        error = %err,
                        "malformed class signature; using erased supertypes"
                    );
                }
                let supertypes = class.super_class.iter().chain(&class.interfaces);
                for sup in supertypes {
                    let decl = self.class_decl(sup);
                    self.add(decl);
                }
            }
        }

        for field in &class.fields {
            if let Err(err) = self.field(field, &scope) {
                self.member_failed(field, &err);
            }
        }
        for method in &class.methods {
            if let Err(err) = self.method(method, this.as_ref(), &mut scope) {
                self.member_failed(method, &err);
            }
        }
    }

    fn member_failed(&self, member: &ClassMember, err: &kiln_classfile::Error) {
        tracing::debug!(
            target = "kiln.deps",
            class = %internal_to_binary(&self.class.this_class),
            member = %member.name,
            error = %err,
            "skipping member metadata"
        );
    }

    fn type_params(&mut self, params: &[TypeParameter], scope: &TypeScope) {
        for bound in params.iter().flat_map(TypeParameter::bounds) {
            let decl = self.table.signature_type(bound, scope);
            self.add(decl);
        }
    }

    fn field(&mut self, field: &ClassMember, scope: &TypeScope) -> kiln_classfile::Result<()> {
        let decl = match &field.signature {
            Some(sig) => self.table.signature_type(&parse_field_signature(sig)?, scope),
            None => self.table.field_type(&parse_field_descriptor(&field.descriptor)?),
        };
        self.add(decl);
        Ok(())
    }

    fn method(
        &mut self,
        method: &ClassMember,
        this: Option<&Decl>,
        scope: &mut TypeScope,
    ) -> kiln_classfile::Result<()> {
        if method.is_static_initializer() {
            return Ok(());
        }
        let desc = parse_method_descriptor(&method.descriptor)?;

        for thrown in &method.exceptions {
            let decl = self.class_decl(thrown);
            self.add(decl);
        }

        let Some(sig) = &method.signature else {
            for param in &desc.params {
                let decl = self.table.field_type(param);
                self.add(decl);
            }
            if let ReturnType::Type(ret) = &desc.return_type {
                let decl = self.table.field_type(ret);
                self.add(decl);
            }
            return Ok(());
        };

        let sig = parse_method_signature(sig)?;
        let owner = this.and_then(|this| {
            if method.is_constructor() {
                self.table.constructor(this, &desc.params)
            } else {
                self.table.method(this, &method.name, &desc.params)
            }
        });
        let pushed = match owner {
            Some(owner) => {
                scope.push(owner, sig.type_params.iter().map(|p| p.name.clone()));
                true
            }
            None => false,
        };

        self.type_params(&sig.type_params, scope);
        let types = sig.params.iter().chain(&sig.return_type);
        for ty in types {
            let decl = self.table.type_signature(ty, scope);
            self.add(decl);
        }
        for thrown in &sig.throws {
            let decl = self.table.signature_type(thrown, scope);
            self.add(decl);
        }

        if pushed {
            scope.pop();
        }
        Ok(())
    }
}
