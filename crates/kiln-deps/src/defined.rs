use std::collections::{BTreeSet, HashSet};

use kiln_classfile::{flags, parse_method_descriptor, ClassFile, ClassMember};
use kiln_core::internal_to_binary;
use kiln_decl::{Decl, DeclTable};

/// What a file's artifacts declare.
#[derive(Debug, Default, Clone)]
pub struct DefinedDeclarations {
    pub decls: HashSet<Decl>,
    /// Canonical rendering of everything dependents can observe: type
    /// headers and non-private member signatures. Two equal shapes mean
    /// dependents need no recompilation.
    pub shape: BTreeSet<String>,
}

pub fn defined_declarations(classes: &[ClassFile], table: &DeclTable) -> DefinedDeclarations {
    let mut defined = DefinedDeclarations::default();
    for class in classes {
        let binary = internal_to_binary(&class.this_class);
        defined.shape.insert(format!(
            "{binary}|{:#06x}|{}|{}|{}",
            class.access_flags & !flags::ACC_SUPER,
            class.super_class.as_deref().unwrap_or(""),
            class.interfaces.join(","),
            class.signature.as_deref().unwrap_or(""),
        ));

        let owner = table.class(&binary);
        if owner.is_none() {
            tracing::debug!(
                target = "kiln.deps",
                class = %binary,
                "defined type is not visible on the classpath"
            );
        }

        for field in class.fields.iter().filter(|f| is_visible(f)) {
            defined.shape.insert(member_shape(&binary, field));
        }
        for method in class
            .methods
            .iter()
            .filter(|m| is_visible(m) && !m.is_static_initializer())
        {
            defined.shape.insert(member_shape(&binary, method));
        }

        let Some(owner) = owner else {
            continue;
        };
        defined.decls.insert(owner.clone());
        defined.decls.extend(
            class
                .fields
                .iter()
                .filter_map(|field| table.field(&owner, &field.name)),
        );
        for method in &class.methods {
            if method.is_static_initializer() {
                continue;
            }
            let Ok(desc) = parse_method_descriptor(&method.descriptor) else {
                continue;
            };
            let decl = if method.is_constructor() {
                table.constructor(&owner, &desc.params)
            } else {
                table.method(&owner, &method.name, &desc.params)
            };
            defined.decls.extend(decl);
        }
    }
    defined
}

fn is_visible(member: &ClassMember) -> bool {
    member.access_flags & (flags::ACC_PRIVATE | flags::ACC_SYNTHETIC) == 0
}

fn member_shape(owner: &str, member: &ClassMember) -> String {
    format!(
        "{owner}#{}{}|{:#06x}|{}|{}",
        member.name,
        member.descriptor,
        member.access_flags,
        member.signature.as_deref().unwrap_or(""),
        member.exceptions.join(","),
    )
}
