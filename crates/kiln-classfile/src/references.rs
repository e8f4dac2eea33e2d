use crate::classfile::ClassFile;
use crate::constant_pool::CpInfo;
use crate::descriptor::{parse_field_descriptor, parse_method_descriptor, FieldType, ReturnType};
use crate::error::Result;

/// A symbol the artifact's code uses, classified from its constant pool.
///
/// Owners and type names are internal names. Array-typed `Class` entries are
/// reduced to their element type; purely primitive arrays are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolReference {
    Type(String),
    Field {
        owner: String,
        name: String,
        descriptor: String,
    },
    Method {
        owner: String,
        name: String,
        descriptor: String,
    },
    Constructor {
        owner: String,
        descriptor: String,
    },
}

impl PoolReference {
    /// Internal name of the type this reference is anchored on.
    pub fn owner(&self) -> &str {
        match self {
            PoolReference::Type(name) => name,
            PoolReference::Field { owner, .. }
            | PoolReference::Method { owner, .. }
            | PoolReference::Constructor { owner, .. } => owner,
        }
    }
}

impl ClassFile {
    /// Classifies every type/field/method/constructor entry of the constant pool.
    ///
    /// Type and method-type entries that fail to decode are skipped
    /// individually; `Err` is only returned for structurally broken pools
    /// (dangling member entries).
    pub fn pool_references(&self) -> Result<Vec<PoolReference>> {
        let cp = &self.constant_pool;
        let mut out = Vec::new();
        for (index, entry) in cp.iter() {
            match entry {
                CpInfo::Class { .. } => {
                    let Ok(name) = cp.get_class_name(index) else {
                        continue;
                    };
                    if let Some(name) = class_entry_type(&name) {
                        out.push(PoolReference::Type(name));
                    }
                }
                CpInfo::Fieldref {
                    class_index,
                    name_and_type_index,
                } => {
                    let Some(owner) = class_entry_type(&cp.get_class_name(*class_index)?) else {
                        continue;
                    };
                    let (name, descriptor) = cp.get_name_and_type(*name_and_type_index)?;
                    out.push(PoolReference::Field {
                        owner,
                        name: name.to_string(),
                        descriptor: descriptor.to_string(),
                    });
                }
                CpInfo::Methodref {
                    class_index,
                    name_and_type_index,
                }
                | CpInfo::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                } => {
                    // Array owners (`[I.clone()`) have no declaring type to resolve.
                    let Some(owner) = class_entry_type(&cp.get_class_name(*class_index)?) else {
                        continue;
                    };
                    let (name, descriptor) = cp.get_name_and_type(*name_and_type_index)?;
                    out.push(if name == "<init>" {
                        PoolReference::Constructor {
                            owner,
                            descriptor: descriptor.to_string(),
                        }
                    } else {
                        PoolReference::Method {
                            owner,
                            name: name.to_string(),
                            descriptor: descriptor.to_string(),
                        }
                    });
                }
                CpInfo::MethodType { descriptor_index } => {
                    let Some(desc) = cp
                        .get_utf8(*descriptor_index)
                        .ok()
                        .and_then(|desc| parse_method_descriptor(desc).ok())
                    else {
                        continue;
                    };
                    let ret = match &desc.return_type {
                        ReturnType::Type(ty) => Some(ty),
                        ReturnType::Void => None,
                    };
                    for ty in desc.params.iter().chain(ret) {
                        if let Some(name) = ty.object_name() {
                            out.push(PoolReference::Type(name.to_string()));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }
}

/// A `Class` entry names either a type or an array descriptor.
fn class_entry_type(name: &str) -> Option<String> {
    if !name.starts_with('[') {
        return Some(name.to_string());
    }
    match parse_field_descriptor(name).ok()? {
        FieldType::Array(component) => component.object_name().map(str::to_string),
        _ => None,
    }
}
