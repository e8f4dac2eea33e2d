#![forbid(unsafe_code)]
//! Decoder for compiled class artifacts.
//!
//! Only the parts needed to reconstruct cross-references are decoded: the
//! constant pool, the class/member headers, and the `Signature`,
//! `InnerClasses` and `Exceptions` attributes. Everything else is skipped.

mod classfile;
mod constant_pool;
mod descriptor;
mod error;
pub mod flags;
mod reader;
mod references;
mod signature;

pub use crate::classfile::{ClassFile, ClassMember, InnerClassInfo};
pub use crate::constant_pool::{ConstantPool, CpInfo};
pub use crate::descriptor::{parse_field_descriptor, parse_method_descriptor, MAX_ARRAY_DIMENSIONS};
pub use crate::descriptor::{BaseType, FieldType, MethodDescriptor, ReturnType};
pub use crate::error::{Error, Result};
pub use crate::references::PoolReference;
pub use crate::signature::{
    parse_class_signature, parse_field_signature, parse_method_signature, ClassSignature,
    ClassTypeSignature, FieldTypeSignature, MethodSignature, SimpleClassTypeSignature,
    TypeArgument, TypeParameter, TypeSignature, MAX_SIGNATURE_DEPTH,
};

/// Magic number every artifact starts with.
pub const MAGIC: u32 = 0xCAFE_BABE;
