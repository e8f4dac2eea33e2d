//! Parser for generic `Signature` attributes.

use crate::descriptor::BaseType;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParameter {
    pub name: String,
    pub class_bound: Option<FieldTypeSignature>,
    pub interface_bounds: Vec<FieldTypeSignature>,
}

impl TypeParameter {
    pub fn bounds(&self) -> impl Iterator<Item = &FieldTypeSignature> {
        self.class_bound.iter().chain(self.interface_bounds.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSignature {
    pub type_params: Vec<TypeParameter>,
    pub super_class: ClassTypeSignature,
    pub interfaces: Vec<ClassTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub type_params: Vec<TypeParameter>,
    pub params: Vec<TypeSignature>,
    /// `None` for `void`.
    pub return_type: Option<TypeSignature>,
    pub throws: Vec<FieldTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSignature {
    Base(BaseType),
    Reference(FieldTypeSignature),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTypeSignature {
    Class(ClassTypeSignature),
    Array(Box<TypeSignature>),
    TypeVariable(String),
}

/// `Lpkg/Outer<TT;>.Inner<*>;` is two segments: `pkg/Outer<T>` and `Inner<?>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTypeSignature {
    pub segments: Vec<SimpleClassTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleClassTypeSignature {
    /// First segment carries the package path (`java/util/Map`).
    pub name: String,
    pub type_args: Vec<TypeArgument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeArgument {
    Any,
    Exact(FieldTypeSignature),
    Extends(FieldTypeSignature),
    Super(FieldTypeSignature),
}

impl TypeArgument {
    pub fn signature(&self) -> Option<&FieldTypeSignature> {
        match self {
            TypeArgument::Any => None,
            TypeArgument::Exact(sig) | TypeArgument::Extends(sig) | TypeArgument::Super(sig) => {
                Some(sig)
            }
        }
    }
}

impl ClassTypeSignature {
    /// Erased internal name, nested segments joined with `$`.
    pub fn internal_name(&self) -> String {
        let mut out = String::new();
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                out.push('$');
            }
            out.push_str(&segment.name);
        }
        out
    }

    /// Type arguments of every segment, outermost first.
    pub fn all_type_args(&self) -> impl Iterator<Item = &TypeArgument> {
        self.segments.iter().flat_map(|s| s.type_args.iter())
    }

    pub fn is_parameterized(&self) -> bool {
        self.segments.iter().any(|s| !s.type_args.is_empty())
    }
}

pub fn parse_class_signature(sig: &str) -> Result<ClassSignature> {
    let mut p = SigParser::new(sig);
    let type_params = p.type_params()?;
    let super_class = p.class_type()?;
    let mut interfaces = Vec::new();
    while !p.at_end() {
        interfaces.push(p.class_type()?);
    }
    Ok(ClassSignature {
        type_params,
        super_class,
        interfaces,
    })
}

pub fn parse_field_signature(sig: &str) -> Result<FieldTypeSignature> {
    let mut p = SigParser::new(sig);
    let ty = p.field_type()?;
    p.finish()?;
    Ok(ty)
}

pub fn parse_method_signature(sig: &str) -> Result<MethodSignature> {
    let mut p = SigParser::new(sig);
    let type_params = p.type_params()?;
    p.expect(b'(')?;
    let mut params = Vec::new();
    while p.peek() != Some(b')') {
        params.push(p.type_sig()?);
    }
    p.expect(b')')?;
    let return_type = if p.eat(b'V') {
        None
    } else {
        Some(p.type_sig()?)
    };
    let mut throws = Vec::new();
    while p.eat(b'^') {
        throws.push(p.field_type()?);
    }
    p.finish()?;
    Ok(MethodSignature {
        type_params,
        params,
        return_type,
        throws,
    })
}

/// Deepest nesting of arrays and type arguments accepted in one signature.
pub const MAX_SIGNATURE_DEPTH: usize = 255;

struct SigParser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> SigParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn error(&self) -> Error {
        Error::InvalidSignature {
            signature: self.input.to_string(),
            offset: self.pos,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn finish(&self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    /// Reads up to (not including) the first byte in `stops`.
    fn identifier(&mut self, stops: &[u8]) -> Result<&'a str> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if stops.contains(&b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error());
        }
        Ok(&self.input[start..self.pos])
    }

    fn type_params(&mut self) -> Result<Vec<TypeParameter>> {
        let mut params = Vec::new();
        if !self.eat(b'<') {
            return Ok(params);
        }
        while !self.eat(b'>') {
            let name = self.identifier(b":>;")?.to_string();
            self.expect(b':')?;
            // The class bound may be empty when only interface bounds follow.
            let class_bound = match self.peek() {
                Some(b'L' | b'T' | b'[') => Some(self.field_type()?),
                _ => None,
            };
            let mut interface_bounds = Vec::new();
            while self.eat(b':') {
                interface_bounds.push(self.field_type()?);
            }
            params.push(TypeParameter {
                name,
                class_bound,
                interface_bounds,
            });
            if self.at_end() {
                return Err(self.error());
            }
        }
        Ok(params)
    }

    fn type_sig(&mut self) -> Result<TypeSignature> {
        if let Some(base) = self.peek().and_then(BaseType::from_char) {
            self.pos += 1;
            return Ok(TypeSignature::Base(base));
        }
        Ok(TypeSignature::Reference(self.field_type()?))
    }

    fn field_type(&mut self) -> Result<FieldTypeSignature> {
        if self.depth >= MAX_SIGNATURE_DEPTH {
            return Err(self.error());
        }
        self.depth += 1;
        let ty = self.field_type_at_depth();
        self.depth -= 1;
        ty
    }

    fn field_type_at_depth(&mut self) -> Result<FieldTypeSignature> {
        match self.peek() {
            Some(b'L') => Ok(FieldTypeSignature::Class(self.class_type()?)),
            Some(b'T') => {
                self.pos += 1;
                let name = self.identifier(b";")?.to_string();
                self.expect(b';')?;
                Ok(FieldTypeSignature::TypeVariable(name))
            }
            Some(b'[') => {
                self.pos += 1;
                Ok(FieldTypeSignature::Array(Box::new(self.type_sig()?)))
            }
            _ => Err(self.error()),
        }
    }

    fn class_type(&mut self) -> Result<ClassTypeSignature> {
        self.expect(b'L')?;
        let mut segments = vec![self.simple_class_type()?];
        while self.eat(b'.') {
            segments.push(self.simple_class_type()?);
        }
        self.expect(b';')?;
        Ok(ClassTypeSignature { segments })
    }

    fn simple_class_type(&mut self) -> Result<SimpleClassTypeSignature> {
        let name = self.identifier(b"<;.")?.to_string();
        let mut type_args = Vec::new();
        if self.eat(b'<') {
            while !self.eat(b'>') {
                if self.at_end() {
                    return Err(self.error());
                }
                type_args.push(self.type_arg()?);
            }
        }
        Ok(SimpleClassTypeSignature { name, type_args })
    }

    fn type_arg(&mut self) -> Result<TypeArgument> {
        if self.eat(b'*') {
            return Ok(TypeArgument::Any);
        }
        if self.eat(b'+') {
            return Ok(TypeArgument::Extends(self.field_type()?));
        }
        if self.eat(b'-') {
            return Ok(TypeArgument::Super(self.field_type()?));
        }
        Ok(TypeArgument::Exact(self.field_type()?))
    }
}
