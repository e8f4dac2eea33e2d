use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    pub fn from_char(c: u8) -> Option<Self> {
        Some(match c {
            b'B' => BaseType::Byte,
            b'C' => BaseType::Char,
            b'D' => BaseType::Double,
            b'F' => BaseType::Float,
            b'I' => BaseType::Int,
            b'J' => BaseType::Long,
            b'S' => BaseType::Short,
            b'Z' => BaseType::Boolean,
            _ => return None,
        })
    }

    /// Source-level keyword (`int`, `boolean`, ...).
    pub fn keyword(self) -> &'static str {
        match self {
            BaseType::Byte => "byte",
            BaseType::Char => "char",
            BaseType::Double => "double",
            BaseType::Float => "float",
            BaseType::Int => "int",
            BaseType::Long => "long",
            BaseType::Short => "short",
            BaseType::Boolean => "boolean",
        }
    }
}

/// An erased field type as written in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Base(BaseType),
    /// Internal name, e.g. `java/lang/String`.
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Innermost non-array component.
    pub fn element(&self) -> &FieldType {
        match self {
            FieldType::Array(component) => component.element(),
            other => other,
        }
    }

    pub fn dimensions(&self) -> usize {
        match self {
            FieldType::Array(component) => 1 + component.dimensions(),
            _ => 0,
        }
    }

    /// Internal name of the object type this type mentions, if any.
    pub fn object_name(&self) -> Option<&str> {
        match self.element() {
            FieldType::Object(name) => Some(name),
            _ => None,
        }
    }
}

/// Renders the erased type with binary names, e.g. `java.lang.String[]`.
impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base) => f.write_str(base.keyword()),
            FieldType::Object(name) => {
                for (idx, part) in name.split('/').enumerate() {
                    if idx > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(part)?;
                }
                Ok(())
            }
            FieldType::Array(component) => write!(f, "{component}[]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Void,
    Type(FieldType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub return_type: ReturnType,
}

/// Array dimension limit of the class-file format.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

pub fn parse_field_descriptor(desc: &str) -> Result<FieldType> {
    let mut cursor = Cursor::new(desc);
    let ty = cursor.field_type()?;
    cursor.finish()?;
    Ok(ty)
}

pub fn parse_method_descriptor(desc: &str) -> Result<MethodDescriptor> {
    let mut cursor = Cursor::new(desc);
    cursor.expect(b'(')?;
    let mut params = Vec::new();
    while cursor.peek() != Some(b')') {
        params.push(cursor.field_type()?);
    }
    cursor.expect(b')')?;

    let return_type = if cursor.peek() == Some(b'V') {
        cursor.pos += 1;
        ReturnType::Void
    } else {
        ReturnType::Type(cursor.field_type()?)
    };
    cursor.finish()?;

    Ok(MethodDescriptor {
        params,
        return_type,
    })
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn invalid(&self) -> Error {
        Error::InvalidDescriptor(self.input.to_string())
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() != Some(byte) {
            return Err(self.invalid());
        }
        self.pos += 1;
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.input.len() {
            return Err(self.invalid());
        }
        Ok(())
    }

    fn field_type(&mut self) -> Result<FieldType> {
        let mut dimensions = 0;
        while self.peek() == Some(b'[') {
            dimensions += 1;
            if dimensions > MAX_ARRAY_DIMENSIONS {
                return Err(self.invalid());
            }
            self.pos += 1;
        }
        let mut ty = self.element_type()?;
        for _ in 0..dimensions {
            ty = FieldType::Array(Box::new(ty));
        }
        Ok(ty)
    }

    fn element_type(&mut self) -> Result<FieldType> {
        let Some(c) = self.peek() else {
            return Err(self.invalid());
        };
        self.pos += 1;
        if let Some(base) = BaseType::from_char(c) {
            return Ok(FieldType::Base(base));
        }
        match c {
            b'L' => {
                let rest = &self.input[self.pos..];
                let end = rest.find(';').ok_or_else(|| self.invalid())?;
                if end == 0 {
                    return Err(self.invalid());
                }
                let name = rest[..end].to_string();
                self.pos += end + 1;
                Ok(FieldType::Object(name))
            }
            _ => Err(self.invalid()),
        }
    }
}
