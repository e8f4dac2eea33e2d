use crate::constant_pool::ConstantPool;
use crate::error::{Error, Result};
use crate::flags;
use crate::reader::Reader;
use crate::MAGIC;

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    /// Internal name, e.g. `com/example/Outer$Inner`.
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<ClassMember>,
    pub methods: Vec<ClassMember>,
    pub signature: Option<String>,
    pub inner_classes: Vec<InnerClassInfo>,
    pub constant_pool: ConstantPool,
}

#[derive(Debug, Clone)]
pub struct ClassMember {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    /// Internal names from the `Exceptions` attribute (methods only).
    pub exceptions: Vec<String>,
}

impl ClassMember {
    pub fn is_static(&self) -> bool {
        self.access_flags & flags::ACC_STATIC != 0
    }

    pub fn is_synthetic(&self) -> bool {
        self.access_flags & flags::ACC_SYNTHETIC != 0
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == "<clinit>"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassInfo {
    pub inner_class: String,
    pub outer_class: Option<String>,
    pub inner_name: Option<String>,
    pub access_flags: u16,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = cp.get_class_name(reader.read_u2()?)?;
        let super_class = match reader.read_u2()? {
            0 => None,
            idx => Some(cp.get_class_name(idx)?),
        };

        let interfaces_count = reader.read_u2()? as usize;
        let interfaces = (0..interfaces_count)
            .map(|_| cp.get_class_name(reader.read_u2()?))
            .collect::<Result<Vec<_>>>()?;

        let fields_count = reader.read_u2()? as usize;
        let fields = (0..fields_count)
            .map(|_| parse_member(&mut reader, &cp))
            .collect::<Result<Vec<_>>>()?;

        let methods_count = reader.read_u2()? as usize;
        let methods = (0..methods_count)
            .map(|_| parse_member(&mut reader, &cp))
            .collect::<Result<Vec<_>>>()?;

        let class_attrs = parse_attributes(&mut reader, &cp, AttributeTarget::Class)?;
        reader.ensure_empty()?;

        Ok(Self {
            minor_version,
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            signature: class_attrs.signature,
            inner_classes: class_attrs.inner_classes,
            constant_pool: cp,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & flags::ACC_INTERFACE != 0
    }

    /// Internal names of the nested types this artifact declares directly.
    pub fn declared_nested_types(&self) -> impl Iterator<Item = &str> {
        self.inner_classes
            .iter()
            .filter(|info| info.outer_class.as_deref() == Some(self.this_class.as_str()))
            .map(|info| info.inner_class.as_str())
    }

    /// Internal name of the outermost type enclosing this artifact's class.
    pub fn root_class(&self) -> &str {
        let name = self.this_class.as_str();
        let pkg_end = name.rfind('/').map(|idx| idx + 1).unwrap_or(0);
        match name[pkg_end..].find('$') {
            Some(0) | None => name,
            Some(idx) => &name[..pkg_end + idx],
        }
    }

    /// Whether `internal` names this artifact's top-level type or any type
    /// nested inside it.
    pub fn is_self_or_nested(&self, internal: &str) -> bool {
        let root = self.root_class();
        internal == root
            || internal
                .strip_prefix(root)
                .is_some_and(|rest| rest.starts_with('$'))
    }
}

fn parse_member(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<ClassMember> {
    let access_flags = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();

    let attrs = parse_attributes(reader, cp, AttributeTarget::Member)?;
    Ok(ClassMember {
        access_flags,
        name,
        descriptor,
        signature: attrs.signature,
        exceptions: attrs.exceptions,
    })
}

#[derive(Default)]
struct ParsedAttributes {
    signature: Option<String>,
    inner_classes: Vec<InnerClassInfo>,
    exceptions: Vec<String>,
}

#[derive(Clone, Copy)]
enum AttributeTarget {
    Class,
    Member,
}

fn parse_attributes(
    reader: &mut Reader<'_>,
    cp: &ConstantPool,
    target: AttributeTarget,
) -> Result<ParsedAttributes> {
    let attributes_count = reader.read_u2()? as usize;
    let mut parsed = ParsedAttributes::default();
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        let name = cp.get_utf8(name_index)?;

        let mut sub = Reader::new(info);
        match (name, target) {
            ("Signature", _) => {
                let sig_index = sub.read_u2().map_err(|_| Error::MalformedAttribute("Signature"))?;
                parsed.signature = Some(cp.get_utf8(sig_index)?.to_string());
                sub.ensure_empty()
                    .map_err(|_| Error::MalformedAttribute("Signature"))?;
            }
            ("Exceptions", AttributeTarget::Member) => {
                let num = sub.read_u2()? as usize;
                for _ in 0..num {
                    parsed.exceptions.push(cp.get_class_name(sub.read_u2()?)?);
                }
                sub.ensure_empty()
                    .map_err(|_| Error::MalformedAttribute("Exceptions"))?;
            }
            ("InnerClasses", AttributeTarget::Class) => {
                let num = sub.read_u2()? as usize;
                for _ in 0..num {
                    let inner_class = cp.get_class_name(sub.read_u2()?)?;
                    let outer_class = match sub.read_u2()? {
                        0 => None,
                        idx => Some(cp.get_class_name(idx)?),
                    };
                    let inner_name = match sub.read_u2()? {
                        0 => None,
                        idx => Some(cp.get_utf8(idx)?.to_string()),
                    };
                    let access_flags = sub.read_u2()?;
                    parsed.inner_classes.push(InnerClassInfo {
                        inner_class,
                        outer_class,
                        inner_name,
                        access_flags,
                    });
                }
                sub.ensure_empty()
                    .map_err(|_| Error::MalformedAttribute("InnerClasses"))?;
            }
            // Code, annotations, debug tables: not needed for reference tracking.
            _ => {}
        }
    }

    Ok(parsed)
}
