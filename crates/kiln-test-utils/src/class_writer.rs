use std::collections::HashMap;

const ACC_PUBLIC: u16 = 0x0001;
const ACC_SUPER: u16 = 0x0020;

/// A field or method to emit.
#[derive(Debug, Clone)]
pub struct MemberSpec {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
}

impl MemberSpec {
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            access_flags: ACC_PUBLIC,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: None,
            exceptions: Vec::new(),
        }
    }

    pub fn flags(mut self, access_flags: u16) -> Self {
        self.access_flags = access_flags;
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    pub fn throws(mut self, internal_name: &str) -> Self {
        self.exceptions.push(internal_name.to_string());
        self
    }
}

#[derive(Debug, Clone)]
enum PoolRef {
    Class(String),
    Field(String, String, String),
    Method(String, String, String),
    InterfaceMethod(String, String, String),
    MethodType(String),
}

#[derive(Debug, Clone)]
struct InnerClass {
    inner: String,
    outer: Option<String>,
    name: Option<String>,
    flags: u16,
}

/// Builds minimal but well-formed class artifacts for tests.
///
/// ```
/// use kiln_test_utils::{ClassWriter, MemberSpec};
///
/// let bytes = ClassWriter::new("p/A")
///     .field(MemberSpec::new("b", "Lp/B;"))
///     .method_ref("p/C", "run", "()V")
///     .build();
/// assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
/// ```
#[derive(Debug, Clone)]
pub struct ClassWriter {
    this_class: String,
    super_class: Option<String>,
    access_flags: u16,
    interfaces: Vec<String>,
    signature: Option<String>,
    fields: Vec<MemberSpec>,
    methods: Vec<MemberSpec>,
    refs: Vec<PoolRef>,
    inner_classes: Vec<InnerClass>,
}

impl ClassWriter {
    pub fn new(internal_name: &str) -> Self {
        Self {
            this_class: internal_name.to_string(),
            super_class: Some("java/lang/Object".to_string()),
            access_flags: ACC_PUBLIC | ACC_SUPER,
            interfaces: Vec::new(),
            signature: None,
            fields: Vec::new(),
            methods: Vec::new(),
            refs: Vec::new(),
            inner_classes: Vec::new(),
        }
    }

    pub fn access(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    pub fn super_class(mut self, internal_name: &str) -> Self {
        self.super_class = Some(internal_name.to_string());
        self
    }

    pub fn no_super_class(mut self) -> Self {
        self.super_class = None;
        self
    }

    pub fn interface(mut self, internal_name: &str) -> Self {
        self.interfaces.push(internal_name.to_string());
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    pub fn field(mut self, spec: MemberSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn method(mut self, spec: MemberSpec) -> Self {
        self.methods.push(spec);
        self
    }

    pub fn class_ref(mut self, internal_name: &str) -> Self {
        self.refs.push(PoolRef::Class(internal_name.to_string()));
        self
    }

    pub fn field_ref(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.refs
            .push(PoolRef::Field(owner.into(), name.into(), descriptor.into()));
        self
    }

    pub fn method_ref(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.refs
            .push(PoolRef::Method(owner.into(), name.into(), descriptor.into()));
        self
    }

    pub fn interface_method_ref(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.refs.push(PoolRef::InterfaceMethod(
            owner.into(),
            name.into(),
            descriptor.into(),
        ));
        self
    }

    pub fn method_type(mut self, descriptor: &str) -> Self {
        self.refs.push(PoolRef::MethodType(descriptor.into()));
        self
    }

    pub fn inner_class(
        mut self,
        inner: &str,
        outer: Option<&str>,
        name: Option<&str>,
        flags: u16,
    ) -> Self {
        self.inner_classes.push(InnerClass {
            inner: inner.to_string(),
            outer: outer.map(str::to_string),
            name: name.map(str::to_string),
            flags,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = Pool::default();

        let this_idx = pool.class(&self.this_class);
        let super_idx = self.super_class.as_deref().map(|s| pool.class(s)).unwrap_or(0);
        let iface_idx: Vec<u16> = self.interfaces.iter().map(|i| pool.class(i)).collect();

        for r in &self.refs {
            match r {
                PoolRef::Class(name) => {
                    pool.class(name);
                }
                PoolRef::Field(o, n, d) => {
                    pool.member(9, o, n, d);
                }
                PoolRef::Method(o, n, d) => {
                    pool.member(10, o, n, d);
                }
                PoolRef::InterfaceMethod(o, n, d) => {
                    pool.member(11, o, n, d);
                }
                PoolRef::MethodType(d) => {
                    let di = pool.utf8(d);
                    pool.push(16, &di.to_be_bytes());
                }
            }
        }

        let mut body = Vec::new();
        put_u2(&mut body, self.access_flags);
        put_u2(&mut body, this_idx);
        put_u2(&mut body, super_idx);
        put_u2(&mut body, iface_idx.len() as u16);
        for idx in iface_idx {
            put_u2(&mut body, idx);
        }
        for members in [&self.fields, &self.methods] {
            put_u2(&mut body, members.len() as u16);
            for m in members {
                put_u2(&mut body, m.access_flags);
                put_u2(&mut body, pool.utf8(&m.name));
                put_u2(&mut body, pool.utf8(&m.descriptor));
                let mut attrs: Vec<(u16, Vec<u8>)> = Vec::new();
                if let Some(sig) = &m.signature {
                    attrs.push((pool.utf8("Signature"), pool.utf8(sig).to_be_bytes().to_vec()));
                }
                if !m.exceptions.is_empty() {
                    let mut info = Vec::new();
                    put_u2(&mut info, m.exceptions.len() as u16);
                    for e in &m.exceptions {
                        put_u2(&mut info, pool.class(e));
                    }
                    attrs.push((pool.utf8("Exceptions"), info));
                }
                put_attributes(&mut body, attrs);
            }
        }

        let mut attrs: Vec<(u16, Vec<u8>)> = Vec::new();
        if let Some(sig) = &self.signature {
            attrs.push((pool.utf8("Signature"), pool.utf8(sig).to_be_bytes().to_vec()));
        }
        if !self.inner_classes.is_empty() {
            let mut info = Vec::new();
            put_u2(&mut info, self.inner_classes.len() as u16);
            for ic in &self.inner_classes {
                put_u2(&mut info, pool.class(&ic.inner));
                put_u2(&mut info, ic.outer.as_deref().map(|o| pool.class(o)).unwrap_or(0));
                put_u2(&mut info, ic.name.as_deref().map(|n| pool.utf8(n)).unwrap_or(0));
                put_u2(&mut info, ic.flags);
            }
            attrs.push((pool.utf8("InnerClasses"), info));
        }
        put_attributes(&mut body, attrs);

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        put_u2(&mut out, 0);
        put_u2(&mut out, 52);
        put_u2(&mut out, pool.next);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_attributes(out: &mut Vec<u8>, attrs: Vec<(u16, Vec<u8>)>) {
    put_u2(out, attrs.len() as u16);
    for (name, info) in attrs {
        put_u2(out, name);
        out.extend_from_slice(&(info.len() as u32).to_be_bytes());
        out.extend_from_slice(&info);
    }
}

struct Pool {
    bytes: Vec<u8>,
    next: u16,
    dedup: HashMap<(u8, Vec<u8>), u16>,
}

impl Default for Pool {
    fn default() -> Self {
        Self {
            bytes: Vec::new(),
            next: 1,
            dedup: HashMap::new(),
        }
    }
}

impl Pool {
    fn push(&mut self, tag: u8, payload: &[u8]) -> u16 {
        if let Some(idx) = self.dedup.get(&(tag, payload.to_vec())) {
            return *idx;
        }
        let idx = self.next;
        self.bytes.push(tag);
        self.bytes.extend_from_slice(payload);
        self.next += 1;
        self.dedup.insert((tag, payload.to_vec()), idx);
        idx
    }

    fn utf8(&mut self, text: &str) -> u16 {
        let mut payload = Vec::new();
        put_u2(&mut payload, text.len() as u16);
        payload.extend_from_slice(text.as_bytes());
        self.push(1, &payload)
    }

    fn class(&mut self, internal_name: &str) -> u16 {
        let name = self.utf8(internal_name);
        self.push(7, &name.to_be_bytes())
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let n = self.utf8(name);
        let d = self.utf8(descriptor);
        let mut nat = Vec::new();
        put_u2(&mut nat, n);
        put_u2(&mut nat, d);
        let nat = self.push(12, &nat);
        let mut payload = Vec::new();
        put_u2(&mut payload, class);
        put_u2(&mut payload, nat);
        self.push(tag, &payload)
    }
}
