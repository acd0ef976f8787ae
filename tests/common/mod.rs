#![allow(dead_code)]

use nrbf::Value;

/// Builds NRBF byte streams record by record for the tests.
pub struct Stream {
    buf: Vec<u8>,
}

/// BinaryTypeEnum entry of a MemberTypeInfo, with its additional info.
#[derive(Clone, Copy)]
pub enum Bt {
    Prim(u8),
    Str,
    Obj,
    SysClass(&'static str),
    Class(&'static str, i32),
    ObjArray,
    StrArray,
    PrimArray(u8),
}

impl Bt {
    fn tag(self) -> u8 {
        match self {
            Bt::Prim(_) => 0,
            Bt::Str => 1,
            Bt::Obj => 2,
            Bt::SysClass(_) => 3,
            Bt::Class(_, _) => 4,
            Bt::ObjArray => 5,
            Bt::StrArray => 6,
            Bt::PrimArray(_) => 7,
        }
    }

    fn detail(self, stream: &mut Stream) {
        match self {
            Bt::Prim(kind) | Bt::PrimArray(kind) => stream.u8(kind),
            Bt::SysClass(name) => stream.lps(name),
            Bt::Class(name, library) => {
                stream.lps(name);
                stream.i32(library);
            }
            _ => {}
        }
    }
}

impl Stream {
    pub fn new(root_id: i32) -> Self {
        let mut stream = Stream { buf: Vec::new() };
        stream.u8(0);
        stream.i32(root_id);
        stream.i32(-1);
        stream.i32(1);
        stream.i32(0);
        stream
    }

    /// A stream with no header, for probing error paths.
    pub fn raw() -> Self {
        Stream { buf: Vec::new() }
    }

    pub fn end(mut self) -> Vec<u8> {
        self.u8(11);
        self.buf
    }

    pub fn bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn lps(&mut self, s: &str) {
        let mut len = s.len();
        loop {
            let byte = (len & 0x7f) as u8;
            len >>= 7;
            if len == 0 {
                self.u8(byte);
                break;
            }
            self.u8(byte | 0x80);
        }
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn string_record(&mut self, id: i32, s: &str) {
        self.u8(6);
        self.i32(id);
        self.lps(s);
    }

    pub fn member_ref(&mut self, id: i32) {
        self.u8(9);
        self.i32(id);
    }

    pub fn object_null(&mut self) {
        self.u8(10);
    }

    pub fn null_multiple(&mut self, count: i32) {
        self.u8(14);
        self.i32(count);
    }

    pub fn null_multiple_256(&mut self, count: u8) {
        self.u8(13);
        self.u8(count);
    }

    pub fn binary_library(&mut self, id: i32, name: &str) {
        self.u8(12);
        self.i32(id);
        self.lps(name);
    }

    /// Tag 8; the caller appends the primitive payload.
    pub fn member_primitive(&mut self, kind: u8) {
        self.u8(8);
        self.u8(kind);
    }

    fn class_info(&mut self, id: i32, name: &str, members: &[&str]) {
        self.i32(id);
        self.lps(name);
        self.i32(members.len() as i32);
        for member in members {
            self.lps(member);
        }
    }

    fn member_type_info(&mut self, members: &[(&str, Bt)]) {
        for (_, bt) in members {
            self.u8(bt.tag());
        }
        for (_, bt) in members {
            bt.detail(self);
        }
    }

    /// Tag 2: SystemClassWithMembers, untyped.
    pub fn system_class(&mut self, id: i32, name: &str, members: &[&str]) {
        self.u8(2);
        self.class_info(id, name, members);
    }

    /// Tag 3: ClassWithMembers, untyped, with a library id.
    pub fn class(&mut self, id: i32, name: &str, members: &[&str], library: i32) {
        self.u8(3);
        self.class_info(id, name, members);
        self.i32(library);
    }

    /// Tag 4: SystemClassWithMembersAndTypes.
    pub fn system_class_with_types(&mut self, id: i32, name: &str, members: &[(&str, Bt)]) {
        self.u8(4);
        let names: Vec<&str> = members.iter().map(|(name, _)| *name).collect();
        self.class_info(id, name, &names);
        self.member_type_info(members);
    }

    /// Tag 5: ClassWithMembersAndTypes, with a library id.
    pub fn class_with_types(&mut self, id: i32, name: &str, members: &[(&str, Bt)], library: i32) {
        self.u8(5);
        let names: Vec<&str> = members.iter().map(|(name, _)| *name).collect();
        self.class_info(id, name, &names);
        self.member_type_info(members);
        self.i32(library);
    }

    /// Tag 1: ClassWithId reusing an interned schema.
    pub fn class_with_id(&mut self, id: i32, metadata_id: i32) {
        self.u8(1);
        self.i32(id);
        self.i32(metadata_id);
    }

    /// Tag 16 header; element records follow.
    pub fn array_single_object(&mut self, id: i32, length: i32) {
        self.u8(16);
        self.i32(id);
        self.i32(length);
    }

    /// Tag 17 header; element records follow.
    pub fn array_single_string(&mut self, id: i32, length: i32) {
        self.u8(17);
        self.i32(id);
        self.i32(length);
    }

    /// Tag 20 header; decoded like tag 17.
    pub fn array_of_type(&mut self, id: i32, length: i32) {
        self.u8(20);
        self.i32(id);
        self.i32(length);
    }

    /// Tag 15 header; the caller appends the contiguous payload.
    pub fn array_single_primitive(&mut self, id: i32, length: i32, kind: u8) {
        self.u8(15);
        self.i32(id);
        self.i32(length);
        self.u8(kind);
    }

    pub fn array_i32(&mut self, id: i32, values: &[i32]) {
        self.array_single_primitive(id, values.len() as i32, 8);
        for v in values {
            self.i32(*v);
        }
    }
}

pub fn s(text: &str) -> Value {
    Value::String(text.into())
}
