use std::cell::RefCell;
use std::rc::Rc;

use derive_getters::Getters;

use crate::primitives::{DateTime, DateTimeKind, TimeSpan};
use crate::ObjectId;

/// A decoded NRBF value. Container variants are reference counted with
/// interior mutability: cloning shares the container, which is what keeps
/// two references to the same ObjectId pointing at the same storage, and
/// what lets reference fix-up write a referent back into its slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
    String(Rc<str>),
    /// Decimal text exactly as transmitted; parsing it is the caller's call.
    Decimal(Rc<str>),
    TimeSpan(TimeSpan),
    DateTime(DateTime),
    /// Contents of a `Byte` primitive array, kept as raw bytes.
    Bytes(Rc<RefCell<Vec<u8>>>),
    Object(Rc<RefCell<Object>>),
    Array(Rc<RefCell<Vec<Value>>>),
    NdArray(Rc<RefCell<NdArray>>),
    Map(Rc<RefCell<ValueMap>>),
    Set(Rc<RefCell<ValueSet>>),
    /// Placeholder for a MemberReference while the stream is being read.
    /// Never present in a graph returned by the decoder.
    Ref(ObjectId),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<RefCell<Object>>> {
        match self {
            Value::Object(rc) => Some(rc),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Rc<RefCell<Vec<Value>>>> {
        match self {
            Value::Array(rc) => Some(rc),
            _ => None,
        }
    }

    pub fn as_nd_array(&self) -> Option<&Rc<RefCell<NdArray>>> {
        match self {
            Value::NdArray(rc) => Some(rc),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Rc<RefCell<ValueMap>>> {
        match self {
            Value::Map(rc) => Some(rc),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Rc<RefCell<ValueSet>>> {
        match self {
            Value::Set(rc) => Some(rc),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Rc<RefCell<Vec<u8>>>> {
        match self {
            Value::Bytes(rc) => Some(rc),
            _ => None,
        }
    }
}

/// A class instance: the sanitised class name and its members in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct Object {
    class_name: Rc<str>,
    members: Vec<(Rc<str>, Value)>,
}

impl Object {
    pub(crate) fn new(class_name: Rc<str>, member_names: &[Rc<str>]) -> Self {
        Self {
            class_name,
            members: member_names
                .iter()
                .map(|name| (name.clone(), Value::Null))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members
            .iter()
            .find(|(member, _)| member.as_ref() == name)
            .map(|(_, value)| value)
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|(member, _)| member.as_ref() == name)
    }

    pub(crate) fn set(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.members.get_mut(index) {
            slot.1 = value;
        }
    }
}

/// A rectangular multidimensional array: per-dimension lengths plus the
/// elements flattened in row-major order.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct NdArray {
    lengths: Vec<usize>,
    elements: Vec<Value>,
}

impl NdArray {
    pub(crate) fn new(lengths: Vec<usize>, elements: Vec<Value>) -> Self {
        Self { lengths, elements }
    }

    pub fn get(&self, indexes: &[usize]) -> Option<&Value> {
        if indexes.len() != self.lengths.len() {
            return None;
        }
        let mut flat = 0usize;
        for (index, length) in indexes.iter().zip(&self.lengths) {
            if index >= length {
                return None;
            }
            flat = flat * length + index;
        }
        self.elements.get(flat)
    }

    pub(crate) fn set(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.elements.get_mut(index) {
            *slot = value;
        }
    }
}

/// An insertion-ordered map produced by collection conversion.
#[derive(Debug, Clone, PartialEq, Default, Getters)]
pub struct ValueMap {
    entries: Vec<(Value, Value)>,
}

impl ValueMap {
    pub(crate) fn from_entries(entries: Vec<(Value, Value)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(entry_key, _)| entry_key == key)
            .map(|(_, value)| value)
    }

    pub(crate) fn set(&mut self, key: &Value, value: Value) {
        if let Some(entry) = self.entries.iter_mut().find(|(entry_key, _)| entry_key == key) {
            entry.1 = value;
        }
    }
}

/// An insertion-ordered set produced by collection conversion.
#[derive(Debug, Clone, PartialEq, Default, Getters)]
pub struct ValueSet {
    elements: Vec<Value>,
}

impl ValueSet {
    pub(crate) fn from_elements(elements: Vec<Value>) -> Self {
        Self { elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.elements.iter().any(|element| element == value)
    }
}

/// Addresses one slot of a decoded container: a member name for objects,
/// an index for sequences, a key for maps.
#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
    Name(&'a str),
    Index(usize),
    Key(&'a Value),
}

impl<'a> From<&'a str> for Member<'a> {
    fn from(name: &'a str) -> Self {
        Member::Name(name)
    }
}

impl From<usize> for Member<'_> {
    fn from(index: usize) -> Self {
        Member::Index(index)
    }
}

impl<'a> From<&'a Value> for Member<'a> {
    fn from(key: &'a Value) -> Self {
        Member::Key(key)
    }
}

/// Shared handle on a container, used as the parent anchor of pending
/// references and as the identity key of the overwrite index.
#[derive(Debug, Clone)]
pub(crate) enum Container {
    Object(Rc<RefCell<Object>>),
    Array(Rc<RefCell<Vec<Value>>>),
    NdArray(Rc<RefCell<NdArray>>),
    Map(Rc<RefCell<ValueMap>>),
    Bytes(Rc<RefCell<Vec<u8>>>),
}

impl Container {
    pub fn of(value: &Value) -> Option<Container> {
        match value {
            Value::Object(rc) => Some(Container::Object(rc.clone())),
            Value::Array(rc) => Some(Container::Array(rc.clone())),
            Value::NdArray(rc) => Some(Container::NdArray(rc.clone())),
            Value::Map(rc) => Some(Container::Map(rc.clone())),
            Value::Bytes(rc) => Some(Container::Bytes(rc.clone())),
            _ => None,
        }
    }

    /// Allocation address, unique for as long as the handle is held.
    pub fn key(&self) -> usize {
        match self {
            Container::Object(rc) => Rc::as_ptr(rc) as usize,
            Container::Array(rc) => Rc::as_ptr(rc) as usize,
            Container::NdArray(rc) => Rc::as_ptr(rc) as usize,
            Container::Map(rc) => Rc::as_ptr(rc) as usize,
            Container::Bytes(rc) => Rc::as_ptr(rc) as usize,
        }
    }

    pub fn put(&self, locator: &SlotLocator, value: Value) {
        match (self, locator) {
            (Container::Object(rc), SlotLocator::Index(index)) => {
                rc.borrow_mut().set(*index, value);
            }
            (Container::Array(rc), SlotLocator::Index(index)) => {
                if let Some(slot) = rc.borrow_mut().get_mut(*index) {
                    *slot = value;
                }
            }
            (Container::NdArray(rc), SlotLocator::Index(index)) => {
                rc.borrow_mut().set(*index, value);
            }
            (Container::Map(rc), SlotLocator::Key(key)) => {
                rc.borrow_mut().set(key, value);
            }
            _ => {}
        }
    }
}

/// Where inside its parent a pending reference has to be written back.
#[derive(Debug, Clone)]
pub(crate) enum SlotLocator {
    Index(usize),
    Key(Value),
}

/// A MemberReference waiting for its referent: resolved in the fix-up
/// passes by writing the referent through `(parent, locator)`.
#[derive(Debug)]
pub(crate) struct PendingRef {
    pub target: ObjectId,
    pub parent: Container,
    pub locator: SlotLocator,
    pub resolved: bool,
}

/// Hashable projection of a `Value`, used to detect key collisions during
/// collection conversion and to address map slots in the overwrite index.
/// Containers, raw bytes and unresolved references have no projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum HashKey {
    Null,
    Bool(bool),
    Int(i128),
    F32(u32),
    F64(u64),
    Char(char),
    Str(Rc<str>),
    Decimal(Rc<str>),
    TimeSpan(i64),
    DateTime(u64, DateTimeKind),
}

impl HashKey {
    pub fn of(value: &Value) -> Option<HashKey> {
        Some(match value {
            Value::Null => HashKey::Null,
            Value::Bool(v) => HashKey::Bool(*v),
            Value::I8(v) => HashKey::Int(i128::from(*v)),
            Value::U8(v) => HashKey::Int(i128::from(*v)),
            Value::I16(v) => HashKey::Int(i128::from(*v)),
            Value::U16(v) => HashKey::Int(i128::from(*v)),
            Value::I32(v) => HashKey::Int(i128::from(*v)),
            Value::U32(v) => HashKey::Int(i128::from(*v)),
            Value::I64(v) => HashKey::Int(i128::from(*v)),
            Value::U64(v) => HashKey::Int(i128::from(*v)),
            Value::F32(v) => HashKey::F32(v.to_bits()),
            Value::F64(v) => HashKey::F64(v.to_bits()),
            Value::Char(v) => HashKey::Char(*v),
            Value::String(s) => HashKey::Str(s.clone()),
            Value::Decimal(s) => HashKey::Decimal(s.clone()),
            Value::TimeSpan(v) => HashKey::TimeSpan(v.ticks()),
            Value::DateTime(v) => HashKey::DateTime(v.ticks(), v.kind()),
            _ => return None,
        })
    }
}
