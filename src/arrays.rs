use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use crate::overwrite::{OverwriteSlot, SlotKey};
use crate::primitives::{self, PrimitiveKind};
use crate::records::Item;
use crate::result::{Error, Result};
use crate::schema;
use crate::values::{Container, NdArray, Value};
use crate::{Decoder, ObjectId};

const SHAPE_RECTANGULAR: u8 = 2;
const SHAPE_SINGLE_OFFSET: u8 = 3;
const SHAPE_RECTANGULAR_OFFSET: u8 = 5;

impl<R: io::Read> Decoder<R> {
    fn read_array_info(&mut self) -> Result<(ObjectId, usize)> {
        let id = ObjectId(self.cursor.read_i32()?);
        let length = self.cursor.read_i32()?;
        if length < 0 {
            return Err(Error::Overflow("negative array length"));
        }
        Ok((id, length as usize))
    }

    /// ArraySinglePrimitive: id, length, element kind, then the elements
    /// back to back with no per-element tags.
    pub(crate) fn read_array_primitive(&mut self) -> Result<Item> {
        let (id, length) = self.read_array_info()?;
        let kind = PrimitiveKind::from_tag(self.cursor.read_u8()?)?;
        let value = self.read_primitive_elements(kind, length)?;
        self.define(id, value.clone())?;
        Ok(Item::Value(value))
    }

    /// ArraySingleObject / ArraySingleString / ArrayOfType: id, length,
    /// then `length` record slots.
    pub(crate) fn read_array_slots(&mut self) -> Result<Item> {
        let (id, length) = self.read_array_info()?;
        let array = Rc::new(RefCell::new(vec![Value::Null; length]));
        self.fill_slots(&Container::Array(array.clone()), length, |_| None)?;
        self.define(id, Value::Array(array.clone()))?;
        Ok(Item::Value(Value::Array(array)))
    }

    /// BinaryArray: shaped arrays. Rectangular shapes build a flat
    /// row-major NdArray; the other shapes are single-dimensional.
    pub(crate) fn read_binary_array(&mut self) -> Result<Item> {
        let id = ObjectId(self.cursor.read_i32()?);
        let shape = self.cursor.read_u8()?;
        if shape > SHAPE_RECTANGULAR_OFFSET {
            return Err(Error::BadTag(shape));
        }
        let rank = self.cursor.read_i32()?;
        if rank < 0 {
            return Err(Error::Overflow("negative array rank"));
        }
        let mut lengths = Vec::new();
        for _ in 0..rank {
            let length = self.cursor.read_i32()?;
            if length < 0 {
                return Err(Error::Overflow("negative array length"));
            }
            lengths.push(length as usize);
        }
        if shape >= SHAPE_SINGLE_OFFSET {
            // lower bounds are not supported; read and ignore
            for _ in 0..rank {
                self.cursor.read_i32()?;
            }
        }
        let element_tag = self.cursor.read_u8()?;
        let element = schema::read_type_detail(&mut self.cursor, element_tag)?;
        let kind = element.primitive();

        if matches!(shape, SHAPE_RECTANGULAR | SHAPE_RECTANGULAR_OFFSET) {
            return self.read_rectangular(id, lengths, kind);
        }
        if lengths.len() != 1 {
            return Err(Error::UnsupportedFeature("multidimensional jagged array"));
        }
        let value = match kind {
            Some(kind) => self.read_primitive_elements(kind, lengths[0])?,
            None => {
                let array = Rc::new(RefCell::new(vec![Value::Null; lengths[0]]));
                self.fill_slots(&Container::Array(array.clone()), lengths[0], |_| None)?;
                Value::Array(array)
            }
        };
        self.define(id, value.clone())?;
        Ok(Item::Value(value))
    }

    fn read_rectangular(
        &mut self,
        id: ObjectId,
        lengths: Vec<usize>,
        kind: Option<PrimitiveKind>,
    ) -> Result<Item> {
        let total = lengths
            .iter()
            .try_fold(1usize, |acc, &len| acc.checked_mul(len))
            .ok_or(Error::Overflow("array element count"))?;
        let nd = Rc::new(RefCell::new(NdArray::new(lengths, vec![Value::Null; total])));
        let parent = Container::NdArray(nd.clone());
        match kind.filter(|kind| kind.fixed_width().is_some()) {
            Some(kind) => self.read_contiguous(&parent, kind, total, |i, value| {
                nd.borrow_mut().set(i, value)
            })?,
            None => self.fill_slots(&parent, total, |_| kind)?,
        }
        self.define(id, Value::NdArray(nd.clone()))?;
        Ok(Item::Value(Value::NdArray(nd)))
    }

    /// Contiguous run of one fixed-width primitive kind: no tags, no
    /// interstitials, one overwrite slot per element.
    fn read_contiguous<F>(
        &mut self,
        parent: &Container,
        kind: PrimitiveKind,
        count: usize,
        mut store: F,
    ) -> Result<()>
    where
        F: FnMut(usize, Value),
    {
        for index in 0..count {
            let pos = self.cursor.position();
            let value = primitives::read_primitive(&mut self.cursor, kind)?;
            self.index_overwrite(parent, SlotKey::Index(index), OverwriteSlot { pos, kind });
            store(index, value);
        }
        Ok(())
    }

    /// Elements of a primitive-typed 1-D array. Fixed-width kinds are read
    /// contiguously (`Byte` as an opaque byte buffer); the value-dependent
    /// encodings go through the slot loop one element at a time.
    pub(crate) fn read_primitive_elements(
        &mut self,
        kind: PrimitiveKind,
        length: usize,
    ) -> Result<Value> {
        if kind == PrimitiveKind::Byte {
            let start = self.cursor.position();
            let bytes = Rc::new(RefCell::new(self.cursor.read_vec(length)?));
            let parent = Container::Bytes(bytes.clone());
            if self.overwrite.is_some() {
                for index in 0..length {
                    self.index_overwrite(
                        &parent,
                        SlotKey::Index(index),
                        OverwriteSlot {
                            pos: start + index as u64,
                            kind,
                        },
                    );
                }
            }
            return Ok(Value::Bytes(bytes));
        }
        if kind.fixed_width().is_some() {
            let array = Rc::new(RefCell::new(vec![Value::Null; length]));
            let parent = Container::Array(array.clone());
            self.read_contiguous(&parent, kind, length, |i, value| {
                if let Some(slot) = array.borrow_mut().get_mut(i) {
                    *slot = value;
                }
            })?;
            return Ok(Value::Array(array));
        }
        let array = Rc::new(RefCell::new(vec![Value::Null; length]));
        self.fill_slots(&Container::Array(array.clone()), length, |_| Some(kind))?;
        Ok(Value::Array(array))
    }
}
