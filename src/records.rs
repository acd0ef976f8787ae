use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use crate::overwrite::{OverwriteSlot, SlotKey};
use crate::primitives::{self, PrimitiveKind};
use crate::result::{Error, Result};
use crate::schema::{self, ClassSchema, MemberSchema};
use crate::values::{Container, Object, PendingRef, SlotLocator, Value};
use crate::{Decoder, ObjectId};

/// What one dispatched record contributes to the graph: a value, a
/// structural marker, or a reference to be fixed up later.
#[derive(Debug)]
pub(crate) enum Item {
    Value(Value),
    NullRun(usize),
    Library,
    End,
    Ref(ObjectId),
}

impl<R: io::Read> Decoder<R> {
    pub(crate) fn read_record(&mut self) -> Result<Item> {
        let tag = self.cursor.read_u8()?;
        self.read_record_body(tag)
    }

    pub(crate) fn read_record_body(&mut self, tag: u8) -> Result<Item> {
        match tag {
            0 => Err(Error::BadHeader("unexpected second serialization header")),
            1 => self.read_class_with_id(),
            2 => self.read_class(false, false),
            3 => self.read_class(true, false),
            4 => self.read_class(false, true),
            5 => self.read_class(true, true),
            6 => self.read_object_string(),
            7 => self.read_binary_array(),
            8 => {
                let kind = PrimitiveKind::from_tag(self.cursor.read_u8()?)?;
                Ok(Item::Value(primitives::read_primitive(&mut self.cursor, kind)?))
            }
            9 => Ok(Item::Ref(ObjectId(self.cursor.read_i32()?))),
            10 => Ok(Item::Value(Value::Null)),
            11 => Ok(Item::End),
            12 => {
                self.skip_library()?;
                Ok(Item::Library)
            }
            13 => Ok(Item::NullRun(usize::from(self.cursor.read_u8()?))),
            14 => {
                let count = self.cursor.read_i32()?;
                if count < 0 {
                    return Err(Error::Overflow("negative null run"));
                }
                Ok(Item::NullRun(count as usize))
            }
            15 => self.read_array_primitive(),
            16 | 17 => self.read_array_slots(),
            20 => {
                log::warn!("ArrayOfType record decoded as ArraySingleString; element types are lost");
                self.read_array_slots()
            }
            21 => Err(Error::UnsupportedFeature("BinaryMethodCall")),
            22 => Err(Error::UnsupportedFeature("BinaryMethodReturn")),
            other => Err(Error::BadTag(other)),
        }
    }

    /// BinaryLibrary payload; the id and name are read and discarded.
    fn skip_library(&mut self) -> Result<()> {
        self.cursor.read_i32()?;
        primitives::read_string(&mut self.cursor)?;
        Ok(())
    }

    fn read_class(&mut self, has_library: bool, typed: bool) -> Result<Item> {
        let info = schema::read_class_info(&mut self.cursor)?;
        let schemas = if typed {
            schema::read_member_schemas(&mut self.cursor, info.member_names.len())?
        } else {
            vec![MemberSchema::Untyped; info.member_names.len()]
        };
        if has_library {
            self.cursor.read_i32()?;
        }
        let class = Rc::new(ClassSchema {
            name: Rc::from(schema::sanitize_identifier(&info.raw_name)),
            members: info.member_names.into_iter().zip(schemas).collect(),
            collection: schema::collection_kind(&info.raw_name),
        });
        self.classes.insert(info.object_id, class.clone());
        self.read_instance(info.object_id, class)
    }

    fn read_class_with_id(&mut self) -> Result<Item> {
        let object_id = ObjectId(self.cursor.read_i32()?);
        let metadata_id = ObjectId(self.cursor.read_i32()?);
        let class = self
            .classes
            .get(&metadata_id)
            .cloned()
            .ok_or(Error::SchemaMismatch("ClassWithId references an unknown metadata id"))?;
        self.read_instance(object_id, class)
    }

    fn read_instance(&mut self, id: ObjectId, class: Rc<ClassSchema>) -> Result<Item> {
        let member_names: Vec<Rc<str>> =
            class.members.iter().map(|(name, _)| name.clone()).collect();
        let object = Rc::new(RefCell::new(Object::new(class.name.clone(), &member_names)));
        let parent = Container::Object(object.clone());
        self.fill_slots(&parent, member_names.len(), |index| {
            class.members[index].1.primitive()
        })?;
        if let Some(kind) = class.collection {
            self.reserve_collection(id, object.clone(), kind)?;
        } else {
            self.define(id, Value::Object(object.clone()))?;
        }
        Ok(Item::Value(Value::Object(object)))
    }

    fn read_object_string(&mut self) -> Result<Item> {
        let id = ObjectId(self.cursor.read_i32()?);
        let value = Value::String(primitives::read_string(&mut self.cursor)?.into());
        self.define(id, value.clone())?;
        Ok(Item::Value(value))
    }

    /// The slot loop shared by class instances and element-wise arrays.
    /// Handles interstitial BinaryLibrary records, null runs, pending
    /// references, and overwrite-slot capture in one place.
    pub(crate) fn fill_slots<F>(&mut self, parent: &Container, len: usize, rule: F) -> Result<()>
    where
        F: Fn(usize) -> Option<PrimitiveKind>,
    {
        let mut index = 0;
        while index < len {
            let (item, slot) = self.read_slot(rule(index))?;
            match item {
                Item::Library => {}
                Item::NullRun(count) => {
                    // Slots are pre-filled with Null; a run just advances.
                    // Overshoot past the declared length is tolerated.
                    index += count;
                }
                Item::Ref(target) => {
                    parent.put(&SlotLocator::Index(index), Value::Ref(target));
                    self.pending.push(PendingRef {
                        target,
                        parent: parent.clone(),
                        locator: SlotLocator::Index(index),
                        resolved: false,
                    });
                    index += 1;
                }
                Item::Value(value) => {
                    if let Some(slot) = slot {
                        self.index_overwrite(parent, SlotKey::Index(index), slot);
                    }
                    parent.put(&SlotLocator::Index(index), value);
                    index += 1;
                }
                Item::End => return Err(Error::Truncated),
            }
        }
        Ok(())
    }

    /// Reads the next value for one slot: a direct primitive when the slot
    /// has a primitive rule, otherwise the next record, with tag 8
    /// intercepted so its primitive body gets an overwrite slot too.
    fn read_slot(
        &mut self,
        kind: Option<PrimitiveKind>,
    ) -> Result<(Item, Option<OverwriteSlot>)> {
        if let Some(kind) = kind {
            return self.read_slot_primitive(kind);
        }
        let tag = self.cursor.read_u8()?;
        if tag == 8 && self.overwrite.is_some() {
            let kind = PrimitiveKind::from_tag(self.cursor.read_u8()?)?;
            return self.read_slot_primitive(kind);
        }
        Ok((self.read_record_body(tag)?, None))
    }

    fn read_slot_primitive(
        &mut self,
        kind: PrimitiveKind,
    ) -> Result<(Item, Option<OverwriteSlot>)> {
        let pos = self.cursor.position();
        let value = primitives::read_primitive(&mut self.cursor, kind)?;
        let slot = match (self.overwrite.is_some(), kind.fixed_width()) {
            (true, Some(_)) => Some(OverwriteSlot { pos, kind }),
            _ => None,
        };
        Ok((Item::Value(value), slot))
    }

    pub(crate) fn index_overwrite(&mut self, parent: &Container, key: SlotKey, slot: OverwriteSlot) {
        if let Some(index) = self.overwrite.as_mut() {
            index.insert(parent, key, slot);
        }
    }

    /// Every ObjectId may be defined at most once per stream.
    pub(crate) fn define(&mut self, id: ObjectId, value: Value) -> Result<()> {
        if self.objects.contains_key(&id) || self.collections.iter().any(|c| c.id == id) {
            return Err(Error::DuplicateId(id));
        }
        self.objects.insert(id, value);
        Ok(())
    }

    /// Convertible collections stay out of the object table until the
    /// converter has run, so pass-1 fix-up cannot hand out the opaque form.
    fn reserve_collection(
        &mut self,
        id: ObjectId,
        object: Rc<RefCell<Object>>,
        kind: schema::CollectionKind,
    ) -> Result<()> {
        if self.objects.contains_key(&id) || self.collections.iter().any(|c| c.id == id) {
            return Err(Error::DuplicateId(id));
        }
        self.collections.push(crate::collections::PendingCollection { id, object, kind });
        Ok(())
    }
}
