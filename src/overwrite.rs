use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use crate::primitives::{self, PrimitiveKind};
use crate::result::{Error, Result};
use crate::values::{Container, HashKey, Member, Value};
use crate::Decoder;

/// Addresses one slot inside an indexed container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum SlotKey {
    Index(usize),
    Key(HashKey),
}

/// Where in the stream a fixed-width primitive body starts, and the rule
/// to re-encode it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OverwriteSlot {
    pub pos: u64,
    pub kind: PrimitiveKind,
}

/// Sparse index from `(container identity, locator)` to overwrite slots.
/// Each entry pins its container so the pointer key cannot be reused by a
/// later allocation while the decoder is alive.
#[derive(Debug, Default)]
pub(crate) struct OverwriteIndex {
    containers: HashMap<usize, ContainerSlots>,
}

#[derive(Debug)]
struct ContainerSlots {
    _pin: Container,
    slots: HashMap<SlotKey, OverwriteSlot>,
}

impl OverwriteIndex {
    pub fn insert(&mut self, container: &Container, key: SlotKey, slot: OverwriteSlot) {
        self.containers
            .entry(container.key())
            .or_insert_with(|| ContainerSlots {
                _pin: container.clone(),
                slots: HashMap::new(),
            })
            .slots
            .insert(key, slot);
    }

    pub fn get(&self, container: usize, key: &SlotKey) -> Option<OverwriteSlot> {
        self.containers.get(&container)?.slots.get(key).copied()
    }

    fn remapped(
        &self,
        src: &Container,
        remap: impl Fn(&SlotKey) -> Option<SlotKey>,
    ) -> Vec<(SlotKey, OverwriteSlot)> {
        match self.containers.get(&src.key()) {
            Some(source) => source
                .slots
                .iter()
                .filter_map(|(key, slot)| remap(key).map(|key| (key, *slot)))
                .collect(),
            None => Vec::new(),
        }
    }
}

impl<R> Decoder<R> {
    /// Carries the slots of a source container over to the container that
    /// replaced it during collection conversion.
    pub(crate) fn transplant_slots(
        &mut self,
        src: &Container,
        dst: &Container,
        remap: impl Fn(&SlotKey) -> Option<SlotKey>,
    ) {
        if let Some(index) = self.overwrite.as_mut() {
            for (key, slot) in index.remapped(src, remap) {
                index.insert(dst, key, slot);
            }
        }
    }

    /// True iff `member` of `obj` has a recorded overwrite slot.
    pub fn is_writable<'a>(&self, obj: &Value, member: impl Into<Member<'a>>) -> bool {
        self.slot_for(obj, member.into()).is_some()
    }

    fn slot_for(&self, obj: &Value, member: Member<'_>) -> Option<OverwriteSlot> {
        let index = self.overwrite.as_ref()?;
        let container = Container::of(obj)?;
        let key = match (obj, member) {
            // map slots are keyed by the entry key, whatever its shape
            (Value::Map(_), Member::Name(name)) => SlotKey::Key(HashKey::Str(Rc::from(name))),
            (Value::Map(_), Member::Index(i)) => SlotKey::Key(HashKey::Int(i as i128)),
            (_, Member::Key(key)) => SlotKey::Key(HashKey::of(key)?),
            (Value::Object(object), Member::Name(name)) => {
                SlotKey::Index(object.borrow().member_index(name)?)
            }
            (_, Member::Name(_)) => return None,
            (_, Member::Index(i)) => SlotKey::Index(i),
        };
        index.get(container.key(), &key)
    }
}

impl<R: io::Read + io::Write + io::Seek> Decoder<R> {
    /// Re-encodes `member` of `obj` in the underlying stream. The graph
    /// itself is left untouched; callers wanting both effects update the
    /// value themselves.
    pub fn write<'a>(
        &mut self,
        obj: &Value,
        member: impl Into<Member<'a>>,
        value: &Value,
    ) -> Result<()> {
        let slot = self
            .slot_for(obj, member.into())
            .ok_or(Error::NotWritable)?;
        let bytes = primitives::encode_fixed(slot.kind, value)?;
        self.cursor.patch(slot.pos, &bytes)
    }
}
