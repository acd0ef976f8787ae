use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::rc::Rc;

use crate::overwrite::SlotKey;
use crate::schema::CollectionKind;
use crate::values::{Container, HashKey, Object, PendingRef, SlotLocator, Value, ValueMap, ValueSet};
use crate::{Decoder, ObjectId};

/// A decoded instance of a well-known .NET collection class, waiting to
/// be rewritten into a native container between the two fix-up passes.
#[derive(Debug)]
pub(crate) struct PendingCollection {
    pub id: ObjectId,
    pub object: Rc<RefCell<Object>>,
    pub kind: CollectionKind,
}

fn array_of(value: &Value) -> Option<Rc<RefCell<Vec<Value>>>> {
    value.as_array().cloned()
}

impl<R: io::Read> Decoder<R> {
    /// Rewrites every pending collection and publishes the result under
    /// the collection's ObjectId. Conversion never fails the decode: a
    /// collection that cannot be represented natively passes through as
    /// the opaque class instance.
    pub(crate) fn convert_collections(&mut self) {
        let pending = std::mem::take(&mut self.collections);
        for entry in pending {
            let converted = match entry.kind {
                CollectionKind::List => self.convert_list(&entry.object),
                CollectionKind::Hashtable => self.convert_hashtable(&entry.object),
                CollectionKind::Dictionary => self.convert_dictionary(&entry.object),
                CollectionKind::HashSet => convert_hashset(&entry.object),
            };
            let value = converted.unwrap_or_else(|| {
                log::debug!(
                    "keeping {} (object {}) as an opaque class instance",
                    entry.object.borrow().class_name(),
                    entry.id
                );
                Value::Object(entry.object.clone())
            });
            self.objects.insert(entry.id, value);
        }
    }

    /// ArrayList / Generic.List: the live prefix of the backing store.
    fn convert_list(&mut self, object: &Rc<RefCell<Object>>) -> Option<Value> {
        let (items, size) = {
            let source = object.borrow();
            let size = match source.get("size")? {
                Value::I32(n) if *n >= 0 => *n as usize,
                _ => return None,
            };
            (array_of(source.get("items")?)?, size)
        };
        let converted = {
            let items_ref = items.borrow();
            let live = size.min(items_ref.len());
            Rc::new(RefCell::new(items_ref[..live].to_vec()))
        };
        let parent = Container::Array(converted.clone());
        self.reanchor_indexed_refs(&parent, &converted.borrow());
        self.transplant_slots(&Container::Array(items), &parent, |key| Some(key.clone()));
        Some(Value::Array(converted))
    }

    /// Hashtable: parallel Keys/Values arrays zipped into an ordered map;
    /// excess keys pair with Null.
    fn convert_hashtable(&mut self, object: &Rc<RefCell<Object>>) -> Option<Value> {
        let (keys, values) = {
            let source = object.borrow();
            (
                array_of(source.get("Keys")?)?,
                array_of(source.get("Values")?)?,
            )
        };
        let mut entries = Vec::new();
        let mut hashes = Vec::new();
        {
            let keys_ref = keys.borrow();
            let values_ref = values.borrow();
            let mut seen = HashSet::new();
            for (index, key) in keys_ref.iter().enumerate() {
                let hash = HashKey::of(key)?;
                if !seen.insert(hash.clone()) {
                    return None;
                }
                hashes.push(hash);
                let value = values_ref.get(index).cloned().unwrap_or(Value::Null);
                entries.push((key.clone(), value));
            }
        }
        let map = Rc::new(RefCell::new(ValueMap::from_entries(entries)));
        let parent = Container::Map(map.clone());
        self.reanchor_keyed_refs(&parent, &map.borrow());
        self.transplant_slots(&Container::Array(values), &parent, move |key| match key {
            SlotKey::Index(index) => hashes.get(*index).cloned().map(SlotKey::Key),
            SlotKey::Key(_) => None,
        });
        Some(Value::Map(map))
    }

    /// Generic.Dictionary: KeyValuePairs[] of `key`/`value` members.
    fn convert_dictionary(&mut self, object: &Rc<RefCell<Object>>) -> Option<Value> {
        let pairs = array_of(object.borrow().get("KeyValuePairs")?)?;
        let mut entries = Vec::new();
        let mut transplants = Vec::new();
        {
            let pairs_ref = pairs.borrow();
            let mut seen = HashSet::new();
            for pair in pairs_ref.iter() {
                let pair = pair.as_object()?.clone();
                let (key, value, value_index) = {
                    let pair_ref = pair.borrow();
                    (
                        pair_ref.get("key")?.clone(),
                        pair_ref.get("value")?.clone(),
                        pair_ref.member_index("value")?,
                    )
                };
                let hash = HashKey::of(&key)?;
                if !seen.insert(hash.clone()) {
                    return None;
                }
                transplants.push((pair, value_index, hash));
                entries.push((key, value));
            }
        }
        let map = Rc::new(RefCell::new(ValueMap::from_entries(entries)));
        let parent = Container::Map(map.clone());
        self.reanchor_keyed_refs(&parent, &map.borrow());
        for (pair, value_index, hash) in transplants {
            self.transplant_slots(&Container::Object(pair), &parent, move |key| match key {
                SlotKey::Index(index) if *index == value_index => {
                    Some(SlotKey::Key(hash.clone()))
                }
                _ => None,
            });
        }
        Some(Value::Map(map))
    }

    /// References copied into a converted sequence keep their index but
    /// must resolve into the new container, not the discarded source.
    fn reanchor_indexed_refs(&mut self, parent: &Container, elements: &[Value]) {
        for (index, value) in elements.iter().enumerate() {
            if let Value::Ref(target) = value {
                self.pending.push(PendingRef {
                    target: *target,
                    parent: parent.clone(),
                    locator: SlotLocator::Index(index),
                    resolved: false,
                });
            }
        }
    }

    fn reanchor_keyed_refs(&mut self, parent: &Container, map: &ValueMap) {
        for (key, value) in map.entries() {
            if let Value::Ref(target) = value {
                self.pending.push(PendingRef {
                    target: *target,
                    parent: parent.clone(),
                    locator: SlotLocator::Key(key.clone()),
                    resolved: false,
                });
            }
        }
    }
}

/// Generic.HashSet: Elements[], all of which must hash and be distinct.
/// An unresolved reference element never hashes, so a set containing one
/// falls back to the opaque instance.
fn convert_hashset(object: &Rc<RefCell<Object>>) -> Option<Value> {
    let elements = array_of(object.borrow().get("Elements")?)?;
    let mut converted = Vec::new();
    let mut seen = HashSet::new();
    for value in elements.borrow().iter() {
        let hash = HashKey::of(value)?;
        if !seen.insert(hash) {
            return None;
        }
        converted.push(value.clone());
    }
    Some(Value::Set(Rc::new(RefCell::new(ValueSet::from_elements(
        converted,
    )))))
}
