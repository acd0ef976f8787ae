use std::collections::HashSet;
use std::io::Read;
use std::rc::Rc;

use crate::cursor::StreamCursor;
use crate::primitives::{self, PrimitiveKind};
use crate::result::{Error, Result};
use crate::ObjectId;

/// Per-member decoding rule distilled from MemberTypeInfo. Only the
/// primitive kind is actionable; everything else means "the value arrives
/// as a record". Class details are read off the wire and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemberSchema {
    Primitive(PrimitiveKind),
    String,
    Object,
    SystemClass,
    Class,
    ObjectArray,
    StringArray,
    PrimitiveArray(PrimitiveKind),
    /// Tags 2 and 3 carry no MemberTypeInfo at all.
    Untyped,
}

impl MemberSchema {
    pub fn primitive(self) -> Option<PrimitiveKind> {
        match self {
            MemberSchema::Primitive(kind) => Some(kind),
            _ => None,
        }
    }
}

/// Reusable class shape, interned in the registry under the ObjectId of
/// the record that declared it and shared by every ClassWithId instance.
#[derive(Debug)]
pub(crate) struct ClassSchema {
    pub name: Rc<str>,
    pub members: Vec<(Rc<str>, MemberSchema)>,
    pub collection: Option<CollectionKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CollectionKind {
    List,
    Hashtable,
    Dictionary,
    HashSet,
}

/// Matches the well-known `System.Collections.` classes against the
/// converter table by shortened lowercase key, generic parameters and all
/// dropped. Runs on the raw class name, before sanitisation.
pub(crate) fn collection_kind(raw_name: &str) -> Option<CollectionKind> {
    let rest = raw_name.strip_prefix("System.Collections.")?;
    let short = rest
        .split('`')
        .next()
        .unwrap_or(rest)
        .replace('.', "_")
        .to_ascii_lowercase();
    match short.as_str() {
        "arraylist" | "generic_list" => Some(CollectionKind::List),
        "hashtable" => Some(CollectionKind::Hashtable),
        "generic_dictionary" => Some(CollectionKind::Dictionary),
        "generic_hashset" => Some(CollectionKind::HashSet),
        _ => None,
    }
}

pub(crate) struct ClassInfo {
    pub object_id: ObjectId,
    pub raw_name: String,
    pub member_names: Vec<Rc<str>>,
}

pub(crate) fn read_class_info<R: Read>(cur: &mut StreamCursor<R>) -> Result<ClassInfo> {
    let object_id = ObjectId(cur.read_i32()?);
    let raw_name = primitives::read_string(cur)?;
    let member_count = cur.read_i32()?;
    if member_count < 0 {
        return Err(Error::Overflow("negative member count"));
    }
    let mut member_names = Vec::new();
    let mut seen = HashSet::new();
    for _ in 0..member_count {
        let raw = primitives::read_string(cur)?;
        let name = make_unique(sanitize_identifier(&raw), &seen);
        seen.insert(name.clone());
        member_names.push(Rc::from(name));
    }
    Ok(ClassInfo {
        object_id,
        raw_name,
        member_names,
    })
}

/// MemberTypeInfo: one BinaryTypeEnum byte per member, then the trailing
/// per-member details in the same order.
pub(crate) fn read_member_schemas<R: Read>(
    cur: &mut StreamCursor<R>,
    count: usize,
) -> Result<Vec<MemberSchema>> {
    let mut tags = Vec::new();
    for _ in 0..count {
        tags.push(cur.read_u8()?);
    }
    let mut schemas = Vec::new();
    for tag in tags {
        schemas.push(read_type_detail(cur, tag)?);
    }
    Ok(schemas)
}

/// Reads the additional-info payload of one BinaryTypeEnum entry. Also
/// used for the element descriptor of BinaryArray records.
pub(crate) fn read_type_detail<R: Read>(cur: &mut StreamCursor<R>, tag: u8) -> Result<MemberSchema> {
    Ok(match tag {
        0 => MemberSchema::Primitive(PrimitiveKind::from_tag(cur.read_u8()?)?),
        1 => MemberSchema::String,
        2 => MemberSchema::Object,
        3 => {
            primitives::read_string(cur)?;
            MemberSchema::SystemClass
        }
        4 => {
            primitives::read_string(cur)?;
            cur.read_i32()?;
            MemberSchema::Class
        }
        5 => MemberSchema::ObjectArray,
        6 => MemberSchema::StringArray,
        7 => MemberSchema::PrimitiveArray(PrimitiveKind::from_tag(cur.read_u8()?)?),
        other => return Err(Error::BadTag(other)),
    })
}

/// Member and class names become identifiers: anything outside
/// `[A-Za-z0-9_]` turns into `_`, leading digits and underscores are
/// stripped, and an empty result falls back to `invalid_identifier`.
/// The result is observable in the returned object keys.
pub(crate) fn sanitize_identifier(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let trimmed = mapped.trim_start_matches(|c: char| c.is_ascii_digit() || c == '_');
    if trimmed.is_empty() {
        "invalid_identifier".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Disambiguates against names already used in the same class by
/// appending the first free numeric suffix, counting from 2.
pub(crate) fn make_unique(name: String, seen: &HashSet<String>) -> String {
    if !seen.contains(&name) {
        return name;
    }
    for suffix in 2.. {
        let replacement = format!("{name}{suffix}");
        if !seen.contains(&replacement) {
            return replacement;
        }
    }
    unreachable!()
}
