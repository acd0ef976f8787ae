use std::collections::HashMap;
use std::fmt;
use std::io;
use std::rc::Rc;

use derive_getters::Getters;

use cursor::StreamCursor;
use result::{Error, Result};
use values::PendingRef;

mod arrays;
mod collections;
mod cursor;
mod overwrite;
mod primitives;
mod records;
pub mod result;
mod schema;
mod values;

pub use primitives::{DateTime, DateTimeKind, TimeSpan};
pub use values::{Member, NdArray, Object, Value, ValueMap, ValueSet};

/// The 32-bit id naming a referenceable value within one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) i32);

impl From<ObjectId> for i32 {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The SerializationHeaderRecord that opens every stream.
#[derive(Debug, Clone, Copy, Getters)]
pub struct Header {
    root_id: ObjectId,
    header_id: i32,
    major_version: i32,
    minor_version: i32,
}

/// Reads one .NET Remoting Binary Format stream into its root [`Value`].
pub fn decode<R: io::Read>(source: R) -> Result<Value> {
    Decoder::new(source).read()
}

/// A long-lived decoding handle over a borrowed byte source.
///
/// `read()` consumes exactly one stream, up to and including its
/// MessageEnd tag, so several concatenated streams can be read
/// back-to-back from the same handle. Constructing the decoder with
/// [`Decoder::with_overwrite`] additionally records the stream offset of
/// every fixed-width primitive so it can be patched in place later.
#[derive(Debug)]
pub struct Decoder<R> {
    pub(crate) cursor: StreamCursor<R>,
    pub(crate) header: Option<Header>,
    pub(crate) classes: HashMap<ObjectId, Rc<schema::ClassSchema>>,
    pub(crate) objects: HashMap<ObjectId, Value>,
    pub(crate) pending: Vec<PendingRef>,
    pub(crate) collections: Vec<collections::PendingCollection>,
    pub(crate) overwrite: Option<overwrite::OverwriteIndex>,
}

impl<R: io::Read> Decoder<R> {
    pub fn new(source: R) -> Self {
        Self {
            cursor: StreamCursor::new(source),
            header: None,
            classes: HashMap::new(),
            objects: HashMap::new(),
            pending: Vec::new(),
            collections: Vec::new(),
            overwrite: None,
        }
    }

    /// Offset of the next unread byte; right after `read()` returns this
    /// is the first byte of any following stream.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// The header of the stream currently being read, once known.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Probes whether the source starts with a valid NRBF header.
    /// Structural mismatches answer `false`; only I/O failures are errors.
    /// The header is kept, so a following `read()` does not re-read it.
    pub fn read_header(&mut self) -> Result<bool> {
        if self.header.is_some() {
            return Ok(true);
        }
        match self.try_read_header() {
            Ok(header) => {
                self.header = Some(header);
                Ok(true)
            }
            Err(Error::IoFailed(err)) => Err(Error::IoFailed(err)),
            Err(_) => Ok(false),
        }
    }

    fn try_read_header(&mut self) -> Result<Header> {
        if self.cursor.read_u8()? != 0 {
            return Err(Error::BadHeader("missing serialization header record"));
        }
        let root_id = ObjectId(self.cursor.read_i32()?);
        let header_id = self.cursor.read_i32()?;
        let major_version = self.cursor.read_i32()?;
        let minor_version = self.cursor.read_i32()?;
        if major_version != 1 {
            return Err(Error::BadHeader("major version must be 1"));
        }
        if minor_version != 0 {
            return Err(Error::BadHeader("minor version must be 0"));
        }
        if root_id.0 == 0 {
            return Err(Error::BadHeader("root id must not be zero"));
        }
        Ok(Header {
            root_id,
            header_id,
            major_version,
            minor_version,
        })
    }

    /// Decodes one stream and returns its root. On error the decoder is
    /// left in an unspecified state and should be discarded.
    pub fn read(&mut self) -> Result<Value> {
        let root_id = match self.header {
            Some(header) => header.root_id,
            None => {
                let header = self.try_read_header()?;
                self.header = Some(header);
                header.root_id
            }
        };
        let root = self.read_graph(root_id)?;
        self.header = None;
        Ok(root)
    }

    fn read_graph(&mut self, root_id: ObjectId) -> Result<Value> {
        loop {
            if let records::Item::End = self.read_record()? {
                break;
            }
        }
        self.classes.clear();

        // Pass 1 resolves what it can; refs into collections stay pending
        // because their targets are published only by the converter.
        self.resolve_references(true)?;
        self.convert_collections();
        self.resolve_references(false)?;

        let root = self
            .objects
            .get(&root_id)
            .cloned()
            .ok_or(Error::DanglingRef(root_id))?;
        self.objects.clear();
        self.pending.clear();
        Ok(root)
    }

    fn resolve_references(&mut self, lenient: bool) -> Result<()> {
        let mut pending = std::mem::take(&mut self.pending);
        for entry in pending.iter_mut().filter(|entry| !entry.resolved) {
            match self.objects.get(&entry.target) {
                Some(value) => {
                    entry.parent.put(&entry.locator, value.clone());
                    entry.resolved = true;
                }
                None if lenient => {}
                None => return Err(Error::DanglingRef(entry.target)),
            }
        }
        self.pending = pending;
        Ok(())
    }
}

impl<R: io::Read + io::Write + io::Seek> Decoder<R> {
    /// Like [`Decoder::new`], but also builds the overwrite index while
    /// reading. Offsets are recorded relative to the source's position at
    /// construction time, so `write()` patches the right bytes even when
    /// the stream does not start at offset zero.
    pub fn with_overwrite(source: R) -> Result<Self> {
        Ok(Self {
            cursor: StreamCursor::at_stream_position(source)?,
            header: None,
            classes: HashMap::new(),
            objects: HashMap::new(),
            pending: Vec::new(),
            collections: Vec::new(),
            overwrite: Some(overwrite::OverwriteIndex::default()),
        })
    }
}
