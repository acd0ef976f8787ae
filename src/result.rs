use thiserror::Error;

use crate::ObjectId;

pub type Result<A, E = Error> = std::result::Result<A, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoFailed(#[from] std::io::Error),
    #[error("unexpected end of stream")]
    Truncated,
    #[error("bad serialization header: {0}")]
    BadHeader(&'static str),
    #[error("unrecognized tag: {0}")]
    BadTag(u8),
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),
    #[error("size overflow: {0}")]
    Overflow(&'static str),
    #[error("invalid character data")]
    InvalidChar,
    #[error("unresolvable member reference to object {0}")]
    DanglingRef(ObjectId),
    #[error("object {0} is defined twice")]
    DuplicateId(ObjectId),
    #[error("member is not writable")]
    NotWritable,
    #[error("value does not fit the stored encoding")]
    EncodingRange,
    #[error("class metadata mismatch: {0}")]
    SchemaMismatch(&'static str),
}
