use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

/// Returns all fields and values of the hash stored at `key`, as a flat array alternating field
/// and value. Order is unspecified. A missing key yields an empty array.
///
/// Ref: <https://redis.io/docs/latest/commands/hgetall/>
#[derive(Debug, PartialEq)]
pub struct HGetAll {
    pub key: Bytes,
}

impl Executable for HGetAll {
    fn exec(self, store: &Store) -> Frame {
        let frames = store
            .hgetall(&self.key)
            .into_iter()
            .flat_map(|(field, value)| [Frame::Bulk(field), Frame::Bulk(value)])
            .collect();

        Frame::Array(frames)
    }
}

impl TryFrom<&mut CommandParser> for HGetAll {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_bytes()?;
        Ok(Self { key })
    }
}
