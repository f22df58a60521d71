use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

/// Sets `field` in the hash stored at `key` to `value`. The hash is created if it doesn't exist.
///
/// Unlike Redis, which replies with the number of fields added, the reply is always `OK`.
///
/// Ref: <https://redis.io/docs/latest/commands/hset/>
#[derive(Debug, PartialEq)]
pub struct HSet {
    pub key: Bytes,
    pub field: Bytes,
    pub value: Bytes,
}

impl Executable for HSet {
    fn exec(self, store: &Store) -> Frame {
        store.hset(self.key, self.field, self.value);

        Frame::Simple("OK".to_string())
    }
}

impl TryFrom<&mut CommandParser> for HSet {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_bytes()?;
        let field = parser.next_bytes()?;
        let value = parser.next_bytes()?;

        Ok(Self { key, field, value })
    }
}
