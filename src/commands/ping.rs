use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

/// Returns PONG if no argument is provided, otherwise return a copy of the argument.
///
/// Ref: <https://redis.io/docs/latest/commands/ping>
#[derive(Debug, PartialEq)]
pub struct Ping {
    pub payload: Option<Bytes>,
}

impl Executable for Ping {
    fn exec(self, _store: &Store) -> Frame {
        let payload = match self.payload {
            Some(payload) => payload,
            None => return Frame::Simple("PONG".to_string()),
        };

        // A status reply can't carry CR or LF, fall back to a bulk string for those.
        match String::from_utf8(payload.to_vec()) {
            Ok(text) if !text.contains(['\r', '\n']) => Frame::Simple(text),
            _ => Frame::Bulk(payload),
        }
    }
}

impl TryFrom<&mut CommandParser> for Ping {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let payload = if parser.has_remaining() {
            Some(parser.next_bytes()?)
        } else {
            None
        };

        Ok(Self { payload })
    }
}
