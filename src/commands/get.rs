use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

/// Get the value of `key`. If the key does not exist the special value `nil` is returned.
///
/// Ref: <https://redis.io/docs/latest/commands/get/>
#[derive(Debug, PartialEq)]
pub struct Get {
    pub key: Bytes,
}

impl Executable for Get {
    fn exec(self, store: &Store) -> Frame {
        match store.get(&self.key) {
            Some(value) => Frame::Bulk(value),
            None => Frame::Null,
        }
    }
}

impl TryFrom<&mut CommandParser> for Get {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_bytes()?;
        Ok(Self { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;

    #[test]
    fn existing_key() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("GET")),
            Frame::Bulk(Bytes::from("key1")),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Get(Get {
                key: Bytes::from("key1")
            })
        );

        let store = Store::new();
        store.set(Bytes::from("key1"), Bytes::from("1"));

        let result = cmd.exec(&store);

        assert_eq!(result, Frame::Bulk(Bytes::from("1")));
    }

    #[test]
    fn missing_key() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("GET")),
            Frame::Bulk(Bytes::from("key1")),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        let store = Store::new();

        let result = cmd.exec(&store);

        assert_eq!(result, Frame::Null);
    }

    #[test]
    fn value_with_crlf() {
        let store = Store::new();
        store.set(Bytes::from("key1"), Bytes::from("a\r\nb"));

        let result = Get {
            key: Bytes::from("key1"),
        }
        .exec(&store);

        assert_eq!(result.serialize(), b"$4\r\na\r\nb\r\n");
    }

    #[test]
    fn missing_argument() {
        let frame = Frame::Array(vec![Frame::Bulk(Bytes::from("GET"))]);

        let err = Command::try_from(frame).unwrap_err();

        assert_eq!(
            err,
            CommandParserError::WrongNumberOfArguments {
                command: String::from("get")
            }
        );
    }
}
