// https://redis.io/docs/reference/protocol-spec

use std::fmt;

use bytes::Buf;
use bytes::Bytes;
use std::io::Cursor;
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

/// The RESP2 null bulk string. This is the only negative length ever written.
static NULL_BULK: &[u8; 5] = b"$-1\r\n";

/// How many arrays may enclose each other. A request only ever needs one.
pub const MAX_DEPTH: usize = 8;

#[derive(Debug, ThisError, PartialEq)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("protocol error; invalid frame data type: {0}")]
    InvalidDataType(u8),
    #[error("protocol error; unexpected '{0}' frame in a request")]
    UnsupportedDataType(char),
    #[error("protocol error; invalid length {0:?}")]
    InvalidLength(String),
    #[error("protocol error; bulk string is not terminated by CRLF")]
    MissingTerminator,
    #[error("protocol error; arrays nested more than {} deep", MAX_DEPTH)]
    TooDeep,
    #[error("protocol error; bulk length {length} exceeds the limit of {limit}")]
    BulkTooLong { length: usize, limit: usize },
}

/// One unit of the wire protocol.
///
/// Requests are always an `Array` of `Bulk` frames. Replies may use any variant.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

// Protocol specification: https://redis.io/docs/reference/protocol-spec/
impl Frame {
    /// Decodes exactly one frame starting at the cursor position, leaving the cursor on the first
    /// byte of the next frame. `Error::Incomplete` means more bytes are needed; the cursor position
    /// is meaningless in that case.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        Self::parse_limited(src, usize::MAX)
    }

    /// Like [`Frame::parse`], but a bulk string declaring more than `max_bulk_len` bytes is
    /// rejected as soon as its header is read, without waiting for the payload.
    pub fn parse_limited(src: &mut Cursor<&[u8]>, max_bulk_len: usize) -> Result<Self, Error> {
        parse_frame(src, max_bulk_len, 0)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes);
        bytes
    }

    fn write_to(&self, bytes: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => {
                bytes.push(u8::from(DataType::SimpleString));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
            }
            Frame::Error(s) => {
                bytes.push(u8::from(DataType::SimpleError));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
            }
            Frame::Bulk(data) => {
                bytes.push(u8::from(DataType::BulkString));
                bytes.extend_from_slice(data.len().to_string().as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes.extend_from_slice(data);
                bytes.extend_from_slice(CRLF);
            }
            Frame::Null => bytes.extend_from_slice(NULL_BULK),
            Frame::Array(arr) => {
                bytes.push(u8::from(DataType::Array));
                bytes.extend_from_slice(arr.len().to_string().as_bytes());
                bytes.extend_from_slice(CRLF);
                for frame in arr {
                    frame.write_to(bytes);
                }
            }
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(arr) => {
                write!(f, "*{}", arr.len())?;
                for frame in arr {
                    write!(f, " {}", frame)?;
                }
                Ok(())
            }
        }
    }
}

fn parse_frame(src: &mut Cursor<&[u8]>, max_bulk_len: usize, depth: usize) -> Result<Frame, Error> {
    // The first byte in an RESP-serialized payload always identifies its type.
    // Subsequent bytes constitute the type's contents.
    let first_byte = get_byte(src)?;
    let data_type = DataType::try_from(first_byte)?;

    match data_type {
        // $<length>\r\n<data>\r\n
        DataType::BulkString => {
            let length = get_length(src)?;

            if length == -1 {
                return Ok(Frame::Null);
            }

            let length =
                usize::try_from(length).map_err(|_| Error::InvalidLength(length.to_string()))?;

            if length > max_bulk_len {
                return Err(Error::BulkTooLong {
                    length,
                    limit: max_bulk_len,
                });
            }

            let data = get_exact_bytes(src, length)?;
            let data = Bytes::copy_from_slice(data);

            match get_exact_bytes(src, CRLF.len())? {
                terminator if terminator == CRLF => Ok(Frame::Bulk(data)),
                _ => Err(Error::MissingTerminator),
            }
        }
        // *<number-of-elements>\r\n<element-1>...<element-n>
        DataType::Array => {
            // Each level is a stack frame, the peer must not decide how many.
            if depth == MAX_DEPTH {
                return Err(Error::TooDeep);
            }

            let length = get_length(src)?;
            let length =
                usize::try_from(length).map_err(|_| Error::InvalidLength(length.to_string()))?;

            // The length comes from the peer, don't trust it for the allocation.
            let mut frames = Vec::with_capacity(length.min(64));
            for _ in 0..length {
                let frame = parse_frame(src, max_bulk_len, depth + 1)?;
                frames.push(frame);
            }

            Ok(Frame::Array(frames))
        }
        data_type => Err(Error::UnsupportedDataType(u8::from(data_type) as char)),
    }
}

/// Longest length line accepted, enough for any `i64`.
const MAX_LENGTH_LINE: usize = 20;

/// Reads a length line and returns it without the terminator. Gives up after
/// `MAX_LENGTH_LINE` bytes instead of scanning the whole buffer for a CRLF.
fn get_length_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();
    let rest = buf.get(start..).ok_or(Error::Incomplete)?;
    let window = &rest[..rest.len().min(MAX_LENGTH_LINE + CRLF.len())];

    let line_end = match window.windows(2).position(|pair| pair == CRLF) {
        Some(index) => start + index,
        None if window.len() > MAX_LENGTH_LINE + 1 => {
            let line = &window[..MAX_LENGTH_LINE];
            return Err(Error::InvalidLength(String::from_utf8_lossy(line).into_owned()));
        }
        None => return Err(Error::Incomplete),
    };

    src.set_position((line_end + CRLF.len()) as u64);

    Ok(&buf[start..line_end])
}

fn get_length(src: &mut Cursor<&[u8]>) -> Result<i64, Error> {
    let line = get_length_line(src)?;

    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::InvalidLength(String::from_utf8_lossy(line).into_owned()))
}

fn get_exact_bytes<'a>(src: &mut Cursor<&'a [u8]>, len: usize) -> Result<&'a [u8], Error> {
    if src.remaining() < len {
        return Err(Error::Incomplete);
    }

    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();
    src.advance(len);

    Ok(&buf[start..start + len])
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &[u8]) -> Result<Frame, Error> {
        let mut cursor = Cursor::new(data);
        Frame::parse(&mut cursor)
    }

    #[test]
    fn parse_bulk_string_frame() {
        let frame = parse(b"$6\r\nfoobar\r\n");

        assert_eq!(frame, Ok(Frame::Bulk(Bytes::from("foobar"))));
    }

    #[test]
    fn parse_bulk_string_frame_empty() {
        let frame = parse(b"$0\r\n\r\n");

        assert_eq!(frame, Ok(Frame::Bulk(Bytes::new())));
    }

    #[test]
    fn parse_bulk_string_frame_with_crlf_in_payload() {
        let frame = parse(b"$8\r\nfoo\r\nbar\r\n");

        assert_eq!(frame, Ok(Frame::Bulk(Bytes::from("foo\r\nbar"))));
    }

    #[test]
    fn parse_bulk_string_frame_null() {
        let frame = parse(b"$-1\r\n");

        assert_eq!(frame, Ok(Frame::Null));
    }

    #[test]
    fn parse_bulk_string_frame_negative_length() {
        let frame = parse(b"$-2\r\n");

        assert_eq!(frame, Err(Error::InvalidLength("-2".to_string())));
    }

    #[test]
    fn parse_bulk_string_frame_missing_terminator() {
        let frame = parse(b"$3\r\nfooXY");

        assert_eq!(frame, Err(Error::MissingTerminator));
    }

    #[test]
    fn parse_bulk_string_frame_short_payload() {
        let frame = parse(b"$10\r\nabc");

        assert_eq!(frame, Err(Error::Incomplete));
    }

    #[test]
    fn parse_array_frame_empty() {
        let frame = parse(b"*0\r\n");

        assert_eq!(frame, Ok(Frame::Array(vec![])));
    }

    #[test]
    fn parse_array_frame() {
        let frame = parse(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");

        assert_eq!(
            frame,
            Ok(Frame::Array(vec![
                Frame::Bulk(Bytes::from("SET")),
                Frame::Bulk(Bytes::from("foo")),
                Frame::Bulk(Bytes::from("bar")),
            ]))
        );
    }

    #[test]
    fn parse_array_frame_nested() {
        let frame = parse(b"*2\r\n*1\r\n$1\r\na\r\n$-1\r\n");

        assert_eq!(
            frame,
            Ok(Frame::Array(vec![
                Frame::Array(vec![Frame::Bulk(Bytes::from("a"))]),
                Frame::Null,
            ]))
        );
    }

    #[test]
    fn parse_array_frame_max_depth() {
        let mut data = b"*1\r\n".repeat(MAX_DEPTH - 1);
        data.extend_from_slice(b"*0\r\n");

        let mut expected = Frame::Array(vec![]);
        for _ in 1..MAX_DEPTH {
            expected = Frame::Array(vec![expected]);
        }

        assert_eq!(parse(&data), Ok(expected));
    }

    #[test]
    fn parse_array_frame_too_deep() {
        let data = b"*1\r\n".repeat(MAX_DEPTH + 1);

        assert_eq!(parse(&data), Err(Error::TooDeep));
    }

    #[test]
    fn parse_array_frame_too_deep_without_stack_overflow() {
        let data = b"*1\r\n".repeat(200_000);

        assert_eq!(parse(&data), Err(Error::TooDeep));
    }

    #[test]
    fn parse_limited_rejects_long_bulk_header() {
        let mut cursor = Cursor::new(&b"*2\r\n$3\r\nSET\r\n$1000\r\n"[..]);

        assert_eq!(
            Frame::parse_limited(&mut cursor, 512),
            Err(Error::BulkTooLong {
                length: 1000,
                limit: 512
            })
        );
    }

    #[test]
    fn parse_limited_accepts_bulk_at_limit() {
        let mut cursor = Cursor::new(&b"$3\r\nfoo\r\n"[..]);

        assert_eq!(
            Frame::parse_limited(&mut cursor, 3),
            Ok(Frame::Bulk(Bytes::from("foo")))
        );
    }

    #[test]
    fn parse_array_frame_invalid_length() {
        let frame = parse(b"*abc\r\n");

        assert_eq!(frame, Err(Error::InvalidLength("abc".to_string())));
    }

    #[test]
    fn parse_length_line_without_terminator() {
        assert_eq!(parse(b"$12345"), Err(Error::Incomplete));
        assert_eq!(
            parse(&[b'$'; 64]),
            Err(Error::InvalidLength("$".repeat(MAX_LENGTH_LINE)))
        );
    }

    #[test]
    fn parse_array_frame_incomplete() {
        let frame = parse(b"*2\r\n$3\r\nfoo\r\n");

        assert_eq!(frame, Err(Error::Incomplete));
    }

    #[test]
    fn parse_leaves_cursor_at_next_frame() {
        let data = b"$1\r\na\r\n$1\r\nb\r\n";
        let mut cursor = Cursor::new(&data[..]);

        assert_eq!(Frame::parse(&mut cursor), Ok(Frame::Bulk(Bytes::from("a"))));
        assert_eq!(cursor.position(), 7);
        assert_eq!(Frame::parse(&mut cursor), Ok(Frame::Bulk(Bytes::from("b"))));
    }

    #[test]
    fn parse_rejects_reply_only_types() {
        assert_eq!(parse(b"+OK\r\n"), Err(Error::UnsupportedDataType('+')));
        assert_eq!(parse(b"-ERR\r\n"), Err(Error::UnsupportedDataType('-')));
    }

    #[test]
    fn parse_rejects_unknown_type() {
        assert_eq!(parse(b":1\r\n"), Err(Error::InvalidDataType(b':')));
    }

    #[test]
    fn serialize_replies() {
        assert_eq!(Frame::Simple("OK".to_string()).serialize(), b"+OK\r\n");
        assert_eq!(Frame::Error("ERR boom".to_string()).serialize(), b"-ERR boom\r\n");
        assert_eq!(Frame::Bulk(Bytes::from("v1")).serialize(), b"$2\r\nv1\r\n");
        assert_eq!(Frame::Null.serialize(), b"$-1\r\n");
        assert_eq!(Frame::Array(vec![]).serialize(), b"*0\r\n");
    }

    #[test]
    fn set_command_bytes_round_trip() {
        let data = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";

        let frame = parse(data).unwrap();

        assert_eq!(frame.serialize(), data.to_vec());
    }

    #[test]
    fn nested_frame_round_trip() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("HSET")),
            Frame::Array(vec![Frame::Null, Frame::Bulk(Bytes::from_static(b"\x00\r\n"))]),
            Frame::Bulk(Bytes::new()),
        ]);

        let bytes = frame.serialize();

        assert_eq!(parse(&bytes), Ok(frame));
    }
}
