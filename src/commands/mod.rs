pub mod executable;
pub mod get;
pub mod hget;
pub mod hgetall;
pub mod hset;
pub mod ping;
pub mod set;

use bytes::Bytes;
use std::{str, vec};
use strum_macros::{AsRefStr, EnumString};
use thiserror::Error as ThisError;
use tracing::warn;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::Store;

use get::Get;
use hget::HGet;
use hgetall::HGetAll;
use hset::HSet;
use ping::Ping;
use set::Set;

/// The command table. Names are matched after uppercasing the first element of the request.
#[derive(Debug, Clone, Copy, PartialEq, EnumString, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum CommandName {
    Ping,
    Get,
    Set,
    HSet,
    HGet,
    HGetAll,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Get(Get),
    HGet(HGet),
    HGetAll(HGetAll),
    HSet(HSet),
    Ping(Ping),
    Set(Set),
}

impl Command {
    /// Whether running the command changes the store. Only these are appended to the log.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Command::Set(_) | Command::HSet(_))
    }
}

impl Executable for Command {
    fn exec(self, store: &Store) -> Frame {
        match self {
            Command::Get(cmd) => cmd.exec(store),
            Command::HGet(cmd) => cmd.exec(store),
            Command::HGetAll(cmd) => cmd.exec(store),
            Command::HSet(cmd) => cmd.exec(store),
            Command::Ping(cmd) => cmd.exec(store),
            Command::Set(cmd) => cmd.exec(store),
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = CommandParserError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the Redis server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(CommandParserError::InvalidFrame {
                    expected: "array".to_string(),
                    actual: frame,
                })
            }
        };

        let mut parts = frames.into_iter();
        let command_name = match parts.next() {
            Some(frame) => frame_to_string(frame)?.to_uppercase(),
            None => return Err(CommandParserError::EmptyCommand),
        };

        let name = command_name
            .parse::<CommandName>()
            .map_err(|_| CommandParserError::UnknownCommand {
                command: command_name,
            })?;

        let parser = &mut CommandParser { name, parts };

        let command = match name {
            CommandName::Get => Get::try_from(&mut *parser).map(Command::Get),
            CommandName::HGet => HGet::try_from(&mut *parser).map(Command::HGet),
            CommandName::HGetAll => HGetAll::try_from(&mut *parser).map(Command::HGetAll),
            CommandName::HSet => HSet::try_from(&mut *parser).map(Command::HSet),
            CommandName::Ping => Ping::try_from(&mut *parser).map(Command::Ping),
            CommandName::Set => Set::try_from(&mut *parser).map(Command::Set),
        }?;

        parser.finish()?;

        Ok(command)
    }
}

/// The result of running one request through the command table.
#[derive(Debug, PartialEq)]
pub struct Dispatch {
    pub reply: Frame,
    /// The request changed the store and belongs in the append-only log.
    pub mutating: bool,
}

/// Parses `frame` into a command and runs it against `store`. Requests that can't be turned into
/// a command still produce a reply, see [`CommandParserError::into_reply`].
///
/// Both live connections and log replay go through here.
pub fn dispatch(frame: Frame, store: &Store) -> Dispatch {
    match Command::try_from(frame) {
        Ok(cmd) => {
            let mutating = cmd.is_mutating();
            let reply = cmd.exec(store);
            Dispatch { reply, mutating }
        }
        Err(err) => {
            warn!(%err, "rejected command");
            Dispatch {
                reply: err.into_reply(),
                mutating: false,
            }
        }
    }
}

pub(crate) struct CommandParser {
    name: CommandName,
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    pub(crate) fn has_remaining(&self) -> bool {
        self.parts.len() > 0
    }

    /// Keys, fields and values are all taken verbatim; only the command name has to be UTF-8.
    pub(crate) fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        match self.next_frame()? {
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_frame(&mut self) -> Result<Frame, CommandParserError> {
        self.parts
            .next()
            .ok_or_else(|| self.wrong_number_of_arguments())
    }

    /// Every command takes a fixed number of arguments; anything left over is an arity error.
    fn finish(&mut self) -> Result<(), CommandParserError> {
        if self.has_remaining() {
            return Err(self.wrong_number_of_arguments());
        }
        Ok(())
    }

    fn wrong_number_of_arguments(&self) -> CommandParserError {
        CommandParserError::WrongNumberOfArguments {
            command: self.name.as_ref().to_lowercase(),
        }
    }
}

fn frame_to_string(frame: Frame) -> Result<String, CommandParserError> {
    match frame {
        Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
            .map(|s| s.to_string())
            .map_err(CommandParserError::InvalidUTF8String),
        frame => Err(CommandParserError::InvalidFrame {
            expected: "bulk string".to_string(),
            actual: frame,
        }),
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("protocol error; invalid frame, expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("protocol error; empty command")]
    EmptyCommand,
    #[error("unknown command '{command}'")]
    UnknownCommand { command: String },
    #[error("wrong number of arguments for '{command}' command")]
    WrongNumberOfArguments { command: String },
    #[error("protocol error; invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
}

impl CommandParserError {
    /// The frame sent back to the client in place of a command result.
    pub fn into_reply(self) -> Frame {
        match self {
            // Unknown commands get an empty status reply rather than an error.
            CommandParserError::UnknownCommand { .. } => Frame::Simple(String::new()),
            err => Frame::Error(format!("ERR {}", err)),
        }
    }
}
