// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Swiofrog is a tiny programmer and terminal for the WCH CH32V003.
//!
//! swiofrog-bin - Swiofrog's session command protocol shared server/client
//! constants and types
//!
//! The protocol is line based.  Each request is a single line of the form
//!
//! ```text
//! #<command>[;<arg>]*
//! ```
//!
//! and is answered with exactly one reply line, `#<code>;<message>`.  The
//! server may also send unsolicited lines at any time:
//!
//! - `!<source>;<message>` - an event, for example `!flasher;Will flash`
//! - `><text>` - text output by the target's terminal
//!
//! Numeric arguments are decimal, or hex with a `0x` prefix.  The upload
//! command `#w` is followed by the raw binary payload of the declared size,
//! which may be split across several chunks.
//!
//! This crate is `no_std` and platform agnostic.

#![no_std]

extern crate alloc;
use alloc::format;
use alloc::string::{String, ToString};
use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

/// Leading character of every request and reply line
pub const REQUEST_PREFIX: char = '#';

/// Leading character of every event line
pub const EVENT_PREFIX: char = '!';

/// Leading character of every terminal output line
pub const TERMINAL_PREFIX: char = '>';

/// Separates the command and its arguments
pub const SEPARATOR: char = ';';

/// Protocol command letters
pub const CMD_REBOOT: u8 = b'b';
pub const CMD_BOOTLOADER: u8 = b'l';
pub const CMD_RESUME: u8 = b'c';
pub const CMD_HALT_RESET: u8 = b'h';
pub const CMD_HALT_NO_RESET: u8 = b'p';
pub const CMD_HALT_MODE: u8 = b'd';
pub const CMD_REG_WRITE: u8 = b's';
pub const CMD_REG_READ: u8 = b'm';
pub const CMD_UPLOAD: u8 = b'w';
pub const CMD_READ: u8 = b'r';
pub const CMD_UNBRICK: u8 = b'u';
pub const CMD_CHIP_INFO: u8 = b'i';
pub const CMD_STATUS: u8 = b'q';
pub const CMD_TERMINAL_ATTACH: u8 = b't';
pub const CMD_TERMINAL_DETACH: u8 = b'x';
pub const CMD_KEYS: u8 = b'k';
pub const CMD_GET_SETTINGS: u8 = b'g';
pub const CMD_SET_SETTINGS: u8 = b'j';

/// Reply codes
pub const RSP_OK: u8 = 0;
pub const RSP_ERR_BUSY: u8 = 1;
pub const RSP_ERR_INIT: u8 = 2;
pub const RSP_ERR_MISSING: u8 = 3;
pub const RSP_ERR_RANGE: u8 = 4;
pub const RSP_ERR_SIZE: u8 = 5;
pub const RSP_ERR_UNIMPLEMENTED: u8 = 6;
pub const RSP_ERR_UNKNOWN: u8 = 7;
pub const RSP_ERR_TARGET: u8 = 8;

/// Largest value accepted as a debug module register address (7 bits)
pub const MAX_REG: u8 = 0x7F;

/// Single letter command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Reboot = CMD_REBOOT,
    Bootloader = CMD_BOOTLOADER,
    Resume = CMD_RESUME,
    HaltReset = CMD_HALT_RESET,
    HaltNoReset = CMD_HALT_NO_RESET,
    HaltMode = CMD_HALT_MODE,
    RegWrite = CMD_REG_WRITE,
    RegRead = CMD_REG_READ,
    Upload = CMD_UPLOAD,
    Read = CMD_READ,
    Unbrick = CMD_UNBRICK,
    ChipInfo = CMD_CHIP_INFO,
    Status = CMD_STATUS,
    TerminalAttach = CMD_TERMINAL_ATTACH,
    TerminalDetach = CMD_TERMINAL_DETACH,
    Keys = CMD_KEYS,
    GetSettings = CMD_GET_SETTINGS,
    SetSettings = CMD_SET_SETTINGS,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Reboot => write!(f, "Reboot"),
            Command::Bootloader => write!(f, "Reboot to Bootloader"),
            Command::Resume => write!(f, "Resume"),
            Command::HaltReset => write!(f, "Halt and Reset"),
            Command::HaltNoReset => write!(f, "Halt"),
            Command::HaltMode => write!(f, "Halt Mode"),
            Command::RegWrite => write!(f, "Register Write"),
            Command::RegRead => write!(f, "Register Read"),
            Command::Upload => write!(f, "Upload"),
            Command::Read => write!(f, "Read"),
            Command::Unbrick => write!(f, "Unbrick"),
            Command::ChipInfo => write!(f, "Chip Info"),
            Command::Status => write!(f, "Status"),
            Command::TerminalAttach => write!(f, "Terminal Attach"),
            Command::TerminalDetach => write!(f, "Terminal Detach"),
            Command::Keys => write!(f, "Keys"),
            Command::GetSettings => write!(f, "Get Settings"),
            Command::SetSettings => write!(f, "Set Settings"),
        }
    }
}

impl Command {
    /// Converts a Command to its byte representation
    ///
    /// Returns:
    /// - `u8`: The ASCII letter of the command.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Convert a command letter to a `Command` enum variant
    ///
    /// Arguments:
    /// - `cmd`: The ASCII command letter to convert.
    ///
    /// Returns:
    /// - `Ok(Command)`: If the command letter is recognized.
    /// - `Err(ProtocolError::Command)`: If the command letter is not
    ///   recognized.
    pub fn from_byte(cmd: u8) -> Result<Self, ProtocolError> {
        match cmd {
            CMD_REBOOT => Ok(Self::Reboot),
            CMD_BOOTLOADER => Ok(Self::Bootloader),
            CMD_RESUME => Ok(Self::Resume),
            CMD_HALT_RESET => Ok(Self::HaltReset),
            CMD_HALT_NO_RESET => Ok(Self::HaltNoReset),
            CMD_HALT_MODE => Ok(Self::HaltMode),
            CMD_REG_WRITE => Ok(Self::RegWrite),
            CMD_REG_READ => Ok(Self::RegRead),
            CMD_UPLOAD => Ok(Self::Upload),
            CMD_READ => Ok(Self::Read),
            CMD_UNBRICK => Ok(Self::Unbrick),
            CMD_CHIP_INFO => Ok(Self::ChipInfo),
            CMD_STATUS => Ok(Self::Status),
            CMD_TERMINAL_ATTACH => Ok(Self::TerminalAttach),
            CMD_TERMINAL_DETACH => Ok(Self::TerminalDetach),
            CMD_KEYS => Ok(Self::Keys),
            CMD_GET_SETTINGS => Ok(Self::GetSettings),
            CMD_SET_SETTINGS => Ok(Self::SetSettings),
            _ => Err(ProtocolError::Command(cmd)),
        }
    }
}

/// Numeric reply codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    Ok = RSP_OK,
    Busy = RSP_ERR_BUSY,
    InitFailed = RSP_ERR_INIT,
    MissingParam = RSP_ERR_MISSING,
    OutOfRange = RSP_ERR_RANGE,
    SizeMismatch = RSP_ERR_SIZE,
    Unimplemented = RSP_ERR_UNIMPLEMENTED,
    Unknown = RSP_ERR_UNKNOWN,
    Target = RSP_ERR_TARGET,
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyCode::Ok => write!(f, "OK"),
            ReplyCode::Busy => write!(f, "Busy"),
            ReplyCode::InitFailed => write!(f, "Init Failed"),
            ReplyCode::MissingParam => write!(f, "Missing Parameter"),
            ReplyCode::OutOfRange => write!(f, "Out Of Range"),
            ReplyCode::SizeMismatch => write!(f, "Size Mismatch"),
            ReplyCode::Unimplemented => write!(f, "Unimplemented"),
            ReplyCode::Unknown => write!(f, "Unknown Command"),
            ReplyCode::Target => write!(f, "Target Error"),
        }
    }
}

impl ReplyCode {
    /// Convert a reply code byte to a `ReplyCode`
    ///
    /// Returns:
    /// - `Some(ReplyCode)`: If the byte is a known code.
    /// - `None`: Otherwise.
    pub fn from_byte(code: u8) -> Option<Self> {
        match code {
            RSP_OK => Some(Self::Ok),
            RSP_ERR_BUSY => Some(Self::Busy),
            RSP_ERR_INIT => Some(Self::InitFailed),
            RSP_ERR_MISSING => Some(Self::MissingParam),
            RSP_ERR_RANGE => Some(Self::OutOfRange),
            RSP_ERR_SIZE => Some(Self::SizeMismatch),
            RSP_ERR_UNIMPLEMENTED => Some(Self::Unimplemented),
            RSP_ERR_UNKNOWN => Some(Self::Unknown),
            RSP_ERR_TARGET => Some(Self::Target),
            _ => None,
        }
    }
}

/// Type used to represent errors that can occur parsing a request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line did not start with [`REQUEST_PREFIX`]
    Prefix,

    /// Invalid command letter received
    Command(u8),

    /// A required parameter was absent or empty.  Contains the parameter
    /// name.
    MissingArg(&'static str),

    /// A parameter could not be parsed, or was outside its range.  Contains
    /// the parameter name.
    Arg(&'static str),
}

impl ProtocolError {
    /// The reply code used to report this error
    pub fn reply_code(&self) -> ReplyCode {
        match self {
            ProtocolError::Prefix | ProtocolError::Command(_) => ReplyCode::Unknown,
            ProtocolError::MissingArg(_) => ReplyCode::MissingParam,
            ProtocolError::Arg(_) => ReplyCode::OutOfRange,
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Prefix => write!(f, "Unknown command"),
            ProtocolError::Command(cmd) => {
                if cmd.is_ascii_graphic() {
                    write!(f, "Unknown command: {}", *cmd as char)
                } else {
                    write!(f, "Unknown command: 0x{cmd:02X}")
                }
            }
            ProtocolError::MissingArg(name) => write!(f, "{name} parameter missing."),
            ProtocolError::Arg(name) => write!(f, "{name} parameter invalid."),
        }
    }
}

/// Represents a request that can be made over the command protocol.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Op {
    Reboot,
    Bootloader,
    Resume,
    HaltAndReset,
    HaltNoReset,
    HaltMode {
        mode: u8,
    },
    RegWrite {
        reg: u8,
        value: u32,
    },
    RegRead {
        reg: u8,
    },
    Upload {
        offset: u32,
        size: u32,
        retries: u8,
        name: Option<String>,
    },
    Read {
        offset: u32,
        size: u32,
    },
    Unbrick,
    ChipInfo,
    Status,
    TerminalAttach,
    TerminalDetach,
    Keys {
        text: String,
    },
    GetSettings,
    SetSettings {
        json: String,
    },
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            match self {
                Op::HaltMode { mode } => write!(f, "HaltMode(mode={mode})"),
                Op::RegWrite { reg, value } => {
                    write!(f, "RegWrite(reg=0x{reg:02X}, value=0x{value:08X})")
                }
                Op::RegRead { reg } => write!(f, "RegRead(reg=0x{reg:02X})"),
                Op::Upload {
                    offset,
                    size,
                    retries,
                    name,
                } => write!(
                    f,
                    "Upload(offset=0x{offset:08X}, size={size}, retries={retries}, name={name:?})"
                ),
                Op::Read { offset, size } => {
                    write!(f, "Read(offset=0x{offset:08X}, size={size})")
                }
                Op::Keys { text } => write!(f, "Keys(len={})", text.len()),
                Op::SetSettings { json } => write!(f, "SetSettings({json})"),
                other => write!(f, "{}", other.command()),
            }
        } else {
            write!(f, "{}", self.command())
        }
    }
}

// Public Op methods
impl Op {
    /// The command letter used to send this request.
    pub fn command(&self) -> Command {
        match self {
            Op::Reboot => Command::Reboot,
            Op::Bootloader => Command::Bootloader,
            Op::Resume => Command::Resume,
            Op::HaltAndReset => Command::HaltReset,
            Op::HaltNoReset => Command::HaltNoReset,
            Op::HaltMode { .. } => Command::HaltMode,
            Op::RegWrite { .. } => Command::RegWrite,
            Op::RegRead { .. } => Command::RegRead,
            Op::Upload { .. } => Command::Upload,
            Op::Read { .. } => Command::Read,
            Op::Unbrick => Command::Unbrick,
            Op::ChipInfo => Command::ChipInfo,
            Op::Status => Command::Status,
            Op::TerminalAttach => Command::TerminalAttach,
            Op::TerminalDetach => Command::TerminalDetach,
            Op::Keys { .. } => Command::Keys,
            Op::GetSettings => Command::GetSettings,
            Op::SetSettings { .. } => Command::SetSettings,
        }
    }

    /// Used by a swiofrog server to parse a complete request line received
    /// from a client.
    ///
    /// Arguments:
    /// - `line`: The request, with or without a trailing line ending.
    ///
    /// Returns:
    /// - `Ok(Self)`: If the request was successfully parsed.
    /// - `Err(ProtocolError)`: If the request is malformed.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let body = line
            .strip_prefix(REQUEST_PREFIX)
            .ok_or(ProtocolError::Prefix)?;
        let cmd = *body.as_bytes().first().ok_or(ProtocolError::Prefix)?;
        let command = Command::from_byte(cmd)?;
        trace!("Received command: {command}");

        let rest = &body[1..];
        let rest = match rest.strip_prefix(SEPARATOR) {
            Some(rest) => rest,
            None if rest.is_empty() => "",
            None => return Err(ProtocolError::Command(cmd)),
        };

        let mut args = Args::new(rest);
        let op = match command {
            Command::Reboot => Op::Reboot,
            Command::Bootloader => Op::Bootloader,
            Command::Resume => Op::Resume,
            Command::HaltReset => Op::HaltAndReset,
            Command::HaltNoReset => Op::HaltNoReset,
            Command::HaltMode => {
                let mode = args.required("Mode")?;
                let mode = u8::try_from(mode).map_err(|_| ProtocolError::Arg("Mode"))?;
                Op::HaltMode { mode }
            }
            Command::RegWrite => {
                let reg = Self::parse_reg(args.required("Register")?)?;
                let value = args.required("Value")?;
                Op::RegWrite { reg, value }
            }
            Command::RegRead => {
                let reg = Self::parse_reg(args.required("Register")?)?;
                Op::RegRead { reg }
            }
            Command::Upload => {
                // Size is reported missing in preference to offset
                let offset = args.optional("Offset")?;
                let size = args.optional("Size")?.ok_or(ProtocolError::MissingArg("Size"))?;
                let offset = offset.ok_or(ProtocolError::MissingArg("Offset"))?;
                let retries = match args.optional("Retries")? {
                    Some(retries) => {
                        u8::try_from(retries).map_err(|_| ProtocolError::Arg("Retries"))?
                    }
                    None => 0,
                };
                let name = args.text();
                Op::Upload {
                    offset,
                    size,
                    retries,
                    name,
                }
            }
            Command::Read => {
                let offset = args.required("Offset")?;
                let size = args.required("Size")?;
                Op::Read { offset, size }
            }
            Command::Unbrick => Op::Unbrick,
            Command::ChipInfo => Op::ChipInfo,
            Command::Status => Op::Status,
            Command::TerminalAttach => Op::TerminalAttach,
            Command::TerminalDetach => Op::TerminalDetach,
            Command::GetSettings => Op::GetSettings,
            Command::Keys => Op::Keys {
                text: rest.to_string(),
            },
            Command::SetSettings => Op::SetSettings {
                json: rest.to_string(),
            },
        };
        Ok(op)
    }

    /// Used by a swiofrog client to build the request line for this
    /// operation, without a line ending.
    pub fn to_line(&self) -> String {
        let cmd = self.command().to_byte() as char;
        match self {
            Op::HaltMode { mode } => format!("{REQUEST_PREFIX}{cmd};{mode}"),
            Op::RegWrite { reg, value } => format!("{REQUEST_PREFIX}{cmd};{reg};{value}"),
            Op::RegRead { reg } => format!("{REQUEST_PREFIX}{cmd};{reg}"),
            Op::Upload {
                offset,
                size,
                retries,
                name,
            } => match name {
                Some(name) => {
                    format!("{REQUEST_PREFIX}{cmd};0x{offset:08X};{size};{retries};{name}")
                }
                None => format!("{REQUEST_PREFIX}{cmd};0x{offset:08X};{size};{retries}"),
            },
            Op::Read { offset, size } => format!("{REQUEST_PREFIX}{cmd};0x{offset:08X};{size}"),
            Op::Keys { text } => format!("{REQUEST_PREFIX}{cmd};{text}"),
            Op::SetSettings { json } => format!("{REQUEST_PREFIX}{cmd};{json}"),
            _ => format!("{REQUEST_PREFIX}{cmd}"),
        }
    }
}

// Internal Op methods
impl Op {
    fn parse_reg(reg: u32) -> Result<u8, ProtocolError> {
        match u8::try_from(reg) {
            Ok(reg) if reg <= MAX_REG => Ok(reg),
            _ => {
                debug!("Invalid register: {reg}");
                Err(ProtocolError::Arg("Register"))
            }
        }
    }
}

/// Parse a numeric argument, either decimal or `0x` prefixed hex.
///
/// Returns:
/// - `Some(u32)`: The parsed value.
/// - `None`: If the argument isn't a valid number.
pub fn parse_number(arg: &str) -> Option<u32> {
    let arg = arg.trim();
    if let Some(hex) = arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        arg.parse::<u32>().ok()
    }
}

// Positional argument iterator over the remainder of a request line
struct Args<'a> {
    rest: Option<&'a str>,
}

impl<'a> Args<'a> {
    fn new(rest: &'a str) -> Self {
        let rest = if rest.is_empty() { None } else { Some(rest) };
        Self { rest }
    }

    fn next_raw(&mut self) -> Option<&'a str> {
        let rest = self.rest?;
        match rest.split_once(SEPARATOR) {
            Some((arg, remaining)) => {
                self.rest = Some(remaining);
                Some(arg)
            }
            None => {
                self.rest = None;
                Some(rest)
            }
        }
    }

    fn optional(&mut self, name: &'static str) -> Result<Option<u32>, ProtocolError> {
        match self.next_raw() {
            None => Ok(None),
            Some(arg) if arg.trim().is_empty() => Ok(None),
            Some(arg) => parse_number(arg).map(Some).ok_or_else(|| {
                debug!("Invalid {name} argument: {arg}");
                ProtocolError::Arg(name)
            }),
        }
    }

    fn required(&mut self, name: &'static str) -> Result<u32, ProtocolError> {
        self.optional(name)?.ok_or(ProtocolError::MissingArg(name))
    }

    fn text(&mut self) -> Option<String> {
        self.rest
            .take()
            .filter(|rest| !rest.is_empty())
            .map(|rest| rest.to_string())
    }
}

/// A reply to a single request, sent as `#<code>;<message>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: ReplyCode,
    pub message: String,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            code: ReplyCode::Ok,
            message: message.into(),
        }
    }

    pub fn error(code: ReplyCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ReplyCode::Ok
    }

    /// Used by a swiofrog client to parse a reply line.
    ///
    /// Returns:
    /// - `Some(Reply)`: If the line is a well formed reply.
    /// - `None`: Otherwise, including event and terminal lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let body = line.strip_prefix(REQUEST_PREFIX)?;
        let (code, message) = match body.split_once(SEPARATOR) {
            Some((code, message)) => (code, message),
            None => (body, ""),
        };
        let code = ReplyCode::from_byte(code.parse::<u8>().ok()?)?;
        Some(Self::error(code, message))
    }
}

impl From<ProtocolError> for Reply {
    fn from(e: ProtocolError) -> Self {
        Reply::error(e.reply_code(), e.to_string())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{REQUEST_PREFIX}{}{SEPARATOR}{}",
            self.code as u8, self.message
        )
    }
}

/// Originator of an unsolicited event line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Flasher,
    Terminal,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::Flasher => write!(f, "flasher"),
            EventSource::Terminal => write!(f, "terminal"),
        }
    }
}

/// An unsolicited event, sent as `!<source>;<message>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub source: EventSource,
    pub message: String,
}

impl Event {
    pub fn flasher(message: impl Into<String>) -> Self {
        Self {
            source: EventSource::Flasher,
            message: message.into(),
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            source: EventSource::Terminal,
            message: message.into(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{EVENT_PREFIX}{}{SEPARATOR}{}", self.source, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_register_commands() {
        assert_eq!(
            Op::parse("#s;17;1234"),
            Ok(Op::RegWrite {
                reg: 17,
                value: 1234
            })
        );
        assert_eq!(Op::parse("#m;0x11\r\n"), Ok(Op::RegRead { reg: 0x11 }));
        assert_eq!(
            Op::parse("#m;128"),
            Err(ProtocolError::Arg("Register"))
        );
        assert_eq!(Op::parse("#m"), Err(ProtocolError::MissingArg("Register")));
    }

    #[test]
    fn parses_upload() {
        assert_eq!(
            Op::parse("#w;0x08000000;64"),
            Ok(Op::Upload {
                offset: 0x0800_0000,
                size: 64,
                retries: 0,
                name: None
            })
        );
        assert_eq!(
            Op::parse("#w;0;100;3;blink;v2.bin"),
            Ok(Op::Upload {
                offset: 0,
                size: 100,
                retries: 3,
                name: Some("blink;v2.bin".into())
            })
        );
        assert_eq!(Op::parse("#w"), Err(ProtocolError::MissingArg("Size")));
        assert_eq!(Op::parse("#w;;64"), Err(ProtocolError::MissingArg("Offset")));
        assert_eq!(Op::parse("#w;0;zz"), Err(ProtocolError::Arg("Size")));
    }

    #[test]
    fn parses_simple_and_text_commands() {
        assert_eq!(Op::parse("#b"), Ok(Op::Reboot));
        assert_eq!(Op::parse("#l"), Ok(Op::Bootloader));
        assert_eq!(Op::parse("#p"), Ok(Op::HaltNoReset));
        assert_eq!(Op::parse("#d;5"), Ok(Op::HaltMode { mode: 5 }));
        assert_eq!(
            Op::parse("#k;ls;pwd"),
            Ok(Op::Keys {
                text: "ls;pwd".into()
            })
        );
        assert_eq!(Op::parse("#z"), Err(ProtocolError::Command(b'z')));
        assert_eq!(Op::parse("b"), Err(ProtocolError::Prefix));
        assert_eq!(Op::parse("#bx"), Err(ProtocolError::Command(b'b')));
    }

    #[test]
    fn request_lines_parse_back() {
        let ops = [
            Op::RegWrite {
                reg: 0x10,
                value: 0x8000_0001,
            },
            Op::Upload {
                offset: 0x0800_0000,
                size: 1024,
                retries: 2,
                name: Some("app.bin".into()),
            },
            Op::Read {
                offset: 0x2000_0000,
                size: 16,
            },
            Op::ChipInfo,
        ];
        for op in ops {
            assert_eq!(Op::parse(&op.to_line()), Ok(op));
        }
    }

    #[test]
    fn formats_replies_and_events() {
        assert_eq!(format!("{}", Reply::ok("1234")), "#0;1234");
        let reply: Reply = ProtocolError::MissingArg("Size").into();
        assert_eq!(format!("{reply}"), "#3;Size parameter missing.");
        assert_eq!(Reply::parse("#5;Size mismatch"), Some(Reply::error(ReplyCode::SizeMismatch, "Size mismatch")));
        assert_eq!(Reply::parse("!flasher;x"), None);
        assert_eq!(
            format!("{}", Event::flasher("Will flash")),
            "!flasher;Will flash"
        );
        assert_eq!(parse_number("0x1F"), Some(31));
        assert_eq!(parse_number("-1"), None);
    }
}
