//! The transfer mode set by the `TYPE` and `STRU` commands.
//
// RFC 959, 3.1.1: data representation types are ASCII, EBCDIC, image (binary) and local
// byte size. ASCII and EBCDIC take an optional second parameter: the format control
// (non-print, telnet format effectors or carriage control). File structure is either a
// continuous sequence of bytes (file) or a sequence of records (record).

use bitflags::bitflags;
use derive_more::Display;
use thiserror::Error;

/// How text is formatted for the ASCII and EBCDIC representation types.
#[derive(Debug, Display, Default, PartialEq, Eq, Clone, Copy, Hash)]
pub enum FormatControl {
    /// No vertical format information.
    #[default]
    #[display("N")]
    NonPrint,
    /// Telnet format effectors.
    #[display("T")]
    Telnet,
    /// ASA carriage control characters.
    #[display("C")]
    Carriage,
}

/// The representation type of transferred data.
#[derive(Debug, Display, PartialEq, Eq, Clone, Copy, Hash)]
pub enum FileType {
    /// ASCII text, the default.
    #[display("A {_0}")]
    Ascii(FormatControl),
    /// EBCDIC text.
    #[display("E {_0}")]
    Ebcdic(FormatControl),
    /// Image, i.e. binary, data.
    #[display("I")]
    Binary,
    /// Local byte size.
    #[display("L {byte_size}")]
    Local {
        /// Logical byte size in bits.
        byte_size: u8,
    },
}

/// The file structure set with `STRU`.
#[derive(Debug, Display, Default, PartialEq, Eq, Clone, Copy, Hash)]
pub enum FileStructure {
    /// A continuous sequence of bytes.
    #[default]
    #[display("F")]
    File,
    /// A sequence of records.
    #[display("R")]
    Record,
}

/// The complete transfer mode of a session.
#[derive(Debug, Display, PartialEq, Eq, Clone, Copy, Hash)]
#[display("{file_type} ({structure})")]
pub struct TransferMode {
    /// The representation type.
    pub file_type: FileType,
    /// The file structure.
    pub structure: FileStructure,
}

impl Default for TransferMode {
    fn default() -> Self {
        TransferMode {
            file_type: FileType::Ascii(FormatControl::NonPrint),
            structure: FileStructure::File,
        }
    }
}

/// Failure to parse a `TYPE` or `STRU` argument.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferModeParseError {
    /// The argument was empty.
    #[error("missing parameter")]
    Missing,
    /// The representation type or structure code is unknown.
    #[error("unknown code: {0}")]
    UnknownCode(String),
    /// The format control or byte size is invalid.
    #[error("invalid second parameter: {0}")]
    InvalidParameter(String),
}

impl FileType {
    /// Parses the argument of a `TYPE` command, e.g. `A`, `A N`, `I` or `L 8`.
    pub fn parse(arg: &str) -> Result<FileType, TransferModeParseError> {
        let mut parts = arg.split_whitespace();
        let code = parts.next().ok_or(TransferModeParseError::Missing)?;
        let param = parts.next();
        if let Some(extra) = parts.next() {
            return Err(TransferModeParseError::InvalidParameter(extra.to_string()));
        }
        match code.to_ascii_uppercase().as_str() {
            "A" => Ok(FileType::Ascii(parse_format_control(param)?)),
            "E" => Ok(FileType::Ebcdic(parse_format_control(param)?)),
            "I" => match param {
                None => Ok(FileType::Binary),
                Some(p) => Err(TransferModeParseError::InvalidParameter(p.to_string())),
            },
            "L" => {
                let p = param.ok_or(TransferModeParseError::Missing)?;
                match p.parse::<u8>() {
                    Ok(byte_size) if byte_size > 0 => Ok(FileType::Local { byte_size }),
                    _ => Err(TransferModeParseError::InvalidParameter(p.to_string())),
                }
            }
            _ => Err(TransferModeParseError::UnknownCode(code.to_string())),
        }
    }
}

fn parse_format_control(param: Option<&str>) -> Result<FormatControl, TransferModeParseError> {
    match param.map(|p| p.to_ascii_uppercase()) {
        None => Ok(FormatControl::NonPrint),
        Some(p) => match p.as_str() {
            "N" => Ok(FormatControl::NonPrint),
            "T" => Ok(FormatControl::Telnet),
            "C" => Ok(FormatControl::Carriage),
            _ => Err(TransferModeParseError::InvalidParameter(p)),
        },
    }
}

impl FileStructure {
    /// Parses the argument of a `STRU` command.
    pub fn parse(arg: &str) -> Result<FileStructure, TransferModeParseError> {
        match arg.trim().to_ascii_uppercase().as_str() {
            "" => Err(TransferModeParseError::Missing),
            "F" => Ok(FileStructure::File),
            "R" => Ok(FileStructure::Record),
            other => Err(TransferModeParseError::UnknownCode(other.to_string())),
        }
    }
}

impl TransferMode {
    /// Returns a copy with the representation type replaced.
    pub fn with_file_type(self, file_type: FileType) -> Self {
        TransferMode { file_type, ..self }
    }

    /// Returns a copy with the file structure replaced.
    pub fn with_structure(self, structure: FileStructure) -> Self {
        TransferMode { structure, ..self }
    }

    /// True for the text types that translate line endings.
    pub fn is_text(&self) -> bool {
        matches!(self.file_type, FileType::Ascii(_) | FileType::Ebcdic(_))
    }
}

bitflags! {
    /// The transfer modes a file system can serve.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TransferCapabilities: u32 {
        /// ASCII representation type.
        const ASCII = 1;
        /// EBCDIC representation type.
        const EBCDIC = 1 << 1;
        /// Image representation type.
        const BINARY = 1 << 2;
        /// Local byte size representation type.
        const LOCAL = 1 << 3;
        /// File structure.
        const FILE_STRUCTURE = 1 << 4;
        /// Record structure.
        const RECORD_STRUCTURE = 1 << 5;
    }
}

impl Default for TransferCapabilities {
    fn default() -> Self {
        TransferCapabilities::ASCII | TransferCapabilities::BINARY | TransferCapabilities::FILE_STRUCTURE
    }
}

impl TransferCapabilities {
    /// Checks whether both the type and the structure of `mode` are supported.
    pub fn supports(&self, mode: &TransferMode) -> bool {
        let file_type = match mode.file_type {
            FileType::Ascii(_) => TransferCapabilities::ASCII,
            FileType::Ebcdic(_) => TransferCapabilities::EBCDIC,
            FileType::Binary => TransferCapabilities::BINARY,
            FileType::Local { .. } => TransferCapabilities::LOCAL,
        };
        let structure = match mode.structure {
            FileStructure::File => TransferCapabilities::FILE_STRUCTURE,
            FileStructure::Record => TransferCapabilities::RECORD_STRUCTURE,
        };
        self.contains(file_type | structure)
    }
}
