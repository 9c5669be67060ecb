//! Errors for pdf-engine
//!
//! error_chain and failure are certainly nice, but completely overengineered
//! for this use-case. For example, neither of them allow error localization.
//! Additionally, debugging macros can get hairy really quick and matching with
//! `*e.kind()` or doing From conversions for other errors is really hard to do.
//!
//! So in this case, the best form of error handling is to use the simple
//! Rust-native way: enums, `From` impls, pattern matching, and a small frame
//! chain pushed on propagation (mirroring §7's context-chain data model
//! without a linked-list allocator).

use core::fmt;

/// One category per spec.md §7. Each variant carries a fine-grained kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Header(HeaderError),
    XRef(XRefError),
    Lexical(LexicalError),
    Schema(SchemaError),
    Context(ContextError),
    Filter(FilterError),
    Deflate(DeflateError),
    Font(FontError),
    Icc(IccError),
    Function(FunctionError),
    Document(DocumentError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    InvalidVersion,
    InvalidTrailer,
    InvalidStartxref,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefError {
    InvalidTable,
    InvalidReference,
    GenerationMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexicalError {
    InvalidObject,
    InvalidNumber,
    NumberLimit,
    UnbalancedString,
    NameUnescapedChar,
    NameBadCharCode,
    StreamInvalidLength,
    UnknownOperator,
    MissingOperand,
    ExcessOperand,
    InvalidOperandDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaError {
    ObjectNotDict,
    MissingDictKey,
    UnknownKey,
    DuplicateKey,
    IncorrectType,
    InvalidSubtype,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    Eof,
    Expect,
    ScanLimit,
    Borrowed,
    NotBorrowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterError {
    AsciiHexInvalid,
    InvalidFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeflateError {
    InvalidBlockType,
    InvalidSymbol,
    RepeatUnderflow,
    RepeatOverflow,
    BackrefUnderflow,
    LenComplementMismatch,
    BitstreamEod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontError {
    Eof,
    MissingTable,
    TableChecksum,
    CmapInvalidPlatform,
    CmapInvalidGiaLength,
    CmapReservedPad,
    BadMagic,
    InvalidCid,
    InvalidGid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IccError {
    InvalidLut,
    InvalidSignature,
    IncorrectChannelCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionError {
    InvalidType,
    DomainMismatch,
    /// Type 4 (PostScript calculator) functions are parsed but not
    /// executed; evaluating one is a deliberate boundary, not a bug.
    PostScriptUnimplemented,
}

/// Errors from the top-level document glue (§4.K): page-tree walking and
/// content-stream assembly, as opposed to the lower-level object/xref
/// errors those steps build on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentError {
    PageIndexOutOfRange,
    PageTreeCycle,
    NotAPageLeaf,
}

macro_rules! impl_from {
    ($from:ident, $variant:ident) => {
        impl From<$from> for Error {
            fn from(err: $from) -> Self {
                Error::$variant(err)
            }
        }
    };
}

impl_from!(HeaderError, Header);
impl_from!(XRefError, XRef);
impl_from!(LexicalError, Lexical);
impl_from!(SchemaError, Schema);
impl_from!(ContextError, Context);
impl_from!(FilterError, Filter);
impl_from!(DeflateError, Deflate);
impl_from!(FontError, Font);
impl_from!(IccError, Icc);
impl_from!(FunctionError, Function);
impl_from!(DocumentError, Document);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Header(e) => write!(f, "{e:?}"),
            Error::XRef(e) => write!(f, "{e:?}"),
            Error::Lexical(e) => write!(f, "{e:?}"),
            Error::Schema(e) => write!(f, "{e:?}"),
            Error::Context(e) => write!(f, "{e:?}"),
            Error::Filter(e) => write!(f, "{e:?}"),
            Error::Deflate(e) => write!(f, "{e:?}"),
            Error::Font(e) => write!(f, "{e:?}"),
            Error::Icc(e) => write!(f, "{e:?}"),
            Error::Function(e) => write!(f, "{e:?}"),
            Error::Document(e) => write!(f, "{e:?}"),
        }
    }
}

impl std::error::Error for Error {}

/// One stack frame of context, pushed by `.context(...)` as an error
/// propagates. Replaces the source's `ErrorCtx` linked-list allocation
/// scheme (§9 REDESIGN FLAGS: "manual error chaining").
#[derive(Debug, Clone)]
pub struct Frame {
    pub function: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub message: Option<String>,
}

/// An `Error` plus the chain of frames it propagated through, outermost
/// call first. Printed outermost-to-innermost per spec.md §7.
#[derive(Debug, Clone)]
pub struct ErrorCtx {
    pub error: Error,
    pub frames: Vec<Frame>,
}

impl ErrorCtx {
    pub fn new(error: impl Into<Error>) -> Self {
        ErrorCtx {
            error: error.into(),
            frames: Vec::new(),
        }
    }

    #[track_caller]
    pub fn push(mut self, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        self.frames.push(Frame {
            function: "",
            file: loc.file(),
            line: loc.line(),
            message: Some(message.into()),
        });
        self
    }
}

impl fmt::Display for ErrorCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error)?;
        for frame in self.frames.iter().rev() {
            match &frame.message {
                Some(msg) => writeln!(f, "  at {}:{}: {}", frame.file, frame.line, msg)?,
                None => writeln!(f, "  at {}:{}", frame.file, frame.line)?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for ErrorCtx {}

impl From<Error> for ErrorCtx {
    fn from(error: Error) -> Self {
        ErrorCtx::new(error)
    }
}

/// Extension trait mirroring `anyhow`/`error_chain`'s `.context()`, but
/// against our own `ErrorCtx` so every propagation point can append a frame
/// without depending on an error crate.
pub trait ResultExt<T> {
    #[track_caller]
    fn context(self, message: impl Into<String>) -> Result<T, ErrorCtx>;
}

impl<T, E: Into<ErrorCtx>> ResultExt<T> for Result<T, E> {
    #[track_caller]
    fn context(self, message: impl Into<String>) -> Result<T, ErrorCtx> {
        self.map_err(|e| e.into().push(message))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
pub type CtxResult<T> = std::result::Result<T, ErrorCtx>;
