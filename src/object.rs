//! The PDF object model and recursive-descent lexer/parser (§4.C).
//! `PdfObject` mirrors the tagged union in
//! `original_source/include/pdf_object.h`; `parse_object` and its helpers
//! are a direct port of `original_source/src/object.c`'s dispatch table,
//! with the source's raw `char*`/`Vec*` fields replaced by arena-borrowed
//! Rust slices — since every variant is either a primitive or an `&'a`
//! reference, `PdfObject<'a>` is `Copy`, same as passing the source's
//! tagged-union-by-pointer around.

use crate::arena::Arena;
use crate::error::{ContextError, Error, LexicalError, Result};
use crate::parse_ctx::{is_regular, ParseCtx};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndirectRef {
    pub id: u64,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct IndirectObject<'a> {
    pub id: u64,
    pub generation: u64,
    pub object: PdfObject<'a>,
}

#[derive(Debug, Clone, Copy)]
pub struct DictEntry<'a> {
    pub key: &'a [u8],
    pub value: PdfObject<'a>,
}

#[derive(Debug, Clone, Copy)]
pub struct StreamObject<'a> {
    pub dict: &'a [DictEntry<'a>],
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub enum PdfObject<'a> {
    Boolean(bool),
    Integer(i32),
    Real(f64),
    String(&'a [u8]),
    Name(&'a [u8]),
    Array(&'a [PdfObject<'a>]),
    Dict(&'a [DictEntry<'a>]),
    Stream(&'a StreamObject<'a>),
    Indirect(&'a IndirectObject<'a>),
    Ref(IndirectRef),
    Null,
}

impl<'a> PdfObject<'a> {
    /// Unwraps one level of `Indirect` so schema projection (§4.F) can treat
    /// a top-level indirect object and a plain dict interchangeably, as
    /// `pdf_deserialize_object` does at its entry point.
    pub fn unwrap_indirect(self) -> PdfObject<'a> {
        match self {
            PdfObject::Indirect(obj) => obj.object,
            other => other,
        }
    }

    pub fn as_dict(self) -> Option<&'a [DictEntry<'a>]> {
        match self.unwrap_indirect() {
            PdfObject::Dict(entries) => Some(entries),
            PdfObject::Stream(stream) => Some(stream.dict),
            _ => None,
        }
    }

    pub fn as_name(self) -> Option<&'a [u8]> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_integer(self) -> Option<i32> {
        match self {
            PdfObject::Integer(n) => Some(n),
            _ => None,
        }
    }

    /// A number of either kind, widened to `f64` — most numeric fields in
    /// the schema (§4.F) accept an integer where a real is formally
    /// required and vice versa.
    pub fn as_number(self) -> Option<f64> {
        match self {
            PdfObject::Integer(n) => Some(n as f64),
            PdfObject::Real(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_string(self) -> Option<&'a [u8]> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(self) -> Option<&'a [PdfObject<'a>]> {
        match self.unwrap_indirect() {
            PdfObject::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_stream(self) -> Option<&'a StreamObject<'a>> {
        match self.unwrap_indirect() {
            PdfObject::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn is_null(self) -> bool {
        matches!(self, PdfObject::Null)
    }

    pub fn dict_lookup(self, key: &[u8]) -> Option<PdfObject<'a>> {
        self.as_dict()?
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value)
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

fn is_non_regular(b: u8) -> bool {
    !is_regular(b)
}

/// Dispatches on the first non-whitespace byte (§4.C's dispatch table).
/// `in_indirect` is true while parsing the body of an already-opened
/// `obj … endobj`; it suppresses another attempt to open one, matching the
/// source's `in_direct_obj` flag, but ref detection (`NN GG R`) is always
/// attempted for digit-led tokens regardless.
pub fn parse_object<'a>(
    arena: &'a Arena,
    ctx: &mut ParseCtx<'a>,
    in_indirect: bool,
) -> Result<PdfObject<'a>> {
    ctx.consume_whitespace();
    let peeked = ctx.peek()?;

    if peeked == b'<' {
        return match ctx.peek_next() {
            Ok(b'<') => parse_dict_or_stream(arena, ctx, in_indirect),
            Ok(_) => parse_hex_string(arena, ctx),
            Err(e) => Err(e),
        };
    }

    match peeked {
        b't' => parse_true(ctx),
        b'f' => parse_false(ctx),
        b'n' => parse_null(ctx),
        b'.' | b'+' | b'-' => parse_number(ctx),
        b'0'..=b'9' => parse_digit_led(arena, ctx, in_indirect),
        b'(' => parse_literal_string(arena, ctx),
        b'/' => parse_name(arena, ctx),
        b'[' => parse_array(arena, ctx),
        _ => Err(Error::Lexical(LexicalError::InvalidObject)),
    }
}

fn parse_true<'a>(ctx: &mut ParseCtx<'a>) -> Result<PdfObject<'a>> {
    ctx.expect(b"true")?;
    ctx.require_char_type(true, is_non_regular)?;
    Ok(PdfObject::Boolean(true))
}

fn parse_false<'a>(ctx: &mut ParseCtx<'a>) -> Result<PdfObject<'a>> {
    ctx.expect(b"false")?;
    ctx.require_char_type(true, is_non_regular)?;
    Ok(PdfObject::Boolean(false))
}

fn parse_null<'a>(ctx: &mut ParseCtx<'a>) -> Result<PdfObject<'a>> {
    ctx.expect(b"null")?;
    ctx.require_char_type(true, is_non_regular)?;
    Ok(PdfObject::Null)
}

const PDF_FLOAT_MAX: f64 = 3.403e38;

/// Manual digit accumulation mirroring `pdf_parse_number` exactly, down to
/// saturating the leading-digit accumulator at `i64::MAX` on overflow
/// instead of failing mid-scan (the final range check happens once, after
/// the full token is consumed).
fn parse_number<'a>(ctx: &mut ParseCtx<'a>) -> Result<PdfObject<'a>> {
    let mut sign: i64 = 1;
    if let Ok(b) = ctx.peek() {
        if b == b'+' || b == b'-' {
            ctx.peek_and_advance()?;
            if b == b'-' {
                sign = -1;
            }
        }
    }

    let mut leading_acc: i64 = 0;
    let mut has_leading = false;
    while let Ok(b) = ctx.peek() {
        if !b.is_ascii_digit() {
            break;
        }
        has_leading = true;
        let digit = (b - b'0') as i64;
        leading_acc = if leading_acc <= (i64::MAX - digit) / 10 {
            leading_acc * 10 + digit
        } else {
            i64::MAX
        };
        ctx.peek_and_advance()?;
    }

    let decimal_peek = ctx.peek();
    let is_integer = match decimal_peek {
        Ok(b) => b != b'.',
        Err(Error::Context(ContextError::Eof)) => true,
        Err(e) => return Err(e),
    };

    if is_integer {
        ctx.require_char_type(true, is_non_regular)?;
        if !has_leading {
            return Err(Error::Lexical(LexicalError::InvalidNumber));
        }
        let value = leading_acc * sign;
        if value < i32::MIN as i64 || value > i32::MAX as i64 {
            return Err(Error::Lexical(LexicalError::NumberLimit));
        }
        return Ok(PdfObject::Integer(value as i32));
    }

    ctx.peek_and_advance()?; // consume '.'

    let mut trailing_acc = 0.0f64;
    let mut trailing_weight = 0.1f64;
    let mut has_trailing = false;
    while let Ok(b) = ctx.peek() {
        if !b.is_ascii_digit() {
            break;
        }
        has_trailing = true;
        trailing_acc += (b - b'0') as f64 * trailing_weight;
        trailing_weight *= 0.1;
        ctx.peek_and_advance()?;
    }

    ctx.require_char_type(true, is_non_regular)?;

    if !has_leading && !has_trailing {
        return Err(Error::Lexical(LexicalError::InvalidNumber));
    }

    let value = (leading_acc as f64 + trailing_acc) * sign as f64;
    if value > PDF_FLOAT_MAX || value < -PDF_FLOAT_MAX {
        return Err(Error::Lexical(LexicalError::NumberLimit));
    }

    Ok(PdfObject::Real(value))
}

/// Tries `NN GG obj … endobj` / `NN GG R`; on any mismatch rewinds and
/// reparses the leading digits as a plain number, per §4.C.
fn parse_digit_led<'a>(
    arena: &'a Arena,
    ctx: &mut ParseCtx<'a>,
    in_indirect: bool,
) -> Result<PdfObject<'a>> {
    let start = ctx.offset();
    match try_parse_indirect(arena, ctx, in_indirect) {
        Ok(obj) => Ok(obj),
        Err(_) => {
            ctx.seek(start)?;
            parse_number(ctx)
        }
    }
}

fn try_parse_indirect<'a>(
    arena: &'a Arena,
    ctx: &mut ParseCtx<'a>,
    in_indirect: bool,
) -> Result<PdfObject<'a>> {
    let (id, len) = ctx.parse_int(None)?;
    if len == 0 {
        return Err(Error::Context(ContextError::Expect));
    }
    ctx.expect(b" ")?;

    let (generation, len) = ctx.parse_int(None)?;
    if len == 0 {
        return Err(Error::Context(ContextError::Expect));
    }
    ctx.expect(b" ")?;

    if ctx.peek()? == b'R' {
        ctx.peek_and_advance()?;
        return Ok(PdfObject::Ref(IndirectRef { id, generation }));
    }

    if in_indirect {
        return Err(Error::Lexical(LexicalError::InvalidObject));
    }

    ctx.expect(b"obj")?;
    ctx.require_char_type(false, is_non_regular)?;
    ctx.consume_whitespace();

    let inner = parse_object(arena, ctx, true)?;

    ctx.require_char_type(false, is_non_regular)?;
    ctx.consume_whitespace();
    ctx.expect(b"endobj")?;
    ctx.require_char_type(true, is_non_regular)?;

    let object = arena.alloc(IndirectObject {
        id,
        generation,
        object: inner,
    });
    Ok(PdfObject::Indirect(object))
}

fn parse_literal_string<'a>(arena: &'a Arena, ctx: &mut ParseCtx<'a>) -> Result<PdfObject<'a>> {
    ctx.expect(b"(")?;

    let start = ctx.offset();
    let mut open = 1i32;
    let mut escape = false;
    loop {
        match ctx.peek_and_advance() {
            Ok(b) => {
                if b == b'(' && !escape {
                    open += 1;
                } else if b == b')' && !escape {
                    open -= 1;
                }
                escape = b == b'\\' && !escape;
                if open == 0 {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    if open != 0 {
        return Err(Error::Lexical(LexicalError::UnbalancedString));
    }

    ctx.require_char_type(true, is_non_regular)?;

    let content_len = ctx.offset() - start - 1;
    let raw = ctx.borrow_substr(start, content_len)?;

    let mut decoded = Vec::with_capacity(content_len);
    let mut escape = false;
    for &b in raw {
        if !escape {
            if b == b'\\' {
                escape = true;
            } else {
                decoded.push(b);
            }
            continue;
        }
        match b {
            b'n' => decoded.push(b'\n'),
            b'r' => decoded.push(b'\r'),
            b't' => decoded.push(b'\t'),
            b'\x08' | b'b' => decoded.push(0x08),
            b'\x0c' | b'f' => decoded.push(0x0c),
            b'(' => decoded.push(b'('),
            b')' => decoded.push(b')'),
            b'\\' => decoded.push(b'\\'),
            // Octal escapes and backslash-newline line continuations are
            // not handled by the source this is ported from.
            _ => {}
        }
        escape = false;
    }
    ctx.release_substr()?;

    Ok(PdfObject::String(arena.alloc_slice_copy(&decoded)))
}

fn parse_hex_string<'a>(arena: &'a Arena, ctx: &mut ParseCtx<'a>) -> Result<PdfObject<'a>> {
    ctx.expect(b"<")?;
    let start = ctx.offset();
    let mut len = 0usize;
    while ctx.peek().map(|b| b != b'>').unwrap_or(false) {
        ctx.peek_and_advance()?;
        len += 1;
    }
    let raw = ctx.borrow_substr(start, len)?;
    let mut digits = Vec::with_capacity(raw.len());
    for &b in raw {
        match hex_value(b) {
            Some(v) => digits.push(v),
            None if b.is_ascii_whitespace() => {}
            None => return Err(Error::Lexical(LexicalError::InvalidObject)),
        }
    }
    ctx.release_substr()?;
    if digits.len() % 2 != 0 {
        digits.push(0);
    }
    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks(2) {
        bytes.push((pair[0] << 4) | pair[1]);
    }
    ctx.expect(b">")?;
    ctx.require_char_type(true, is_non_regular)?;
    Ok(PdfObject::String(arena.alloc_slice_copy(&bytes)))
}

fn parse_name<'a>(arena: &'a Arena, ctx: &mut ParseCtx<'a>) -> Result<PdfObject<'a>> {
    ctx.expect(b"/")?;
    let start = ctx.offset();
    let mut len = 0usize;
    while let Ok(b) = ctx.peek() {
        if !is_regular(b) {
            break;
        }
        if !(b'!'..=b'~').contains(&b) {
            return Err(Error::Lexical(LexicalError::NameUnescapedChar));
        }
        ctx.peek_and_advance()?;
        len += 1;
    }
    ctx.require_char_type(true, is_non_regular)?;

    let raw = ctx.borrow_substr(start, len)?;
    let mut decoded = Vec::with_capacity(len);
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' {
            let hi = raw
                .get(i + 1)
                .copied()
                .and_then(hex_value)
                .ok_or(Error::Lexical(LexicalError::NameBadCharCode))?;
            let lo = raw
                .get(i + 2)
                .copied()
                .and_then(hex_value)
                .ok_or(Error::Lexical(LexicalError::NameBadCharCode))?;
            decoded.push((hi << 4) | lo);
            i += 3;
        } else {
            decoded.push(raw[i]);
            i += 1;
        }
    }
    ctx.release_substr()?;

    Ok(PdfObject::Name(arena.alloc_slice_copy(&decoded)))
}

fn parse_array<'a>(arena: &'a Arena, ctx: &mut ParseCtx<'a>) -> Result<PdfObject<'a>> {
    ctx.expect(b"[")?;
    ctx.consume_whitespace();

    let mut elements = Vec::new();
    while ctx.peek().map(|b| b != b']').unwrap_or(false) {
        let element = parse_object(arena, ctx, false)?;
        ctx.require_char_type(false, is_non_regular)?;
        ctx.consume_whitespace();
        elements.push(element);
    }

    ctx.expect(b"]")?;
    ctx.require_char_type(true, is_non_regular)?;

    Ok(PdfObject::Array(arena.alloc_slice_copy(&elements)))
}

fn parse_dict_or_stream<'a>(
    arena: &'a Arena,
    ctx: &mut ParseCtx<'a>,
    in_indirect: bool,
) -> Result<PdfObject<'a>> {
    ctx.expect(b"<<")?;
    ctx.consume_whitespace();

    let mut entries = Vec::new();
    while ctx.peek().map(|b| b != b'>').unwrap_or(false) {
        let key = match parse_name(arena, ctx)? {
            PdfObject::Name(n) => n,
            _ => unreachable!("parse_name always returns Name or Err"),
        };
        ctx.require_char_type(false, is_non_regular)?;
        ctx.consume_whitespace();

        let value = parse_object(arena, ctx, false)?;
        ctx.require_char_type(false, is_non_regular)?;
        ctx.consume_whitespace();

        entries.push(DictEntry { key, value });
    }

    ctx.expect(b">>")?;
    ctx.require_char_type(true, is_non_regular)?;

    let entries = arena.alloc_slice_copy(&entries);

    if in_indirect {
        let restore = ctx.offset();
        ctx.consume_whitespace();
        match parse_stream(arena, ctx, entries) {
            Ok(data) => {
                ctx.require_char_type(true, is_non_regular)?;
                return Ok(PdfObject::Stream(arena.alloc(StreamObject {
                    dict: entries,
                    data,
                })));
            }
            // Any failure to see a well-formed stream body after `>>` means
            // this is just a dict, not a stream object: rewind past the
            // whitespace we speculatively consumed and fall through.
            Err(_) => ctx.seek(restore)?,
        }
    }

    Ok(PdfObject::Dict(entries))
}

fn parse_stream<'a>(
    arena: &'a Arena,
    ctx: &mut ParseCtx<'a>,
    entries: &'a [DictEntry<'a>],
) -> Result<&'a [u8]> {
    ctx.expect(b"stream")?;

    match ctx.peek()? {
        b'\n' => {
            ctx.shift(1)?;
        }
        b'\r' => ctx.expect(b"\r\n")?,
        _ => return Err(Error::Context(ContextError::Expect)),
    }

    let length = entries
        .iter()
        .find(|e| e.key == b"Length")
        .and_then(|e| e.value.as_integer())
        .filter(|&n| n >= 0)
        .ok_or(Error::Lexical(LexicalError::StreamInvalidLength))? as usize;

    let raw = ctx.borrow_substr(ctx.offset(), length)?;
    let body = arena.alloc_slice_copy(raw);
    ctx.release_substr()?;

    ctx.shift(length as isize)?;
    if ctx.expect(b"\nendstream").is_err()
        && ctx.expect(b"\r\nendstream").is_err()
        && ctx.expect(b"\rendstream").is_err()
    {
        return Err(Error::Context(ContextError::Expect));
    }

    Ok(body)
}
