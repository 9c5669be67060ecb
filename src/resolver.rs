//! The resolver (§4.E): owns the arena, the input buffer, the xref table,
//! and an at-most-once object cache. Construction walks the header,
//! `startxref`/`%%EOF` tail, and trailer dictionary the way
//! `original_source/src/pdf.c`'s `pdf_document_new` and `src/parse.c`'s
//! `pdf_parse_header`/`pdf_parse_startxref` do; trailer *location* (finding
//! the `trailer` keyword once the xref table is built) has no single
//! `original_source` owner, so it follows spec.md §4.E's grammar directly.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::arena::Arena;
use crate::error::{CtxResult, Error, HeaderError, Result, ResultExt, XRefError};
use crate::object::{parse_object, IndirectRef, PdfObject};
use crate::parse_ctx::ParseCtx;
use crate::xref::XRefTable;

/// The first line of a PDF file is `%PDF-1.N`, `N` a digit 0-7.
pub fn parse_header(buffer: &[u8]) -> Result<u8> {
    let mut ctx = ParseCtx::new(buffer);
    ctx.expect(b"%PDF-1.")?;
    let digit = ctx.peek_and_advance()?;
    if !(b'0'..=b'7').contains(&digit) {
        return Err(Error::Header(HeaderError::InvalidVersion));
    }
    Ok(digit - b'0')
}

/// Backscans from EOF for the `%%EOF` marker, then reads the preceding
/// `startxref` line's byte offset.
pub fn parse_startxref(buffer: &[u8]) -> Result<usize> {
    let mut ctx = ParseCtx::new(buffer);
    ctx.seek(buffer.len())?;
    ctx.backscan(b"%%EOF", 32)?;

    let eof_marker_offset = ctx.offset();
    ctx.seek_line_start()?;
    if eof_marker_offset != ctx.offset() {
        return Err(Error::Header(HeaderError::InvalidTrailer));
    }

    ctx.shift(-1)?;
    ctx.seek_line_start()?;
    let startxref_offset = ctx.offset();

    let (value, len) = ctx.parse_int(None)?;
    if len == 0 {
        return Err(Error::Header(HeaderError::InvalidTrailer));
    }

    ctx.seek(startxref_offset)?;
    ctx.shift(-1)?;
    ctx.seek_line_start()?;
    ctx.expect(b"startxref")?;

    Ok(value as usize)
}

fn locate_trailer(buffer: &[u8], search_from: usize) -> Result<usize> {
    buffer[search_from..]
        .windows(b"trailer".len())
        .position(|w| w == b"trailer")
        .map(|p| p + search_from)
        .ok_or(Error::Header(HeaderError::InvalidTrailer))
}

pub struct Resolver<'a> {
    arena: &'a Arena,
    buffer: &'a [u8],
    xref: XRefTable<'a>,
    cache: RefCell<HashMap<(u64, u64), PdfObject<'a>>>,
    pub version: u8,
    pub trailer: PdfObject<'a>,
}

impl<'a> Resolver<'a> {
    /// Every step here is a named frame in the context chain (§7): a fatal
    /// during document open should read outermost-to-innermost as "opening
    /// document" -> "parsing trailer dictionary" -> the actual lexical
    /// cause, not a bare enum variant.
    pub fn open(arena: &'a Arena, buffer: &'a [u8]) -> CtxResult<Self> {
        let version = parse_header(buffer).context("parsing %PDF-1.N header")?;
        let startxref = parse_startxref(buffer).context("locating startxref/%%EOF tail")?;
        let xref = XRefTable::new(buffer, startxref).context("parsing xref table")?;

        let trailer_offset =
            locate_trailer(buffer, startxref).context("locating trailer keyword")?;
        let mut ctx = ParseCtx::new(buffer);
        ctx.seek(trailer_offset).context("seeking to trailer offset")?;
        ctx.expect(b"trailer").context("expecting trailer keyword")?;
        ctx.consume_whitespace();
        let trailer =
            parse_object(arena, &mut ctx, false).context("parsing trailer dictionary")?;

        Ok(Resolver {
            arena,
            buffer,
            xref,
            cache: RefCell::new(HashMap::new()),
            version,
            trailer,
        })
    }

    pub fn root_ref(&self) -> Result<IndirectRef> {
        match self.trailer.dict_lookup(b"Root") {
            Some(PdfObject::Ref(r)) => Ok(r),
            _ => Err(Error::Header(HeaderError::InvalidTrailer)),
        }
    }

    /// Turns `(id, gen)` into a borrowed `PdfObject`, parsing exactly once
    /// per pair and caching the result for every later lookup.
    pub fn resolve_ref(&self, id: u64, generation: u64) -> Result<PdfObject<'a>> {
        if let Some(cached) = self.cache.borrow().get(&(id, generation)) {
            return Ok(*cached);
        }

        let entry = self.xref.get_entry(id, generation)?;
        if !entry.in_use {
            return Err(Error::XRef(XRefError::InvalidReference));
        }

        let mut ctx = ParseCtx::new(self.buffer);
        ctx.seek(entry.offset as usize)?;
        let parsed = parse_object(self.arena, &mut ctx, false)?;

        let object = match parsed {
            PdfObject::Indirect(indirect)
                if indirect.id == id && indirect.generation == generation =>
            {
                indirect.object
            }
            _ => return Err(Error::XRef(XRefError::InvalidReference)),
        };

        self.cache.borrow_mut().insert((id, generation), object);
        Ok(object)
    }

    /// Resolves `object` if it is a `Ref`, otherwise returns it unchanged —
    /// the common "maybe-indirect" access pattern used throughout schema
    /// projection (§4.F).
    pub fn resolve(&self, object: PdfObject<'a>) -> Result<PdfObject<'a>> {
        match object {
            PdfObject::Ref(r) => self.resolve_ref(r.id, r.generation),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Vec<u8> {
        let obj1 = b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n";
        let obj2 = b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n";
        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.7\n");
        let obj1_offset = buf.len();
        buf.extend_from_slice(obj1);
        let obj2_offset = buf.len();
        buf.extend_from_slice(obj2);
        let xref_offset = buf.len();
        buf.extend_from_slice(b"xref\n0 3\n");
        buf.extend_from_slice(b"0000000000 65535 f \n");
        buf.extend_from_slice(format!("{:010} 00000 n \n", obj1_offset).as_bytes());
        buf.extend_from_slice(format!("{:010} 00000 n \n", obj2_offset).as_bytes());
        buf.extend_from_slice(b"trailer\n<< /Size 3 /Root 1 0 R >>\n");
        buf.extend_from_slice(format!("startxref\n{}\n%%EOF", xref_offset).as_bytes());
        buf
    }

    #[test]
    fn parses_header_version() {
        assert_eq!(parse_header(b"%PDF-1.5").unwrap(), 5);
        assert!(parse_header(b"hello").is_err());
        assert_eq!(
            parse_header(b"%PDF-1.f"),
            Err(Error::Header(HeaderError::InvalidVersion))
        );
    }

    #[test]
    fn parses_startxref_from_tail() {
        assert_eq!(parse_startxref(b"startxref\n4325\n%%EOF").unwrap(), 4325);
        assert!(parse_startxref(b"startxref\n\n%%EOF").is_err());
        assert!(parse_startxref(b"startxref\n+435\n%%EOF").is_err());
        assert!(parse_startxref(b"notstartxref\n4325\n%%EOF").is_err());
    }

    #[test]
    fn opens_document_and_resolves_catalog() {
        let buf = sample_document();
        let arena = Arena::default();
        let resolver = Resolver::open(&arena, &buf).unwrap();
        assert_eq!(resolver.version, 7);

        let root = resolver.root_ref().unwrap();
        assert_eq!(root.id, 1);

        let catalog = resolver.resolve_ref(root.id, root.generation).unwrap();
        let pages_ref = catalog.dict_lookup(b"Pages").unwrap();
        let pages = resolver.resolve(pages_ref).unwrap();
        assert_eq!(pages.dict_lookup(b"Count").unwrap().as_integer(), Some(0));
    }

    #[test]
    fn resolving_same_ref_twice_hits_the_cache() {
        let buf = sample_document();
        let arena = Arena::default();
        let resolver = Resolver::open(&arena, &buf).unwrap();
        let root = resolver.root_ref().unwrap();
        let first = resolver.resolve_ref(root.id, root.generation).unwrap();
        let second = resolver.resolve_ref(root.id, root.generation).unwrap();
        assert!(matches!((first, second), (PdfObject::Dict(a), PdfObject::Dict(b)) if std::ptr::eq(a, b)));
    }
}
