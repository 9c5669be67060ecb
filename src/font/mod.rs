//! Embedded TrueType font parsing (§4.L): wraps [`sfnt`]'s table parsing
//! with the PDF-level glue a `/FontFile2` stream needs — table presence/
//! checksum policy (driven by [`EngineConfig`]) and `/CIDToGIDMap`
//! resolution for CID-keyed fonts, grounded on
//! `original_source/libs/pdf/src/fonts/*.c`.

pub mod sfnt;

use crate::config::EngineConfig;
use crate::error::{Error, FontError, Result};
use crate::object::PdfObject;
use crate::resolver::Resolver;
use sfnt::{CmapTable, Glyph, Head, Maxp, TableDirectory};

/// A parsed `/FontFile2` TrueType program: the table directory plus the
/// tables every embedded font needs resolved up front.
pub struct EmbeddedFont<'a> {
    directory: TableDirectory<'a>,
    pub head: Head,
    pub maxp: Maxp,
    loca: Vec<u32>,
    cmap: Option<CmapTable>,
}

/// Either `Identity` (CID == GID) or an explicit big-endian `u16` GID table
/// indexed by CID, per PDF 32000-1 §9.7.4.2.
pub enum CidToGidMap {
    Identity,
    Explicit(Vec<u16>),
}

impl CidToGidMap {
    pub fn gid_for(&self, cid: u32) -> Result<u16> {
        match self {
            CidToGidMap::Identity => {
                u16::try_from(cid).map_err(|_| Error::Font(FontError::InvalidCid))
            }
            CidToGidMap::Explicit(table) => table
                .get(cid as usize)
                .copied()
                .ok_or(Error::Font(FontError::InvalidCid)),
        }
    }
}

impl<'a> EmbeddedFont<'a> {
    /// Parses the SFNT table directory and the `head`/`maxp`/`loca`
    /// tables (required for any glyph lookup) plus `cmap` (optional — a
    /// CID-keyed font with an external `CIDToGIDMap` stream may omit it).
    /// A table checksum mismatch is logged and tolerated unless
    /// `config.strict_font_checksums` is set.
    pub fn parse(data: &'a [u8], config: &EngineConfig) -> Result<Self> {
        let directory = TableDirectory::parse(data)?;
        let head = sfnt::parse_head(&directory)?;
        let maxp = sfnt::parse_maxp(&directory)?;
        let loca = sfnt::parse_loca(&directory, &head, &maxp)?;

        for tag in [b"head", b"maxp", b"loca", b"glyf"] {
            match directory.verify_checksum(tag) {
                Ok(true) | Err(_) => {}
                Ok(false) => {
                    log::warn!(
                        target: "pdf_engine::font",
                        "table checksum mismatch: {:?}",
                        std::str::from_utf8(tag).unwrap_or("?")
                    );
                    if config.strict_font_checksums {
                        return Err(Error::Font(FontError::TableChecksum));
                    }
                }
            }
        }

        let cmap = sfnt::parse_cmap(&directory).ok();

        Ok(EmbeddedFont { directory, head, maxp, loca, cmap })
    }

    pub fn num_glyphs(&self) -> u16 {
        self.maxp.num_glyphs
    }

    pub fn glyph(&self, gid: u16) -> Result<Glyph> {
        if gid >= self.maxp.num_glyphs {
            return Err(Error::Font(FontError::InvalidGid));
        }
        sfnt::parse_glyph(&self.directory, &self.loca, gid)
    }

    /// Unicode codepoint -> GID, via the font's `cmap` table (absent for a
    /// CID-keyed font relying on an explicit `/CIDToGIDMap` instead).
    pub fn gid_for_codepoint(&self, codepoint: u32) -> Option<u16> {
        self.cmap.as_ref().and_then(|c| c.lookup(codepoint))
    }
}

/// Resolves a `/CIDToGIDMap` entry: the bare name `/Identity`, or a stream
/// of big-endian `u16` GIDs indexed by CID.
pub fn deserialize_cid_to_gid_map<'a>(
    resolver: &Resolver<'a>,
    object: PdfObject<'a>,
) -> Result<CidToGidMap> {
    let resolved = resolver.resolve(object)?.unwrap_indirect();
    if resolved.as_name() == Some(b"Identity") {
        return Ok(CidToGidMap::Identity);
    }
    if let Some(stream) = resolved.as_stream() {
        let data = stream.data;
        if data.len() % 2 != 0 {
            return Err(Error::Font(FontError::InvalidGid));
        }
        let table = data
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Ok(CidToGidMap::Explicit(table));
    }
    Err(Error::Font(FontError::InvalidGid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cid_to_gid_identity_passes_through() {
        let map = CidToGidMap::Identity;
        assert_eq!(map.gid_for(42).unwrap(), 42);
    }

    #[test]
    fn cid_to_gid_explicit_looks_up_table() {
        let map = CidToGidMap::Explicit(vec![5, 6, 7]);
        assert_eq!(map.gid_for(1).unwrap(), 6);
        assert_eq!(
            map.gid_for(99),
            Err(Error::Font(FontError::InvalidCid))
        );
    }
}
