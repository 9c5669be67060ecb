//! Top-level document glue (§4.K), grounded on `original_source/examples/
//! pdf.c`'s driver loop (`pdf_resolver_new` → `pdf_get_catalog` →
//! `pdf_resolve_page_tree_node` → per-kid `pdf_resolve_page` →
//! `render_page`) and `original_source/src/catalog.c`/`src/page.c`'s
//! deserializers, which this module drives via [`crate::schema`] instead of
//! re-implementing field-by-field.
//!
//! `Document::open` takes the arena and input buffer as separate borrows
//! (rather than owning them behind `Document::open(bytes)`), matching
//! [`Resolver::open`]'s own shape — a `Document` that owned its arena while
//! also holding borrows into it would be self-referential, which this
//! codebase avoids by keeping the arena external everywhere else (§4.A/§4.E
//! open question, recorded in DESIGN.md).

use std::collections::HashMap;
use std::rc::Rc;

use crate::canvas::Canvas;
use crate::color::{deserialize_color_space, ColorSpace};
use crate::config::EngineConfig;
use crate::content::{tokenize, ExtGStateValues, Interpreter, ResourceLookup};
use crate::error::{CtxResult, DocumentError, Error, Result, ResultExt};
use crate::filter::{decode_chain, Filter};
use crate::object::PdfObject;
use crate::resolver::Resolver;
use crate::schema::{deserialize_catalog, deserialize_page_tree_node, Catalog, PageTreeNode};
use crate::shading::{deserialize_shading, ShadingResource};

/// Default media box (US Letter, in points) used when neither a page nor
/// any of its ancestors declares `/MediaBox` — PDF 32000-1 doesn't mandate
/// a fallback, but every reader needs one; `original_source` always
/// required the field, so this default has no upstream owner (§9 open
/// question, recorded in DESIGN.md).
pub const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// A leaf page with every inheritable attribute already resolved down from
/// its ancestors (§4.K).
#[derive(Debug, Clone)]
pub struct Page<'a> {
    pub resources: Option<PdfObject<'a>>,
    pub media_box: [f64; 4],
    pub rotate: i32,
    pub contents: Option<PdfObject<'a>>,
}

/// The document information dictionary (`/Info`), if present. Every field
/// is kept as a raw PDF string — no date parsing, matching
/// `original_source`'s schema treating `/CreationDate` as a plain string.
#[derive(Debug, Clone, Default)]
pub struct Info {
    pub title: Option<Vec<u8>>,
    pub author: Option<Vec<u8>>,
    pub subject: Option<Vec<u8>>,
    pub producer: Option<Vec<u8>>,
    pub creator: Option<Vec<u8>>,
    pub creation_date: Option<Vec<u8>>,
    pub mod_date: Option<Vec<u8>>,
}

fn info_string(resolver: &Resolver, dict: PdfObject, key: &[u8]) -> Option<Vec<u8>> {
    let value = resolver.resolve(dict.dict_lookup(key)?).ok()?;
    value.as_string().map(|s| s.to_vec())
}

fn deserialize_info(resolver: &Resolver, object: PdfObject) -> Info {
    Info {
        title: info_string(resolver, object, b"Title"),
        author: info_string(resolver, object, b"Author"),
        subject: info_string(resolver, object, b"Subject"),
        producer: info_string(resolver, object, b"Producer"),
        creator: info_string(resolver, object, b"Creator"),
        creation_date: info_string(resolver, object, b"CreationDate"),
        mod_date: info_string(resolver, object, b"ModDate"),
    }
}

/// The `Resources` a single page's content stream executes against.
/// Indexes `/ColorSpace`, `/Shading`, and `/ExtGState` by name, the three
/// categories the content-stream interpreter (§4.I) looks up through
/// [`ResourceLookup`] for `CS`/`cs`/`sh`/`gs`; `/Font`/`/XObject` stay
/// unindexed because `Tf`/`Do` don't resolve resources through this trait
/// (text showing renders glyph-box placeholders rather than real outlines,
/// and XObject painting is out of this spec's required operator subset).
struct PageResources {
    color_spaces: HashMap<Vec<u8>, Rc<ColorSpace>>,
    shadings: HashMap<Vec<u8>, Rc<ShadingResource>>,
    ext_gstates: HashMap<Vec<u8>, ExtGStateValues>,
}

/// Pulls `/CA` (stroking alpha) and `/ca` (nonstroking alpha) out of one
/// already-resolved `ExtGState` dictionary, per §4.I's `gs` row.
fn ext_gstate_values<'a>(resolver: &Resolver<'a>, dict: PdfObject<'a>) -> ExtGStateValues {
    let entries = match dict.as_dict() {
        Some(entries) => entries,
        None => return ExtGStateValues::default(),
    };
    let lookup = |key: &[u8]| {
        entries
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| resolver.resolve(e.value).ok())
            .and_then(|o| o.as_number())
    };
    ExtGStateValues {
        stroke_alpha: lookup(b"CA"),
        fill_alpha: lookup(b"ca"),
    }
}

impl PageResources {
    fn build<'a>(
        resolver: &Resolver<'a>,
        resources: Option<PdfObject<'a>>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let mut color_spaces = HashMap::new();
        let mut shadings = HashMap::new();
        let mut ext_gstates = HashMap::new();
        if let Some(resources) = resources {
            let resolved = resolver.resolve(resources)?;
            if let Some(cs_dict) = resolved
                .dict_lookup(b"ColorSpace")
                .map(|o| resolver.resolve(o))
                .transpose()?
                .and_then(|o| o.as_dict())
            {
                for entry in cs_dict {
                    if let Ok(space) = deserialize_color_space(resolver, entry.value, config) {
                        color_spaces.insert(entry.key.to_vec(), Rc::new(space));
                    }
                }
            }
            if let Some(sh_dict) = resolved
                .dict_lookup(b"Shading")
                .map(|o| resolver.resolve(o))
                .transpose()?
                .and_then(|o| o.as_dict())
            {
                for entry in sh_dict {
                    if let Ok(value) = resolver.resolve(entry.value) {
                        if let Ok((shading, functions, space)) =
                            deserialize_shading(resolver, value, config)
                        {
                            shadings.insert(
                                entry.key.to_vec(),
                                Rc::new(ShadingResource { shading, functions, space }),
                            );
                        }
                    }
                }
            }
            if let Some(gs_dict) = resolved
                .dict_lookup(b"ExtGState")
                .map(|o| resolver.resolve(o))
                .transpose()?
                .and_then(|o| o.as_dict())
            {
                for entry in gs_dict {
                    if let Ok(value) = resolver.resolve(entry.value) {
                        ext_gstates.insert(entry.key.to_vec(), ext_gstate_values(resolver, value));
                    }
                }
            }
        }
        Ok(PageResources { color_spaces, shadings, ext_gstates })
    }
}

impl<'a> ResourceLookup<'a> for PageResources {
    fn color_space(&self, name: &[u8]) -> Option<Rc<ColorSpace>> {
        self.color_spaces.get(name).cloned()
    }

    fn shading(&self, name: &[u8]) -> Option<Rc<ShadingResource>> {
        self.shadings.get(name).cloned()
    }

    fn ext_gstate(&self, name: &[u8]) -> Option<ExtGStateValues> {
        self.ext_gstates.get(name).copied()
    }
}

/// An opened PDF: the resolver plus the flattened page list, built once at
/// `open` time rather than walked lazily, so `page_count`/`page` are O(1)
/// and a malformed page tree fails during `open` instead of mid-render.
pub struct Document<'a> {
    resolver: Resolver<'a>,
    config: EngineConfig,
    catalog: Catalog<'a>,
    pages: Vec<Page<'a>>,
    info: Info,
}

#[derive(Clone, Copy, Default)]
struct Inherited<'a> {
    resources: Option<PdfObject<'a>>,
    media_box: Option<[f64; 4]>,
    rotate: Option<i32>,
}

impl<'a> Document<'a> {
    pub fn open(arena: &'a crate::arena::Arena, buffer: &'a [u8]) -> CtxResult<Self> {
        Self::open_with_config(arena, buffer, EngineConfig::default())
    }

    /// Each fallible stage pushes its own frame (§7) so a fatal here prints
    /// as a chain from "opening document" down to the actual lexical/schema
    /// cause, per spec.md §7/§8's outermost-to-innermost requirement.
    pub fn open_with_config(
        arena: &'a crate::arena::Arena,
        buffer: &'a [u8],
        config: EngineConfig,
    ) -> CtxResult<Self> {
        let resolver = Resolver::open(arena, buffer).context("opening resolver")?;
        let root_ref = resolver.root_ref().context("locating /Root in trailer")?;
        let catalog_object = resolver
            .resolve_ref(root_ref.id, root_ref.generation)
            .context("resolving catalog object")?;
        let catalog = deserialize_catalog(&resolver, catalog_object, &config)
            .context("deserializing catalog")?;

        let mut pages = Vec::new();
        walk_page_tree(
            &resolver,
            &config,
            catalog.pages,
            Inherited::default(),
            0,
            &mut pages,
        )
        .context("walking page tree")?;

        let info = resolver
            .trailer
            .dict_lookup(b"Info")
            .and_then(|o| resolver.resolve(o).ok())
            .map(|o| deserialize_info(&resolver, o))
            .unwrap_or_default();

        Ok(Document { resolver, config, catalog, pages, info })
    }

    pub fn catalog(&self) -> &Catalog<'a> {
        &self.catalog
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Result<&Page<'a>> {
        self.pages
            .get(index)
            .ok_or(Error::Document(DocumentError::PageIndexOutOfRange))
    }

    /// Decodes the page's content stream(s) (concatenated in array order,
    /// per PDF 32000-1 §7.8.2), tokenizes them, and drives the
    /// content-stream interpreter (§4.I) against `canvas`.
    pub fn render_page(&self, index: usize, canvas: &mut dyn Canvas) -> CtxResult<()> {
        let page = self.page(index).context("looking up page")?;
        let resources = PageResources::build(&self.resolver, page.resources, &self.config)
            .context("building page resources")?;

        let arena = crate::arena::Arena::default();
        let mut data = Vec::new();
        if let Some(contents) = page.contents {
            for stream_obj in content_streams(&self.resolver, contents)
                .context("resolving /Contents streams")?
            {
                let stream = stream_obj
                    .as_stream()
                    .ok_or(Error::Document(DocumentError::NotAPageLeaf))
                    .context("expecting a content stream")?;
                let filters = stream_filters(stream.dict);
                let decoded = decode_chain(&filters, stream.data).context("decoding filters")?;
                data.extend_from_slice(&decoded);
                data.push(b'\n');
            }
        }
        let data: &[u8] = arena.alloc_slice_copy(&data);

        let instructions = tokenize(&arena, data).context("tokenizing content stream")?;
        let mut interp = Interpreter::new(canvas, &resources);
        interp
            .run(&instructions)
            .context("executing content stream")
    }
}

/// Resolves `/Contents` into the ordered list of stream objects it names —
/// a single stream, or an array of streams concatenated per §7.8.2.
fn content_streams<'a>(resolver: &Resolver<'a>, contents: PdfObject<'a>) -> Result<Vec<PdfObject<'a>>> {
    let resolved = resolver.resolve(contents)?;
    if let Some(items) = resolved.as_array() {
        items.iter().map(|&item| resolver.resolve(item)).collect()
    } else {
        Ok(vec![resolved])
    }
}

fn stream_filters<'a>(dict: &[crate::object::DictEntry<'a>]) -> Vec<Filter> {
    let entry = dict.iter().find(|e| e.key == b"Filter");
    match entry.map(|e| e.value) {
        Some(PdfObject::Name(name)) => Filter::from_name(name).ok().into_iter().collect(),
        Some(PdfObject::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name())
            .filter_map(|n| Filter::from_name(n).ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn merge_inherited<'a>(parent: Inherited<'a>, node_resources: Option<PdfObject<'a>>, node_media_box: Option<[f64; 4]>, node_rotate: Option<i32>) -> Inherited<'a> {
    Inherited {
        resources: node_resources.or(parent.resources),
        media_box: node_media_box.or(parent.media_box),
        rotate: node_rotate.or(parent.rotate),
    }
}

/// Recursively flattens the `/Pages` tree into `out`, resolving inherited
/// `Resources`/`MediaBox`/`Rotate` down each branch per PDF 32000-1
/// §7.7.3.4. `depth` is bounded by `config.max_object_recursion` — the same
/// knob that caps indirect-object nesting elsewhere — since a page tree
/// with a `Kids` cycle would otherwise recurse forever.
fn walk_page_tree<'a>(
    resolver: &Resolver<'a>,
    config: &EngineConfig,
    node: PdfObject<'a>,
    inherited: Inherited<'a>,
    depth: u32,
    out: &mut Vec<Page<'a>>,
) -> Result<()> {
    if depth > config.max_object_recursion {
        return Err(Error::Document(DocumentError::PageTreeCycle));
    }

    let resolved = resolver.resolve(node)?;
    match deserialize_page_tree_node(resolver, resolved, config)? {
        PageTreeNode::Intermediate { kids, resources, media_box, rotate } => {
            let merged = merge_inherited(inherited, resources, media_box, rotate);
            for kid in kids {
                walk_page_tree(resolver, config, kid, merged, depth + 1, out)?;
            }
            Ok(())
        }
        PageTreeNode::Leaf { resources, media_box, rotate, contents } => {
            let merged = merge_inherited(inherited, resources, media_box, rotate);
            out.push(Page {
                resources: merged.resources,
                media_box: merged.media_box.unwrap_or(DEFAULT_MEDIA_BOX),
                rotate: merged.rotate.unwrap_or(0),
                contents,
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::canvas::RasterCanvas;

    fn sample_document() -> Vec<u8> {
        let obj1 = b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n";
        let obj2 =
            b"2 0 obj\n<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /MediaBox [0 0 200 300] >>\nendobj\n";
        let obj3 = b"3 0 obj\n<< /Type /Page /Parent 2 0 R /Contents 5 0 R >>\nendobj\n";
        let obj4 =
            b"4 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 50 50] /Rotate 90 >>\nendobj\n";
        let stream_body = b"1 0 0 rg 0 0 10 10 re f";
        let obj5 = format!(
            "5 0 obj\n<< /Length {} >>\nstream\n{}\nendstream\nendobj\n",
            stream_body.len(),
            std::str::from_utf8(stream_body).unwrap()
        );

        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.7\n");
        let mut offsets = Vec::new();
        for chunk in [obj1.as_slice(), obj2.as_slice(), obj3.as_slice(), obj4.as_slice(), obj5.as_bytes()] {
            offsets.push(buf.len());
            buf.extend_from_slice(chunk);
        }
        let xref_offset = buf.len();
        buf.extend_from_slice(b"xref\n0 6\n");
        buf.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets {
            buf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        buf.extend_from_slice(b"trailer\n<< /Size 6 /Root 1 0 R >>\n");
        buf.extend_from_slice(format!("startxref\n{}\n%%EOF", xref_offset).as_bytes());
        buf
    }

    #[test]
    fn opens_and_flattens_page_tree_with_inheritance() {
        let arena = Arena::default();
        let buf = sample_document();
        let doc = Document::open(&arena, &buf).unwrap();

        assert_eq!(doc.page_count(), 2);

        let first = doc.page(0).unwrap();
        assert_eq!(first.media_box, [0.0, 0.0, 200.0, 300.0]);
        assert_eq!(first.rotate, 0);
        assert!(first.contents.is_some());

        let second = doc.page(1).unwrap();
        assert_eq!(second.media_box, [0.0, 0.0, 50.0, 50.0]);
        assert_eq!(second.rotate, 90);
    }

    #[test]
    fn page_index_out_of_range_errors() {
        let arena = Arena::default();
        let buf = sample_document();
        let doc = Document::open(&arena, &buf).unwrap();
        assert_eq!(
            doc.page(99).err(),
            Some(Error::Document(DocumentError::PageIndexOutOfRange))
        );
    }

    #[test]
    fn render_page_paints_the_content_stream_onto_the_canvas() {
        let arena = Arena::default();
        let buf = sample_document();
        let doc = Document::open(&arena, &buf).unwrap();
        let mut canvas = RasterCanvas::new(200, 300);
        doc.render_page(0, &mut canvas).unwrap();
    }

    #[test]
    fn info_dictionary_is_absent_when_trailer_has_none() {
        let arena = Arena::default();
        let buf = sample_document();
        let doc = Document::open(&arena, &buf).unwrap();
        assert!(doc.info().title.is_none());
    }
}
