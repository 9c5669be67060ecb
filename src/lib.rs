//! # pdf-engine
//!
//! A PDF parsing and rendering engine: arena allocation, a byte-parsing
//! cursor, the PDF object model and lexer/parser, cross-reference table and
//! resolver, a declarative schema deserializer, an RFC 1951 DEFLATE decoder,
//! the stream filter pipeline, a content-stream interpreter, color-space
//! mapping, Type 2/3 shading, SFNT font-program parsing, and the top-level
//! `Document` glue that ties all of it together.
//!
//! This crate parses and renders existing PDFs; it does not write new ones,
//! handle encryption or linearized/incremental updates, execute JavaScript
//! or form actions, hint TrueType outlines, or rasterize glyph/SVG pixel
//! data — see each module's docs for the exact boundary.
//!
//! ```no_run
//! use pdf_engine::arena::Arena;
//! use pdf_engine::canvas::RasterCanvas;
//! use pdf_engine::document::Document;
//!
//! let bytes = std::fs::read("input.pdf").unwrap();
//! let arena = Arena::default();
//! let doc = Document::open(&arena, &bytes).unwrap();
//!
//! let mut canvas = RasterCanvas::new(612, 792);
//! doc.render_page(0, &mut canvas).unwrap();
//! ```

pub mod arena;
pub mod canvas;
pub mod color;
pub mod config;
pub mod content;
pub mod deflate;
pub mod document;
pub mod error;
pub mod filter;
pub mod font;
pub mod function;
pub mod matrix;
pub mod object;
pub mod parse_ctx;
pub mod resolver;
pub mod schema;
pub mod shading;
pub mod xref;

pub use config::EngineConfig;
pub use document::{Document, Info, Page};
pub use error::{CtxResult, Error, ErrorCtx, Result, ResultExt};
pub use resolver::Resolver;
