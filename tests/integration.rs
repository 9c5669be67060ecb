//! End-to-end tests driving the public API the way a caller actually would:
//! build a well-formed PDF byte buffer by hand, open it, and walk it through
//! to a rendered canvas or a resolved color/shading/function value.

use pdf_engine::arena::Arena;
use pdf_engine::canvas::{RasterCanvas, SvgCanvas};
use pdf_engine::document::Document;
use pdf_engine::resolver::Resolver;

/// Packs `objects` (each a complete `N 0 obj ... endobj` body, in order
/// starting at object 1) into a minimal single-section PDF with a matching
/// xref table and a `trailer` pointing at object 1 as `/Root`.
fn build_pdf(objects: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"%PDF-1.7\n");

    let mut offsets = Vec::new();
    for obj in objects {
        offsets.push(buf.len());
        buf.extend_from_slice(obj);
    }

    let xref_offset = buf.len();
    buf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    buf.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        buf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    buf.extend_from_slice(format!("trailer\n<< /Size {} /Root 1 0 R >>\n", objects.len() + 1).as_bytes());
    buf.extend_from_slice(format!("startxref\n{}\n%%EOF", xref_offset).as_bytes());
    buf
}

fn obj(id: u32, body: &str) -> Vec<u8> {
    format!("{} 0 obj\n{}\nendobj\n", id, body).into_bytes()
}

fn stream_obj(id: u32, dict_extra: &str, data: &[u8]) -> Vec<u8> {
    let mut out = format!("{} 0 obj\n<< {} /Length {} >>\nstream\n", id, dict_extra, data.len())
        .into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream\nendobj\n");
    out
}

/// Wraps `body` in a single RFC 1951 "stored" (uncompressed) DEFLATE block,
/// per §3.2.4: a byte-aligned 1-byte header (BFINAL=1, BTYPE=00, remaining
/// bits zero-padded), then `LEN`/`~LEN` as little-endian `u16`s, then the
/// raw bytes verbatim.
fn deflate_stored(body: &[u8]) -> Vec<u8> {
    let len = body.len() as u16;
    let nlen = !len;
    let mut out = vec![0x01u8];
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&nlen.to_le_bytes());
    out.extend_from_slice(body);
    out
}

#[test]
fn opens_a_document_and_renders_a_flate_decoded_content_stream_to_svg() {
    let content = b"1 0 0 rg 10 20 100 50 re f";
    let compressed = deflate_stored(content);

    let objects = vec![
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 200 200] >>"),
        obj(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R /Resources << >> >>"),
        stream_obj(4, "/Filter /FlateDecode", &compressed),
    ];
    let buf = build_pdf(&objects);

    let arena = Arena::default();
    let doc = Document::open(&arena, &buf).expect("valid minimal document");
    assert_eq!(doc.page_count(), 1);

    let mut canvas = SvgCanvas::new(200, 200);
    doc.render_page(0, &mut canvas).expect("content stream renders cleanly");
    let svg = canvas.finish();

    assert!(svg.starts_with("<svg"));
    assert!(svg.ends_with("</svg>"));
    // `1 0 0 rg` set fill to pure red before the `re f` paints it.
    assert!(svg.contains("#ff0000ff"), "expected red fill in: {svg}");
}

#[test]
fn chained_ascii_hex_then_flate_filters_decode_to_the_same_content() {
    let content = b"0 0 1 rg 0 0 50 50 re f";
    let compressed = deflate_stored(content);
    let hex: String = compressed.iter().map(|b| format!("{:02X}", b)).collect();
    let hex_with_eod = format!("{hex}>");

    let objects = vec![
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 80 80] >>"),
        obj(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R /Resources << >> >>"),
        stream_obj(4, "/Filter [/ASCIIHexDecode /FlateDecode]", hex_with_eod.as_bytes()),
    ];
    let buf = build_pdf(&objects);

    let arena = Arena::default();
    let doc = Document::open(&arena, &buf).unwrap();
    let mut canvas = SvgCanvas::new(80, 80);
    doc.render_page(0, &mut canvas).unwrap();
    let svg = canvas.finish();
    assert!(svg.contains("#0000ffff"), "expected blue fill in: {svg}");
}

#[test]
fn page_tree_inheritance_survives_a_full_open_and_render_cycle() {
    let objects = vec![
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(
            2,
            "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /MediaBox [0 0 300 300] /Rotate 0 >>",
        ),
        obj(3, "<< /Type /Page /Parent 2 0 R >>"),
        obj(4, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 90 90] /Rotate 270 >>"),
    ];
    let buf = build_pdf(&objects);

    let arena = Arena::default();
    let doc = Document::open(&arena, &buf).unwrap();
    assert_eq!(doc.page_count(), 2);

    let inherited = doc.page(0).unwrap();
    assert_eq!(inherited.media_box, [0.0, 0.0, 300.0, 300.0]);
    assert_eq!(inherited.rotate, 0);
    assert!(inherited.contents.is_none());

    let overridden = doc.page(1).unwrap();
    assert_eq!(overridden.media_box, [0.0, 0.0, 90.0, 90.0]);
    assert_eq!(overridden.rotate, 270);

    // A page with no /Contents renders as a no-op rather than an error.
    let mut canvas = RasterCanvas::new(90, 90);
    doc.render_page(1, &mut canvas).unwrap();
}

#[test]
fn document_info_dictionary_resolves_through_the_trailer() {
    let objects = vec![
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 10 10] >>"),
        obj(3, "<< /Type /Page /Parent 2 0 R >>"),
        obj(4, "<< /Title (Integration Test) /Author (pdf-engine) >>"),
    ];
    let mut buf = Vec::new();
    buf.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    for o in &objects {
        offsets.push(buf.len());
        buf.extend_from_slice(o);
    }
    let xref_offset = buf.len();
    buf.extend_from_slice(b"xref\n0 5\n0000000000 65535 f \n");
    for offset in &offsets {
        buf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    buf.extend_from_slice(b"trailer\n<< /Size 5 /Root 1 0 R /Info 4 0 R >>\n");
    buf.extend_from_slice(format!("startxref\n{}\n%%EOF", xref_offset).as_bytes());

    let arena = Arena::default();
    let doc = Document::open(&arena, &buf).unwrap();
    assert_eq!(doc.info().title.as_deref(), Some(b"Integration Test".as_slice()));
    assert_eq!(doc.info().author.as_deref(), Some(b"pdf-engine".as_slice()));
}

#[test]
fn shading_dictionary_resolves_and_renders_through_the_resolver() {
    use pdf_engine::color::deserialize_color_space;
    use pdf_engine::config::EngineConfig;
    use pdf_engine::function::{deserialize_function, PdfFunction};
    use pdf_engine::shading::{deserialize_shading, render_shading, Shading};

    let objects = vec![
        obj(1, "<< /Type /Catalog /Pages 2 0 R >>"),
        obj(2, "<< /Type /Pages /Kids [] /Count 0 /MediaBox [0 0 10 10] >>"),
        obj(
            3,
            "<< /ShadingType 2 /ColorSpace /DeviceGray /Coords [0 0 10 0] /Function 4 0 R /Extend [true true] >>",
        ),
        obj(4, "<< /FunctionType 2 /Domain [0 1] /C0 [0] /C1 [1] /N 1 >>"),
    ];
    let buf = build_pdf(&objects);

    let arena = Arena::default();
    let resolver = Resolver::open(&arena, &buf).unwrap();
    let config = EngineConfig::default();

    let shading_obj = resolver.resolve_ref(3, 0).unwrap();
    let (shading, functions, space) = deserialize_shading(&resolver, shading_obj, &config).unwrap();
    assert!(matches!(shading, Shading::Axial(_)));

    // Sanity-check the pieces independently resolve too, the way a caller
    // might reuse them outside `deserialize_shading`.
    let color_space_obj = resolver.resolve(shading_obj.dict_lookup(b"ColorSpace").unwrap()).unwrap();
    let space_again = deserialize_color_space(&resolver, color_space_obj, &config).unwrap();
    assert_eq!(space.n_components(), space_again.n_components());

    let function_obj = resolver.resolve_ref(4, 0).unwrap();
    let function = deserialize_function(&resolver, function_obj, &config).unwrap();
    assert!((function.eval(&[0.5]).unwrap()[0] - 0.5).abs() < 1e-9);

    let mut samples = 0;
    render_shading(&shading, &functions, &space, pdf_engine::matrix::Mat3::IDENTITY, (0.0, 0.0, 10.0, 10.0), 2.0, |_, _, _| {
        samples += 1;
    })
    .unwrap();
    assert!(samples > 0);
}

#[test]
fn malformed_startxref_is_reported_rather_than_panicking() {
    let mut buf = b"%PDF-1.7\nnot a real xref table".to_vec();
    buf.extend_from_slice(b"\nstartxref\n999999\n%%EOF");
    let arena = Arena::default();
    assert!(Document::open(&arena, &buf).is_err());
}

#[test]
fn open_failure_carries_a_context_frame_chain() {
    let mut buf = b"%PDF-1.7\nnot a real xref table".to_vec();
    buf.extend_from_slice(b"\nstartxref\n999999\n%%EOF");
    let arena = Arena::default();
    let err = Document::open(&arena, &buf).unwrap_err();
    assert!(!err.frames.is_empty());
    let rendered = err.to_string();
    assert!(rendered.contains("opening resolver"));
}
