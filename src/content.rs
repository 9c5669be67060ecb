//! Content-stream tokenizer, operator table, and graphics-state machine
//! (§4.I), grounded on `original_source/src/content_stream/tokenizer.c`
//! (operand/operator alternation) and `original_source/src/content_stream/
//! operators.c` (the per-operator dispatch table), with the graphics-state
//! field shape following `fschutt-printpdf/src/graphics.rs` and the matrix
//! combine idiom from `matrix.rs`/`ctm.rs`.
//!
//! Tokenization alternates exactly as spec.md describes: greedily try to
//! parse an operand object; on failure (every PDF operator is an ASCII
//! letter run that the object grammar rejects outright) rewind and read an
//! operator token instead, then flush the accumulated operand buffer into
//! one instruction.

use std::rc::Rc;

use crate::arena::Arena;
use crate::canvas::{Canvas, Rgba};
use crate::color::{map_color, ColorSpace};
use crate::error::{Error, LexicalError, Result};
use crate::matrix::Mat3;
use crate::object::{parse_object, PdfObject};
use crate::parse_ctx::{is_regular, ParseCtx};
use crate::shading::{render_shading, ShadingResource};

/// One `(operands, operator)` tuple from the content stream (§4.I).
#[derive(Debug, Clone)]
pub struct Instruction<'a> {
    pub operator: Vec<u8>,
    pub operands: Vec<PdfObject<'a>>,
}

/// Tokenizes an entire content stream into instructions. Inline images
/// (`BI … ID … EI`) are recognised and skipped whole, since rasterizing
/// their pixel data is out of scope (§4.I); no `Instruction` is emitted for
/// them.
pub fn tokenize<'a>(arena: &'a Arena, data: &'a [u8]) -> Result<Vec<Instruction<'a>>> {
    let mut ctx = ParseCtx::new(data);
    let mut instructions = Vec::new();
    let mut operands: Vec<PdfObject<'a>> = Vec::new();

    loop {
        ctx.consume_whitespace();
        if ctx.is_eof() {
            break;
        }

        let start = ctx.offset();
        match parse_object(arena, &mut ctx, false) {
            Ok(obj) => {
                operands.push(obj);
                continue;
            }
            Err(_) => ctx.seek(start)?,
        }

        let operator = read_operator_token(&mut ctx)?;

        if operator == b"BI" {
            skip_inline_image(&mut ctx)?;
            operands.clear();
            continue;
        }

        instructions.push(Instruction {
            operator: operator.to_vec(),
            operands: std::mem::take(&mut operands),
        });
    }

    Ok(instructions)
}

fn read_operator_token<'a>(ctx: &mut ParseCtx<'a>) -> Result<&'a [u8]> {
    let start = ctx.offset();
    let mut len = 0usize;
    while let Ok(b) = ctx.peek() {
        if !is_regular(b) {
            break;
        }
        ctx.peek_and_advance()?;
        len += 1;
    }
    if len == 0 {
        return Err(Error::Lexical(LexicalError::UnknownOperator));
    }
    ctx.slice(start, len)
}

/// Consumes `/Key value` pairs (inline-image dict syntax has no `<< >>`
/// brackets), then `ID`, a single separating whitespace byte, the raw
/// sample data, and the closing `EI`. The boundary is found by scanning
/// for whitespace immediately followed by `EI` and a non-regular byte or
/// EOF, matching the source's heuristic for un-length-prefixed inline
/// image data.
fn skip_inline_image<'a>(ctx: &mut ParseCtx<'a>) -> Result<()> {
    ctx.consume_whitespace();
    while ctx.peek().map(|b| b == b'/').unwrap_or(false) {
        read_operator_token(ctx).ok();
        ctx.consume_whitespace();
        // Re-use the arena-free object grammar only for skipping; values in
        // an inline image dict are always scalars/arrays, never streams.
        skip_one_value(ctx)?;
        ctx.consume_whitespace();
    }
    ctx.expect(b"ID")?;
    ctx.shift(1)?; // the single mandatory separator byte after ID

    loop {
        let offset = ctx.offset();
        if ctx.is_eof() {
            return Err(Error::Lexical(LexicalError::UnknownOperator));
        }
        let b = ctx.peek_and_advance()?;
        if !is_regular(b) {
            let probe_start = ctx.offset();
            if ctx.expect(b"EI").is_ok()
                && ctx.peek().map(|n| !is_regular(n)).unwrap_or(true)
            {
                return Ok(());
            }
            ctx.seek(probe_start)?;
        }
        let _ = offset;
    }
}

/// Skips exactly one inline-image dict value without retaining it (no
/// arena available in this context, and the value is never inspected).
fn skip_one_value(ctx: &mut ParseCtx) -> Result<()> {
    ctx.consume_whitespace();
    match ctx.peek()? {
        b'[' => {
            ctx.peek_and_advance()?;
            ctx.consume_whitespace();
            while ctx.peek().map(|b| b != b']').unwrap_or(false) {
                skip_one_value(ctx)?;
                ctx.consume_whitespace();
            }
            ctx.expect(b"]")?;
        }
        b'/' => {
            read_operator_token(ctx)?;
        }
        b'(' => {
            let mut depth = 1i32;
            ctx.peek_and_advance()?;
            while depth > 0 {
                match ctx.peek_and_advance()? {
                    b'(' => depth += 1,
                    b')' => depth -= 1,
                    _ => {}
                }
            }
        }
        _ => {
            // true/false/numbers: any run of regular bytes.
            while ctx.peek().map(is_regular).unwrap_or(false) {
                ctx.peek_and_advance()?;
            }
        }
    }
    Ok(())
}

/// Text-object state (`Tc Tw Tz TL Tf Tr Ts`), reset to its defaults only
/// at the start of a new `BT`, per spec.md §4.I.
#[derive(Debug, Clone)]
pub struct TextState {
    pub char_spacing: f64,
    pub word_spacing: f64,
    pub horizontal_scale: f64,
    pub leading: f64,
    pub font: Option<Vec<u8>>,
    pub font_size: f64,
    pub render_mode: i32,
    pub rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            font: None,
            font_size: 0.0,
            render_mode: 0,
            rise: 0.0,
        }
    }
}

/// One stroking/nonstroking color slot: the color space in force plus its
/// current component values (§4.I `CS/cs`, `SC/SCN`, `sc/scn`, `G/g`,
/// `RG/rg`, `K/k`).
#[derive(Clone)]
pub struct ColorState {
    pub space: Rc<ColorSpace>,
    pub components: Vec<f64>,
}

impl Default for ColorState {
    fn default() -> Self {
        ColorState {
            space: Rc::new(ColorSpace::DeviceGray),
            components: vec![0.0],
        }
    }
}

impl ColorState {
    pub fn rgba(&self) -> Rgba {
        match map_color(&self.components, &self.space) {
            Ok([r, g, b]) => [
                (r.clamp(0.0, 1.0) * 255.0).round() as u8,
                (g.clamp(0.0, 1.0) * 255.0).round() as u8,
                (b.clamp(0.0, 1.0) * 255.0).round() as u8,
                255,
            ],
            Err(_) => [0, 0, 0, 255],
        }
    }
}

/// The dash pattern `d array phase` operand pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashPattern {
    pub array: Vec<f64>,
    pub phase: f64,
}

/// A single `q`-snapshotted graphics state (§3 `GraphicsState`). Everything
/// in here must be `Clone` so `q`/`Q` is a plain stack push/pop of value
/// copies, matching spec.md §8's "state after `q X … Q` equals the state
/// before `q`" property.
#[derive(Clone)]
pub struct GraphicsState {
    pub ctm: Mat3,
    pub line_width: f64,
    pub line_cap: i32,
    pub line_join: i32,
    pub miter_limit: f64,
    pub dash: DashPattern,
    pub stroke_color: ColorState,
    pub fill_color: ColorState,
    pub clip_stack_height: usize,
    pub alpha_stroke: f64,
    pub alpha_fill: f64,
    pub text_state: TextState,
}

impl Default for GraphicsState {
    fn default() -> Self {
        GraphicsState {
            ctm: Mat3::IDENTITY,
            line_width: 1.0,
            line_cap: 0,
            line_join: 0,
            miter_limit: 10.0,
            dash: DashPattern::default(),
            stroke_color: ColorState::default(),
            fill_color: ColorState::default(),
            clip_stack_height: 0,
            alpha_stroke: 1.0,
            alpha_fill: 1.0,
            text_state: TextState::default(),
        }
    }
}

/// Path construction buffer (`m l c v y h re`). Curves are flattened to
/// line segments at a fixed subdivision count — the canvas contract (§6)
/// only takes already-flattened point lists.
#[derive(Default)]
pub struct PathBuilder {
    pub subpaths: Vec<Vec<(f64, f64)>>,
    current: Vec<(f64, f64)>,
    start: (f64, f64),
    cursor: (f64, f64),
}

const BEZIER_STEPS: usize = 16;

impl PathBuilder {
    fn flush_subpath(&mut self) {
        if self.current.len() > 1 {
            self.subpaths.push(std::mem::take(&mut self.current));
        } else {
            self.current.clear();
        }
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        self.flush_subpath();
        self.start = (x, y);
        self.cursor = (x, y);
        self.current.push((x, y));
    }

    pub fn line_to(&mut self, x: f64, y: f64) {
        if self.current.is_empty() {
            self.current.push(self.cursor);
        }
        self.current.push((x, y));
        self.cursor = (x, y);
    }

    pub fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) {
        if self.current.is_empty() {
            self.current.push(self.cursor);
        }
        let (x0, y0) = self.cursor;
        for i in 1..=BEZIER_STEPS {
            let t = i as f64 / BEZIER_STEPS as f64;
            let mt = 1.0 - t;
            let x = mt * mt * mt * x0
                + 3.0 * mt * mt * t * x1
                + 3.0 * mt * t * t * x2
                + t * t * t * x3;
            let y = mt * mt * mt * y0
                + 3.0 * mt * mt * t * y1
                + 3.0 * mt * t * t * y2
                + t * t * t * y3;
            self.current.push((x, y));
        }
        self.cursor = (x3, y3);
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.flush_subpath();
        self.current = vec![(x, y), (x + w, y), (x + w, y + h), (x, y + h)];
        self.start = (x, y);
        self.cursor = (x, y);
        self.flush_subpath();
    }

    pub fn close(&mut self) {
        if !self.current.is_empty() {
            self.current.push(self.start);
            self.cursor = self.start;
        }
    }

    pub fn finish(&mut self) -> Vec<Vec<(f64, f64)>> {
        self.flush_subpath();
        std::mem::take(&mut self.subpaths)
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.is_empty() && self.current.len() < 2
    }
}

/// The subset of an `ExtGState` dictionary this interpreter applies:
/// `/CA` (stroking alpha) and `/ca` (nonstroking alpha). Other entries
/// (`/BM`, `/SMask`, overprint flags, `/LW`/`/LC`/`/LJ`/`/ML`/`/D`, which
/// duplicate operators this interpreter already has) are not folded in here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtGStateValues {
    pub stroke_alpha: Option<f64>,
    pub fill_alpha: Option<f64>,
}

/// Resources a content stream executes against: `ExtGState`, named color
/// spaces, and (by name) shading dictionaries — the operator subset
/// spec.md requires a full implementation of (gs/CS/cs/sh). Callers supply
/// these already-deserialized, since resource lookup is schema work (§4.F),
/// not interpreter work.
pub trait ResourceLookup<'a> {
    fn color_space(&self, name: &[u8]) -> Option<Rc<ColorSpace>>;
    fn shading(&self, name: &[u8]) -> Option<Rc<ShadingResource>>;
    fn ext_gstate(&self, name: &[u8]) -> Option<ExtGStateValues>;
}

/// Drives a tokenized content stream against a `Canvas`, maintaining the
/// graphics-state stack described in §3/§4.I.
pub struct Interpreter<'a, 'res, C: Canvas> {
    canvas: &'a mut C,
    resources: &'res dyn ResourceLookup<'a>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    path: PathBuilder,
    in_text_object: bool,
    in_compat_section: bool,
    text_matrix: Mat3,
    line_matrix: Mat3,
    marked_content_depth: u32,
}

impl<'a, 'res, C: Canvas> Interpreter<'a, 'res, C> {
    pub fn new(canvas: &'a mut C, resources: &'res dyn ResourceLookup<'a>) -> Self {
        Interpreter {
            canvas,
            resources,
            state: GraphicsState::default(),
            stack: Vec::new(),
            path: PathBuilder::default(),
            in_text_object: false,
            in_compat_section: false,
            text_matrix: Mat3::IDENTITY,
            line_matrix: Mat3::IDENTITY,
            marked_content_depth: 0,
        }
    }

    pub fn state(&self) -> &GraphicsState {
        &self.state
    }

    pub fn run(&mut self, instructions: &[Instruction<'a>]) -> Result<()> {
        for instr in instructions {
            self.execute(instr)?;
        }
        Ok(())
    }

    fn nums(operands: &[PdfObject<'a>]) -> Option<Vec<f64>> {
        operands.iter().map(|o| o.as_number()).collect()
    }

    fn execute(&mut self, instr: &Instruction<'a>) -> Result<()> {
        let op = instr.operator.as_slice();
        let operands = &instr.operands;

        // Unknown operators and operand-arity mismatches are tolerated
        // silently inside a `BX … EX` compatibility section (§4.I).
        match self.execute_known(op, operands) {
            Ok(()) => Ok(()),
            Err(Error::Lexical(LexicalError::UnknownOperator)) if self.in_compat_section => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn execute_known(&mut self, op: &[u8], operands: &[PdfObject<'a>]) -> Result<()> {
        match op {
            b"q" => {
                self.stack.push(self.state.clone());
                Ok(())
            }
            b"Q" => {
                self.state = self
                    .stack
                    .pop()
                    .ok_or(Error::Lexical(LexicalError::MissingOperand))?;
                Ok(())
            }
            b"cm" => {
                let n = Self::nums(operands).ok_or(Error::Lexical(LexicalError::MissingOperand))?;
                if n.len() != 6 {
                    return Err(Error::Lexical(LexicalError::MissingOperand));
                }
                let m = Mat3::new(n[0], n[1], n[2], n[3], n[4], n[5]);
                self.state.ctm = m.then(self.state.ctm);
                Ok(())
            }
            b"w" => self.set_scalar(operands, |s, v| s.line_width = v),
            b"J" => self.set_scalar(operands, |s, v| s.line_cap = v as i32),
            b"j" => self.set_scalar(operands, |s, v| s.line_join = v as i32),
            b"M" => self.set_scalar(operands, |s, v| s.miter_limit = v),
            b"d" => {
                let array = operands
                    .first()
                    .and_then(|o| o.as_array())
                    .map(|items| items.iter().filter_map(|o| o.as_number()).collect())
                    .unwrap_or_default();
                let phase = operands.get(1).and_then(|o| o.as_number()).unwrap_or(0.0);
                self.state.dash = DashPattern { array, phase };
                Ok(())
            }
            b"ri" | b"i" => Ok(()),
            b"gs" => self.apply_ext_gstate(operands),
            b"m" => self.path_op(operands, |p, n| p.move_to(n[0], n[1]), 2),
            b"l" => self.path_op(operands, |p, n| p.line_to(n[0], n[1]), 2),
            b"c" => self.path_op(
                operands,
                |p, n| p.curve_to(n[0], n[1], n[2], n[3], n[4], n[5]),
                6,
            ),
            b"v" => {
                let n = Self::nums(operands).ok_or(Error::Lexical(LexicalError::MissingOperand))?;
                if n.len() != 4 {
                    return Err(Error::Lexical(LexicalError::MissingOperand));
                }
                let (cx, cy) = self.path.cursor_pos();
                self.path.curve_to(cx, cy, n[0], n[1], n[2], n[3]);
                Ok(())
            }
            b"y" => {
                let n = Self::nums(operands).ok_or(Error::Lexical(LexicalError::MissingOperand))?;
                if n.len() != 4 {
                    return Err(Error::Lexical(LexicalError::MissingOperand));
                }
                self.path.curve_to(n[0], n[1], n[2], n[3], n[2], n[3]);
                Ok(())
            }
            b"h" => {
                self.path.close();
                Ok(())
            }
            b"re" => self.path_op(operands, |p, n| p.rect(n[0], n[1], n[2], n[3]), 4),
            b"S" | b"s" | b"f" | b"F" | b"f*" | b"B" | b"B*" | b"b" | b"b*" | b"n" => {
                self.paint_path(op)
            }
            b"W" | b"W*" => {
                self.state.clip_stack_height += 1;
                Ok(())
            }
            b"CS" => self.set_color_space(operands, true),
            b"cs" => self.set_color_space(operands, false),
            b"SC" | b"SCN" => self.set_color_components(operands, true),
            b"sc" | b"scn" => self.set_color_components(operands, false),
            b"G" => self.set_device_color(operands, true, ColorSpace::DeviceGray, 1),
            b"g" => self.set_device_color(operands, false, ColorSpace::DeviceGray, 1),
            b"RG" => self.set_device_color(operands, true, ColorSpace::DeviceRGB, 3),
            b"rg" => self.set_device_color(operands, false, ColorSpace::DeviceRGB, 3),
            b"K" => self.set_device_color(operands, true, ColorSpace::DeviceCMYK, 4),
            b"k" => self.set_device_color(operands, false, ColorSpace::DeviceCMYK, 4),
            b"sh" => self.paint_shading(operands),
            b"BT" => {
                if self.in_text_object {
                    return Err(Error::Lexical(LexicalError::InvalidOperandDescriptor));
                }
                self.in_text_object = true;
                self.text_matrix = Mat3::IDENTITY;
                self.line_matrix = Mat3::IDENTITY;
                Ok(())
            }
            b"ET" => {
                if !self.in_text_object {
                    return Err(Error::Lexical(LexicalError::InvalidOperandDescriptor));
                }
                self.in_text_object = false;
                Ok(())
            }
            b"Tc" => self.set_scalar(operands, |s, v| s.text_state.char_spacing = v),
            b"Tw" => self.set_scalar(operands, |s, v| s.text_state.word_spacing = v),
            b"Tz" => self.set_scalar(operands, |s, v| s.text_state.horizontal_scale = v / 100.0),
            b"TL" => self.set_scalar(operands, |s, v| s.text_state.leading = v),
            b"Tf" => {
                let name = operands
                    .first()
                    .and_then(|o| o.as_name())
                    .ok_or(Error::Lexical(LexicalError::MissingOperand))?;
                let size = operands
                    .get(1)
                    .and_then(|o| o.as_number())
                    .ok_or(Error::Lexical(LexicalError::MissingOperand))?;
                self.state.text_state.font = Some(name.to_vec());
                self.state.text_state.font_size = size;
                Ok(())
            }
            b"Tr" => self.set_scalar(operands, |s, v| s.text_state.render_mode = v as i32),
            b"Ts" => self.set_scalar(operands, |s, v| s.text_state.rise = v),
            b"Td" => self.text_move(operands, false),
            b"TD" => self.text_move(operands, true),
            b"Tm" => {
                let n = Self::nums(operands).ok_or(Error::Lexical(LexicalError::MissingOperand))?;
                if n.len() != 6 {
                    return Err(Error::Lexical(LexicalError::MissingOperand));
                }
                self.line_matrix = Mat3::new(n[0], n[1], n[2], n[3], n[4], n[5]);
                self.text_matrix = self.line_matrix;
                Ok(())
            }
            b"T*" => {
                let leading = self.state.text_state.leading;
                self.advance_line(0.0, -leading)
            }
            b"Tj" => self.show_text(operands.first()),
            b"'" => {
                self.advance_line(0.0, -self.state.text_state.leading)?;
                self.show_text(operands.first())
            }
            b"\"" => {
                if operands.len() != 3 {
                    return Err(Error::Lexical(LexicalError::MissingOperand));
                }
                self.state.text_state.word_spacing = operands[0]
                    .as_number()
                    .ok_or(Error::Lexical(LexicalError::MissingOperand))?;
                self.state.text_state.char_spacing = operands[1]
                    .as_number()
                    .ok_or(Error::Lexical(LexicalError::MissingOperand))?;
                self.advance_line(0.0, -self.state.text_state.leading)?;
                self.show_text(operands.get(2))
            }
            b"TJ" => {
                let items = operands
                    .first()
                    .and_then(|o| o.as_array())
                    .ok_or(Error::Lexical(LexicalError::MissingOperand))?;
                for item in items {
                    match item {
                        PdfObject::String(_) => self.show_text(Some(item))?,
                        _ => {
                            let adj = item.as_number().unwrap_or(0.0);
                            let tx = -adj / 1000.0 * self.state.text_state.font_size
                                * self.state.text_state.horizontal_scale;
                            self.text_matrix = Mat3::translate(tx, 0.0).then(self.text_matrix);
                        }
                    }
                }
                Ok(())
            }
            b"d0" | b"d1" => Ok(()),
            b"Do" => Ok(()), // XObject painting: resource resolution + recursive form execution is document-level (§4.K) wiring.
            b"MP" | b"DP" | b"BMC" | b"BDC" => {
                self.marked_content_depth += 1;
                Ok(())
            }
            b"EMC" => {
                self.marked_content_depth = self.marked_content_depth.saturating_sub(1);
                Ok(())
            }
            b"BX" => {
                self.in_compat_section = true;
                Ok(())
            }
            b"EX" => {
                self.in_compat_section = false;
                Ok(())
            }
            _ => Err(Error::Lexical(LexicalError::UnknownOperator)),
        }
    }

    fn set_scalar(
        &mut self,
        operands: &[PdfObject<'a>],
        apply: impl FnOnce(&mut GraphicsState, f64),
    ) -> Result<()> {
        let v = operands
            .first()
            .and_then(|o| o.as_number())
            .ok_or(Error::Lexical(LexicalError::MissingOperand))?;
        apply(&mut self.state, v);
        Ok(())
    }

    fn path_op(
        &mut self,
        operands: &[PdfObject<'a>],
        apply: impl FnOnce(&mut PathBuilder, &[f64]),
        arity: usize,
    ) -> Result<()> {
        let n = Self::nums(operands).ok_or(Error::Lexical(LexicalError::MissingOperand))?;
        if n.len() != arity {
            return Err(Error::Lexical(LexicalError::MissingOperand));
        }
        apply(&mut self.path, &n);
        Ok(())
    }

    fn transformed_subpaths(&self) -> Vec<Vec<(f64, f64)>> {
        self.path
            .subpaths
            .iter()
            .map(|sp| sp.iter().map(|&(x, y)| self.state.ctm.apply(x, y)).collect())
            .collect()
    }

    fn paint_path(&mut self, op: &[u8]) -> Result<()> {
        let do_fill = matches!(op, b"f" | b"F" | b"f*" | b"B" | b"B*" | b"b" | b"b*");
        let do_stroke = matches!(op, b"S" | b"s" | b"B" | b"B*" | b"b" | b"b*");
        let close_first = matches!(op, b"s" | b"b" | b"b*");

        if close_first {
            self.path.close();
        }

        let fill = do_fill.then(|| self.state.fill_color.rgba());
        let stroke_color = self.state.stroke_color.rgba();
        let line_width = self.state.line_width;
        let stroke = do_stroke.then_some((stroke_color, line_width));

        for subpath in self.transformed_subpaths() {
            if subpath.len() < 2 {
                continue;
            }
            self.canvas.draw_path(&subpath, close_first, fill, stroke);
        }

        self.path = PathBuilder::default();
        Ok(())
    }

    fn set_color_space(&mut self, operands: &[PdfObject<'a>], stroking: bool) -> Result<()> {
        let name = operands
            .first()
            .and_then(|o| o.as_name())
            .ok_or(Error::Lexical(LexicalError::MissingOperand))?;
        let space = match name {
            b"DeviceGray" => Rc::new(ColorSpace::DeviceGray),
            b"DeviceRGB" => Rc::new(ColorSpace::DeviceRGB),
            b"DeviceCMYK" => Rc::new(ColorSpace::DeviceCMYK),
            b"Pattern" => Rc::new(ColorSpace::Pattern),
            other => self
                .resources
                .color_space(other)
                .unwrap_or_else(|| Rc::new(ColorSpace::DeviceGray)),
        };
        let n = space.n_components().max(1);
        let slot = if stroking {
            &mut self.state.stroke_color
        } else {
            &mut self.state.fill_color
        };
        slot.space = space;
        slot.components = vec![0.0; n];
        Ok(())
    }

    fn set_color_components(&mut self, operands: &[PdfObject<'a>], stroking: bool) -> Result<()> {
        let components: Vec<f64> = operands.iter().filter_map(|o| o.as_number()).collect();
        let slot = if stroking {
            &mut self.state.stroke_color
        } else {
            &mut self.state.fill_color
        };
        if !components.is_empty() {
            slot.components = components;
        }
        Ok(())
    }

    fn set_device_color(
        &mut self,
        operands: &[PdfObject<'a>],
        stroking: bool,
        space: ColorSpace,
        arity: usize,
    ) -> Result<()> {
        let n = Self::nums(operands).ok_or(Error::Lexical(LexicalError::MissingOperand))?;
        if n.len() != arity {
            return Err(Error::Lexical(LexicalError::MissingOperand));
        }
        let slot = if stroking {
            &mut self.state.stroke_color
        } else {
            &mut self.state.fill_color
        };
        slot.space = Rc::new(space);
        slot.components = n;
        Ok(())
    }

    /// `gs /Name` (§4.I): merges the named `ExtGState` resource into the
    /// graphics state. Only `/CA`/`/ca` are applied, into
    /// `alpha_stroke`/`alpha_fill`; an unresolvable name is a no-op rather
    /// than an error, matching how `CS`/`cs` fall back on an unresolvable
    /// color-space name.
    fn apply_ext_gstate(&mut self, operands: &[PdfObject<'a>]) -> Result<()> {
        let name = operands
            .first()
            .and_then(|o| o.as_name())
            .ok_or(Error::Lexical(LexicalError::MissingOperand))?;
        if let Some(values) = self.resources.ext_gstate(name) {
            if let Some(ca) = values.stroke_alpha {
                self.state.alpha_stroke = ca;
            }
            if let Some(ca) = values.fill_alpha {
                self.state.alpha_fill = ca;
            }
        }
        Ok(())
    }

    /// `sh /Name` (§4.I): evaluates the named shading dictionary against
    /// the current CTM over the whole canvas (clipping to a path region is
    /// tracked only as a stack height, §3 `GraphicsState`, since the clip
    /// path itself isn't retained) and writes pixels straight to the
    /// canvas, per §2's "(I) calls (J) for shadings".
    fn paint_shading(&mut self, operands: &[PdfObject<'a>]) -> Result<()> {
        let name = operands
            .first()
            .and_then(|o| o.as_name())
            .ok_or(Error::Lexical(LexicalError::MissingOperand))?;
        let resource = match self.resources.shading(name) {
            Some(resource) => resource,
            None => return Ok(()),
        };

        let ctm = self.state.ctm;
        let bbox = (0.0, 0.0, self.canvas.width() as f64, self.canvas.height() as f64);
        let step = self.canvas.raster_resolution();
        let canvas = &mut *self.canvas;
        render_shading(
            &resource.shading,
            &resource.functions,
            &resource.space,
            ctm,
            bbox,
            step,
            |x, y, rgb| {
                let rgba: Rgba = [
                    (rgb[0].clamp(0.0, 1.0) * 255.0).round() as u8,
                    (rgb[1].clamp(0.0, 1.0) * 255.0).round() as u8,
                    (rgb[2].clamp(0.0, 1.0) * 255.0).round() as u8,
                    255,
                ];
                canvas.draw_pixel(x.round() as i64, y.round() as i64, rgba);
            },
        )
    }

    fn text_move(&mut self, operands: &[PdfObject<'a>], set_leading: bool) -> Result<()> {
        let n = Self::nums(operands).ok_or(Error::Lexical(LexicalError::MissingOperand))?;
        if n.len() != 2 {
            return Err(Error::Lexical(LexicalError::MissingOperand));
        }
        if set_leading {
            self.state.text_state.leading = -n[1];
        }
        self.advance_line(n[0], n[1])
    }

    fn advance_line(&mut self, tx: f64, ty: f64) -> Result<()> {
        self.line_matrix = Mat3::translate(tx, ty).then(self.line_matrix);
        self.text_matrix = self.line_matrix;
        Ok(())
    }

    /// Renders a text-showing string as a run of filled glyph-box
    /// placeholders (glyph outline rasterization is out of scope, §1); each
    /// byte still advances the text matrix per PDF 32000-1 §9.4.3's
    /// formula, which is the part of text showing this spec requires.
    fn show_text(&mut self, operand: Option<&PdfObject<'a>>) -> Result<()> {
        if !self.in_text_object {
            return Err(Error::Lexical(LexicalError::InvalidOperandDescriptor));
        }
        let bytes = operand
            .and_then(|o| o.as_string())
            .ok_or(Error::Lexical(LexicalError::MissingOperand))?;

        let ts = &self.state.text_state;
        let fill = self.state.fill_color.rgba();
        for &byte in bytes {
            // Without embedded font metrics every glyph uses an
            // em-square-fraction placeholder advance; real width tables
            // come from the font program (§4.L) via the document glue.
            let glyph_width = 0.5;
            let advance = (glyph_width * ts.font_size + ts.char_spacing
                + if byte == b' ' { ts.word_spacing } else { 0.0 })
                * ts.horizontal_scale;

            if ts.render_mode != 3 && ts.font_size > 0.0 {
                let render_matrix = Mat3::new(
                    ts.font_size * ts.horizontal_scale,
                    0.0,
                    0.0,
                    ts.font_size,
                    0.0,
                    ts.rise,
                )
                .then(self.text_matrix)
                .then(self.state.ctm);
                let (x0, y0) = render_matrix.apply(0.0, 0.0);
                let (x1, y1) = render_matrix.apply(glyph_width, 1.0);
                let w = (x1 - x0).abs().max(1e-6);
                let h = (y1 - y0).abs().max(1e-6);
                self.canvas
                    .draw_rect(x0.min(x1), y0.min(y1), w, h, Some(fill), None);
            }

            self.text_matrix = Mat3::translate(advance, 0.0).then(self.text_matrix);
        }
        Ok(())
    }
}

impl PathBuilder {
    fn cursor_pos(&self) -> (f64, f64) {
        self.current.last().copied().unwrap_or(self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::RasterCanvas;

    struct NoResources;
    impl<'a> ResourceLookup<'a> for NoResources {
        fn color_space(&self, _name: &[u8]) -> Option<Rc<ColorSpace>> {
            None
        }
        fn shading(&self, _name: &[u8]) -> Option<Rc<ShadingResource>> {
            None
        }
        fn ext_gstate(&self, _name: &[u8]) -> Option<ExtGStateValues> {
            None
        }
    }

    fn run<'a>(arena: &'a Arena, canvas: &mut RasterCanvas, src: &'a [u8]) -> GraphicsState {
        let instructions = tokenize(arena, src).unwrap();
        let resources = NoResources;
        let mut interp = Interpreter::new(canvas, &resources);
        interp.run(&instructions).unwrap();
        interp.state().clone()
    }

    #[test]
    fn tokenizes_operands_then_operator() {
        let arena = Arena::default();
        let instructions = tokenize(&arena, b"1 0 0 1 10 20 cm").unwrap();
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].operator, b"cm");
        assert_eq!(instructions[0].operands.len(), 6);
    }

    #[test]
    fn q_x_q_restores_prior_state() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let before = GraphicsState::default();
        let after = run(&arena, &mut canvas, b"q 2 0 0 2 5 5 cm 3 w Q");
        assert_eq!(after.ctm, before.ctm);
        assert_eq!(after.line_width, before.line_width);
    }

    #[test]
    fn cm_premultiplies_ctm() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let state = run(&arena, &mut canvas, b"1 0 0 1 10 0 cm 1 0 0 1 0 5 cm");
        let (x, y) = state.ctm.apply(0.0, 0.0);
        assert!((x - 10.0).abs() < 1e-9);
        assert!((y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn rg_sets_fill_device_rgb() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let state = run(&arena, &mut canvas, b"1 0 0 rg");
        assert_eq!(state.fill_color.components, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn unbalanced_q_pop_is_an_error() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let instructions = tokenize(&arena, b"Q").unwrap();
        let resources = NoResources;
        let mut interp = Interpreter::new(&mut canvas, &resources);
        assert!(interp.run(&instructions).is_err());
    }

    #[test]
    fn re_then_f_paints_a_filled_rect_and_clears_the_path() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let instructions = tokenize(&arena, b"1 0 0 rg 0 0 4 4 re f").unwrap();
        let resources = NoResources;
        let mut interp = Interpreter::new(&mut canvas, &resources);
        interp.run(&instructions).unwrap();
        assert!(interp.path.is_empty());
    }

    #[test]
    fn bt_et_must_balance() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let instructions = tokenize(&arena, b"BT BT ET ET").unwrap();
        let resources = NoResources;
        let mut interp = Interpreter::new(&mut canvas, &resources);
        assert!(interp.run(&instructions).is_err());
    }

    #[test]
    fn bx_ex_swallows_unknown_operators() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let instructions = tokenize(&arena, b"BX totallyUnknownOp EX").unwrap();
        let resources = NoResources;
        let mut interp = Interpreter::new(&mut canvas, &resources);
        assert!(interp.run(&instructions).is_ok());
    }

    #[test]
    fn unknown_operator_outside_compat_section_errors() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let instructions = tokenize(&arena, b"totallyUnknownOp").unwrap();
        let resources = NoResources;
        let mut interp = Interpreter::new(&mut canvas, &resources);
        assert!(interp.run(&instructions).is_err());
    }

    #[test]
    fn tj_array_advances_text_matrix_past_numeric_adjustment() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let instructions = tokenize(&arena, b"BT /F1 12 Tf [(A) -200 (B)] TJ ET").unwrap();
        let resources = NoResources;
        let mut interp = Interpreter::new(&mut canvas, &resources);
        interp.run(&instructions).unwrap();
    }

    struct OneExtGState;
    impl<'a> ResourceLookup<'a> for OneExtGState {
        fn color_space(&self, _name: &[u8]) -> Option<Rc<ColorSpace>> {
            None
        }
        fn shading(&self, _name: &[u8]) -> Option<Rc<ShadingResource>> {
            None
        }
        fn ext_gstate(&self, name: &[u8]) -> Option<ExtGStateValues> {
            (name == b"GS1").then_some(ExtGStateValues {
                stroke_alpha: Some(0.5),
                fill_alpha: Some(0.25),
            })
        }
    }

    #[test]
    fn gs_merges_ca_and_lowercase_ca_into_alpha_fields() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let instructions = tokenize(&arena, b"/GS1 gs").unwrap();
        let resources = OneExtGState;
        let mut interp = Interpreter::new(&mut canvas, &resources);
        interp.run(&instructions).unwrap();
        assert_eq!(interp.state().alpha_stroke, 0.5);
        assert_eq!(interp.state().alpha_fill, 0.25);
    }

    #[test]
    fn gs_with_unresolvable_name_is_a_no_op() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let instructions = tokenize(&arena, b"/Nonexistent gs").unwrap();
        let resources = OneExtGState;
        let mut interp = Interpreter::new(&mut canvas, &resources);
        interp.run(&instructions).unwrap();
        assert_eq!(interp.state().alpha_stroke, 1.0);
        assert_eq!(interp.state().alpha_fill, 1.0);
    }

    struct IdentityGray;
    impl crate::function::PdfFunction for IdentityGray {
        fn eval(&self, input: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![input[0]])
        }
    }

    struct OneShading;
    impl<'a> ResourceLookup<'a> for OneShading {
        fn color_space(&self, _name: &[u8]) -> Option<Rc<ColorSpace>> {
            None
        }
        fn shading(&self, name: &[u8]) -> Option<Rc<ShadingResource>> {
            (name == b"Sh1").then(|| {
                Rc::new(ShadingResource {
                    shading: crate::shading::Shading::Axial(crate::shading::AxialShading {
                        p0: (0.0, 0.0),
                        p1: (10.0, 0.0),
                        domain: (0.0, 1.0),
                        extend: (true, true),
                    }),
                    functions: crate::shading::ShadingFunctions::Single(Rc::new(IdentityGray)),
                    space: ColorSpace::DeviceGray,
                })
            })
        }
        fn ext_gstate(&self, _name: &[u8]) -> Option<ExtGStateValues> {
            None
        }
    }

    #[test]
    fn sh_paints_pixels_from_the_named_shading_onto_the_canvas() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let instructions = tokenize(&arena, b"/Sh1 sh").unwrap();
        let resources = OneShading;
        let mut interp = Interpreter::new(&mut canvas, &resources);
        interp.run(&instructions).unwrap();
        assert!(canvas.pixels().iter().any(|&b| b != 0));
    }

    #[test]
    fn sh_with_unresolvable_name_is_a_no_op() {
        let arena = Arena::default();
        let mut canvas = RasterCanvas::new(10, 10);
        let instructions = tokenize(&arena, b"/Nonexistent sh").unwrap();
        let resources = OneShading;
        let mut interp = Interpreter::new(&mut canvas, &resources);
        assert!(interp.run(&instructions).is_ok());
    }
}
