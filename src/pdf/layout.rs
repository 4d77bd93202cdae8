//! 从页面内容流恢复文本版面
//!
//! 遍历内容流并跟踪 CTM 和文本矩阵，把显示的每个字符串转换成带位置的字形，
//! 再按基线分组成行。表单 XObject 使用自身的矩阵和资源进入。
//! 字形宽度优先取字体 `/Widths`，没有时按字符估算。

use highlight_core::Rectangle;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Encoding, Object, ObjectId, Stream};
use std::collections::BTreeMap;

use super::utils::{get_number, get_page_content, get_stream_content, inherited_attribute, resolve_dict};
use super::PdfError;

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// 表单 XObject 的嵌套上限，同时阻止自引用表单
const MAX_FORM_DEPTH: usize = 8;

/// 字形框在基线下方 / 上方占字号的比例
const DESCENT: f32 = 0.22;
const ASCENT: f32 = 0.78;

/// 先应用 `m`，再应用 `n`
fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn translate(m: &Matrix, tx: f32, ty: f32) -> Matrix {
    multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], m)
}

fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, obj) in m.iter_mut().zip(operands) {
        *slot = get_number(obj)?;
    }
    Some(m)
}

/// 没有可用度量的字体按 em 估算宽度
fn estimate_char_width(c: char) -> f32 {
    if c.is_ascii() {
        0.55
    } else {
        1.0
    }
}

/// 用户空间中一个带位置的字符
#[derive(Debug, Clone, Copy)]
pub struct Glyph {
    pub ch: char,
    pub left: f32,
    pub right: f32,
    pub baseline: f32,
    pub size: f32,
}

impl Glyph {
    fn rect(&self) -> Rectangle {
        Rectangle::new(
            self.left,
            self.baseline + ASCENT * self.size,
            self.right,
            self.baseline - DESCENT * self.size,
        )
    }
}

/// 同一基线上的字形，按阅读顺序
#[derive(Debug, Clone, Default)]
pub struct TextLine {
    pub glyphs: Vec<Glyph>,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.glyphs.iter().map(|g| g.ch).collect()
    }

    /// `query` 不重叠、区分大小写的出现位置
    fn find(&self, query: &[char], max_hits: usize, out: &mut Vec<Rectangle>) {
        let n = query.len();
        if n == 0 || n > self.glyphs.len() {
            return;
        }
        let mut i = 0;
        while i + n <= self.glyphs.len() && out.len() < max_hits {
            let matched = self.glyphs[i..i + n].iter().zip(query).all(|(g, q)| g.ch == *q);
            if matched {
                let span = &self.glyphs[i..i + n];
                let mut rect = span[0].rect();
                for glyph in &span[1..] {
                    let r = glyph.rect();
                    rect = Rectangle::new(
                        rect.left.min(r.left),
                        rect.top.max(r.top),
                        rect.right.max(r.right),
                        rect.bottom.min(r.bottom),
                    );
                }
                out.push(rect);
                i += n;
            } else {
                i += 1;
            }
        }
    }
}

/// 单页带位置的文本
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub lines: Vec<TextLine>,
}

impl PageLayout {
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(TextLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `query` 的外接矩形，最多 `max_hits` 个
    pub fn find(&self, query: &str, max_hits: usize) -> Vec<Rectangle> {
        let query: Vec<char> = query.chars().collect();
        let mut out = Vec::new();
        for line in &self.lines {
            if out.len() >= max_hits {
                break;
            }
            line.find(&query, max_hits, &mut out);
        }
        out
    }
}

// ============================================================================
// 字体
// ============================================================================

struct FontMetrics<'a> {
    encoding: Option<Encoding<'a>>,
    first_char: i64,
    widths: Vec<f32>,
    two_byte: bool,
}

impl<'a> FontMetrics<'a> {
    fn load(doc: &'a Document, font: &'a Dictionary) -> Self {
        let two_byte = matches!(font.get(b"Subtype").and_then(Object::as_name), Ok(b"Type0"));
        let encoding = match font.get_font_encoding(doc) {
            Ok(encoding) => Some(encoding),
            Err(e) => {
                log::debug!("[Layout] 字体编码不可用: {}", e);
                None
            }
        };
        let first_char = font.get(b"FirstChar").and_then(Object::as_i64).unwrap_or(0);
        let widths = font
            .get(b"Widths")
            .ok()
            .and_then(|obj| match obj {
                Object::Array(arr) => Some(arr),
                Object::Reference(id) => doc.get_object(*id).and_then(Object::as_array).ok(),
                _ => None,
            })
            .map(|arr| arr.iter().map(|w| get_number(w).unwrap_or(0.0)).collect())
            .unwrap_or_default();

        Self {
            encoding,
            first_char,
            widths,
            two_byte,
        }
    }

    fn codes<'b>(&self, bytes: &'b [u8]) -> Vec<&'b [u8]> {
        let step = if self.two_byte { 2 } else { 1 };
        bytes.chunks(step).collect()
    }

    fn decode(&self, code: &[u8]) -> String {
        match &self.encoding {
            Some(encoding) => Document::decode_text(encoding, code)
                .unwrap_or_else(|_| code.iter().map(|&b| b as char).collect()),
            None => code.iter().map(|&b| b as char).collect(),
        }
    }

    /// 单个编码在文本空间中的宽度（未乘字号），未知时为 None
    fn width(&self, code: &[u8]) -> Option<f32> {
        if self.two_byte || code.len() != 1 {
            return None;
        }
        let index = code[0] as i64 - self.first_char;
        if index < 0 {
            return None;
        }
        self.widths
            .get(index as usize)
            .copied()
            .filter(|w| *w > 0.0)
            .map(|w| w / 1000.0)
    }
}

/// 单个内容流可见的字体和表单 XObject
#[derive(Default)]
struct Scope<'a> {
    fonts: BTreeMap<Vec<u8>, FontMetrics<'a>>,
    forms: BTreeMap<Vec<u8>, &'a Stream>,
}

impl<'a> Scope<'a> {
    fn from_resources(doc: &'a Document, resources: &'a Dictionary) -> Self {
        let entries = |key: &[u8]| {
            resources
                .get(key)
                .ok()
                .and_then(|obj| resolve_dict(doc, obj))
                .map(|dict| dict.iter().collect::<Vec<_>>())
                .unwrap_or_default()
        };

        let fonts = entries(b"Font")
            .into_iter()
            .filter_map(|(name, obj)| {
                resolve_dict(doc, obj).map(|font| (name.clone(), FontMetrics::load(doc, font)))
            })
            .collect();
        let forms = entries(b"XObject")
            .into_iter()
            .filter_map(|(name, obj)| {
                let stream = doc
                    .get_object(obj.as_reference().ok()?)
                    .and_then(Object::as_stream)
                    .ok()?;
                let is_form = matches!(stream.dict.get(b"Subtype").and_then(Object::as_name), Ok(b"Form"));
                is_form.then(|| (name.clone(), stream))
            })
            .collect();

        Self { fonts, forms }
    }

    /// 页面字体（含继承的）和页面的表单 XObject
    fn for_page(doc: &'a Document, page_id: ObjectId) -> Result<Self, PdfError> {
        let mut scope = inherited_attribute(doc, page_id, b"Resources")
            .and_then(|obj| resolve_dict(doc, obj))
            .map(|resources| Self::from_resources(doc, resources))
            .unwrap_or_default();
        for (name, font) in doc.get_page_fonts(page_id)? {
            scope
                .fonts
                .entry(name)
                .or_insert_with(|| FontMetrics::load(doc, font));
        }
        Ok(scope)
    }
}

// ============================================================================
// 内容流遍历
// ============================================================================

#[derive(Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            font: None,
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
        }
    }
}

struct LayoutBuilder<'a> {
    doc: &'a Document,
    /// 最内层作用域在最后
    scopes: Vec<Scope<'a>>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    depth: usize,
    glyphs: Vec<Glyph>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(doc: &'a Document, scope: Scope<'a>) -> Self {
        Self {
            doc,
            scopes: vec![scope],
            state: GraphicsState::default(),
            stack: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            depth: 0,
            glyphs: Vec::new(),
        }
    }

    fn font(&self, name: &[u8]) -> Option<&FontMetrics<'a>> {
        self.scopes.iter().rev().find_map(|scope| scope.fonts.get(name))
    }

    fn form(&self, name: &[u8]) -> Option<&'a Stream> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.forms.get(name).copied())
    }

    /// 在当前状态下排版表单 XObject，效果等同包在 `q ... Q` 中
    fn run_form(&mut self, name: &[u8]) {
        let Some(form) = self.form(name) else {
            return;
        };
        if self.depth >= MAX_FORM_DEPTH {
            log::debug!("[Layout] 表单嵌套达到上限，跳过 {:?}", String::from_utf8_lossy(name));
            return;
        }
        let content = match Content::decode(&get_stream_content(form)) {
            Ok(content) => content,
            Err(e) => {
                log::debug!("[Layout] 表单 {:?} 无法读取: {}", String::from_utf8_lossy(name), e);
                return;
            }
        };

        let saved = (self.state.clone(), self.text_matrix, self.line_matrix, self.stack.len());
        if let Some(m) = form
            .dict
            .get(b"Matrix")
            .and_then(Object::as_array)
            .ok()
            .and_then(|arr| matrix_operands(arr))
        {
            self.state.ctm = multiply(&m, &self.state.ctm);
        }

        let doc = self.doc;
        let own_scope = form
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve_dict(doc, obj))
            .map(|resources| Scope::from_resources(doc, resources));
        let pushed = own_scope.is_some();
        if let Some(scope) = own_scope {
            self.scopes.push(scope);
        }

        self.depth += 1;
        self.run(content);
        self.depth -= 1;

        if pushed {
            self.scopes.pop();
        }
        let (state, text_matrix, line_matrix, stack_len) = saved;
        self.state = state;
        self.text_matrix = text_matrix;
        self.line_matrix = line_matrix;
        self.stack.truncate(stack_len);
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = translate(&self.line_matrix, tx, ty);
        self.text_matrix = self.line_matrix;
    }

    fn advance(&mut self, tx: f32) {
        self.text_matrix = translate(&self.text_matrix, tx, 0.0);
    }

    fn show(&mut self, bytes: &[u8]) {
        let size = self.state.font_size;
        let th = self.state.horizontal_scale;
        let font = self.state.font.as_deref().and_then(|name| self.font(name));

        let mut pending = Vec::new();
        match font {
            Some(font) => {
                for code in font.codes(bytes) {
                    let text = font.decode(code);
                    let em = font
                        .width(code)
                        .unwrap_or_else(|| text.chars().map(estimate_char_width).sum::<f32>().max(0.25));
                    let spacing = if code == b" " { self.state.word_spacing } else { 0.0 };
                    let tx = (em * size + self.state.char_spacing + spacing) * th;
                    pending.push((text, tx));
                }
            }
            None => {
                for &b in bytes {
                    let c = b as char;
                    let spacing = if b == b' ' { self.state.word_spacing } else { 0.0 };
                    let tx = (estimate_char_width(c) * size + self.state.char_spacing + spacing) * th;
                    pending.push((c.to_string(), tx));
                }
            }
        }

        for (text, tx) in pending {
            self.emit(&text, tx);
        }
    }

    fn emit(&mut self, text: &str, tx: f32) {
        let m = multiply(&self.text_matrix, &self.state.ctm);
        let size = self.state.font_size * (m[2] * m[2] + m[3] * m[3]).sqrt();
        let start_x = m[4];
        let end_x = m[0] * tx + m[4];
        let baseline = m[5];

        let count = text.chars().count();
        if count > 0 {
            let step = (end_x - start_x) / count as f32;
            for (i, ch) in text.chars().enumerate() {
                let a = start_x + step * i as f32;
                let b = a + step;
                self.glyphs.push(Glyph {
                    ch,
                    left: a.min(b),
                    right: a.max(b),
                    baseline,
                    size: size.abs().max(1.0),
                });
            }
        }
        self.advance(tx);
    }

    fn run(&mut self, content: Content) {
        for op in content.operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => self.stack.push(self.state.clone()),
                "Q" => {
                    if let Some(saved) = self.stack.pop() {
                        self.state = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_operands(operands) {
                        self.state.ctm = multiply(&m, &self.state.ctm);
                    }
                }
                "BT" => {
                    self.text_matrix = IDENTITY;
                    self.line_matrix = IDENTITY;
                }
                "Tf" if operands.len() >= 2 => {
                    self.state.font = operands[0].as_name().ok().map(<[u8]>::to_vec);
                    if let Some(size) = get_number(&operands[1]) {
                        self.state.font_size = size;
                    }
                }
                "Tc" => {
                    if let Some(v) = operands.first().and_then(get_number) {
                        self.state.char_spacing = v;
                    }
                }
                "Tw" => {
                    if let Some(v) = operands.first().and_then(get_number) {
                        self.state.word_spacing = v;
                    }
                }
                "Tz" => {
                    if let Some(v) = operands.first().and_then(get_number) {
                        self.state.horizontal_scale = v / 100.0;
                    }
                }
                "TL" => {
                    if let Some(v) = operands.first().and_then(get_number) {
                        self.state.leading = v;
                    }
                }
                "Td" | "TD" if operands.len() >= 2 => {
                    if let (Some(tx), Some(ty)) = (get_number(&operands[0]), get_number(&operands[1])) {
                        if op.operator == "TD" {
                            self.state.leading = -ty;
                        }
                        self.next_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let Some(m) = matrix_operands(operands) {
                        self.text_matrix = m;
                        self.line_matrix = m;
                    }
                }
                "T*" => self.next_line(0.0, -self.state.leading),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(bytes);
                    }
                }
                "'" => {
                    self.next_line(0.0, -self.state.leading);
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(bytes);
                    }
                }
                "\"" if operands.len() >= 3 => {
                    if let Some(v) = get_number(&operands[0]) {
                        self.state.word_spacing = v;
                    }
                    if let Some(v) = get_number(&operands[1]) {
                        self.state.char_spacing = v;
                    }
                    self.next_line(0.0, -self.state.leading);
                    if let Object::String(bytes, _) = &operands[2] {
                        self.show(bytes);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.show(bytes),
                                other => {
                                    if let Some(n) = get_number(other) {
                                        let tx = -n / 1000.0 * self.state.font_size * self.state.horizontal_scale;
                                        self.advance(tx);
                                    }
                                }
                            }
                        }
                    }
                }
                "Do" => {
                    if let Some(Ok(name)) = operands.first().map(Object::as_name) {
                        self.run_form(name);
                    }
                }
                _ => {}
            }
        }
    }
}

/// 按基线把字形分组成行，单词之间有可见间隙时插入空格
fn build_lines(glyphs: Vec<Glyph>) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();
    let mut current = TextLine::default();

    for glyph in glyphs {
        if let Some(last) = current.glyphs.last().copied() {
            let tolerance = 0.5 * last.size.min(glyph.size);
            let same_baseline = (glyph.baseline - last.baseline).abs() <= tolerance;
            let backwards = glyph.left < last.right - last.size;
            if !same_baseline || backwards {
                lines.push(std::mem::take(&mut current));
            } else {
                let gap = glyph.left - last.right;
                if gap > 0.25 * last.size && !last.ch.is_whitespace() && !glyph.ch.is_whitespace() {
                    current.glyphs.push(Glyph {
                        ch: ' ',
                        left: last.right,
                        right: glyph.left,
                        baseline: last.baseline,
                        size: last.size,
                    });
                }
            }
        }
        current.glyphs.push(glyph);
    }
    if !current.glyphs.is_empty() {
        lines.push(current);
    }
    lines
}

/// 排版单页文本
pub fn page_layout(doc: &Document, page_id: ObjectId) -> Result<PageLayout, PdfError> {
    let raw = get_page_content(doc, page_id);
    let content = Content::decode(&raw).map_err(|e| PdfError::Content(e.to_string()))?;

    let mut builder = LayoutBuilder::new(doc, Scope::for_page(doc, page_id)?);
    builder.run(content);

    Ok(PageLayout {
        lines: build_lines(builder.glyphs),
    })
}
