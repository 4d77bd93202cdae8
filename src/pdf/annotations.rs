//! 以 PDF 注释的形式放置高亮
//!
//! 每个矩形生成一个 Square 注释（填充底色，无边框）或 Highlight 注释，
//! 并登记到增量更新中页面的 `/Annots` 数组。
//! 注释无法写入时，直接把矩形绘制到页面内容中。

use highlight_core::{AnnotationKind, AnnotationStyle, Rectangle};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};

use super::overlay;
use super::utils::page_bounds;
use super::{PdfDocument, PdfError};

/// 文本矩形四周的默认外扩量，页面单位
pub const DEFAULT_MARGIN_X: f32 = 1.0;
pub const DEFAULT_MARGIN_Y: f32 = 0.5;

/// 外观流中图形状态的名称
const APPEARANCE_GS: &str = "GS0";

/// 矩形最终写入文档的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// 新建的注释对象
    Annotation(ObjectId),
    /// 追加到页面内容中的填充矩形
    ContentStream,
}

#[derive(Debug, Clone, Copy)]
pub struct AnnotationPlacer {
    margin_x: f32,
    margin_y: f32,
}

impl Default for AnnotationPlacer {
    fn default() -> Self {
        Self::new(DEFAULT_MARGIN_X, DEFAULT_MARGIN_Y)
    }
}

impl AnnotationPlacer {
    pub fn new(margin_x: f32, margin_y: f32) -> Self {
        Self { margin_x, margin_y }
    }

    /// 在第 `page_index` 页的 `rect` 上放置一个高亮。
    ///
    /// 矩形先按边距外扩，再裁剪到页面可见区域。
    /// 同一矩形放置两次会生成两个对象。
    pub fn place(
        &self,
        doc: &mut PdfDocument,
        page_index: usize,
        rect: &Rectangle,
        style: &AnnotationStyle,
    ) -> Result<Placement, PdfError> {
        if !doc.is_writable() {
            return Err(PdfError::Encrypted("document cannot take an update"));
        }
        let page_id = doc.page_id(page_index)?;
        if !rect.is_finite() {
            return Err(PdfError::Rejected(format!("non-finite rectangle {:?}", rect)));
        }

        let bounds = page_bounds(doc.reader(), page_id);
        let target = rect
            .inflate(self.margin_x, self.margin_y)
            .clamp_to(&bounds)
            .filter(|r| !r.is_degenerate())
            .ok_or_else(|| {
                PdfError::Rejected(format!("{:?} is outside page {}", rect, page_index + 1))
            })?;

        let placement = match add_annotation(doc, page_id, &target, style) {
            Ok(annot_id) => {
                log::debug!(
                    "[Placer] 第 {} 页: {} 注释 {:?}",
                    page_index + 1,
                    style.kind,
                    annot_id
                );
                Placement::Annotation(annot_id)
            }
            Err(e) => {
                log::warn!(
                    "[Placer] 第 {} 页注释写入失败: {}，改为绘制到页面内容",
                    page_index + 1,
                    e
                );
                overlay::paint_rect(doc, page_id, &target, style)?;
                Placement::ContentStream
            }
        };
        doc.record_placement();
        Ok(placement)
    }
}

fn real_array(values: &[f32]) -> Vec<Object> {
    values.iter().map(|v| Object::Real(*v)).collect()
}

fn add_annotation(
    doc: &mut PdfDocument,
    page_id: ObjectId,
    rect: &Rectangle,
    style: &AnnotationStyle,
) -> Result<ObjectId, PdfError> {
    let color = real_array(&style.fill().components());
    let opacity = style.opacity.value();
    let subtype = match style.kind {
        AnnotationKind::Backdrop => "Square",
        AnnotationKind::Highlight => "Highlight",
    };

    // 写入任何对象之前先检查，失败时增量更新保持干净
    let slot = annots_slot(doc, page_id)?;

    let annot_id = doc.update().new_object_id();
    let mut annot = dictionary! {
        "Type" => "Annot",
        "Subtype" => subtype,
        "Rect" => real_array(&rect.to_pdf_array()),
        "F" => 4,
        "CA" => opacity,
        "P" => page_id,
    };
    match style.kind {
        AnnotationKind::Backdrop => {
            annot.set("IC", color);
            annot.set("BS", dictionary! { "W" => 0 });
        }
        AnnotationKind::Highlight => {
            annot.set("C", color);
            annot.set("QuadPoints", real_array(&rect.to_quad_points()));
        }
    }

    // 加密文件中新增的字符串和流会被当作密文读取，
    // 所以这类文档只写不带外观的注释
    if !doc.is_encrypted() {
        annot.set(
            "NM",
            Object::string_literal(format!("highlight-{}-{}", annot_id.0, annot_id.1)),
        );
        let appearance = appearance_stream(rect, style)?;
        let appearance_id = doc.update().add_object(appearance);
        annot.set("AP", dictionary! { "N" => appearance_id });
    }

    doc.update()
        .objects
        .insert(annot_id, Object::Dictionary(annot));
    register_annotation(doc, page_id, slot, annot_id)?;
    Ok(annot_id)
}

/// 绘制填充矩形的表单 XObject，保证各阅读器显示一致
fn appearance_stream(rect: &Rectangle, style: &AnnotationStyle) -> Result<Stream, PdfError> {
    let [r, g, b] = style.fill().components();
    let opacity = style.opacity.value();

    let mut gs = dictionary! {
        "Type" => "ExtGState",
        "ca" => opacity,
        "CA" => opacity,
    };
    if style.kind == AnnotationKind::Highlight {
        gs.set("BM", "Multiply");
    }

    let operations = vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(APPEARANCE_GS.as_bytes().to_vec())]),
        Operation::new("rg", vec![r.into(), g.into(), b.into()]),
        Operation::new(
            "re",
            vec![
                rect.left.into(),
                rect.bottom.into(),
                rect.width().into(),
                rect.height().into(),
            ],
        ),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ];
    let content = Content { operations }
        .encode()
        .map_err(|e| PdfError::Content(e.to_string()))?;

    Ok(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => real_array(&rect.to_pdf_array()),
            "Resources" => dictionary! {
                "ExtGState" => dictionary! { APPEARANCE_GS => gs },
            },
        },
        content,
    ))
}

/// 页面注释列表的存放位置
enum AnnotsSlot {
    Inline(Vec<Object>),
    Referenced(ObjectId, Vec<Object>),
    Missing,
}

fn annots_slot(doc: &PdfDocument, page_id: ObjectId) -> Result<AnnotsSlot, PdfError> {
    let page_ref = Object::Reference(page_id);
    let page = doc
        .resolve(&page_ref)
        .and_then(|obj| obj.as_dict().ok())
        .ok_or_else(|| PdfError::Content(format!("page {:?} is not a dictionary", page_id)))?;

    match page.get(b"Annots") {
        Err(_) => Ok(AnnotsSlot::Missing),
        Ok(Object::Array(annots)) => Ok(AnnotsSlot::Inline(annots.clone())),
        Ok(Object::Reference(array_id)) => doc
            .resolve(&Object::Reference(*array_id))
            .and_then(|obj| obj.as_array().ok())
            .map(|annots| AnnotsSlot::Referenced(*array_id, annots.clone()))
            .ok_or_else(|| PdfError::Content(format!("/Annots {:?} is not an array", array_id))),
        Ok(other) => Err(PdfError::Content(format!("malformed /Annots {:?}", other))),
    }
}

/// 把 `annot_id` 追加到页面 `/Annots`，保留已有条目
fn register_annotation(
    doc: &mut PdfDocument,
    page_id: ObjectId,
    slot: AnnotsSlot,
    annot_id: ObjectId,
) -> Result<(), PdfError> {
    match slot {
        AnnotsSlot::Inline(mut annots) => {
            annots.push(annot_id.into());
            doc.editable_dictionary(page_id)?.set("Annots", annots);
        }
        AnnotsSlot::Referenced(array_id, mut annots) => {
            annots.push(annot_id.into());
            doc.update().objects.insert(array_id, Object::Array(annots));
        }
        AnnotsSlot::Missing => {
            doc.editable_dictionary(page_id)?
                .set("Annots", vec![Object::Reference(annot_id)]);
        }
    }
    Ok(())
}

/// 页面上已解析的注释字典
pub fn page_annotations(doc: &lopdf::Document, page_id: ObjectId) -> Vec<Dictionary> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    let annots = match page.get(b"Annots") {
        Ok(Object::Array(arr)) => arr.clone(),
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .and_then(Object::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    annots
        .iter()
        .filter_map(|obj| match obj {
            Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
            Object::Dictionary(dict) => Some(dict.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::test_support::{
        build_pdf, with_encryption, with_page_annots, with_stray_encrypt_marker, PageSpec,
    };
    use crate::pdf::utils::get_number;
    use crate::pdf::LopdfBackend;
    use highlight_core::{Opacity, Palette};
    use lopdf::Document;

    fn numbers(dict: &Dictionary, key: &[u8]) -> Vec<f32> {
        dict.get(key)
            .and_then(Object::as_array)
            .unwrap()
            .iter()
            .filter_map(get_number)
            .collect()
    }

    fn reload(bytes: &[u8]) -> (Document, ObjectId) {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        (doc, page_id)
    }

    #[test]
    fn test_place_backdrop() {
        let original = build_pdf(&[PageSpec::lines(&["Acme Inc"])]);
        let mut doc = PdfDocument::load(original.clone(), &LopdfBackend).unwrap();

        let placement = AnnotationPlacer::default()
            .place(
                &mut doc,
                0,
                &Rectangle::new(72.0, 710.0, 125.0, 698.0),
                &AnnotationStyle::default(),
            )
            .unwrap();
        assert!(matches!(placement, Placement::Annotation(_)));

        let saved = doc.save().unwrap();
        assert!(saved.starts_with(&original));
        assert!(saved.len() > original.len());

        let (reloaded, page_id) = reload(&saved);
        let annots = page_annotations(&reloaded, page_id);
        assert_eq!(annots.len(), 1);

        let annot = &annots[0];
        assert_eq!(annot.get(b"Subtype").and_then(Object::as_name).unwrap(), b"Square");
        assert_eq!(numbers(annot, b"Rect"), vec![71.0, 697.5, 126.0, 710.5]);
        assert_eq!(numbers(annot, b"IC"), vec![1.0, 1.0, 0.0]);
        assert!(annot.get(b"C").is_err());
        assert!((get_number(annot.get(b"CA").unwrap()).unwrap() - 0.4).abs() < 1e-6);
        assert_eq!(annot.get(b"F").and_then(Object::as_i64).unwrap(), 4);
        assert!(annot.has(b"AP"));
        assert!(annot.has(b"NM"));
    }

    #[test]
    fn test_place_highlight_kind() {
        let original = build_pdf(&[PageSpec::lines(&["Acme Inc"])]);
        let mut doc = PdfDocument::load(original, &LopdfBackend).unwrap();
        let style = AnnotationStyle {
            color: Palette::Green,
            opacity: Opacity::new(0.5).unwrap(),
            kind: AnnotationKind::Highlight,
        };
        AnnotationPlacer::new(0.0, 0.0)
            .place(&mut doc, 0, &Rectangle::new(72.0, 710.0, 125.0, 698.0), &style)
            .unwrap();

        let (reloaded, page_id) = reload(&doc.save().unwrap());
        let annot = &page_annotations(&reloaded, page_id)[0];
        assert_eq!(annot.get(b"Subtype").and_then(Object::as_name).unwrap(), b"Highlight");
        assert_eq!(
            numbers(annot, b"QuadPoints"),
            vec![72.0, 710.0, 125.0, 710.0, 72.0, 698.0, 125.0, 698.0]
        );
        let expected = Palette::Green.rgb().components();
        for (got, want) in numbers(annot, b"C").iter().zip(expected) {
            assert!((got - want).abs() < 1e-4);
        }
    }

    #[test]
    fn test_clamps_to_page_and_rejects_outside() {
        let mut doc = PdfDocument::load(build_pdf(&[PageSpec::lines(&["x"])]), &LopdfBackend).unwrap();
        let placer = AnnotationPlacer::default();
        let style = AnnotationStyle::default();

        placer
            .place(&mut doc, 0, &Rectangle::new(600.0, 795.0, 640.0, 780.0), &style)
            .unwrap();
        assert!(matches!(
            placer.place(&mut doc, 0, &Rectangle::new(700.0, 900.0, 720.0, 880.0), &style),
            Err(PdfError::Rejected(_))
        ));
        assert!(matches!(
            placer.place(&mut doc, 3, &Rectangle::new(10.0, 20.0, 30.0, 10.0), &style),
            Err(PdfError::PageNotFound(3))
        ));
        assert_eq!(doc.placements(), 1);

        let (reloaded, page_id) = reload(&doc.save().unwrap());
        let annot = &page_annotations(&reloaded, page_id)[0];
        assert_eq!(numbers(annot, b"Rect"), vec![599.0, 779.5, 612.0, 792.0]);
    }

    #[test]
    fn test_placing_twice_adds_two_annotations() {
        let mut doc = PdfDocument::load(build_pdf(&[PageSpec::lines(&["x"])]), &LopdfBackend).unwrap();
        let rect = Rectangle::new(72.0, 710.0, 125.0, 698.0);
        let placer = AnnotationPlacer::default();
        let first = placer.place(&mut doc, 0, &rect, &AnnotationStyle::default()).unwrap();
        let second = placer.place(&mut doc, 0, &rect, &AnnotationStyle::default()).unwrap();
        assert_ne!(first, second);

        let (reloaded, page_id) = reload(&doc.save().unwrap());
        assert_eq!(page_annotations(&reloaded, page_id).len(), 2);
    }

    #[test]
    fn test_appends_to_referenced_annots_array() {
        let mut doc = PdfDocument::load(build_pdf(&[PageSpec::lines(&["x"])]), &LopdfBackend).unwrap();
        let page_id = doc.page_id(0).unwrap();
        let array_id = doc.update().add_object(Object::Array(vec![]));
        doc.editable_dictionary(page_id)
            .unwrap()
            .set("Annots", Object::Reference(array_id));

        AnnotationPlacer::default()
            .place(
                &mut doc,
                0,
                &Rectangle::new(72.0, 710.0, 125.0, 698.0),
                &AnnotationStyle::default(),
            )
            .unwrap();

        let (reloaded, page_id) = reload(&doc.save().unwrap());
        let page = reloaded.get_dictionary(page_id).unwrap();
        assert_eq!(page.get(b"Annots").and_then(Object::as_reference).unwrap(), array_id);
        assert_eq!(page_annotations(&reloaded, page_id).len(), 1);
    }

    fn text_rect() -> Rectangle {
        Rectangle::new(72.0, 710.0, 125.0, 698.0)
    }

    #[test]
    fn test_malformed_annots_paints_into_content() {
        let original = with_page_annots(&build_pdf(&[PageSpec::lines(&["Acme Inc"])]), Object::Integer(7));
        let mut doc = PdfDocument::load(original, &LopdfBackend).unwrap();

        let placement = AnnotationPlacer::default()
            .place(&mut doc, 0, &text_rect(), &AnnotationStyle::default())
            .unwrap();
        assert_eq!(placement, Placement::ContentStream);
        assert_eq!(doc.placements(), 1);

        let (reloaded, page_id) = reload(&doc.save().unwrap());
        let page = reloaded.get_dictionary(page_id).unwrap();
        assert_eq!(page.get(b"Annots").and_then(Object::as_i64).unwrap(), 7);
        assert!(page.get(b"Contents").and_then(Object::as_array).is_ok());
    }

    #[test]
    fn test_annots_referencing_non_array_is_kept() {
        let mut doc = PdfDocument::load(build_pdf(&[PageSpec::lines(&["x"])]), &LopdfBackend).unwrap();
        let page_id = doc.page_id(0).unwrap();
        let target_id = doc.update().add_object(Object::Integer(3));
        doc.editable_dictionary(page_id)
            .unwrap()
            .set("Annots", Object::Reference(target_id));

        let placement = AnnotationPlacer::default()
            .place(&mut doc, 0, &text_rect(), &AnnotationStyle::default())
            .unwrap();
        assert_eq!(placement, Placement::ContentStream);
        assert_eq!(doc.update().get_object(target_id).and_then(Object::as_i64).unwrap(), 3);
    }

    #[test]
    fn test_encrypted_document_gets_bare_annotation() {
        let original = with_encryption(&build_pdf(&[PageSpec::lines(&["Acme Inc"])]));
        let mut doc = PdfDocument::load(original.clone(), &LopdfBackend).unwrap();
        assert!(doc.is_encrypted());
        assert!(doc.is_writable());

        let placement = AnnotationPlacer::default()
            .place(&mut doc, 0, &text_rect(), &AnnotationStyle::default())
            .unwrap();
        assert!(matches!(placement, Placement::Annotation(_)));

        let saved = doc.save().unwrap();
        assert!(saved.starts_with(&original));
        let update = &saved[original.len()..];
        for key in [&b"/Encrypt"[..], b"/ID"] {
            assert!(update.windows(key.len()).any(|w| w == key));
        }

        let (reloaded, page_id) = reload(&saved);
        assert!(reloaded.trailer.has(b"Encrypt"));
        let annot = &page_annotations(&reloaded, page_id)[0];
        assert!(!annot.has(b"NM"));
        assert!(!annot.has(b"AP"));
        assert_eq!(numbers(annot, b"IC"), vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_encrypted_with_malformed_annots_is_not_placed() {
        let original = with_encryption(&with_page_annots(
            &build_pdf(&[PageSpec::lines(&["Acme Inc"])]),
            Object::Integer(7),
        ));
        let mut doc = PdfDocument::load(original.clone(), &LopdfBackend).unwrap();

        let result = AnnotationPlacer::default().place(&mut doc, 0, &text_rect(), &AnnotationStyle::default());
        assert!(matches!(result, Err(PdfError::Encrypted(_))));
        assert_eq!(doc.placements(), 0);
        assert_eq!(doc.save().unwrap(), original);
    }

    #[test]
    fn test_stray_encrypt_marker_makes_document_read_only() {
        let original = with_stray_encrypt_marker(&build_pdf(&[PageSpec::lines(&["Acme Inc"])]));
        let mut doc = PdfDocument::load(original, &LopdfBackend).unwrap();
        assert!(doc.is_encrypted());
        assert!(!doc.is_writable());

        let result = AnnotationPlacer::default().place(&mut doc, 0, &text_rect(), &AnnotationStyle::default());
        assert!(matches!(result, Err(PdfError::Encrypted(_))));
    }
}
