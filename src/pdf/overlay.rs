//! 直接绘制到页面内容中的高亮
//!
//! 在无法写入注释时使用。每页原有内容只包一次 `q ... Q`，
//! 防止其图形状态影响追加的矩形。

use highlight_core::{AnnotationKind, AnnotationStyle, Rectangle};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};

use super::utils::{inherited_attribute, resolve_dict};
use super::{PdfDocument, PdfError};

/// 样式对应的图形状态资源名，相同样式共用一项
fn gstate_name(style: &AnnotationStyle) -> String {
    let permille = (style.opacity.value() * 1000.0).round() as u32;
    match style.kind {
        AnnotationKind::Backdrop => format!("HLgs{}", permille),
        AnnotationKind::Highlight => format!("HLgs{}m", permille),
    }
}

fn fill_operations(gs: &str, rect: &Rectangle, style: &AnnotationStyle) -> Vec<Operation> {
    let [r, g, b] = style.fill().components();
    vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(gs.as_bytes().to_vec())]),
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
    ]
}

fn encode(operations: Vec<Operation>) -> Result<Vec<u8>, PdfError> {
    Content { operations }
        .encode()
        .map_err(|e| PdfError::Content(e.to_string()))
}

/// 在页面上绘制半透明填充矩形
pub fn paint_rect(
    doc: &mut PdfDocument,
    page_id: ObjectId,
    rect: &Rectangle,
    style: &AnnotationStyle,
) -> Result<(), PdfError> {
    if doc.is_encrypted() {
        return Err(PdfError::Encrypted("content streams cannot be appended"));
    }

    let gs = gstate_name(style);
    let mut state = dictionary! {
        "Type" => "ExtGState",
        "ca" => style.opacity.value(),
        "CA" => style.opacity.value(),
    };
    if style.kind == AnnotationKind::Highlight {
        state.set("BM", "Multiply");
    }
    add_ext_gstate(doc, page_id, &gs, state)?;

    let existing = doc.editable_dictionary(page_id)?.get(b"Contents").ok().cloned();
    let mut parts: Vec<Object> = match existing {
        Some(Object::Array(arr)) => arr,
        Some(Object::Reference(id)) => match doc.resolve(&Object::Reference(id)) {
            Some(Object::Array(arr)) => arr.clone(),
            _ => vec![Object::Reference(id)],
        },
        _ => Vec::new(),
    };

    if doc.wrapped_pages.insert(page_id) {
        let save = doc
            .update()
            .add_object(Stream::new(dictionary! {}, encode(vec![Operation::new("q", vec![])])?));
        let restore = doc
            .update()
            .add_object(Stream::new(dictionary! {}, encode(vec![Operation::new("Q", vec![])])?));
        parts.insert(0, save.into());
        parts.push(restore.into());
    }

    let paint = doc
        .update()
        .add_object(Stream::new(dictionary! {}, encode(fill_operations(&gs, rect, style))?));
    parts.push(paint.into());

    doc.editable_dictionary(page_id)?.set("Contents", parts);
    log::debug!("[Overlay] 已绘制 {:?}，页面 {:?}", rect, page_id);
    Ok(())
}

/// 把 `name` 加入页面 ExtGState 资源。资源可能直接写在页面上、通过引用，
/// 或从页面树继承（会复制到页面上）。
fn add_ext_gstate(doc: &mut PdfDocument, page_id: ObjectId, name: &str, state: Dictionary) -> Result<(), PdfError> {
    let own = doc.editable_dictionary(page_id)?.get(b"Resources").ok().cloned();

    let mut resources: Dictionary = match &own {
        Some(obj) => doc
            .resolve(obj)
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        None => {
            let reader = doc.reader();
            inherited_attribute(reader, page_id, b"Resources")
                .and_then(|obj| resolve_dict(reader, obj))
                .cloned()
                .unwrap_or_default()
        }
    };

    let mut states: Dictionary = resources
        .get(b"ExtGState")
        .ok()
        .and_then(|obj| doc.resolve(obj))
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    states.set(name, state);
    resources.set("ExtGState", states);

    match own {
        Some(Object::Reference(id)) => {
            doc.update().objects.insert(id, Object::Dictionary(resources));
        }
        _ => doc.editable_dictionary(page_id)?.set("Resources", resources),
    }
    Ok(())
}
