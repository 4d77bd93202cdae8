use highlight_core::Rectangle;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// 查找继承属性时页面树的最大遍历深度
const MAX_TREE_DEPTH: usize = 32;

/// 页面没有声明任何边界框时使用 US Letter
pub const DEFAULT_PAGE_BOX: (f32, f32, f32, f32) = (0.0, 0.0, 612.0, 792.0);

/// 读取数值操作数或数组元素
pub fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// 从边界框数组中提取 `[llx lly urx ury]`
fn extract_box_values(doc: &Document, obj: &Object) -> Option<(f32, f32, f32, f32)> {
    let arr = match obj {
        Object::Array(arr) => arr,
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
        _ => return None,
    };
    let values: Vec<f32> = arr.iter().filter_map(get_number).collect();
    if values.len() == 4 {
        Some((values[0], values[1], values[2], values[3]))
    } else {
        None
    }
}

/// 先在页面上查找 `key`，再在页面树的祖先节点中查找
pub fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// 页面可见区域：优先 CropBox，否则 MediaBox，两者都可继承
pub fn page_bounds(doc: &Document, page_id: ObjectId) -> Rectangle {
    let found = [b"CropBox".as_slice(), b"MediaBox".as_slice()]
        .into_iter()
        .find_map(|key| {
            inherited_attribute(doc, page_id, key).and_then(|obj| extract_box_values(doc, obj))
        });

    let (llx, lly, urx, ury) = found.unwrap_or_else(|| {
        log::warn!("[PageBox] 页面 {:?} 没有声明边界框，使用 Letter", page_id);
        DEFAULT_PAGE_BOX
    });
    Rectangle::new(llx, ury, urx, lly)
}

/// 流字节，有受支持的过滤器时先解压
pub fn get_stream_content(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// 页面所有内容流拼接后的字节
pub fn get_page_content(doc: &Document, page_id: ObjectId) -> Vec<u8> {
    let mut all_content = Vec::new();
    for stream_id in doc.get_page_contents(page_id) {
        if let Ok(stream) = doc.get_object(stream_id).and_then(Object::as_stream) {
            all_content.extend(get_stream_content(stream));
            all_content.push(b'\n');
        }
    }
    all_content
}

/// 解析直接存放或通过引用存放的字典
pub fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}
