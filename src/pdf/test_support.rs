//! 单元测试用的内存小 PDF

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

pub struct PageSpec {
    lines: Vec<String>,
    widths: Option<i64>,
}

impl PageSpec {
    pub fn lines(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            widths: None,
        }
    }

    /// 给页面字体加上所有编码宽度相同的 `/Widths` 表
    pub fn with_uniform_widths(mut self, width: i64) -> Self {
        self.widths = Some(width);
        self
    }
}

/// Letter 页面，Helvetica 12pt，从 (72, 700) 开始，行距 16pt
pub fn build_pdf(pages: &[PageSpec]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();

    for spec in pages {
        let mut font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        };
        if let Some(width) = spec.widths {
            font.set("FirstChar", 32);
            font.set("LastChar", 126);
            font.set("Widths", (32..=126).map(|_| Object::Integer(width)).collect::<Vec<_>>());
        }
        let font_id = doc.add_object(font);
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut operations = Vec::new();
        if !spec.lines.is_empty() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new("Td", vec![72.into(), 700.into()]));
            for (i, line) in spec.lines.iter().enumerate() {
                if i > 0 {
                    operations.push(Operation::new("Td", vec![0.into(), (-16).into()]));
                }
                operations.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
            }
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

        kids.push(Object::Reference(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        })));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn rewrite(bytes: &[u8], edit: impl FnOnce(&mut Document)) -> Vec<u8> {
    let mut doc = Document::load_mem(bytes).unwrap();
    edit(&mut doc);
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// 把每页的 `/Annots` 设为 `annots`
pub fn with_page_annots(bytes: &[u8], annots: Object) -> Vec<u8> {
    rewrite(bytes, |doc| {
        for page_id in doc.get_pages().into_values() {
            doc.get_dictionary_mut(page_id)
                .unwrap()
                .set("Annots", annots.clone());
        }
    })
}

/// 添加用户密码非空的标准安全处理器（RC4，40 位）。
/// 对象仍为明文，不需要密钥也能读取。
pub fn with_encryption(bytes: &[u8]) -> Vec<u8> {
    rewrite(bytes, |doc| {
        let hex = |b: u8| Object::String(vec![b; 32], StringFormat::Hexadecimal);
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "O" => hex(0x28),
            "U" => hex(0x00),
            "P" => -4,
        });
        doc.trailer.set("Encrypt", encrypt_id);
        let file_id = Object::String(b"highlight-fixture".to_vec(), StringFormat::Hexadecimal);
        doc.trailer.set("ID", vec![file_id.clone(), file_id]);
    })
}

/// 在文件末尾追加提到 `/Encrypt` 的注释，
/// 模拟某些工具从 trailer 中删掉加密字典后留下的痕迹。
pub fn with_stray_encrypt_marker(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    out.extend_from_slice(b"\n% /Encrypt\n");
    out
}
