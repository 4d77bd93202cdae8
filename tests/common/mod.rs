#![allow(dead_code)]

use std::cell::RefCell;

use highlighter::ocr::{OcrError, OcrProvider};
use highlighter::{Oracle, OracleError};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// 每项一页 Letter，Helvetica 12pt，从 (72, 700) 开始，行距 16pt。
/// 空项表示没有文本的页面。
pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        if !lines.is_empty() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new("Td", vec![72.into(), 700.into()]));
            for (i, line) in lines.iter().enumerate() {
                if i > 0 {
                    operations.push(Operation::new("Td", vec![0.into(), (-16).into()]));
                }
                operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            }
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
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

pub fn pdf_with_text(lines: &[&str]) -> Vec<u8> {
    pdf_with_pages(&[lines])
}

fn rewrite(bytes: &[u8], edit: impl FnOnce(&mut Document)) -> Vec<u8> {
    let mut doc = Document::load_mem(bytes).unwrap();
    edit(&mut doc);
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// 给每页设置一个不是数组的 `/Annots`
pub fn with_broken_annots(bytes: &[u8]) -> Vec<u8> {
    rewrite(bytes, |doc| {
        for page_id in doc.get_pages().into_values() {
            doc.get_dictionary_mut(page_id).unwrap().set("Annots", 7);
        }
    })
}

/// 用户密码非空的标准安全处理器，对象保持明文
pub fn with_encryption(bytes: &[u8]) -> Vec<u8> {
    rewrite(bytes, |doc| {
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "O" => Object::String(vec![0x28; 32], StringFormat::Hexadecimal),
            "U" => Object::String(vec![0; 32], StringFormat::Hexadecimal),
            "P" => -4,
        });
        doc.trailer.set("Encrypt", encrypt_id);
        let file_id = Object::String(b"pipeline-fixture".to_vec(), StringFormat::Hexadecimal);
        doc.trailer.set("ID", vec![file_id.clone(), file_id]);
    })
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// 按页序排列的页面对象 id
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// 页面上已解析的注释字典
pub fn annotations(doc: &Document, page_id: ObjectId) -> Vec<Dictionary> {
    highlighter::pdf::annotations::page_annotations(doc, page_id)
}

fn as_number(object: &Object) -> f32 {
    match object {
        Object::Integer(i) => *i as f32,
        Object::Real(r) => *r,
        other => panic!("not a number: {:?}", other),
    }
}

pub fn number(dict: &Dictionary, key: &[u8]) -> f32 {
    as_number(dict.get(key).unwrap())
}

pub fn numbers(dict: &Dictionary, key: &[u8]) -> Vec<f32> {
    dict.get(key)
        .and_then(Object::as_array)
        .unwrap()
        .iter()
        .map(as_number)
        .collect()
}

/// 总是返回同样的文本，并记录收到的请求
pub struct StubOracle {
    answer: String,
    pub seen: RefCell<Vec<(String, String)>>,
}

impl StubOracle {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl Oracle for StubOracle {
    fn classify(&self, instruction: &str, text: &str) -> Result<String, OracleError> {
        self.seen
            .borrow_mut()
            .push((instruction.to_string(), text.to_string()));
        Ok(self.answer.clone())
    }
}

impl Oracle for &'static StubOracle {
    fn classify(&self, instruction: &str, text: &str) -> Result<String, OracleError> {
        (**self).classify(instruction, text)
    }
}

/// 文本包含触发词时返回给定目标的 JSON 列表，否则返回空
pub struct TriggerOracle {
    pub trigger: &'static str,
    pub answer: &'static str,
}

impl Oracle for TriggerOracle {
    fn classify(&self, _instruction: &str, text: &str) -> Result<String, OracleError> {
        if text.contains(self.trigger) {
            Ok(self.answer.to_string())
        } else {
            Ok(String::new())
        }
    }
}

pub struct FailingOracle;

impl Oracle for FailingOracle {
    fn classify(&self, _instruction: &str, _text: &str) -> Result<String, OracleError> {
        Err(OracleError::Status {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

pub struct StubOcr(pub &'static str);

impl OcrProvider for StubOcr {
    fn extract_text(&self, _file_bytes: &[u8]) -> Result<String, OcrError> {
        Ok(self.0.to_string())
    }
}
