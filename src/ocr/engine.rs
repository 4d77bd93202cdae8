//! OCR 引擎 trait

use image::DynamicImage;
use std::path::Path;

use super::types::OcrWord;
use super::OcrError;

pub trait OcrEngine {
    /// 识别图片文件中的单词
    fn recognize_file(&self, image_path: &Path) -> Result<Vec<OcrWord>, OcrError>;

    /// 通过临时 PNG 文件识别内存中的图片
    fn recognize_image(&self, img: &DynamicImage) -> Result<Vec<OcrWord>, OcrError> {
        let temp = tempfile::Builder::new()
            .prefix("highlighter-ocr-")
            .suffix(".png")
            .tempfile()?;
        img.save_with_format(temp.path(), image::ImageFormat::Png)?;
        self.recognize_file(temp.path())
    }

    /// 图片的纯文本，每个识别出的文本行输出一行
    fn extract_text(&self, img: &DynamicImage) -> Result<String, OcrError> {
        Ok(words_to_text(&self.recognize_image(img)?))
    }
}

/// 按 block/paragraph/line 位置把单词重新拼成行
pub fn words_to_text(words: &[OcrWord]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key = None;

    for word in words {
        let key = word.line_key();
        if current_key == Some(key) {
            if let Some(line) = lines.last_mut() {
                line.push(' ');
                line.push_str(&word.text);
            }
        } else {
            lines.push(word.text.clone());
            current_key = Some(key);
        }
    }
    lines.join("\n")
}
