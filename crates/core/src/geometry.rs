//! 页面坐标系几何
//! 所有坐标均为 PDF 用户空间：原点在页面左下角，x 向右、y 向上，
//! 因此始终满足 `top >= bottom`。

use serde::{Deserialize, Serialize};

/// 页面坐标系中的轴对齐矩形
/// 不可变值类型，所有变换都返回新矩形。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rectangle {
    /// 由四条边构造矩形，顺序颠倒的边会被交换
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left: left.min(right),
            top: top.max(bottom),
            right: left.max(right),
            bottom: top.min(bottom),
        }
    }

    /// 由左下角和宽高构造矩形，与 `re` 操作符一致
    pub fn from_origin(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y + height, x + width, y)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.top.is_finite() && self.right.is_finite() && self.bottom.is_finite()
    }

    /// 面积为零（或坐标非有限值）时为 true
    pub fn is_degenerate(&self) -> bool {
        !self.is_finite() || self.width() <= f32::EPSILON || self.height() <= f32::EPSILON
    }

    /// 各边向外扩展：水平 `dx`，垂直 `dy`
    pub fn inflate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.left - dx, self.top + dy, self.right + dx, self.bottom - dy)
    }

    pub fn intersects(&self, other: &Rectangle) -> bool {
        self.left < other.right && self.right > other.left && self.bottom < other.top && self.top > other.bottom
    }

    /// 两个矩形的重叠部分，仅相接或分离时返回 `None`
    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        if !self.intersects(other) {
            return None;
        }
        Some(Rectangle {
            left: self.left.max(other.left),
            top: self.top.min(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.max(other.bottom),
        })
    }

    /// 裁剪到 `bounds` 内，没有剩余可用区域时返回 `None`
    pub fn clamp_to(&self, bounds: &Rectangle) -> Option<Rectangle> {
        if !self.is_finite() {
            return None;
        }
        self.intersection(bounds).filter(|r| !r.is_degenerate())
    }

    /// `[llx, lly, urx, ury]`，即 PDF `/Rect` 数组的顺序
    pub fn to_pdf_array(&self) -> [f32; 4] {
        [self.left, self.bottom, self.right, self.top]
    }

    /// 高亮 `/QuadPoints` 要求的四角顺序：
    /// 左上、右上、左下、右下
    pub fn to_quad_points(&self) -> [f32; 8] {
        [
            self.left, self.top, self.right, self.top, self.left, self.bottom, self.right, self.bottom,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_edges() {
        let r = Rectangle::new(10.0, 5.0, 2.0, 20.0);
        assert_eq!(r.left, 2.0);
        assert_eq!(r.right, 10.0);
        assert_eq!(r.top, 20.0);
        assert_eq!(r.bottom, 5.0);
    }

    #[test]
    fn test_inflate_returns_new_value() {
        let r = Rectangle::new(100.0, 710.0, 150.0, 700.0);
        let padded = r.inflate(1.0, 0.5);
        assert_eq!(padded, Rectangle::new(99.0, 710.5, 151.0, 699.5));
        // 原值不变
        assert_eq!(r.width(), 50.0);
        assert_eq!(padded.width(), 52.0);
        assert_eq!(padded.height(), 11.0);
    }

    #[test]
    fn test_clamp_to_page() {
        let page = Rectangle::new(0.0, 792.0, 612.0, 0.0);

        let inside = Rectangle::new(10.0, 20.0, 30.0, 10.0);
        assert_eq!(inside.clamp_to(&page), Some(inside));

        let spilling = Rectangle::new(-1.0, 795.0, 20.0, 780.0);
        assert_eq!(spilling.clamp_to(&page), Some(Rectangle::new(0.0, 792.0, 20.0, 780.0)));

        let outside = Rectangle::new(700.0, 20.0, 720.0, 10.0);
        assert_eq!(outside.clamp_to(&page), None);

        let nan = Rectangle {
            left: f32::NAN,
            top: 1.0,
            right: 2.0,
            bottom: 0.0,
        };
        assert_eq!(nan.clamp_to(&page), None);
    }

    #[test]
    fn test_degenerate() {
        assert!(Rectangle::new(5.0, 10.0, 5.0, 0.0).is_degenerate());
        assert!(!Rectangle::from_origin(5.0, 0.0, 1.0, 1.0).is_degenerate());
    }

    #[test]
    fn test_pdf_arrays() {
        let r = Rectangle::from_origin(72.0, 700.0, 40.0, 12.0);
        assert_eq!(r.to_pdf_array(), [72.0, 700.0, 112.0, 712.0]);
        assert_eq!(
            r.to_quad_points(),
            [72.0, 712.0, 112.0, 712.0, 72.0, 700.0, 112.0, 700.0]
        );
    }
}
