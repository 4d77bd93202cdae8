//! 注释样式：调色板颜色、透明度和标记类型

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// RGB 颜色，每个通道取值 `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub fn new(r: f32, g: f32, b: f32) -> crate::Result<Self> {
        let valid = |c: f32| c.is_finite() && (0.0..=1.0).contains(&c);
        if !(valid(r) && valid(g) && valid(b)) {
            return Err(CoreError::InvalidConfig("color channels must lie in 0..=1"));
        }
        Ok(Self { r, g, b })
    }

    pub fn components(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

/// 提供给用户的固定调色板
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    #[default]
    Yellow,
    Green,
    Blue,
    Pink,
    Orange,
    Black,
}

impl Palette {
    pub const ALL: [Palette; 6] = [
        Palette::Yellow,
        Palette::Green,
        Palette::Blue,
        Palette::Pink,
        Palette::Orange,
        Palette::Black,
    ];

    pub fn rgb(&self) -> Rgb {
        let (r, g, b) = match self {
            Palette::Yellow => (1.0, 1.0, 0.0),
            Palette::Green => (0.56, 0.93, 0.56),
            Palette::Blue => (0.53, 0.81, 0.98),
            Palette::Pink => (1.0, 0.75, 0.8),
            Palette::Orange => (1.0, 0.65, 0.0),
            Palette::Black => (0.0, 0.0, 0.0),
        };
        Rgb { r, g, b }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Palette::Yellow => "yellow",
            Palette::Green => "green",
            Palette::Blue => "blue",
            Palette::Pink => "pink",
            Palette::Orange => "orange",
            Palette::Black => "black",
        }
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Palette {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Palette::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or(CoreError::InvalidConfig("unknown palette color"))
    }
}

/// 透明度，取值 `(0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Opacity(f32);

impl Opacity {
    /// 覆盖在文字上仍清晰可读的推荐区间
    pub const RECOMMENDED: (f32, f32) = (0.1, 0.9);

    pub fn new(value: f32) -> crate::Result<Self> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(CoreError::InvalidConfig("opacity must lie in (0, 1]"))
        }
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn is_recommended(&self) -> bool {
        (Self::RECOMMENDED.0..=Self::RECOMMENDED.1).contains(&self.0)
    }
}

impl Default for Opacity {
    fn default() -> Self {
        Self(0.4)
    }
}

impl<'de> Deserialize<'de> for Opacity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f32::deserialize(deserializer)?;
        Opacity::new(value).map_err(serde::de::Error::custom)
    }
}

/// 标记匹配所用的覆盖对象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    /// 填充的 Square 注释，无边框
    #[default]
    Backdrop,
    /// 文本标记类 Highlight 注释
    Highlight,
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AnnotationKind::Backdrop => "backdrop",
            AnnotationKind::Highlight => "highlight",
        })
    }
}

impl FromStr for AnnotationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "backdrop" => Ok(AnnotationKind::Backdrop),
            "highlight" => Ok(AnnotationKind::Highlight),
            _ => Err(CoreError::InvalidConfig("unknown annotation style")),
        }
    }
}

/// 一次流水线运行中所有注释共用的样式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AnnotationStyle {
    pub color: Palette,
    pub opacity: Opacity,
    pub kind: AnnotationKind,
}

impl AnnotationStyle {
    pub fn fill(&self) -> Rgb {
        self.color.rgb()
    }
}
