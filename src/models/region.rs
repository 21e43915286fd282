//! 文字区域模型

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// 像素坐标点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: i64,
    pub y: i64,
}

/// 四边形，顶点顺序为左上、右上、右下、左下
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingPoly {
    pub vertices: [Vertex; 4],
}

/// 轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub left: i64,
    pub right: i64,
    pub top: i64,
    pub bottom: i64,
}

impl Bounds {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) as f64 / 2.0,
            (self.top + self.bottom) as f64 / 2.0,
        )
    }

    /// 两个包围盒的并集
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            left: self.left.min(other.left),
            right: self.right.max(other.right),
            top: self.top.min(other.top),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

impl BoundingPoly {
    pub fn from_bounds(b: Bounds) -> Self {
        Self {
            vertices: [
                Vertex { x: b.left, y: b.top },
                Vertex { x: b.right, y: b.top },
                Vertex { x: b.right, y: b.bottom },
                Vertex { x: b.left, y: b.bottom },
            ],
        }
    }

    pub fn bounds(&self) -> Bounds {
        let xs = self.vertices.iter().map(|v| v.x);
        let ys = self.vertices.iter().map(|v| v.y);
        Bounds {
            left: xs.clone().min().unwrap_or_default(),
            right: xs.max().unwrap_or_default(),
            top: ys.clone().min().unwrap_or_default(),
            bottom: ys.max().unwrap_or_default(),
        }
    }
}

/// DOM 中读取到的原始样式，用于排查上游格式变化
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawGeometry {
    pub raw_style: String,
    pub top_str: String,
    pub left_str: String,
    pub width_str: String,
    pub height_str: String,
}

/// 一个识别出的文字区域
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRegion {
    pub description: String,
    pub bounding_poly: BoundingPoly,
    pub rotate: f64,
    pub style: String,
    #[serde(flatten)]
    pub raw: Option<RawGeometry>,
}

impl TextRegion {
    /// 根据包围盒和旋转角度构造区域，样式为绝对像素值
    pub fn from_bounds(description: impl Into<String>, bounds: Bounds, rotate: f64) -> Self {
        Self {
            description: description.into(),
            bounding_poly: BoundingPoly::from_bounds(bounds),
            rotate,
            style: pixel_style(
                bounds.top,
                bounds.left,
                bounds.right - bounds.left,
                bounds.bottom - bounds.top,
                format_angle(rotate),
            ),
            raw: None,
        }
    }

    /// 去掉原始样式信息
    pub fn without_raw(&self) -> Self {
        Self {
            raw: None,
            ..self.clone()
        }
    }
}

/// 绝对像素样式，例如 `top: 0px; left: 10px; width: 52px; height: 38px; transform: rotate(0deg);`
pub fn pixel_style(top: i64, left: i64, width: i64, height: i64, rotate: impl Display) -> String {
    format!(
        "top: {}px; left: {}px; width: {}px; height: {}px; transform: rotate({}deg);",
        top, left, width, height, rotate
    )
}

/// 角度的文本形式，整数角度也保留一位小数（`0.0`、`-3.0`）
pub fn format_angle(rotate: f64) -> String {
    format!("{:?}", rotate)
}
