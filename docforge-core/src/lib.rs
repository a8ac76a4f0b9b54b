pub mod document;
pub mod entity;
pub mod normalized;

pub mod geometry {
    use serde::{Deserialize, Serialize};

    /// 控件左上角在页面坐标系中的位置（CSS 像素）。
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Position {
        pub x: f64,
        pub y: f64,
    }

    impl Position {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self { x, y }
        }

        #[inline]
        pub fn translate(self, dx: f64, dy: f64) -> Self {
            Self {
                x: self.x + dx,
                y: self.y + dy,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Size {
        pub width: f64,
        pub height: f64,
    }

    impl Size {
        #[inline]
        pub fn new(width: f64, height: f64) -> Self {
            Self { width, height }
        }

        /// 宽或高不为正时视为空尺寸，导出截图会跳过这类控件。
        #[inline]
        pub fn is_empty(self) -> bool {
            self.width <= 0.0 || self.height <= 0.0
        }
    }

    /// 轴对齐矩形，用于选区范围与对齐参考线。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Rect {
        min: Position,
        max: Position,
    }

    impl Rect {
        #[inline]
        pub fn from_origin_size(origin: Position, size: Size) -> Self {
            Self {
                min: origin,
                max: Position::new(origin.x + size.width, origin.y + size.height),
            }
        }

        #[inline]
        pub fn min(&self) -> Position {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Position {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x - self.min.x
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y - self.min.y
        }

        pub fn union(&self, other: &Rect) -> Rect {
            Rect {
                min: Position::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
                max: Position::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
            }
        }

        #[inline]
        pub fn center(&self) -> Position {
            Position::new(
                (self.min.x + self.max.x) * 0.5,
                (self.min.y + self.max.y) * 0.5,
            )
        }
    }
}

pub mod navigation {
    use serde::{Deserialize, Serialize};

    /// 编辑器当前激活的子章节与页面。
    ///
    /// 同一时刻只有一个页面处于挂载状态；导出流程会临时接管该游标，结束后必须恢复。
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct NavigationCursor {
        pub subsection_id: Option<String>,
        pub page_id: Option<String>,
    }

    impl NavigationCursor {
        pub fn new(subsection_id: impl Into<String>, page_id: impl Into<String>) -> Self {
            Self {
                subsection_id: Some(subsection_id.into()),
                page_id: Some(page_id.into()),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.subsection_id.is_none() && self.page_id.is_none()
        }
    }
}
