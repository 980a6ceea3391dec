//! 原始标注元素 (像素坐标) 及其到地图几何体的转换.

use super::Geometry;
use crate::coord::{pixel_to_map, Scale};
use geo::{Area, Coord, LineString, Point, Polygon};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// 单个标注元素无法转换为合法几何体.
///
/// 该错误只影响出错的元素本身, 同一图层的其余元素照常导入.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum MalformedGeometryError {
    /// 去除闭合点与连续重复点后, 顶点不足 3 个.
    #[error("polyline needs at least 3 distinct vertices, found {0}")]
    TooFewVertices(usize),

    /// 缩放后面积为 0.
    #[error("polygon has zero area after scaling")]
    ZeroArea,

    /// 第 `0` 个顶点坐标分量不足 2 个.
    #[error("vertex #{0} has fewer than 2 coordinates")]
    ShortVertex(usize),

    /// 坐标中含有 NaN 或无穷.
    #[error("non-finite coordinate")]
    NonFiniteCoordinate,

    /// 矩形宽高不是正数.
    #[error("rectangle has non-positive size ({0}, {1})")]
    BadRectangle(f64, f64),
}

/// 原始元素的几何形状, 坐标均为全分辨率像素坐标.
///
/// 反序列化格式与标注服务一致, 以 `"type"` 字段区分:
///
/// ```json
/// {"type": "polyline", "points": [[x, y, z], ...]}
/// {"type": "rectangle", "center": [x, y, z], "width": w, "height": h}
/// {"type": "point", "center": [x, y, z]}
/// ```
///
/// `z` 分量可省略, 且总是被忽略.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementShape {
    /// 折线 (多边形外环).
    Polyline {
        /// 顶点列表.
        points: Vec<Vec<f64>>,
    },

    /// 轴对齐矩形.
    Rectangle {
        /// 中心.
        center: Vec<f64>,
        /// 宽.
        width: f64,
        /// 高.
        height: f64,
    },

    /// 点.
    Point {
        /// 位置.
        center: Vec<f64>,
    },
}

/// 一个原始标注元素: 形状加上任意元数据.
#[derive(Clone, Debug, Deserialize)]
pub struct RawElement {
    /// 形状.
    #[serde(flatten)]
    pub shape: ElementShape,

    /// 元数据, 原样转入结构属性.
    #[serde(default, rename = "user")]
    pub metadata: Map<String, Value>,
}

impl RawElement {
    /// 由 `(x, y)` 顶点创建折线元素.
    pub fn polyline<I: IntoIterator<Item = (f64, f64)>>(points: I) -> Self {
        Self {
            shape: ElementShape::Polyline {
                points: points.into_iter().map(|(x, y)| vec![x, y]).collect(),
            },
            metadata: Map::new(),
        }
    }

    /// 创建点元素.
    pub fn point(x: f64, y: f64) -> Self {
        Self {
            shape: ElementShape::Point { center: vec![x, y] },
            metadata: Map::new(),
        }
    }

    /// 创建矩形元素.
    pub fn rectangle((x, y): (f64, f64), width: f64, height: f64) -> Self {
        Self {
            shape: ElementShape::Rectangle {
                center: vec![x, y],
                width,
                height,
            },
            metadata: Map::new(),
        }
    }

    /// 附加元数据.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// 转换为地图坐标下的几何体.
    pub fn to_geometry(&self, scale: Scale) -> Result<Geometry, MalformedGeometryError> {
        match &self.shape {
            ElementShape::Polyline { points } => {
                let ring = points
                    .iter()
                    .enumerate()
                    .map(|(i, p)| vertex(i, p))
                    .collect::<Result<Vec<_>, _>>()?;
                polygon_from_ring(ring, scale).map(Geometry::Polygon)
            }
            ElementShape::Rectangle {
                center,
                width,
                height,
            } => {
                let c = vertex(0, center)?;
                if !(*width > 0.0 && *height > 0.0) {
                    return Err(MalformedGeometryError::BadRectangle(*width, *height));
                }
                let (dx, dy) = (width / 2.0, height / 2.0);
                let ring = vec![
                    Coord { x: c.x - dx, y: c.y - dy },
                    Coord { x: c.x + dx, y: c.y - dy },
                    Coord { x: c.x + dx, y: c.y + dy },
                    Coord { x: c.x - dx, y: c.y + dy },
                ];
                polygon_from_ring(ring, scale).map(Geometry::Polygon)
            }
            ElementShape::Point { center } => {
                let c = vertex(0, center)?;
                Ok(Geometry::Point(Point::from(pixel_to_map(c, scale))))
            }
        }
    }
}

/// 读取一个顶点, 忽略第三个及之后的分量.
fn vertex(index: usize, p: &[f64]) -> Result<Coord<f64>, MalformedGeometryError> {
    let [x, y, ..] = *p else {
        return Err(MalformedGeometryError::ShortVertex(index));
    };
    if x.is_finite() && y.is_finite() {
        Ok(Coord { x, y })
    } else {
        Err(MalformedGeometryError::NonFiniteCoordinate)
    }
}

/// 由像素坐标外环构建地图坐标下的多边形.
///
/// 连续重复点与闭合点会被去掉后再计数.
pub(crate) fn polygon_from_ring(
    mut ring: Vec<Coord<f64>>,
    scale: Scale,
) -> Result<Polygon<f64>, MalformedGeometryError> {
    ring.dedup();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() < 3 {
        return Err(MalformedGeometryError::TooFewVertices(ring.len()));
    }
    let ring: Vec<_> = ring.into_iter().map(|c| pixel_to_map(c, scale)).collect();
    let poly = Polygon::new(LineString::from(ring), vec![]);
    if poly.unsigned_area() > 0.0 {
        Ok(poly)
    } else {
        Err(MalformedGeometryError::ZeroArea)
    }
}
