//! 切片像素坐标与地图 (viewer) 坐标之间的变换, 以及各缩放级别的瓦片网格.
//!
//! 地图坐标系的 y 轴向上, 像素坐标系的 y 轴向下, 因此 `y` 方向缩放系数恒为负.

mod frame;

pub use frame::{FrameError, SlideFrame, TileIndex};

use geo::{Coord, LineString, Polygon};

/// 像素坐标到地图坐标的缩放系数.
///
/// 由 [`SlideFrame::scale`] 得到时, 保证 `x > 0`, `y < 0`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Scale {
    /// `x` 方向缩放系数.
    pub x: f64,

    /// `y` 方向缩放系数.
    pub y: f64,
}

impl Scale {
    /// 直接构建. 不做任何检查.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 像素坐标 -> 地图坐标.
#[inline]
pub fn pixel_to_map(p: Coord<f64>, scale: Scale) -> Coord<f64> {
    Coord {
        x: p.x * scale.x,
        y: p.y * scale.y,
    }
}

/// 地图坐标 -> 像素坐标. `scale` 的分量不能为 0.
#[inline]
pub fn map_to_pixel(p: Coord<f64>, scale: Scale) -> Coord<f64> {
    Coord {
        x: p.x / scale.x,
        y: p.y / scale.y,
    }
}

/// 对多边形外环的每个顶点做 [`pixel_to_map`].
pub fn ring_pixel_to_map(ring: &[Coord<f64>], scale: Scale) -> Vec<Coord<f64>> {
    ring.iter().map(|c| pixel_to_map(*c, scale)).collect()
}

/// 对多边形外环的每个顶点做 [`map_to_pixel`].
pub fn ring_map_to_pixel(ring: &[Coord<f64>], scale: Scale) -> Vec<Coord<f64>> {
    ring.iter().map(|c| map_to_pixel(*c, scale)).collect()
}

/// 将地图坐标下的多边形 (仅外环) 转回像素坐标.
pub fn polygon_map_to_pixel(poly: &Polygon<f64>, scale: Scale) -> Polygon<f64> {
    let ring = ring_map_to_pixel(&poly.exterior().0, scale);
    Polygon::new(LineString::from(ring), vec![])
}
