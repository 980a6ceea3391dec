//! 相交查询: 哪些结构与给定区域相交?

use crate::store::{Geometry, GeometryStore, Layer, Structure};
use geo::{Area, BooleanOps, Intersects, Point, Polygon, Rect};
use log::debug;

/// 查询区域, 地图坐标.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryRegion {
    /// 轴对齐矩形, 通常是当前视野.
    Box(Rect<f64>),

    /// 任意简单多边形, 通常是手绘区域.
    Polygon(Polygon<f64>),

    /// 点, 通常是标记点.
    Point(Point<f64>),
}

impl QueryRegion {
    /// 由 `(min_x, min_y, max_x, max_y)` 构建矩形区域.
    #[inline]
    pub fn from_bounds(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::Box(Rect::new((min_x, min_y), (max_x, max_y)))
    }

    /// 面积. 点的面积为 0.
    pub fn area(&self) -> f64 {
        match self {
            Self::Box(r) => r.unsigned_area(),
            Self::Polygon(p) => p.unsigned_area(),
            Self::Point(_) => 0.0,
        }
    }

    /// 矩形或多边形面积为 0 时, 区域不匹配任何结构.
    #[inline]
    fn is_degenerate(&self) -> bool {
        !matches!(self, Self::Point(_)) && self.area() <= 0.0
    }

    /// 精确相交判断.
    fn intersects(&self, g: &Geometry) -> bool {
        match (self, g) {
            (Self::Box(r), Geometry::Polygon(p)) => r.to_polygon().intersects(p),
            (Self::Box(r), Geometry::Point(p)) => r.to_polygon().intersects(p),
            (Self::Polygon(q), Geometry::Polygon(p)) => q.intersects(p),
            (Self::Polygon(q), Geometry::Point(p)) => q.intersects(p),
            (Self::Point(q), Geometry::Polygon(p)) => p.intersects(q),
            (Self::Point(q), Geometry::Point(p)) => q == p,
        }
    }
}

/// 需要查询的图层.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayerSelection {
    /// 全部图层, 按存储中的创建顺序.
    All,

    /// 指定图层, 按给定顺序.
    Named(Vec<String>),
}

impl From<&str> for LayerSelection {
    /// `"all"` 表示全部图层, 其余字符串视为单个图层名.
    fn from(s: &str) -> Self {
        if s == "all" {
            Self::All
        } else {
            Self::Named(vec![s.to_string()])
        }
    }
}

impl<S: AsRef<str>> From<&[S]> for LayerSelection {
    fn from(names: &[S]) -> Self {
        Self::Named(names.iter().map(|s| s.as_ref().to_string()).collect())
    }
}

/// 在单个图层中查询.
fn find_in_layer<'s>(layer: &'s Layer, region: &QueryRegion, out: &mut Vec<&'s Structure>) {
    match region {
        QueryRegion::Box(r) => {
            for (group_box, members) in layer.groups() {
                if !group_box.intersects(r) {
                    continue;
                }
                out.extend(
                    members
                        .iter()
                        .filter(|s| s.bbox().intersects(r) && region.intersects(s.geometry())),
                );
            }
        }
        _ => out.extend(
            layer
                .structures()
                .iter()
                .filter(|s| region.intersects(s.geometry())),
        ),
    }
}

/// 查询 `layers` 中与 `region` 相交的所有结构.
///
/// 结果按图层分组, 图层顺序与 `layers` 一致, 图层内保持导入顺序.
/// 空图层列表或退化 (面积为 0) 的区域得到空结果. 不存在的图层被跳过.
pub fn find<'s>(
    store: &'s GeometryStore,
    region: &QueryRegion,
    layers: &LayerSelection,
) -> Vec<&'s Structure> {
    let mut out = Vec::new();
    if region.is_degenerate() {
        return out;
    }
    match layers {
        LayerSelection::All => {
            for layer in store.layers() {
                find_in_layer(layer, region, &mut out);
            }
        }
        LayerSelection::Named(names) => {
            for name in names {
                match store.layer_or_err(name) {
                    Ok(layer) => find_in_layer(layer, region, &mut out),
                    Err(e) => debug!("Query skipped: {e}"),
                }
            }
        }
    }
    out
}

/// 结构与多边形区域的重叠比例: `相交面积 / 区域面积`.
///
/// 点结构落在区域内时记为 1. 区域面积为 0 时返回 0.
pub fn overlap_weight(s: &Structure, region: &Polygon<f64>) -> f64 {
    let region_area = region.unsigned_area();
    if region_area <= 0.0 {
        return 0.0;
    }
    match s.geometry() {
        Geometry::Point(p) => {
            if region.intersects(p) {
                1.0
            } else {
                0.0
            }
        }
        Geometry::Polygon(p) => {
            if !region.intersects(p) {
                return 0.0;
            }
            p.intersection(region).unsigned_area() / region_area
        }
    }
}
