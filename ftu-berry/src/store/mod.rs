//! 单张切片的结构存储, 按图层 (FTU 类型) 组织.
//!
//! 图层内结构按导入顺序排列, 结构编号即其在图层中的位置. 除 `ManualROI`
//! 与 `Marker` 两个会话图层只允许追加外, 导入后的结构不再变化.

mod element;
mod export;

pub use element::{ElementShape, MalformedGeometryError, RawElement};

use crate::consts::{layer, GROUP_SIZE, HIER_SEP};
use crate::coord::Scale;
use crate::property::{properties_from_json, Properties, PropertyValue};
use crate::query::{self, LayerSelection, QueryRegion};
use geo::{Coord, Point, Polygon, Rect};
use itertools::Itertools;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// 查询了不存在的图层.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("layer `{0}` not found")]
pub struct LayerNotFoundError(pub String);

/// 结构的几何形状, 地图坐标.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// 多边形 (仅外环).
    Polygon(Polygon<f64>),

    /// 点.
    Point(Point<f64>),
}

impl Geometry {
    /// 包围盒.
    pub fn bounding_box(&self) -> Rect<f64> {
        match self {
            Self::Polygon(p) => bbox_of(p.exterior().coords().copied()),
            Self::Point(p) => Rect::new(p.0, p.0),
        }
    }
}

/// 由坐标序列求包围盒. 序列不能为空.
fn bbox_of<I: IntoIterator<Item = Coord<f64>>>(it: I) -> Rect<f64> {
    let mut it = it.into_iter();
    let first = it.next().unwrap_or(Coord { x: 0.0, y: 0.0 });
    let (lo, hi) = it.fold((first, first), |(lo, hi), c| {
        (
            Coord { x: lo.x.min(c.x), y: lo.y.min(c.y) },
            Coord { x: hi.x.max(c.x), y: hi.y.max(c.y) },
        )
    });
    Rect::new(lo, hi)
}

/// 两个包围盒的并.
#[inline]
fn bbox_union(a: &Rect<f64>, b: &Rect<f64>) -> Rect<f64> {
    bbox_of([a.min(), a.max(), b.min(), b.max()])
}

/// 对另一个结构的引用.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructureRef {
    /// 图层名.
    pub layer: String,

    /// 图层内编号.
    pub id: usize,
}

/// 一个标注对象: FTU 实例、spot、手绘区域或标记点.
#[derive(Clone, Debug)]
pub struct Structure {
    id: usize,
    layer_name: String,
    geometry: Geometry,
    bbox: Rect<f64>,
    properties: Properties,
    linked: Option<StructureRef>,
}

impl Structure {
    fn new(id: usize, layer_name: &str, geometry: Geometry, properties: Properties) -> Self {
        let bbox = geometry.bounding_box();
        Self {
            id,
            layer_name: layer_name.to_string(),
            geometry,
            bbox,
            properties,
            linked: None,
        }
    }

    /// 图层内编号.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// 所属图层名.
    #[inline]
    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    /// 几何形状 (地图坐标).
    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// 预先计算的包围盒.
    #[inline]
    pub fn bbox(&self) -> &Rect<f64> {
        &self.bbox
    }

    /// 全部属性.
    #[inline]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// 获取单个属性.
    #[inline]
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// 标记点所关联的结构. 其它结构总是 `None`.
    #[inline]
    pub fn linked(&self) -> Option<&StructureRef> {
        self.linked.as_ref()
    }

    /// 引用自身.
    pub fn to_ref(&self) -> StructureRef {
        StructureRef {
            layer: self.layer_name.clone(),
            id: self.id,
        }
    }

    /// 可读名称, 形如 `"{layer}_{id}"`.
    #[inline]
    pub fn name(&self) -> String {
        format!("{}_{}", self.layer_name, self.id)
    }
}

/// 一个图层. 每 [`GROUP_SIZE`] 个连续结构共享一个分组包围盒, 用于快速排除.
#[derive(Clone, Debug)]
pub struct Layer {
    name: String,
    structures: Vec<Structure>,
    groups: Vec<Rect<f64>>,
}

impl Layer {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            structures: Vec::new(),
            groups: Vec::new(),
        }
    }

    fn push(&mut self, s: Structure) {
        if self.structures.len() % GROUP_SIZE == 0 {
            self.groups.push(s.bbox);
        } else if let Some(g) = self.groups.last_mut() {
            *g = bbox_union(g, &s.bbox);
        }
        self.structures.push(s);
    }

    /// 图层名.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 按导入顺序排列的全部结构.
    #[inline]
    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    /// 结构个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    /// 按顺序返回 `(分组包围盒, 该组结构)`.
    pub fn groups(&self) -> impl Iterator<Item = (&Rect<f64>, &[Structure])> {
        self.groups.iter().zip(self.structures.chunks(GROUP_SIZE))
    }
}

/// 一次 [`GeometryStore::ingest_layer`] 的结果.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// 成功导入的结构数.
    pub ingested: usize,

    /// 被跳过的元素: `(元素下标, 原因)`.
    pub skipped: Vec<(usize, MalformedGeometryError)>,
}

impl IngestReport {
    /// 被跳过的元素个数.
    #[inline]
    pub fn skip_count(&self) -> usize {
        self.skipped.len()
    }
}

/// 单张切片的全部结构.
#[derive(Clone, Debug, Default)]
pub struct GeometryStore {
    layers: Vec<Layer>,
    index: HashMap<String, usize>,
}

impl GeometryStore {
    /// 创建空存储.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn layer_mut(&mut self, name: &str) -> &mut Layer {
        let idx = match self.index.get(name) {
            Some(&i) => i,
            None => {
                self.layers.push(Layer::new(name));
                self.index.insert(name.to_string(), self.layers.len() - 1);
                self.layers.len() - 1
            }
        };
        &mut self.layers[idx]
    }

    /// 导入一个图层的全部元素. 坐标由像素坐标按 `scale` 转为地图坐标,
    /// 元素元数据转为结构属性.
    ///
    /// 不合法的元素会被跳过并记录在返回值中, 其余元素照常导入.
    /// 若图层已存在, 新结构追加在其末尾.
    pub fn ingest_layer<I>(&mut self, layer_name: &str, raw_elements: I, scale: Scale) -> IngestReport
    where
        I: IntoIterator<Item = RawElement>,
    {
        let mut report = IngestReport::default();
        let layer = self.layer_mut(layer_name);
        for (idx, elem) in raw_elements.into_iter().enumerate() {
            match elem.to_geometry(scale) {
                Ok(geometry) => {
                    let props = properties_from_json(&elem.metadata);
                    layer.push(Structure::new(layer.len(), layer_name, geometry, props));
                    report.ingested += 1;
                }
                Err(e) => {
                    warn!("Skipping element #{idx} of layer `{layer_name}`: {e}");
                    report.skipped.push((idx, e));
                }
            }
        }
        info!(
            "Layer `{layer_name}`: {} ingested, {} skipped",
            report.ingested,
            report.skip_count()
        );
        report
    }

    /// 追加一个手绘区域 (地图坐标), 返回其编号. 编号为追加前已有的手绘区域个数.
    pub fn add_manual_region(
        &mut self,
        polygon: Polygon<f64>,
        properties: Properties,
    ) -> Result<usize, MalformedGeometryError> {
        let polygon = element::polygon_from_ring(polygon.exterior().0.clone(), Scale::new(1.0, 1.0))?;
        let layer = self.layer_mut(layer::MANUAL_ROI);
        let id = layer.len();
        layer.push(Structure::new(id, layer::MANUAL_ROI, Geometry::Polygon(polygon), properties));
        Ok(id)
    }

    /// 追加一个标记点 (地图坐标), 返回其编号.
    ///
    /// 追加时会在所有非标记图层中查询该点, 并将按图层顺序找到的第一个结构
    /// 关联到该标记上. 重叠结构之间不做进一步消歧.
    pub fn add_marker(&mut self, point: Point<f64>) -> usize {
        let candidates: Vec<String> = self
            .layer_names()
            .filter(|n| *n != layer::MARKER)
            .map(str::to_string)
            .collect();
        let hits = query::find(self, &QueryRegion::Point(point), &LayerSelection::Named(candidates));
        if hits.len() > 1 {
            debug!(
                "Marker hits {} structures, keeping `{}`",
                hits.len(),
                hits[0].name()
            );
        }
        let linked = hits.first().map(|s| s.to_ref());

        let layer = self.layer_mut(layer::MARKER);
        let id = layer.len();
        let mut marker = Structure::new(id, layer::MARKER, Geometry::Point(point), Properties::new());
        marker.linked = linked;
        layer.push(marker);
        id
    }

    /// 按创建顺序列出所有图层名.
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.name())
    }

    /// 按创建顺序列出所有图层.
    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// 获取图层.
    #[inline]
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.index.get(name).map(|&i| &self.layers[i])
    }

    /// 获取图层, 不存在时报错.
    pub fn layer_or_err(&self, name: &str) -> Result<&Layer, LayerNotFoundError> {
        self.layer(name)
            .ok_or_else(|| LayerNotFoundError(name.to_string()))
    }

    /// 按引用获取结构.
    pub fn get(&self, r: &StructureRef) -> Option<&Structure> {
        self.layer(&r.layer)?.structures.get(r.id)
    }

    /// 所有结构的全部可展示属性名, 去重且有序.
    ///
    /// 一层及两层分布会展开一级, 形如 `"Main_Cell_Types --> PT"`.
    pub fn property_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for s in self.layers.iter().flat_map(|l| l.structures.iter()) {
            for (key, value) in s.properties.iter() {
                match value {
                    PropertyValue::Distribution(d) => {
                        names.extend(d.keys().map(|sub| format!("{key}{HIER_SEP}{sub}")));
                    }
                    PropertyValue::NestedDistribution(d) => {
                        names.extend(d.keys().map(|sub| format!("{key}{HIER_SEP}{sub}")));
                    }
                    _ => {
                        names.insert(key.clone());
                    }
                }
            }
        }
        names.into_iter().collect_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use serde_json::json;

    const UNIT: Scale = Scale::new(1.0, 1.0);

    fn square(x: f64, y: f64, side: f64) -> RawElement {
        RawElement::polyline([(x, y), (x + side, y), (x + side, y + side), (x, y + side)])
    }

    #[test]
    fn test_ingest_skips_malformed() {
        let mut store = GeometryStore::new();
        let elems = vec![
            square(0.0, 0.0, 10.0),
            RawElement::polyline([(0.0, 0.0), (1.0, 0.0)]),
            square(20.0, 0.0, 10.0),
            RawElement::polyline([(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]),
        ];
        let report = store.ingest_layer("Glomeruli", elems, Scale::new(0.5, -0.5));
        assert_eq!(report.ingested, 2);
        assert_eq!(report.skip_count(), 2);
        assert_eq!(report.skipped[0].0, 1);
        assert_eq!(report.skipped[1].1, MalformedGeometryError::ZeroArea);

        let layer = store.layer("Glomeruli").unwrap();
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.structures()[1].id(), 1);
        assert_eq!(layer.structures()[1].name(), "Glomeruli_1");
        // y 翻转后包围盒仍然有序
        let b = layer.structures()[0].bbox();
        assert_eq!((b.min().y, b.max().y), (-5.0, 0.0));
    }

    /// 每 50 个结构共享一个分组包围盒.
    #[test]
    fn test_group_boxes() {
        let mut store = GeometryStore::new();
        let elems = (0..120).map(|i| square(i as f64 * 2.0, 0.0, 1.0));
        store.ingest_layer("Spots", elems, UNIT);
        let layer = store.layer("Spots").unwrap();
        let groups: Vec<_> = layer.groups().collect();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[2].1.len(), 20);
        assert_eq!(groups[0].0.min().x, 0.0);
        assert_eq!(groups[0].0.max().x, 99.0);
        assert_eq!(groups[1].0.min().x, 100.0);
    }

    #[test]
    fn test_manual_region_ids() {
        let mut store = GeometryStore::new();
        let p = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        assert_eq!(store.add_manual_region(p.clone(), Properties::new()), Ok(0));
        assert_eq!(store.add_manual_region(p, Properties::new()), Ok(1));
        let degenerate = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0), (x: 2.0, y: 2.0)];
        assert!(store.add_manual_region(degenerate, Properties::new()).is_err());
        assert_eq!(store.layer(layer::MANUAL_ROI).unwrap().len(), 2);
    }

    /// 标记点关联按图层顺序找到的第一个结构.
    #[test]
    fn test_marker_first_match_wins() {
        let mut store = GeometryStore::new();
        store.ingest_layer("Tubules", vec![square(0.0, 0.0, 10.0)], UNIT);
        store.ingest_layer("Arteries", vec![square(5.0, 5.0, 10.0)], UNIT);

        let m0 = store.add_marker(Point::new(7.0, 7.0));
        let m1 = store.add_marker(Point::new(12.0, 12.0));
        let m2 = store.add_marker(Point::new(50.0, 50.0));
        let markers = store.layer(layer::MARKER).unwrap().structures();
        assert_eq!((m0, m1, m2), (0, 1, 2));
        assert_eq!(markers[0].linked().unwrap().layer, "Tubules");
        assert_eq!(markers[1].linked().unwrap().layer, "Arteries");
        assert!(markers[2].linked().is_none());
        assert_eq!(store.get(markers[1].linked().unwrap()).unwrap().name(), "Arteries_0");
        assert!(store.layer_or_err("Glomeruli").is_err());
    }

    #[test]
    fn test_property_names() {
        let mut store = GeometryStore::new();
        let meta = json!({
            "Area": 3.0,
            "Main_Cell_Types": {"PT": 1.0, "DT": 2.0},
            "Cell_States": {"PT": {"healthy": 1.0}},
        });
        let e = square(0.0, 0.0, 1.0).with_metadata(meta.as_object().unwrap().clone());
        store.ingest_layer("Tubules", vec![e], UNIT);
        assert_eq!(
            store.property_names(),
            vec![
                "Area",
                "Cell_States --> PT",
                "Main_Cell_Types --> DT",
                "Main_Cell_Types --> PT",
            ]
        );
    }
}
