//! 单张切片的会话状态.
//!
//! [`SlideSession`] 持有切片的坐标框架与几何库, 取代全局可变状态.
//! 多线程场景下使用 [`SharedSlideSession`]: 查询共享读锁, 导入与追加独占写锁.

use crate::aggregate::{self, AggregateError, AggregateResult, AggregationResult};
use crate::consts::{keys, layer, HIER_SEP};
use crate::coord::{pixel_to_map, SlideFrame};
use crate::property::{NestedDistribution, Properties, PropertyValue};
use crate::query::{self, LayerSelection, QueryRegion};
use crate::store::{GeometryStore, IngestReport, MalformedGeometryError, RawElement, Structure};
use geo::{Point, Polygon, Rect};
use log::info;
use serde_json::Value;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// 会话操作中的错误.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionError {
    /// 输入几何非法.
    #[error(transparent)]
    Geometry(#[from] MalformedGeometryError),

    /// 属性聚合失败.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// 一张切片的会话.
#[derive(Debug)]
pub struct SlideSession {
    frame: SlideFrame,
    store: GeometryStore,
}

impl SlideSession {
    /// 以切片坐标框架创建空会话.
    pub fn new(frame: SlideFrame) -> Self {
        Self {
            frame,
            store: GeometryStore::new(),
        }
    }

    /// 切片坐标框架.
    #[inline]
    pub fn frame(&self) -> &SlideFrame {
        &self.frame
    }

    /// 几何库.
    #[inline]
    pub fn store(&self) -> &GeometryStore {
        &self.store
    }

    /// 以本切片的比例导入一个图层 (像素坐标).
    pub fn ingest_layer<I>(&mut self, layer_name: &str, raw_elements: I) -> IngestReport
    where
        I: IntoIterator<Item = RawElement>,
    {
        self.store
            .ingest_layer(layer_name, raw_elements, self.frame.scale())
    }

    /// 视野 `viewport` (地图坐标) 内可见的结构.
    pub fn visible(&self, viewport: Rect<f64>, layers: &LayerSelection) -> Vec<&Structure> {
        query::find(&self.store, &QueryRegion::Box(viewport), layers)
    }

    /// 视野汇总: 每个有结构命中的普通图层一份聚合结果,
    /// 随后每个手绘区域各一份 (即其自身属性).
    pub fn summarize_viewport(
        &self,
        viewport: Rect<f64>,
        layers: &LayerSelection,
    ) -> AggregateResult<Vec<(String, AggregationResult)>> {
        let region = QueryRegion::Box(viewport);
        let mut out: Vec<(String, AggregationResult)> = aggregate::aggregate_by_layer(&self.store, &region, layers)?
            .into_iter()
            .filter(|(name, _)| name.as_str() != layer::MANUAL_ROI && name.as_str() != layer::MARKER)
            .collect();
        if let Some(rois) = self.store.layer(layer::MANUAL_ROI) {
            for roi in rois.structures() {
                out.push((roi.name(), aggregate::aggregate(&[roi])?));
            }
        }
        Ok(out)
    }

    /// 追加一个手绘区域 (像素坐标), 返回其编号.
    ///
    /// 区域的 `Main_Cell_Types` 与 `Cell_States` 属性由与之重叠的 spot
    /// 按面积加权聚合得到. 没有重叠 spot 时这两个属性缺省.
    /// 聚合失败时不追加区域.
    pub fn draw_manual_region(&mut self, ring_pixels: &[(f64, f64)]) -> Result<usize, SessionError> {
        let scale = self.frame.scale();
        let ring: Vec<_> = ring_pixels
            .iter()
            .map(|&(x, y)| pixel_to_map((x, y).into(), scale))
            .collect();
        let polygon = Polygon::new(ring.into(), vec![]);

        let spots = aggregate::aggregate_region(
            &self.store,
            &QueryRegion::Polygon(polygon.clone()),
            &LayerSelection::from(layer::SPOTS),
        )?;
        let properties = spot_properties(&spots);
        let id = self.store.add_manual_region(polygon, properties)?;
        info!("Manual region {id} added, {} spots overlapped", spots.matched_count);
        Ok(id)
    }

    /// 追加一个标记点 (像素坐标), 返回其编号.
    pub fn place_marker(&mut self, x: f64, y: f64) -> usize {
        let p = pixel_to_map((x, y).into(), self.frame.scale());
        self.store.add_marker(Point::from(p))
    }

    /// 以 GeoJSON 导出手绘区域与标记点 (像素坐标).
    pub fn export(&self) -> Value {
        self.store.export_session_layers(self.frame.scale())
    }
}

/// 从 spot 聚合结果中取出手绘区域需要的细胞类型与细胞状态分布.
fn spot_properties(spots: &AggregationResult) -> Properties {
    let mut props = Properties::new();
    let dists = &spots.hierarchical_distributions;
    if let Some(main) = dists.get(keys::MAIN_CELL_TYPES) {
        props.insert(
            keys::MAIN_CELL_TYPES.to_string(),
            PropertyValue::Distribution(main.clone()),
        );
    }
    let prefix = format!("{}{HIER_SEP}", keys::CELL_STATES);
    let states: NestedDistribution = dists
        .iter()
        .filter_map(|(k, d)| Some((k.strip_prefix(&prefix)?.to_string(), d.clone())))
        .collect();
    if !states.is_empty() {
        props.insert(
            keys::CELL_STATES.to_string(),
            PropertyValue::NestedDistribution(states),
        );
    }
    props
}

/// 可在线程间共享的会话.
#[derive(Clone, Debug)]
pub struct SharedSlideSession(Arc<RwLock<SlideSession>>);

impl SharedSlideSession {
    /// 包装一个会话.
    pub fn new(session: SlideSession) -> Self {
        Self(Arc::new(RwLock::new(session)))
    }

    /// 获取读锁. 锁中毒时仍返回内部数据 (会话只做追加操作, 不存在半更新状态).
    pub fn read(&self) -> RwLockReadGuard<'_, SlideSession> {
        self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    /// 获取写锁. 锁中毒时仍返回内部数据.
    pub fn write(&self) -> RwLockWriteGuard<'_, SlideSession> {
        self.0.write().unwrap_or_else(|e| e.into_inner())
    }
}
