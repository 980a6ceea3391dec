//! 结构属性聚合.
//!
//! 将一组结构 (通常是一次相交查询的结果) 的属性合并成一份汇总:
//!
//! 1. 标量: 对拥有该字段的结构求 (加权) 平均. 没有任何结构拥有的字段不出现在结果中.
//! 2. 类别: 统计各取值出现次数.
//! 3. 比例分布: 逐子键累加 (加权) 原始权重, 再除以该顶层键的总和.
//!    总和为 0 时所有子键均为 0, 而不是 NaN.
//! 4. 向量: 逐元素求平均, 长度不一致时报错.
//!
//! 手绘多边形区域使用面积加权 (见 [`crate::query::overlap_weight`]),
//! 视野矩形与点区域按全额计入.

mod overlay;

pub use overlay::{overlay_values, OverlayProp};

use crate::consts::{DECIMAL_PRECISION, HIER_SEP};
use crate::property::{Distribution, PropertyValue};
use crate::query::{self, LayerSelection, QueryRegion};
use crate::store::{GeometryStore, Structure};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// 聚合过程中的错误.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AggregateError {
    /// 同一向量字段在不同结构中长度不同.
    #[error("vector field `{field}` has length {found}, expected {expected}")]
    InconsistentVectorLength {
        /// 字段名.
        field: String,
        /// 第一个结构中的长度.
        expected: usize,
        /// 出错结构中的长度.
        found: usize,
    },
}

/// 聚合结果别名.
pub type AggregateResult<T> = Result<T, AggregateError>;

/// 一组结构的属性汇总. 可直接序列化为 JSON 供图表使用.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AggregationResult {
    /// 标量字段均值.
    pub numeric_means: BTreeMap<String, f64>,

    /// 类别字段直方图.
    pub categorical_counts: BTreeMap<String, BTreeMap<String, u64>>,

    /// 归一化的比例分布. 每个顶层键下的值之和为 1, 或全为 0.
    pub hierarchical_distributions: BTreeMap<String, Distribution>,

    /// 向量字段逐元素均值.
    pub vector_means: BTreeMap<String, Vec<f64>>,

    /// 参与聚合的结构个数.
    pub matched_count: usize,
}

impl AggregationResult {
    /// 顶层键 `top_key` 下权重最大的 `n` 个子键, 按权重降序. 权重相同时按子键字典序.
    pub fn top(&self, top_key: &str, n: usize) -> Vec<(&str, f64)> {
        let Some(dist) = self.hierarchical_distributions.get(top_key) else {
            return Vec::new();
        };
        dist.iter()
            .sorted_by_key(|(_, v)| std::cmp::Reverse(OrderedFloat(**v)))
            .take(n)
            .map(|(k, v)| (k.as_str(), *v))
            .collect()
    }
}

/// 固定小数位输出, 避免反复归一化时的舍入误差积累.
#[inline]
fn fixed_precision(v: f64) -> f64 {
    format!("{v:.prec$}", prec = DECIMAL_PRECISION)
        .parse()
        .unwrap_or(v)
}

/// 累加器.
#[derive(Default)]
struct Accumulator {
    /// 字段 -> (加权和, 权重和).
    numeric: BTreeMap<String, (f64, f64)>,
    categorical: BTreeMap<String, BTreeMap<String, u64>>,
    hierarchical: BTreeMap<String, Distribution>,
    /// 字段 -> (逐元素和, 个数).
    vectors: BTreeMap<String, (Vec<f64>, usize)>,
    count: usize,
}

impl Accumulator {
    fn add_distribution(&mut self, top_key: String, dist: &Distribution, weight: f64) {
        let sums = self.hierarchical.entry(top_key).or_default();
        for (sub, v) in dist {
            *sums.entry(sub.clone()).or_insert(0.0) += v * weight;
        }
    }

    fn add(&mut self, s: &Structure, weight: f64) -> AggregateResult<()> {
        self.count += 1;
        for (key, value) in s.properties() {
            match value {
                PropertyValue::Number(v) => {
                    let (swv, sw) = self.numeric.entry(key.clone()).or_insert((0.0, 0.0));
                    *swv += v * weight;
                    *sw += weight;
                }
                PropertyValue::Text(t) => {
                    *self
                        .categorical
                        .entry(key.clone())
                        .or_default()
                        .entry(t.clone())
                        .or_insert(0) += 1;
                }
                PropertyValue::Vector(v) => match self.vectors.get_mut(key) {
                    Some((sums, n)) => {
                        if sums.len() != v.len() {
                            return Err(AggregateError::InconsistentVectorLength {
                                field: key.clone(),
                                expected: sums.len(),
                                found: v.len(),
                            });
                        }
                        sums.iter_mut().zip(v).for_each(|(a, b)| *a += b);
                        *n += 1;
                    }
                    None => {
                        self.vectors.insert(key.clone(), (v.clone(), 1));
                    }
                },
                PropertyValue::Distribution(d) => self.add_distribution(key.clone(), d, weight),
                PropertyValue::NestedDistribution(nested) => {
                    for (top, d) in nested {
                        self.add_distribution(format!("{key}{HIER_SEP}{top}"), d, weight);
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> AggregationResult {
        let numeric_means = self
            .numeric
            .into_iter()
            .filter(|(_, (_, sw))| *sw > 0.0)
            .map(|(k, (swv, sw))| (k, swv / sw))
            .collect();

        let hierarchical_distributions = self
            .hierarchical
            .into_iter()
            .map(|(k, sums)| {
                let total: f64 = sums.values().sum();
                let normalized = sums
                    .into_iter()
                    .map(|(sub, v)| {
                        let w = if total > 0.0 { fixed_precision(v / total) } else { 0.0 };
                        (sub, w)
                    })
                    .collect();
                (k, normalized)
            })
            .collect();

        let vector_means = self
            .vectors
            .into_iter()
            .map(|(k, (sums, n))| (k, sums.into_iter().map(|s| s / n as f64).collect()))
            .collect();

        AggregationResult {
            numeric_means,
            categorical_counts: self.categorical,
            hierarchical_distributions,
            vector_means,
            matched_count: self.count,
        }
    }
}

/// 带权聚合. 权重作用于标量均值与比例分布.
pub fn aggregate_weighted<'s, I>(items: I) -> AggregateResult<AggregationResult>
where
    I: IntoIterator<Item = (&'s Structure, f64)>,
{
    let mut acc = Accumulator::default();
    for (s, w) in items {
        acc.add(s, w)?;
    }
    Ok(acc.finish())
}

/// 全额 (不加权) 聚合.
#[inline]
pub fn aggregate(structures: &[&Structure]) -> AggregateResult<AggregationResult> {
    aggregate_weighted(structures.iter().map(|s| (*s, 1.0)))
}

/// 对区域内的结构进行聚合. 权重规则由区域类型决定.
fn aggregate_hits(hits: &[&Structure], region: &QueryRegion) -> AggregateResult<AggregationResult> {
    match region {
        QueryRegion::Polygon(poly) => {
            aggregate_weighted(hits.iter().map(|s| (*s, query::overlap_weight(s, poly))))
        }
        QueryRegion::Box(_) | QueryRegion::Point(_) => aggregate(hits),
    }
}

/// 查询并聚合 `region` 内的结构.
pub fn aggregate_region(
    store: &GeometryStore,
    region: &QueryRegion,
    layers: &LayerSelection,
) -> AggregateResult<AggregationResult> {
    let hits = query::find(store, region, layers);
    aggregate_hits(&hits, region)
}

/// 查询 `region` 内的结构并按图层分别聚合. 只返回至少有一个结构命中的图层,
/// 顺序与查询结果一致.
pub fn aggregate_by_layer(
    store: &GeometryStore,
    region: &QueryRegion,
    layers: &LayerSelection,
) -> AggregateResult<Vec<(String, AggregationResult)>> {
    let hits = query::find(store, region, layers);
    let mut out = Vec::new();
    for (layer, group) in &hits.into_iter().group_by(|s| s.layer_name().to_string()) {
        let group: Vec<&Structure> = group.collect();
        out.push((layer, aggregate_hits(&group, region)?));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Scale;
    use crate::store::RawElement;
    use geo::polygon;
    use serde_json::json;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    const UNIT: Scale = Scale::new(1.0, 1.0);

    fn element(x: f64, meta: serde_json::Value) -> RawElement {
        RawElement::polyline([(x, 0.0), (x + 1.0, 0.0), (x + 1.0, 1.0), (x, 1.0)])
            .with_metadata(meta.as_object().cloned().unwrap_or_default())
    }

    fn store_of(metas: Vec<serde_json::Value>) -> GeometryStore {
        let mut store = GeometryStore::new();
        let elems = metas
            .into_iter()
            .enumerate()
            .map(|(i, m)| element(i as f64 * 2.0, m));
        store.ingest_layer("FTU", elems, UNIT);
        store
    }

    fn all(store: &GeometryStore) -> Vec<&Structure> {
        store.layer("FTU").unwrap().structures().iter().collect()
    }

    #[test]
    fn test_empty_input() {
        let r = aggregate(&[]).unwrap();
        assert_eq!(r, AggregationResult::default());
        assert_eq!(r.matched_count, 0);
    }

    /// 面积加权的例子: PT = 3 * 1.0 + 1 * 0.5, DT = 1 * 1.0.
    #[test]
    fn test_weighted_distribution() {
        let store = store_of(vec![
            json!({"Main_Cell_Types": {"PT": 3, "DT": 1}}),
            json!({"Main_Cell_Types": {"PT": 1}}),
            json!({"Main_Cell_Types": {"PT": 0, "DT": 0}}),
        ]);
        let s = all(&store);
        let r = aggregate_weighted([(s[0], 1.0), (s[1], 0.5), (s[2], 1.0)]).unwrap();
        let d = &r.hierarchical_distributions["Main_Cell_Types"];
        assert!(f64_eq(d["PT"], 3.5 / 4.5));
        assert!(f64_eq(d["DT"], 1.0 / 4.5));
        assert!(f64_eq(d.values().sum::<f64>(), 1.0));
        assert_eq!(r.matched_count, 3);
        assert_eq!(r.top("Main_Cell_Types", 1), vec![("PT", d["PT"])]);
        assert!(r.top("Cell_States", 3).is_empty());
    }

    /// 总权重为 0 时, 子键为精确的 0.
    #[test]
    fn test_zero_total() {
        let store = store_of(vec![
            json!({"Main_Cell_Types": {"PT": 0, "DT": 0}}),
            json!({"Main_Cell_Types": {"TAL": 0.0}}),
        ]);
        let r = aggregate(&all(&store)).unwrap();
        let d = &r.hierarchical_distributions["Main_Cell_Types"];
        assert_eq!(d.len(), 3);
        assert!(d.values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_nested_distribution() {
        let store = store_of(vec![
            json!({"Cell_States": {"PT": {"healthy": 3, "injured": 1}, "DT": {"healthy": 2}}}),
            json!({"Cell_States": {"PT": {"injured": 4}}}),
        ]);
        let r = aggregate(&all(&store)).unwrap();
        let pt = &r.hierarchical_distributions["Cell_States --> PT"];
        assert!(f64_eq(pt["healthy"], 3.0 / 8.0));
        assert!(f64_eq(pt["injured"], 5.0 / 8.0));
        assert!(f64_eq(r.hierarchical_distributions["Cell_States --> DT"]["healthy"], 1.0));
    }

    /// 标量只对拥有该字段的结构求均值, 类别按次数统计.
    #[test]
    fn test_numeric_and_categorical() {
        let store = store_of(vec![
            json!({"Area": 10, "Cluster": "1"}),
            json!({"Area": 20, "Cluster": "2"}),
            json!({"Cluster": "1"}),
        ]);
        let r = aggregate(&all(&store)).unwrap();
        assert_eq!(r.numeric_means.len(), 1);
        assert!(f64_eq(r.numeric_means["Area"], 15.0));
        assert_eq!(r.categorical_counts["Cluster"]["1"], 2);
        assert_eq!(r.categorical_counts["Cluster"]["2"], 1);
        assert!(!r.numeric_means.contains_key("Thickness"));

        let s = all(&store);
        let r = aggregate_weighted([(s[0], 0.75), (s[1], 0.25)]).unwrap();
        assert!(f64_eq(r.numeric_means["Area"], 12.5));
    }

    /// 只接触边界 (重叠面积为 0) 的结构不贡献标量均值.
    #[test]
    fn test_zero_weight_numeric_omitted() {
        let store = store_of(vec![json!({"Area": 500}), json!({"Area": 20})]);
        let s = all(&store);
        let r = aggregate_weighted([(s[0], 0.0)]).unwrap();
        assert_eq!(r.matched_count, 1);
        assert!(r.numeric_means.is_empty());

        let r = aggregate_weighted([(s[0], 0.0), (s[1], 0.5)]).unwrap();
        assert_eq!(r.numeric_means.len(), 1);
        assert!(f64_eq(r.numeric_means["Area"], 20.0));

        let touching = polygon![(x: 1.0, y: 0.0), (x: 1.5, y: 0.0), (x: 1.5, y: 1.0), (x: 1.0, y: 1.0)];
        let r = aggregate_region(&store, &QueryRegion::Polygon(touching), &LayerSelection::All).unwrap();
        assert_eq!(r.matched_count, 1);
        assert!(!r.numeric_means.contains_key("Area"));
    }

    #[test]
    fn test_vector_means() {
        let store = store_of(vec![
            json!({"Channel_Means": [1.0, 2.0, 3.0]}),
            json!({"Channel_Means": [3.0, 4.0, 5.0]}),
        ]);
        let r = aggregate(&all(&store)).unwrap();
        assert_eq!(r.vector_means["Channel_Means"], vec![2.0, 3.0, 4.0]);

        let bad = store_of(vec![
            json!({"Channel_Means": [1.0, 2.0, 3.0]}),
            json!({"Channel_Means": [3.0, 4.0]}),
        ]);
        assert_eq!(
            aggregate(&all(&bad)).unwrap_err(),
            AggregateError::InconsistentVectorLength {
                field: "Channel_Means".to_string(),
                expected: 3,
                found: 2
            }
        );
    }

    /// 多边形区域按重叠面积加权, 矩形区域全额计入.
    #[test]
    fn test_region_dispatch() {
        let store = store_of(vec![
            json!({"Main_Cell_Types": {"PT": 1}}),
            json!({"Main_Cell_Types": {"DT": 1}}),
        ]);
        // 覆盖第 0 个结构的全部 (面积 1) 和第 1 个结构的一半 (面积 0.5)
        let poly = polygon![(x: 0.0, y: 0.0), (x: 2.5, y: 0.0), (x: 2.5, y: 1.0), (x: 0.0, y: 1.0)];
        let r = aggregate_region(&store, &QueryRegion::Polygon(poly), &LayerSelection::All).unwrap();
        let d = &r.hierarchical_distributions["Main_Cell_Types"];
        assert!(f64_eq(d["PT"], 2.0 / 3.0));
        assert!(f64_eq(d["DT"], 1.0 / 3.0));

        let b = QueryRegion::from_bounds(0.0, 0.0, 2.5, 1.0);
        let r = aggregate_region(&store, &b, &LayerSelection::All).unwrap();
        assert!(f64_eq(r.hierarchical_distributions["Main_Cell_Types"]["PT"], 0.5));

        let by_layer = aggregate_by_layer(&store, &b, &LayerSelection::All).unwrap();
        assert_eq!(by_layer.len(), 1);
        assert_eq!(by_layer[0].0, "FTU");
        assert_eq!(by_layer[0].1.matched_count, 2);
    }

    #[test]
    fn test_serialize_shape() {
        let v = serde_json::to_value(AggregationResult::default()).unwrap();
        let keys: Vec<_> = v.as_object().unwrap().keys().cloned().collect();
        for k in [
            "numeric_means",
            "categorical_counts",
            "hierarchical_distributions",
            "vector_means",
            "matched_count",
        ] {
            assert!(keys.iter().any(|x| x == k));
        }
    }
}
