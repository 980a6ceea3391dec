//! 热力图叠加所需的原始属性值提取.

use crate::consts::HIER_SEP;
use crate::property::PropertyValue;
use crate::store::Structure;
use ordered_float::OrderedFloat;

/// 叠加属性: `name[value][sub_value]`.
///
/// `value == "max"` 时提取分布中最大权重子键的下标 (按子键字典序计数).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayProp {
    /// 属性名.
    pub name: String,

    /// 一级子键.
    pub value: Option<String>,

    /// 二级子键.
    pub sub_value: Option<String>,
}

impl OverlayProp {
    /// 解析 [`crate::store::GeometryStore::property_names`] 中的名称,
    /// 如 `"Main_Cell_Types --> PT"`.
    pub fn parse(s: &str) -> Self {
        let mut parts = s.splitn(3, HIER_SEP).map(str::to_string);
        Self {
            name: parts.next().unwrap_or_default(),
            value: parts.next(),
            sub_value: parts.next(),
        }
    }
}

/// 最大值下标. 首个最大值优先.
fn argmax<'a, I: IntoIterator<Item = &'a f64>>(it: I) -> Option<usize> {
    it.into_iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
            Some((_, b)) if OrderedFloat(*v) <= OrderedFloat(b) => best,
            _ => Some((i, *v)),
        })
        .map(|(i, _)| i)
}

fn extract(s: &Structure, prop: &OverlayProp) -> Option<f64> {
    let value = s.property(&prop.name)?;
    match (value, prop.value.as_deref(), prop.sub_value.as_deref()) {
        (PropertyValue::Number(v), None, _) => Some(*v),
        (PropertyValue::Distribution(d), Some(k), None) => match d.get(k) {
            Some(v) => Some(*v),
            None if k == "max" => argmax(d.values()).map(|i| i as f64),
            None => None,
        },
        (PropertyValue::NestedDistribution(d), Some(k), Some(sub)) => d.get(k)?.get(sub).copied(),
        (PropertyValue::NestedDistribution(d), Some("max"), None) => {
            let totals: Vec<f64> = d.values().map(|inner| inner.values().sum()).collect();
            argmax(totals.iter()).map(|i| i as f64)
        }
        _ => None,
    }
}

/// 提取每个结构中 `prop` 所指的原始数值. 缺少该属性的结构被跳过.
pub fn overlay_values<'s, I>(structures: I, prop: &OverlayProp) -> Vec<f64>
where
    I: IntoIterator<Item = &'s Structure>,
{
    structures
        .into_iter()
        .filter_map(|s| extract(s, prop))
        .collect()
}
