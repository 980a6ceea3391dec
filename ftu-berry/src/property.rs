//! 结构属性的强类型表示.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 一层比例分布, 如 `cell_type -> weight`. 存储时不要求和为 1.
pub type Distribution = BTreeMap<String, f64>;

/// 两层比例分布, 如 `cell_type -> cell_state -> weight`.
pub type NestedDistribution = BTreeMap<String, Distribution>;

/// 单个属性值.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// 标量, 如面积、厚度.
    Number(f64),

    /// 类别标签.
    Text(String),

    /// 定长向量, 如各通道均值.
    Vector(Vec<f64>),

    /// 一层比例分布.
    Distribution(Distribution),

    /// 两层比例分布.
    NestedDistribution(NestedDistribution),
}

/// 一个结构的全部属性. 键有序, 保证遍历与序列化结果稳定.
pub type Properties = BTreeMap<String, PropertyValue>;

#[inline]
fn number_of(v: &Value) -> Option<f64> {
    v.as_f64().filter(|f| f.is_finite())
}

fn distribution_of(m: &Map<String, Value>) -> Option<Distribution> {
    m.iter()
        .map(|(k, v)| number_of(v).map(|f| (k.clone(), f)))
        .collect()
}

impl PropertyValue {
    /// 从任意 JSON 值转换. 无法表示的值 (null, 布尔, 混合数组, 超过两层的嵌套等) 返回 `None`.
    pub fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Number(_) => number_of(v).map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(arr) => arr
                .iter()
                .map(number_of)
                .collect::<Option<Vec<_>>>()
                .map(Self::Vector),
            Value::Object(m) => {
                if let Some(d) = distribution_of(m) {
                    return Some(Self::Distribution(d));
                }
                m.iter()
                    .map(|(k, v)| match v {
                        Value::Object(inner) => distribution_of(inner).map(|d| (k.clone(), d)),
                        _ => None,
                    })
                    .collect::<Option<NestedDistribution>>()
                    .map(Self::NestedDistribution)
            }
            Value::Null | Value::Bool(_) => None,
        }
    }

    /// 类型名, 用于日志.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Vector(_) => "vector",
            Self::Distribution(_) => "distribution",
            Self::NestedDistribution(_) => "nested distribution",
        }
    }
}

impl From<f64> for PropertyValue {
    #[inline]
    fn from(f: f64) -> Self {
        Self::Number(f)
    }
}

impl From<&str> for PropertyValue {
    #[inline]
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<f64>> for PropertyValue {
    #[inline]
    fn from(v: Vec<f64>) -> Self {
        Self::Vector(v)
    }
}

impl From<Distribution> for PropertyValue {
    #[inline]
    fn from(d: Distribution) -> Self {
        Self::Distribution(d)
    }
}

impl From<NestedDistribution> for PropertyValue {
    #[inline]
    fn from(d: NestedDistribution) -> Self {
        Self::NestedDistribution(d)
    }
}

/// 将标注元数据转换为结构属性. 无法表示的值会被丢弃并记录警告.
pub fn properties_from_json(meta: &Map<String, Value>) -> Properties {
    let mut props = Properties::new();
    for (k, v) in meta {
        match PropertyValue::from_json(v) {
            Some(p) => {
                props.insert(k.clone(), p);
            }
            None => warn!("Dropping property `{k}`: unsupported value {v}"),
        }
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_kinds() {
        let meta = json!({
            "Area": 1200,
            "Cluster": "3",
            "Channel_Means": [0.5, 1.0, 2],
            "Main_Cell_Types": {"PT": 3, "DT": 1.5},
            "Cell_States": {"PT": {"healthy": 0.8, "injured": 0.2}},
            "Flag": true,
            "Missing": null,
            "Mixed": [1, "a"],
            "Deep": {"a": {"b": {"c": 1}}},
        });
        let props = properties_from_json(meta.as_object().unwrap());
        assert_eq!(props.len(), 5);
        assert_eq!(props["Area"], PropertyValue::Number(1200.0));
        assert_eq!(props["Cluster"], PropertyValue::Text("3".to_string()));
        assert_eq!(props["Channel_Means"], PropertyValue::Vector(vec![0.5, 1.0, 2.0]));
        assert!(matches!(props["Main_Cell_Types"], PropertyValue::Distribution(_)));
        match &props["Cell_States"] {
            PropertyValue::NestedDistribution(d) => assert_eq!(d["PT"]["injured"], 0.2),
            other => panic!("unexpected {}", other.kind()),
        }
        assert!(!props.contains_key("Flag"));
        assert!(!props.contains_key("Deep"));
    }

    /// 无标签序列化应与原始 JSON 形状一致.
    #[test]
    fn test_serde_untagged() {
        let v: PropertyValue = serde_json::from_str(r#"{"PT": {"a": 1.0}}"#).unwrap();
        assert!(matches!(v, PropertyValue::NestedDistribution(_)));
        let v: PropertyValue = serde_json::from_str(r#"{"PT": 1.0}"#).unwrap();
        assert!(matches!(v, PropertyValue::Distribution(_)));
        assert_eq!(serde_json::to_string(&PropertyValue::from(2.5)).unwrap(), "2.5");
    }
}
