//! 会话图层 (手绘区域与标记点) 的 GeoJSON 导出.

use super::{Geometry, GeometryStore, Structure};
use crate::consts::layer;
use crate::coord::{map_to_pixel, polygon_map_to_pixel, Scale};
use serde_json::{json, Map, Value};

fn geometry_json(g: &Geometry, scale: Scale) -> Value {
    match g {
        Geometry::Polygon(p) => {
            let ring: Vec<[f64; 2]> = polygon_map_to_pixel(p, scale)
                .exterior()
                .coords()
                .map(|c| [c.x, c.y])
                .collect();
            json!({"type": "Polygon", "coordinates": [ring]})
        }
        Geometry::Point(p) => {
            let c = map_to_pixel(p.0, scale);
            json!({"type": "Point", "coordinates": [c.x, c.y]})
        }
    }
}

impl GeometryStore {
    fn feature(&self, s: &Structure, scale: Scale) -> Value {
        let mut props = Map::new();
        props.insert("name".to_string(), Value::from(s.name()));
        for (k, v) in s.properties() {
            if let Ok(v) = serde_json::to_value(v) {
                props.insert(k.clone(), v);
            }
        }
        if let Some(linked) = s.linked().and_then(|r| self.get(r)) {
            props.insert("structure".to_string(), Value::from(linked.name()));
        }
        json!({
            "type": "Feature",
            "geometry": geometry_json(s.geometry(), scale),
            "properties": props,
        })
    }

    /// 以像素坐标导出所有手绘区域与标记点, 格式为 GeoJSON `FeatureCollection`.
    ///
    /// 每个要素的 `name` 为 `"{layer}_{id}"`; 已关联结构的标记点额外带有
    /// `structure` 字段, 值为被关联结构的名称.
    pub fn export_session_layers(&self, scale: Scale) -> Value {
        let features: Vec<Value> = [layer::MANUAL_ROI, layer::MARKER]
            .into_iter()
            .filter_map(|name| self.layer(name))
            .flat_map(|l| l.structures().iter())
            .map(|s| self.feature(s, scale))
            .collect();
        json!({"type": "FeatureCollection", "features": features})
    }
}

#[cfg(test)]
mod tests {
    use crate::coord::Scale;
    use crate::property::{Properties, PropertyValue};
    use crate::store::{GeometryStore, RawElement};
    use geo::{polygon, Point};

    #[test]
    fn test_export_pixel_coordinates() {
        let scale = Scale::new(0.5, -0.5);
        let mut store = GeometryStore::new();
        let elem = RawElement::polyline([(0.0, 0.0), (20.0, 0.0), (20.0, 20.0), (0.0, 20.0)]);
        store.ingest_layer("Glomeruli", vec![elem], scale);

        let mut props = Properties::new();
        props.insert("Cluster".to_string(), PropertyValue::from("2"));
        let roi = polygon![(x: 1.0, y: -1.0), (x: 3.0, y: -1.0), (x: 3.0, y: -3.0)];
        store.add_manual_region(roi, props).unwrap();
        store.add_marker(Point::new(5.0, -5.0));

        let v = store.export_session_layers(scale);
        let features = v["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["properties"]["name"], "ManualROI_0");
        assert_eq!(features[0]["properties"]["Cluster"], "2");
        assert_eq!(features[0]["geometry"]["coordinates"][0][1][0], 6.0);
        assert_eq!(features[0]["geometry"]["coordinates"][0][2][1], 6.0);
        assert_eq!(features[1]["properties"]["name"], "Marker_0");
        assert_eq!(features[1]["properties"]["structure"], "Glomeruli_0");
        assert_eq!(features[1]["geometry"]["coordinates"][0], 10.0);
    }
}
