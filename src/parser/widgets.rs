//! Typed view over the upstream widget tree.
//!
//! Every node of the tree is `{ "widget_type": <tag>, "data": { ... } }`.
//! [`Widget::classify`] turns a node into a closed sum type; tags this crate
//! does not know become [`Widget::Unknown`] and are skipped by the visitor.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Pointer to the nested widget list of an expandable sheet.
pub const MODAL_WIDGETS: &str = "/data/action/payload/modal_page/widget_list";

static NULL: Value = Value::Null;

#[derive(Debug)]
pub enum Widget<'a> {
    LegendTitle(LegendTitleData),
    GroupInfo(GroupInfoData),
    Unexpandable(LabelValue),
    Feature(FeatureItem),
    GroupFeature(GroupFeatureData),
    Description(DescriptionData),
    ImageCarousel(ImageCarouselData),
    Map(MapData),
    Unknown(&'a str),
}

impl<'a> Widget<'a> {
    /// Reads the tag and deserializes the data block for known tags.
    /// A known tag with a malformed data block is an error for that node only.
    pub fn classify(node: &'a Value) -> Result<Self, serde_json::Error> {
        let tag = node
            .get("widget_type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let data = node.get("data").unwrap_or(&NULL);

        let widget = match tag {
            "LEGEND_TITLE_ROW" => Widget::LegendTitle(LegendTitleData::deserialize(data)?),
            "GROUP_INFO_ROW" => Widget::GroupInfo(GroupInfoData::deserialize(data)?),
            "UNEXPANDABLE_ROW" => Widget::Unexpandable(LabelValue::deserialize(data)?),
            "FEATURE_ROW" => Widget::Feature(FeatureItem::deserialize(data)?),
            "GROUP_FEATURE_ROW" => Widget::GroupFeature(GroupFeatureData::deserialize(data)?),
            "DESCRIPTION_ROW" => Widget::Description(DescriptionData::deserialize(data)?),
            "IMAGE_CAROUSEL_ROW" => Widget::ImageCarousel(ImageCarouselData::deserialize(data)?),
            "MAP_ROW" => Widget::Map(MapData::deserialize(data)?),
            other => Widget::Unknown(other),
        };

        Ok(widget)
    }
}

/// Nested widgets reachable through the node's action, if any.
pub fn modal_widgets(node: &Value) -> &[Value] {
    node.pointer(MODAL_WIDGETS)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
pub struct LegendTitleData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subtitle: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LabelValue {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupInfoData {
    #[serde(default)]
    pub items: Vec<LabelValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeatureItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupFeatureData {
    #[serde(default)]
    pub items: Vec<FeatureItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DescriptionData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageItem {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageCarouselData {
    #[serde(default)]
    pub items: Vec<ImageItem>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct PointData {
    #[serde(default)]
    pub point: Option<Point>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MapLocation {
    #[serde(default)]
    pub exact_data: Option<PointData>,
    #[serde(default)]
    pub approximate_data: Option<PointData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MapData {
    #[serde(default)]
    pub location: Option<MapLocation>,
}

impl MapData {
    /// Exact point when published, approximate otherwise. The flag tells
    /// which one was used.
    pub fn point(&self) -> Option<(Point, bool)> {
        let location = self.location.as_ref()?;
        let exact = location.exact_data.as_ref().and_then(|d| d.point);
        let approximate = location.approximate_data.as_ref().and_then(|d| d.point);
        exact
            .map(|p| (p, true))
            .or_else(|| approximate.map(|p| (p, false)))
    }
}

/// Accepts strings and numbers; everything else (including `null`) is `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_tags_are_preserved_for_logging() {
        let node = json!({"widget_type": "SCORE_ROW", "data": {"score": 3}});
        assert!(matches!(
            Widget::classify(&node).unwrap(),
            Widget::Unknown("SCORE_ROW")
        ));
    }

    #[test]
    fn numeric_values_are_read_as_text() {
        let node = json!({"widget_type": "UNEXPANDABLE_ROW", "data": {"title": "طبقه", "value": 3}});
        match Widget::classify(&node).unwrap() {
            Widget::Unexpandable(row) => assert_eq!(row.value.as_deref(), Some("3")),
            other => panic!("unexpected widget {other:?}"),
        }
    }

    #[test]
    fn map_prefers_exact_point() {
        let node = json!({"widget_type": "MAP_ROW", "data": {"location": {
            "exact_data": {"point": {"latitude": 35.7, "longitude": 51.4}},
            "approximate_data": {"point": {"latitude": 35.0, "longitude": 51.0}}
        }}});
        let Widget::Map(map) = Widget::classify(&node).unwrap() else {
            panic!("expected map widget");
        };
        let (point, exact) = map.point().unwrap();
        assert!(exact);
        assert_eq!(point.latitude, 35.7);
    }

    #[test]
    fn modal_widget_list_is_found() {
        let node = json!({"widget_type": "UNEXPANDABLE_ROW", "data": {
            "title": "امکانات",
            "action": {"payload": {"modal_page": {"widget_list": [
                {"widget_type": "FEATURE_ROW", "data": {"title": "آسانسور"}}
            ]}}}
        }});
        assert_eq!(modal_widgets(&node).len(), 1);
    }
}
