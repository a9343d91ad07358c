//! Detail payload parser.
//!
//! Turns one upstream detail payload into a [`ParsedPost`]. The parser is pure:
//! no network, no storage, same output for the same input.
//!
//! The payload is a tree of sections → widgets → typed data blocks. A single
//! depth-first traversal ([`Visitor::visit`]) dispatches on the widget tag and
//! accumulates into mutable state; widgets that open a modal sheet are
//! re-entered through the same dispatcher.

pub mod jalali;
pub mod locale;
pub mod relative_time;
pub mod widgets;

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::models::{AttributeKind, GeoPoint};
use locale::{normalize_text, numeric_tokens, parse_amount, parse_decimal, parse_integer};
use widgets::{DescriptionData, FeatureItem, ImageItem, LabelValue, Widget};

/// Nested modal sheets deeper than this are not followed.
pub const MAX_WIDGET_DEPTH: usize = 16;

const NEGATION: &str = "ندارد";
const NEGOTIABLE: &str = "توافقی";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedMedia {
    pub position: usize,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAttribute {
    pub key: String,
    pub label: String,
    pub kind: AttributeKind,
    pub value_text: Option<String>,
    pub value_number: Option<Decimal>,
    pub value_bool: Option<bool>,
}

/// Flat result of parsing one payload. Every field is optional: absence in
/// the source yields `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedPost {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub web_url: Option<String>,

    pub cat1: Option<String>,
    pub cat2: Option<String>,
    pub cat3: Option<String>,
    pub city_slug: Option<String>,
    pub district_slug: Option<String>,
    pub business_type: Option<String>,

    pub total_price: Option<Decimal>,
    pub price_per_meter: Option<Decimal>,
    pub deposit: Option<Decimal>,
    pub monthly_rent: Option<Decimal>,
    pub price_negotiable: Option<bool>,

    pub area: Option<Decimal>,
    pub land_area: Option<Decimal>,
    pub rooms: Option<i64>,
    pub build_year: Option<i64>,
    pub floor: Option<i64>,
    pub total_floors: Option<i64>,
    pub units_per_floor: Option<i64>,

    pub has_elevator: Option<bool>,
    pub has_parking: Option<bool>,
    pub has_warehouse: Option<bool>,
    pub has_balcony: Option<bool>,

    pub location: Option<GeoPoint>,
    pub location_is_exact: Option<bool>,

    /// Raw relative-age phrase as shown to users.
    pub published_relative: Option<String>,
    /// Milliseconds between publication and the moment the payload was served.
    pub published_ago_ms: Option<i64>,
    /// Gregorian date of a Jalali date found in the title or SEO text.
    pub jalali_date: Option<NaiveDate>,

    pub medias: Vec<ParsedMedia>,
    pub attributes: Vec<ParsedAttribute>,
}

/// Labels mapped to dedicated fields instead of generic attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrimaryField {
    Area,
    LandArea,
    BuildYear,
    Rooms,
    Floor,
    UnitsPerFloor,
    TotalPrice,
    PricePerMeter,
    Deposit,
    MonthlyRent,
}

impl PrimaryField {
    fn from_label(label: &str) -> Option<Self> {
        let field = match label {
            "متراژ" | "متراژ بنا" => Self::Area,
            "متراژ زمین" => Self::LandArea,
            "ساخت" | "سال ساخت" => Self::BuildYear,
            "اتاق" | "تعداد اتاق" => Self::Rooms,
            "طبقه" => Self::Floor,
            "تعداد واحد در طبقه" | "واحد در طبقه" => Self::UnitsPerFloor,
            "قیمت کل" | "قیمت" => Self::TotalPrice,
            "قیمت هر متر" => Self::PricePerMeter,
            "ودیعه" => Self::Deposit,
            "اجاره ماهانه" | "اجاره" => Self::MonthlyRent,
            _ => return None,
        };
        Some(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Amenity {
    Elevator,
    Parking,
    Warehouse,
    Balcony,
}

impl Amenity {
    fn from_title(title: &str) -> Option<Self> {
        if title.contains("آسانسور") {
            Some(Self::Elevator)
        } else if title.contains("پارکینگ") {
            Some(Self::Parking)
        } else if title.contains("انباری") {
            Some(Self::Warehouse)
        } else if title.contains("بالکن") {
            Some(Self::Balcony)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct Visitor {
    /// Label → raw value, in first-seen order.
    rows: Vec<(String, String)>,
    seen_labels: HashSet<String>,
    seen_attribute_keys: HashSet<String>,
    attributes: Vec<ParsedAttribute>,
    medias: Vec<ParsedMedia>,
    elevator: Option<bool>,
    parking: Option<bool>,
    warehouse: Option<bool>,
    balcony: Option<bool>,
    description: Option<String>,
    primary_description: bool,
    title: Option<String>,
    subtitle: Option<String>,
    location: Option<(GeoPoint, bool)>,
    skipped: usize,
}

impl Visitor {
    fn visit(&mut self, node: &Value, depth: usize) {
        if depth > MAX_WIDGET_DEPTH {
            warn!(depth, "Widget tree deeper than limit, not descending");
            return;
        }

        match Widget::classify(node) {
            Ok(Widget::LegendTitle(data)) => {
                set_once(&mut self.title, data.title);
                set_once(&mut self.subtitle, data.subtitle);
            }
            Ok(Widget::GroupInfo(data)) => {
                for item in data.items {
                    self.record_row(item);
                }
            }
            Ok(Widget::Unexpandable(row)) => self.record_row(row),
            Ok(Widget::Feature(item)) => self.record_feature(item),
            Ok(Widget::GroupFeature(data)) => {
                for item in data.items {
                    self.record_feature(item);
                }
            }
            Ok(Widget::Description(data)) => self.record_description(data),
            Ok(Widget::ImageCarousel(data)) => {
                for item in data.items {
                    self.record_image(item);
                }
            }
            Ok(Widget::Map(data)) => {
                if self.location.is_none() {
                    self.location = data.point().map(|(p, exact)| {
                        (
                            GeoPoint {
                                latitude: p.latitude,
                                longitude: p.longitude,
                            },
                            exact,
                        )
                    });
                }
            }
            Ok(Widget::Unknown(tag)) => {
                debug!(tag, "Ignoring unknown widget type");
            }
            Err(e) => {
                self.skipped += 1;
                debug!(error = %e, "Skipping malformed widget");
            }
        }

        for nested in widgets::modal_widgets(node) {
            self.visit(nested, depth + 1);
        }
    }

    fn record_row(&mut self, row: LabelValue) {
        let (Some(title), Some(value)) = (row.title, row.value) else {
            return;
        };
        let label = normalize_text(&title);
        if label.is_empty() || !self.seen_labels.insert(label.clone()) {
            return;
        }

        if PrimaryField::from_label(&label).is_none() {
            let number = parse_decimal(&value);
            self.push_attribute(ParsedAttribute {
                key: attribute_key(&label),
                label: title.trim().to_string(),
                kind: if number.is_some() {
                    AttributeKind::Number
                } else {
                    AttributeKind::Text
                },
                value_text: Some(value.trim().to_string()),
                value_number: number,
                value_bool: None,
            });
        }

        self.rows.push((label, value));
    }

    fn record_feature(&mut self, item: FeatureItem) {
        let Some(title) = item.title else {
            return;
        };
        let normalized = normalize_text(&title);
        let (name, available) = match normalized.strip_suffix(NEGATION) {
            Some(rest) => (rest.trim().to_string(), false),
            None => (normalized, true),
        };
        if name.is_empty() {
            return;
        }

        let Some(amenity) = Amenity::from_title(&name) else {
            self.push_attribute(ParsedAttribute {
                key: attribute_key(&name),
                label: name,
                kind: AttributeKind::Bool,
                value_text: None,
                value_number: None,
                value_bool: Some(available),
            });
            return;
        };
        let flag = match amenity {
            Amenity::Elevator => &mut self.elevator,
            Amenity::Parking => &mut self.parking,
            Amenity::Warehouse => &mut self.warehouse,
            Amenity::Balcony => &mut self.balcony,
        };
        set_once(flag, Some(available));
    }

    fn record_description(&mut self, data: DescriptionData) {
        let Some(text) = data.text.filter(|t| !t.trim().is_empty()) else {
            return;
        };
        if data.is_primary && !self.primary_description {
            self.description = Some(text);
            self.primary_description = true;
        } else if self.description.is_none() {
            self.description = Some(text);
        }
    }

    fn record_image(&mut self, item: ImageItem) {
        let Some(url) = item.image_url.filter(|u| !u.is_empty()) else {
            return;
        };
        self.medias.push(ParsedMedia {
            position: self.medias.len(),
            url,
            thumbnail_url: item.thumbnail_url,
            alt: item.alt,
        });
    }

    fn push_attribute(&mut self, attribute: ParsedAttribute) {
        if self.seen_attribute_keys.insert(attribute.key.clone()) {
            self.attributes.push(attribute);
        }
    }

    fn finish(self, post: &mut ParsedPost) {
        for (label, value) in &self.rows {
            let Some(field) = PrimaryField::from_label(label) else {
                continue;
            };
            match field {
                PrimaryField::Area => set_once(&mut post.area, parse_decimal(value)),
                PrimaryField::LandArea => set_once(&mut post.land_area, parse_decimal(value)),
                PrimaryField::BuildYear => set_once(&mut post.build_year, parse_integer(value)),
                PrimaryField::Rooms => set_once(&mut post.rooms, parse_rooms(value)),
                PrimaryField::UnitsPerFloor => {
                    set_once(&mut post.units_per_floor, parse_integer(value))
                }
                PrimaryField::Floor => {
                    let (floor, total) = parse_floor(value);
                    set_once(&mut post.floor, floor);
                    set_once(&mut post.total_floors, total);
                }
                PrimaryField::TotalPrice => {
                    set_once(&mut post.total_price, parse_amount(value));
                    if normalize_text(value).contains(NEGOTIABLE) {
                        post.price_negotiable = Some(true);
                    }
                }
                PrimaryField::PricePerMeter => {
                    set_once(&mut post.price_per_meter, parse_amount(value))
                }
                PrimaryField::Deposit => set_once(&mut post.deposit, parse_amount(value)),
                PrimaryField::MonthlyRent => {
                    set_once(&mut post.monthly_rent, parse_amount(value))
                }
            }
        }

        post.title = self.title;
        post.subtitle = self.subtitle;
        post.description = self.description;
        post.has_elevator = self.elevator;
        post.has_parking = self.parking;
        post.has_warehouse = self.warehouse;
        post.has_balcony = self.balcony;
        if let Some((point, exact)) = self.location {
            post.location = Some(point);
            post.location_is_exact = Some(exact);
        }
        post.medias = self.medias;
        post.attributes = self.attributes;
    }
}

#[derive(Debug, Default, Deserialize)]
struct Seo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Webengage {
    #[serde(default)]
    cat_1: Option<String>,
    #[serde(default)]
    cat_2: Option<String>,
    #[serde(default)]
    cat_3: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    district: Option<String>,
    #[serde(default)]
    business_type: Option<String>,
}

/// Parses one detail payload.
pub fn parse_post(payload: &Value) -> Result<ParsedPost, ParseError> {
    let sections = payload
        .get("sections")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::Malformed("payload has no sections array".into()))?;

    let mut visitor = Visitor::default();
    for section in sections {
        let Some(widgets) = section.get("widgets").and_then(Value::as_array) else {
            continue;
        };
        for node in widgets {
            visitor.visit(node, 0);
        }
    }
    if visitor.skipped > 0 {
        debug!(skipped = visitor.skipped, "Malformed widgets skipped");
    }

    let mut post = ParsedPost::default();
    visitor.finish(&mut post);

    let seo: Seo = optional_block(payload, "seo")?;
    let analytics: Webengage = optional_block(payload, "webengage")?;

    post.seo_title = non_empty(seo.title);
    post.seo_description = non_empty(seo.description);
    post.web_url = payload
        .pointer("/share/web_url")
        .and_then(Value::as_str)
        .map(str::to_string);
    post.cat1 = non_empty(analytics.cat_1);
    post.cat2 = non_empty(analytics.cat_2);
    post.cat3 = non_empty(analytics.cat_3);
    post.city_slug = non_empty(analytics.city);
    post.district_slug = non_empty(analytics.district);
    post.business_type = non_empty(analytics.business_type);

    post.published_ago_ms = post
        .subtitle
        .as_deref()
        .and_then(relative_time::parse_relative_age)
        .map(|d| d.num_milliseconds());
    if post.published_ago_ms.is_some() {
        post.published_relative = post.subtitle.clone();
    }
    post.jalali_date = [&post.seo_title, &post.seo_description, &post.title]
        .into_iter()
        .flatten()
        .find_map(|text| jalali::find_trailing_date(text));

    Ok(post)
}

/// When the ad was published. `anchor` is the instant the payload was served;
/// an anchor/relative-duration pair always wins over the Jalali date.
pub fn derive_published_at(
    post: &ParsedPost,
    anchor: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    if let (Some(anchor), Some(ago)) = (anchor, post.published_ago_ms) {
        return Some(anchor - Duration::milliseconds(ago));
    }
    post.jalali_date
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn optional_block<T>(payload: &Value, key: &str) -> Result<T, ParseError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    match payload.get(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(block) => T::deserialize(block)
            .map_err(|e| ParseError::Malformed(format!("invalid {key} block: {e}"))),
    }
}

fn set_once<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn attribute_key(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join("_")
}

fn parse_rooms(value: &str) -> Option<i64> {
    if normalize_text(value).contains("بدون") {
        return Some(0);
    }
    parse_integer(value).or_else(|| locale::parse_number_words(value))
}

/// `۳ از ۵` → (3, 5); `همکف` is the ground floor and `زیرهمکف` the one below.
fn parse_floor(value: &str) -> (Option<i64>, Option<i64>) {
    let text = normalize_text(value);
    let numbers: Vec<i64> = numeric_tokens(&text)
        .into_iter()
        .filter_map(|d| i64::try_from(d.trunc()).ok())
        .collect();

    let (head, tail) = match text.split_once(" از ") {
        Some((head, tail)) => (head, Some(tail)),
        None => (text.as_str(), None),
    };

    let floor = if head.contains("زیرهمکف") || head.contains("زیر همکف") {
        Some(-1)
    } else if head.contains("همکف") {
        Some(0)
    } else {
        numbers.first().copied()
    };
    let total = tail.and_then(parse_integer);

    (floor, total)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn widget(tag: &str, data: Value) -> Value {
        json!({"widget_type": tag, "data": data})
    }

    fn payload(widgets: Vec<Value>) -> Value {
        json!({"sections": [{"section_name": "LIST_DATA", "widgets": widgets}]})
    }

    #[test]
    fn group_rows_fill_primary_fields() {
        let post = parse_post(&payload(vec![
            widget(
                "GROUP_INFO_ROW",
                json!({"items": [
                    {"title": "متراژ", "value": "۱۲۰"},
                    {"title": "ساخت", "value": "۱۳۹۸"},
                    {"title": "اتاق", "value": "۲"}
                ]}),
            ),
            widget(
                "UNEXPANDABLE_ROW",
                json!({"title": "قیمت کل", "value": "۴٬۵۰۰٬۰۰۰٬۰۰۰ تومان"}),
            ),
            widget("UNEXPANDABLE_ROW", json!({"title": "طبقه", "value": "۳ از ۵"})),
        ]))
        .unwrap();

        assert_eq!(post.area, Some(Decimal::from(120)));
        assert_eq!(post.build_year, Some(1398));
        assert_eq!(post.rooms, Some(2));
        assert_eq!(post.total_price, Some(Decimal::from(4_500_000_000i64)));
        assert_eq!(post.floor, Some(3));
        assert_eq!(post.total_floors, Some(5));
        assert!(post.attributes.is_empty());
    }

    #[test]
    fn first_label_occurrence_wins() {
        let post = parse_post(&payload(vec![
            widget("UNEXPANDABLE_ROW", json!({"title": "متراژ", "value": "۸۰"})),
            widget("UNEXPANDABLE_ROW", json!({"title": "متراژ", "value": "۹۰"})),
            widget("UNEXPANDABLE_ROW", json!({"title": "جهت ساختمان", "value": "شمالی"})),
            widget("UNEXPANDABLE_ROW", json!({"title": "جهت ساختمان", "value": "جنوبی"})),
        ]))
        .unwrap();

        assert_eq!(post.area, Some(Decimal::from(80)));
        assert_eq!(post.attributes.len(), 1);
        assert_eq!(post.attributes[0].value_text.as_deref(), Some("شمالی"));
        assert_eq!(post.attributes[0].kind, AttributeKind::Text);
    }

    #[test]
    fn secondary_rows_become_numeric_attributes() {
        let post = parse_post(&payload(vec![widget(
            "UNEXPANDABLE_ROW",
            json!({"title": "تعداد سرویس بهداشتی", "value": "۲ عدد"}),
        )]))
        .unwrap();

        let attribute = &post.attributes[0];
        assert_eq!(attribute.key, "تعداد_سرویس_بهداشتی");
        assert_eq!(attribute.kind, AttributeKind::Number);
        assert_eq!(attribute.value_number, Some(Decimal::from(2)));
    }

    #[test]
    fn features_set_flags_and_negation() {
        let post = parse_post(&payload(vec![widget(
            "GROUP_FEATURE_ROW",
            json!({"items": [
                {"title": "آسانسور"},
                {"title": "پارکینگ ندارد"},
                {"title": "انباری"},
                {"title": "کمد دیواری"}
            ]}),
        )]))
        .unwrap();

        assert_eq!(post.has_elevator, Some(true));
        assert_eq!(post.has_parking, Some(false));
        assert_eq!(post.has_warehouse, Some(true));
        assert_eq!(post.has_balcony, None);
        assert_eq!(post.attributes.len(), 1);
        assert_eq!(post.attributes[0].kind, AttributeKind::Bool);
        assert_eq!(post.attributes[0].value_bool, Some(true));
    }

    #[test]
    fn primary_description_wins() {
        let post = parse_post(&payload(vec![
            widget("DESCRIPTION_ROW", json!({"text": "توضیح فرعی", "is_primary": false})),
            widget("DESCRIPTION_ROW", json!({"text": "توضیح اصلی", "is_primary": true})),
            widget("DESCRIPTION_ROW", json!({"text": "توضیح دوم", "is_primary": true})),
        ]))
        .unwrap();

        assert_eq!(post.description.as_deref(), Some("توضیح اصلی"));
    }

    #[test]
    fn non_primary_description_ignored_once_set() {
        let post = parse_post(&payload(vec![
            widget("DESCRIPTION_ROW", json!({"text": "اول", "is_primary": false})),
            widget("DESCRIPTION_ROW", json!({"text": "دوم", "is_primary": false})),
        ]))
        .unwrap();

        assert_eq!(post.description.as_deref(), Some("اول"));
    }

    #[test]
    fn carousel_positions_follow_insertion_order() {
        let post = parse_post(&payload(vec![
            widget(
                "IMAGE_CAROUSEL_ROW",
                json!({"items": [
                    {"image_url": "https://img/1.jpg", "thumbnail_url": "https://img/1t.jpg", "alt": "نما"},
                    {"image_url": "https://img/2.jpg"}
                ]}),
            ),
            widget("IMAGE_CAROUSEL_ROW", json!({"items": [{"image_url": "https://img/3.jpg"}]})),
        ]))
        .unwrap();

        let positions: Vec<_> = post.medias.iter().map(|m| (m.position, m.url.as_str())).collect();
        assert_eq!(
            positions,
            vec![(0, "https://img/1.jpg"), (1, "https://img/2.jpg"), (2, "https://img/3.jpg")]
        );
        assert_eq!(post.medias[0].alt.as_deref(), Some("نما"));
    }

    #[test]
    fn map_falls_back_to_approximate() {
        let post = parse_post(&payload(vec![widget(
            "MAP_ROW",
            json!({"location": {"approximate_data": {"point": {"latitude": 35.75, "longitude": 51.41}}}}),
        )]))
        .unwrap();

        assert_eq!(
            post.location,
            Some(GeoPoint {
                latitude: 35.75,
                longitude: 51.41
            })
        );
        assert_eq!(post.location_is_exact, Some(false));
    }

    #[test]
    fn modal_pages_are_reentered() {
        let post = parse_post(&payload(vec![widget(
            "UNEXPANDABLE_ROW",
            json!({
                "title": "ویژگی‌ها و امکانات",
                "value": "نمایش همه",
                "action": {"payload": {"modal_page": {"widget_list": [
                    {"widget_type": "FEATURE_ROW", "data": {"title": "بالکن"}},
                    {"widget_type": "UNEXPANDABLE_ROW", "data": {"title": "متراژ زمین", "value": "۲۰۰"}}
                ]}}}
            }),
        )]))
        .unwrap();

        assert_eq!(post.has_balcony, Some(true));
        assert_eq!(post.land_area, Some(Decimal::from(200)));
    }

    #[test]
    fn recursion_is_bounded() {
        let mut node = widget("FEATURE_ROW", json!({"title": "آسانسور"}));
        for _ in 0..(MAX_WIDGET_DEPTH + 4) {
            node = widget(
                "UNEXPANDABLE_ROW",
                json!({"action": {"payload": {"modal_page": {"widget_list": [node]}}}}),
            );
        }
        let post = parse_post(&payload(vec![node])).unwrap();
        assert_eq!(post.has_elevator, None);
    }

    #[test]
    fn unknown_and_malformed_widgets_are_skipped() {
        let post = parse_post(&payload(vec![
            widget("SCORE_ROW", json!({"score": 4})),
            widget("IMAGE_CAROUSEL_ROW", json!({"items": "broken"})),
            widget("UNEXPANDABLE_ROW", json!({"title": "متراژ", "value": "۶۵"})),
        ]))
        .unwrap();

        assert_eq!(post.area, Some(Decimal::from(65)));
        assert!(post.medias.is_empty());
    }

    #[test]
    fn absent_data_stays_none() {
        let post = parse_post(&payload(vec![])).unwrap();
        assert_eq!(post, ParsedPost::default());
    }

    #[test]
    fn missing_sections_is_malformed() {
        let err = parse_post(&json!({"seo": {}})).unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn rent_and_negotiable_prices() {
        let post = parse_post(&payload(vec![
            widget("UNEXPANDABLE_ROW", json!({"title": "ودیعه", "value": "۲۰۰ میلیون تومان"})),
            widget("UNEXPANDABLE_ROW", json!({"title": "اجارهٔ ماهانه", "value": "۸٬۰۰۰٬۰۰۰ تومان"})),
            widget("UNEXPANDABLE_ROW", json!({"title": "قیمت کل", "value": "توافقی"})),
        ]))
        .unwrap();

        assert_eq!(post.deposit, Some(Decimal::from(200_000_000)));
        assert_eq!(post.monthly_rent, Some(Decimal::from(8_000_000)));
        assert_eq!(post.total_price, None);
        assert_eq!(post.price_negotiable, Some(true));
    }

    #[test]
    fn floor_variants() {
        assert_eq!(parse_floor("همکف از ۴"), (Some(0), Some(4)));
        assert_eq!(parse_floor("زیرهمکف"), (Some(-1), None));
        assert_eq!(parse_floor("۷"), (Some(7), None));
        assert_eq!(parse_rooms("بدون اتاق"), Some(0));
    }

    #[test]
    fn metadata_blocks() {
        let mut value = payload(vec![widget(
            "LEGEND_TITLE_ROW",
            json!({"title": "آپارتمان ۸۵ متری", "subtitle": "۲ روز پیش در تهران، ونک"}),
        )]);
        value["seo"] = json!({"title": "آپارتمان ۸۵ متری - ۱۶ فروردین ۱۴۰۳", "description": ""});
        value["webengage"] = json!({"cat_1": "real-estate", "cat_2": "buy-residential", "cat_3": "buy-apartment", "city": "tehran", "district": "vanak"});
        value["share"] = json!({"web_url": "https://divar.ir/v/abc"});

        let post = parse_post(&value).unwrap();
        assert_eq!(post.cat3.as_deref(), Some("buy-apartment"));
        assert_eq!(post.district_slug.as_deref(), Some("vanak"));
        assert_eq!(post.seo_description, None);
        assert_eq!(post.web_url.as_deref(), Some("https://divar.ir/v/abc"));
        assert_eq!(post.published_ago_ms, Some(2 * 86_400_000));
        assert_eq!(post.jalali_date, NaiveDate::from_ymd_opt(2024, 4, 4));
        assert_eq!(post.published_relative.as_deref(), Some("۲ روز پیش در تهران، ونک"));
        assert_eq!(post.area, None, "title text is not a data row");
    }

    #[test]
    fn published_at_three_hours_before_anchor() {
        let value = payload(vec![widget(
            "LEGEND_TITLE_ROW",
            json!({"title": "آپارتمان", "subtitle": "۳ ساعت پیش در تهران"}),
        )]);
        let post = parse_post(&value).unwrap();
        let base = Utc.with_ymd_and_hms(2024, 4, 4, 12, 0, 0).unwrap();

        assert_eq!(
            derive_published_at(&post, Some(base)),
            Some(Utc.with_ymd_and_hms(2024, 4, 4, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn relative_duration_preferred_over_jalali_date() {
        let post = ParsedPost {
            published_ago_ms: Some(3 * 86_400_000),
            jalali_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };
        let base = Utc.with_ymd_and_hms(2024, 4, 4, 12, 0, 0).unwrap();

        assert_eq!(
            derive_published_at(&post, Some(base)),
            Some(Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(
            derive_published_at(&post, None),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(derive_published_at(&ParsedPost::default(), Some(base)), None);
    }
}
