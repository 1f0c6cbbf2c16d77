use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    #[default]
    Info,
    Low,
    Medium,
    High,
}

impl AlertLevel {
    /// 大小写不敏感；推送端历史上用过 warning / critical 等写法，未知级别按 info 处理。
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" => Self::Low,
            "medium" | "warning" | "warn" | "major" => Self::Medium,
            "high" | "critical" | "urgent" => Self::High,
            _ => Self::Info,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// info 级别不计入未读数。
    pub fn counts_as_unread(self) -> bool {
        self != Self::Info
    }
}

impl<'de> Deserialize<'de> for AlertLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::parse).unwrap_or_default())
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertRecord {
    pub id: String,
    #[serde(default)]
    pub level: AlertLevel,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub area: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub time: String,
    #[serde(default)]
    pub read: bool,
}

impl AlertRecord {
    pub fn is_unread(&self) -> bool {
        !self.read && self.level.counts_as_unread()
    }

    /// 字段级合并：补丁中出现的字段覆盖，未出现的保持原值。
    pub fn apply_patch(&mut self, patch: &AlertPatch) {
        if let Some(level) = patch.level {
            self.level = level;
        }
        if let Some(title) = patch.title.as_ref() {
            self.title = title.clone();
        }
        if let Some(area) = patch.area.as_ref() {
            self.area = area.clone();
        }
        if let Some(time) = patch.time.as_ref() {
            self.time = time.clone();
        }
        if let Some(read) = patch.read {
            self.read = read;
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<AlertLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_string_or_number"
    )]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
}

impl AlertPatch {
    pub fn is_empty(&self) -> bool {
        self.level.is_none()
            && self.title.is_none()
            && self.area.is_none()
            && self.time.is_none()
            && self.read.is_none()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertUpdatePayload {
    pub id: String,
    #[serde(flatten)]
    pub patch: AlertPatch,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertClearPayload {
    pub id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AlertHistoryPayload {
    #[serde(default)]
    pub items: Vec<AlertRecord>,
}

/// 四个顶层看板视图，各自拥有独立的数据槽。
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewKey {
    #[default]
    #[serde(rename = "p1")]
    NetworkOverview,
    #[serde(rename = "p2")]
    CapacityPlanning,
    #[serde(rename = "p3")]
    ServiceQuality,
    #[serde(rename = "p4")]
    RegionMap,
}

impl ViewKey {
    pub const ALL: [ViewKey; 4] = [
        ViewKey::NetworkOverview,
        ViewKey::CapacityPlanning,
        ViewKey::ServiceQuality,
        ViewKey::RegionMap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkOverview => "p1",
            Self::CapacityPlanning => "p2",
            Self::ServiceQuality => "p3",
            Self::RegionMap => "p4",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == raw.trim())
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::NetworkOverview => "网络总览",
            Self::CapacityPlanning => "容量规划",
            Self::ServiceQuality => "业务质量",
            Self::RegionMap => "区域态势",
        }
    }

    /// 每个视图固定发起的并行子请求，名称同时作为合并结果的字段名。
    pub fn sections(self) -> &'static [&'static str] {
        match self {
            Self::NetworkOverview => &["summary", "traffic_trend", "top_cells", "alarm_distribution"],
            Self::CapacityPlanning => &["capacity_summary", "utilization_trend", "hotspots"],
            Self::ServiceQuality => &["kqi_summary", "kqi_trend", "degraded_services"],
            Self::RegionMap => &["regions", "links", "incidents"],
        }
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_string_or_number(deserializer)?.unwrap_or_default())
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number for time, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn level_parsing_is_lenient() {
        assert_eq!(AlertLevel::parse("HIGH"), AlertLevel::High);
        assert_eq!(AlertLevel::parse("critical"), AlertLevel::High);
        assert_eq!(AlertLevel::parse("warning"), AlertLevel::Medium);
        assert_eq!(AlertLevel::parse("whatever"), AlertLevel::Info);
    }

    #[test]
    fn null_level_falls_back_to_info() {
        let record: AlertRecord =
            serde_json::from_value(json!({"id": "a-7", "level": null, "title": "抖动"})).unwrap();
        assert_eq!(record.level, AlertLevel::Info);
        assert!(!record.is_unread());

        let patch: AlertPatch = serde_json::from_value(json!({"level": null})).unwrap();
        assert!(patch.level.is_none());
    }

    #[test]
    fn record_accepts_numeric_time_and_defaults() {
        let record: AlertRecord = serde_json::from_value(json!({
            "id": "a-1",
            "level": "Medium",
            "title": "小区拥塞",
            "area": "浦东",
            "time": 1700000000000i64
        }))
        .unwrap();
        assert_eq!(record.time, "1700000000000");
        assert_eq!(record.level, AlertLevel::Medium);
        assert!(!record.read);
        assert!(record.is_unread());
    }

    #[test]
    fn update_payload_flattens_patch() {
        let payload: AlertUpdatePayload =
            serde_json::from_value(json!({"id": "a-1", "title": "已缓解", "read": true})).unwrap();
        assert_eq!(payload.id, "a-1");
        assert_eq!(payload.patch.title.as_deref(), Some("已缓解"));
        assert_eq!(payload.patch.read, Some(true));
        assert!(payload.patch.level.is_none());
        assert!(payload.patch.time.is_none());
    }

    #[test]
    fn view_keys_round_trip_through_wire_names() {
        for key in ViewKey::ALL {
            assert_eq!(ViewKey::parse(key.as_str()), Some(key));
            let encoded = serde_json::to_value(key).unwrap();
            assert_eq!(encoded, json!(key.as_str()));
            assert!((3..=4).contains(&key.sections().len()));
        }
        assert_eq!(ViewKey::parse("p9"), None);
    }
}
