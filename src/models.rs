//! Data models for the chart reader.
//!
//! This module contains the typed chart input (birth information and the
//! twelve palaces) and the report structures produced by the analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Gender of the chart subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Gender {
    Male,
    /// Anything that is not explicitly "male" reads as female.
    #[default]
    Female,
}

impl From<String> for Gender {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "male" | "男" => Gender::Male,
            _ => Gender::Female,
        }
    }
}

impl From<Gender> for String {
    fn from(g: Gender) -> Self {
        match g {
            Gender::Male => "male".to_string(),
            Gender::Female => "female".to_string(),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "Male"),
            Gender::Female => write!(f, "Female"),
        }
    }
}

/// Birth information of the chart subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BirthInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default, deserialize_with = "string_or_number")]
    pub birth_year: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub birth_month: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub birth_day: String,
    /// Two-hour birth slot (时辰).
    #[serde(default, deserialize_with = "string_or_number")]
    pub birth_shichen: String,
}

impl BirthInfo {
    /// Render the chart-level context block shared by every palace prompt.
    pub fn context(&self) -> String {
        let name = self
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Unknown");

        format!(
            "User: {}\nGender: {}\nBirth: {}-{}-{}\nBirth Time: {}",
            name,
            self.gender,
            self.birth_year,
            self.birth_month,
            self.birth_day,
            self.birth_shichen
        )
    }
}

/// Birth form fields arrive either as strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// A star placed in a palace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Star {
    #[serde(default)]
    pub name: String,
    /// Brightness (庙旺利陷); absent brightness renders as `-`.
    #[serde(default)]
    pub brightness: Option<String>,
    /// Birth-year transformation tag (禄权科忌), if any.
    #[serde(default)]
    pub mutagen: Option<String>,
}

impl Star {
    /// Brightness text, falling back to the `-` placeholder.
    pub fn brightness_label(&self) -> &str {
        self.brightness.as_deref().unwrap_or("-")
    }

    /// Transformation tag, treating an empty tag as none.
    pub fn mutagen_label(&self) -> Option<&str> {
        self.mutagen.as_deref().filter(|m| !m.is_empty())
    }
}

/// Ten-year period covered by a palace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decadal {
    #[serde(default)]
    pub range: Vec<i64>,
}

/// One of the twelve palaces of a chart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Palace {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub major_stars: Vec<Star>,
    #[serde(default)]
    pub minor_stars: Vec<Star>,
    #[serde(default)]
    pub adjective_stars: Vec<Star>,
    #[serde(default)]
    pub decadal: Option<Decadal>,
    /// Palace stem (宫干), a single heavenly-stem character.
    #[serde(default)]
    pub heavenly_stem: String,
}

impl Palace {
    /// Name used in prompts and reports; unnamed palaces fall back to their index.
    pub fn display_name(&self, index: usize) -> String {
        if self.name.is_empty() {
            format!("Palace {}", index)
        } else {
            self.name.clone()
        }
    }

    /// Decade range as `start-end`, or `N/A` when fewer than two bounds exist.
    pub fn decadal_range(&self) -> String {
        match self.decadal.as_ref().map(|d| d.range.as_slice()) {
            Some([start, end, ..]) => format!("{}-{}", start, end),
            _ => "N/A".to_string(),
        }
    }
}

/// The astrolabe produced by the charting library.
///
/// Only the palaces are typed; everything else is carried through untouched
/// so the overview prompt can include it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Astrolabe {
    #[serde(default)]
    pub palaces: Vec<Palace>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A complete chart submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    #[serde(default)]
    pub birth_info: BirthInfo,
    #[serde(default)]
    pub astrolabe: Astrolabe,
}

impl Chart {
    /// The ordered palace ring.
    pub fn palaces(&self) -> &[Palace] {
        &self.astrolabe.palaces
    }
}

/// Analysis of a single palace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PalaceReport {
    /// Palace name.
    pub name: String,
    /// Position of the palace in the chart (0-11).
    pub index: usize,
    /// Analysis text, or a diagnostic line when the LLM call failed.
    pub analysis: String,
    /// Failure detail if the LLM call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PalaceReport {
    /// Creates a successful report.
    pub fn new(name: String, index: usize, analysis: String) -> Self {
        Self {
            name,
            index,
            analysis,
            error: None,
        }
    }

    /// Creates a report carrying the diagnostic text for a failed LLM call.
    pub fn failed(name: String, index: usize, error: String) -> Self {
        Self {
            analysis: format!("Unable to generate analysis for {}: {}", name, error),
            name,
            index,
            error: Some(error),
        }
    }

    /// Whether the LLM call for this palace succeeded.
    pub fn is_successful(&self) -> bool {
        self.error.is_none()
    }
}

/// Metadata about the analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Name of the chart subject.
    pub subject: String,
    /// Date and time of the analysis.
    pub analysis_date: DateTime<Utc>,
    /// Name of the LLM model used.
    pub model_used: String,
    /// Number of palaces analysed.
    pub palaces_analyzed: usize,
    /// Number of palaces whose LLM call failed.
    pub palaces_failed: usize,
    /// Duration of the analysis in seconds.
    pub duration_seconds: f64,
}

/// The complete chart reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub metadata: ReportMetadata,
    /// Whole-chart overview, when run in overview mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    /// Per-palace analyses in chart order.
    pub palaces: Vec<PalaceReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHART_JSON: &str = r#"{
        "birthInfo": {
            "name": "张三",
            "gender": "male",
            "birthYear": 1990,
            "birthMonth": "5",
            "birthDay": 12,
            "birthShichen": "子时"
        },
        "astrolabe": {
            "fiveElementsClass": "水二局",
            "palaces": [
                {
                    "name": "命宫",
                    "heavenlyStem": "甲",
                    "majorStars": [{"name": "紫微", "brightness": "庙", "mutagen": "科"}],
                    "minorStars": [{"name": "文昌", "brightness": "旺"}],
                    "adjectiveStars": [{"name": "天刑"}],
                    "decadal": {"range": [2, 11]}
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_chart() {
        let chart: Chart = serde_json::from_str(CHART_JSON).unwrap();
        assert_eq!(chart.birth_info.gender, Gender::Male);
        assert_eq!(chart.birth_info.birth_year, "1990");
        assert_eq!(chart.palaces().len(), 1);

        let palace = &chart.palaces()[0];
        assert_eq!(palace.heavenly_stem, "甲");
        assert_eq!(palace.major_stars[0].mutagen_label(), Some("科"));
        assert_eq!(palace.minor_stars[0].mutagen_label(), None);
        assert_eq!(palace.adjective_stars[0].brightness_label(), "-");
        assert_eq!(palace.decadal_range(), "2-11");
        assert!(chart.astrolabe.extra.contains_key("fiveElementsClass"));
    }

    #[test]
    fn test_birth_context() {
        let chart: Chart = serde_json::from_str(CHART_JSON).unwrap();
        assert_eq!(
            chart.birth_info.context(),
            "User: 张三\nGender: Male\nBirth: 1990-5-12\nBirth Time: 子时"
        );

        let anonymous = BirthInfo {
            gender: Gender::from("unknown".to_string()),
            ..BirthInfo::default()
        };
        assert!(anonymous.context().starts_with("User: Unknown\nGender: Female"));
    }

    #[test]
    fn test_palace_fallbacks() {
        let palace = Palace::default();
        assert_eq!(palace.display_name(7), "Palace 7");
        assert_eq!(palace.decadal_range(), "N/A");

        let half_range = Palace {
            decadal: Some(Decadal { range: vec![12] }),
            ..Palace::default()
        };
        assert_eq!(half_range.decadal_range(), "N/A");
    }

    #[test]
    fn test_failed_report_embeds_name() {
        let report = PalaceReport::failed("财帛宫".to_string(), 4, "timed out".to_string());
        assert!(!report.is_successful());
        assert_eq!(
            report.analysis,
            "Unable to generate analysis for 财帛宫: timed out"
        );
    }
}
