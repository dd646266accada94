//! Chart rules: palace relationships and star formatting.
//!
//! This module computes the Three Parties and Four Areas (三方四正) of a
//! palace, renders star lists for prompts, and exposes the palace-stem
//! transformation table.

pub mod mutagen;

pub use mutagen::mutagen_flow;

use crate::models::Palace;
use thiserror::Error;

/// Placeholder for an empty star group.
pub const NONE_LABEL: &str = "None";

const STAR_SEPARATOR: &str = "、";

/// Errors raised for invalid rule inputs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RulesError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// The four palaces that frame a palace's reading.
#[derive(Debug, Clone, Copy)]
pub struct RelationSet<'a> {
    /// 本宫
    pub core: (usize, &'a Palace),
    /// 对宫, six positions away.
    pub opposite: (usize, &'a Palace),
    /// 三方, four positions away.
    pub triad1: (usize, &'a Palace),
    /// 三方, eight positions away.
    pub triad2: (usize, &'a Palace),
}

/// Compute the Three Parties and Four Areas for the palace at `index`.
///
/// Offsets are taken modulo the ring length, so any ring size works; charts
/// always carry twelve palaces.
pub fn relations_for(index: usize, palaces: &[Palace]) -> Result<RelationSet<'_>, RulesError> {
    let count = palaces.len();
    if count == 0 {
        return Err(RulesError::InvalidArgument(
            "palace ring is empty".to_string(),
        ));
    }
    if index >= count {
        return Err(RulesError::InvalidArgument(format!(
            "palace index {} out of range for {} palaces",
            index, count
        )));
    }

    let at = |offset: usize| {
        let i = (index + offset) % count;
        (i, &palaces[i])
    };

    Ok(RelationSet {
        core: at(0),
        opposite: at(6),
        triad1: at(4),
        triad2: at(8),
    })
}

/// Rendered star groups of a palace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarSummary {
    pub major: String,
    pub minor: String,
    pub adjective: String,
}

/// Format a palace's star groups for display, preserving input order.
///
/// Major stars render as `name(brightness,mutagen)` or `name(brightness)`,
/// minor stars as `name(brightness)`, adjective stars by name only.
pub fn format_stars(palace: &Palace) -> StarSummary {
    let major = palace
        .major_stars
        .iter()
        .map(|s| match s.mutagen_label() {
            Some(m) => format!("{}({},{})", s.name, s.brightness_label(), m),
            None => format!("{}({})", s.name, s.brightness_label()),
        })
        .collect::<Vec<_>>()
        .join(STAR_SEPARATOR);

    let minor = palace
        .minor_stars
        .iter()
        .map(|s| format!("{}({})", s.name, s.brightness_label()))
        .collect::<Vec<_>>()
        .join(STAR_SEPARATOR);

    let adjective = palace
        .adjective_stars
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(STAR_SEPARATOR);

    StarSummary {
        major: or_none(major),
        minor: or_none(minor),
        adjective: or_none(adjective),
    }
}

fn or_none(s: String) -> String {
    if s.is_empty() {
        NONE_LABEL.to_string()
    } else {
        s
    }
}

/// Major stars as `name(brightness)`, without transformation tags.
fn major_brief(palace: &Palace) -> String {
    if palace.major_stars.is_empty() {
        return "No Major Stars".to_string();
    }
    palace
        .major_stars
        .iter()
        .map(|s| format!("{}({})", s.name, s.brightness_label()))
        .collect::<Vec<_>>()
        .join(STAR_SEPARATOR)
}

/// Render the relation set as the Three Parties block of a prompt.
pub fn format_three_parties(relations: &RelationSet<'_>) -> String {
    let line = |label: &str, (index, palace): (usize, &Palace)| {
        format!(
            "- {} - {}): {}",
            label,
            palace.display_name(index),
            major_brief(palace)
        )
    };

    [
        "Three Parties and Four Areas (三方四正):".to_string(),
        line("Core (本宫", relations.core),
        line("Opposite (对宫", relations.opposite),
        line("Triad 1 (三方", relations.triad1),
        line("Triad 2 (三方", relations.triad2),
    ]
    .join("\n")
}

/// Render the palace stem and its transformation flow.
///
/// Empty when the palace carries no stem.
pub fn format_mutagen_info(palace: &Palace) -> String {
    let stem = palace.heavenly_stem.trim();
    if stem.is_empty() {
        return String::new();
    }

    format!(
        "Palace Stem (宫干): {}\nMutagen Flow (四化): {}\nInstruction: Analyze if these transforming stars appear in the Three Parties.",
        stem,
        mutagen_flow(stem)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Star;

    fn star(name: &str, brightness: Option<&str>, mutagen: Option<&str>) -> Star {
        Star {
            name: name.to_string(),
            brightness: brightness.map(String::from),
            mutagen: mutagen.map(String::from),
        }
    }

    fn ring(n: usize) -> Vec<Palace> {
        (0..n)
            .map(|i| Palace {
                name: format!("P{}", i),
                ..Palace::default()
            })
            .collect()
    }

    #[test]
    fn test_relations_for_twelve() {
        let palaces = ring(12);
        for i in 0..12 {
            let rel = relations_for(i, &palaces).unwrap();
            assert_eq!(rel.core.0, i);
            assert_eq!(rel.opposite.0, (i + 6) % 12);
            assert_eq!(rel.triad1.0, (i + 4) % 12);
            assert_eq!(rel.triad2.0, (i + 8) % 12);
            assert_eq!(rel.opposite.1.name, format!("P{}", (i + 6) % 12));

            let mut all = vec![rel.core.0, rel.opposite.0, rel.triad1.0, rel.triad2.0];
            all.sort();
            all.dedup();
            assert_eq!(all.len(), 4, "relations of {} must be distinct", i);
        }
    }

    #[test]
    fn test_relations_wrap_for_other_ring_sizes() {
        let palaces = ring(5);
        let rel = relations_for(3, &palaces).unwrap();
        assert_eq!(rel.opposite.0, 4);
        assert_eq!(rel.triad1.0, 2);
        assert_eq!(rel.triad2.0, 1);
    }

    #[test]
    fn test_relations_invalid_input() {
        assert!(matches!(
            relations_for(0, &[]),
            Err(RulesError::InvalidArgument(_))
        ));
        assert!(matches!(
            relations_for(12, &ring(12)),
            Err(RulesError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_format_stars() {
        let palace = Palace {
            major_stars: vec![
                star("紫微", Some("庙"), Some("科")),
                star("天府", Some("旺"), None),
            ],
            minor_stars: vec![star("文昌", None, None)],
            adjective_stars: vec![star("天刑", None, None), star("红鸾", None, None)],
            ..Palace::default()
        };

        let summary = format_stars(&palace);
        assert_eq!(summary.major, "紫微(庙,科)、天府(旺)");
        assert_eq!(summary.minor, "文昌(-)");
        assert_eq!(summary.adjective, "天刑、红鸾");
    }

    #[test]
    fn test_format_stars_empty_groups() {
        let summary = format_stars(&Palace::default());
        assert_eq!(summary.major, NONE_LABEL);
        assert_eq!(summary.minor, NONE_LABEL);
        assert_eq!(summary.adjective, NONE_LABEL);
    }

    #[test]
    fn test_format_three_parties() {
        let mut palaces = ring(12);
        palaces[0].major_stars = vec![star("紫微", Some("庙"), Some("科"))];
        let rel = relations_for(0, &palaces).unwrap();

        let block = format_three_parties(&rel);
        assert!(block.starts_with("Three Parties and Four Areas (三方四正):"));
        assert!(block.contains("- Core (本宫 - P0): 紫微(庙)"));
        assert!(block.contains("- Opposite (对宫 - P6): No Major Stars"));
        assert!(block.contains("- Triad 1 (三方 - P4)"));
        assert!(block.contains("- Triad 2 (三方 - P8)"));
    }

    #[test]
    fn test_format_mutagen_info() {
        let palace = Palace {
            heavenly_stem: "甲".to_string(),
            ..Palace::default()
        };
        let info = format_mutagen_info(&palace);
        assert!(info.contains("Palace Stem (宫干): 甲"));
        assert!(info.contains("廉贞->禄, 破军->权, 武曲->科, 太阳->忌"));

        assert_eq!(format_mutagen_info(&Palace::default()), "");

        let odd = Palace {
            heavenly_stem: "?".to_string(),
            ..Palace::default()
        };
        assert!(format_mutagen_info(&odd).contains(mutagen::UNKNOWN_STEM));
    }
}
