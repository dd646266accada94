//! Palace-stem transformations (宫干四化).
//!
//! Each of the ten heavenly stems turns four specific stars into
//! 禄, 权, 科 and 忌, in that order.

use std::fmt;

/// Text rendered in place of the flow for a stem outside the table.
pub const UNKNOWN_STEM: &str = "Unknown Stem";

/// The four transformation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutagen {
    /// 化禄
    Lu,
    /// 化权
    Quan,
    /// 化科
    Ke,
    /// 化忌
    Ji,
}

impl Mutagen {
    /// The single-character label used in charts and prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Mutagen::Lu => "禄",
            Mutagen::Quan => "权",
            Mutagen::Ke => "科",
            Mutagen::Ji => "忌",
        }
    }
}

impl fmt::Display for Mutagen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A star and the transformation a stem applies to it.
pub type Transformation = (&'static str, Mutagen);

use Mutagen::{Ji, Ke, Lu, Quan};

static MUTAGEN_TABLE: [(char, [Transformation; 4]); 10] = [
    ('甲', [("廉贞", Lu), ("破军", Quan), ("武曲", Ke), ("太阳", Ji)]),
    ('乙', [("天机", Lu), ("天梁", Quan), ("紫微", Ke), ("太阴", Ji)]),
    ('丙', [("天同", Lu), ("天机", Quan), ("文昌", Ke), ("廉贞", Ji)]),
    ('丁', [("太阴", Lu), ("天同", Quan), ("天机", Ke), ("巨门", Ji)]),
    ('戊', [("贪狼", Lu), ("太阴", Quan), ("右弼", Ke), ("天机", Ji)]),
    ('己', [("武曲", Lu), ("贪狼", Quan), ("天梁", Ke), ("文曲", Ji)]),
    ('庚', [("太阳", Lu), ("武曲", Quan), ("太阴", Ke), ("天同", Ji)]),
    ('辛', [("巨门", Lu), ("太阳", Quan), ("文曲", Ke), ("文昌", Ji)]),
    ('壬', [("天梁", Lu), ("紫微", Quan), ("左辅", Ke), ("武曲", Ji)]),
    ('癸', [("破军", Lu), ("巨门", Quan), ("太阴", Ke), ("贪狼", Ji)]),
];

/// Look up the transformations for a stem.
///
/// The stem must be exactly one recognised character; anything else yields
/// an empty slice so an odd palace never blocks the rest of the chart.
pub fn transformations_for(stem: &str) -> &'static [Transformation] {
    let mut chars = stem.trim().chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return &[];
    };

    MUTAGEN_TABLE
        .iter()
        .find(|(s, _)| *s == c)
        .map(|(_, flow)| flow.as_slice())
        .unwrap_or(&[])
}

/// Render the flow as `廉贞->禄, 破军->权, ...`, or [`UNKNOWN_STEM`].
pub fn mutagen_flow(stem: &str) -> String {
    let flow = transformations_for(stem);
    if flow.is_empty() {
        return UNKNOWN_STEM.to_string();
    }

    flow.iter()
        .map(|(star, kind)| format!("{}->{}", star, kind))
        .collect::<Vec<_>>()
        .join(", ")
}
