//! Prompt construction for palace and overview readings.
//!
//! A palace prompt combines the palace's own stars, its Three Parties and
//! Four Areas, the palace-stem transformations, excerpts from the
//! knowledge base and the chart-level context into one fixed template.

use crate::corpus::{TextIndex, NOISE_PHRASE};
use crate::models::{Chart, Palace};
use crate::rules::{self, StarSummary};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of knowledge-base excerpts per palace.
pub const DEFAULT_MAX_EXCERPTS: usize = 3;

const NO_EXCERPTS: &str = "No ancient texts found.";
const NO_CONTEXT: &str = "No context provided";

/// Characters of serialised astrolabe included in the overview prompt.
const OVERVIEW_CHART_LIMIT: usize = 4000;

/// Builds the request body for each palace.
#[derive(Debug, Clone)]
pub struct AnalysisPromptComposer {
    corpus: Arc<TextIndex>,
    max_excerpts: usize,
}

impl AnalysisPromptComposer {
    pub fn new(corpus: Arc<TextIndex>, max_excerpts: usize) -> Self {
        Self {
            corpus,
            max_excerpts,
        }
    }

    /// Compose the analysis prompt for the palace at `index`.
    ///
    /// Never fails: missing relations or excerpts fall back to placeholders.
    pub fn compose(&self, index: usize, palaces: &[Palace], context: &str) -> String {
        let Some(palace) = palaces.get(index) else {
            warn!("No palace at index {}; composing an empty prompt", index);
            return String::new();
        };
        let name = palace.display_name(index);
        let stars = rules::format_stars(palace);

        let three_parties = match rules::relations_for(index, palaces) {
            Ok(relations) => rules::format_three_parties(&relations),
            Err(e) => {
                warn!("Relations unavailable for {}: {}", name, e);
                String::new()
            }
        };
        let mutagen_info = rules::format_mutagen_info(palace);

        let query = retrieval_query(&name, &stars);
        let excerpts = self.corpus.search(&query, self.max_excerpts);
        debug!(
            "[Palace {}] {} excerpt characters for {}",
            index,
            excerpts.chars().count(),
            name
        );

        render_palace_prompt(&PalaceSections {
            name: &name,
            stars: &stars,
            decadal_range: &palace.decadal_range(),
            three_parties: &three_parties,
            mutagen_info: &mutagen_info,
            excerpts: &excerpts,
            context,
        })
    }
}

/// Query sent to the knowledge base for a palace.
pub fn retrieval_query(name: &str, stars: &StarSummary) -> String {
    format!("{} {} {} {}", NOISE_PHRASE, name, stars.major, stars.minor)
}

struct PalaceSections<'a> {
    name: &'a str,
    stars: &'a StarSummary,
    decadal_range: &'a str,
    three_parties: &'a str,
    mutagen_info: &'a str,
    excerpts: &'a str,
    context: &'a str,
}

fn or_placeholder<'a>(s: &'a str, placeholder: &'a str) -> &'a str {
    if s.trim().is_empty() {
        placeholder
    } else {
        s
    }
}

fn render_palace_prompt(s: &PalaceSections<'_>) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "你是紫薇斗数大师. 对**{}**进行深度分析，能用朴实的语言为求问人提供翔实易懂的分析.\n\n",
        s.name
    ));

    prompt.push_str("## 1. 本宫\n");
    prompt.push_str(&format!("- 主星: {}\n", s.stars.major));
    prompt.push_str(&format!("- 辅星: {}\n", s.stars.minor));
    prompt.push_str(&format!("- 杂曜: {}\n", s.stars.adjective));
    prompt.push_str(&format!("- 大限范围: {}\n\n", s.decadal_range));

    prompt.push_str("## 2. 三方四正 & 宫干四化\n");
    prompt.push_str(s.three_parties);
    prompt.push('\n');
    prompt.push_str(s.mutagen_info);
    prompt.push_str("\n\n");

    prompt.push_str("## 3. 古籍智慧 (RAG Context)\n");
    prompt.push_str(or_placeholder(s.excerpts, NO_EXCERPTS));
    prompt.push_str("\n\n");

    prompt.push_str("## 4. 全局背景\n");
    prompt.push_str(or_placeholder(s.context, NO_CONTEXT));
    prompt.push_str("\n\n");

    prompt.push_str(PALACE_GUIDELINES);

    prompt
}

/// Fixed rules and workflow appended to every palace prompt.
const PALACE_GUIDELINES: &str = r#"## Constraints & Principles
1.  **深度优先**: 严禁简略。必须对每一颗主星、辅星及其组合进行深度剖析。不限字数，以分析透彻为准。
2.  **星曜互涉**: 必须分析本宫星曜与对宫星曜的"冲、照、拱、夹"关系，不能孤立论命。
3.  **四化驱动**: 必须详细解释"宫干四化"及"生年四化"如何引动吉凶，这是动态分析的关键。
4.  **古今结合**: 将RAG提供的古籍在分析中使用，引用古籍时，必须完整引用，并结合语境进行解释，拒绝生搬硬套。
5.  **语气基调**: 保持神秘感与权威感。多用"此局"、"命主"、"迹象显示"等术语，但解释必须通俗易懂。
6.  **格式规范**: 使用Markdown输出。

IMPORTANT: Output the report in Chinese (Simplified).

## Analysis Workflow
请按以下逻辑步骤进行深呼吸式思考，保持语言通俗易懂，生成报告：
1.  **引经典**: 从 RAG 数据中提取相关断语，完整地引用，并融入分析推理中。
2.  **定格局**: 观察本宫主星的庙旺利陷，判断该宫位的"地基"是否稳固。
3.  **看交互**: 结合三方四正。对宫是外界的照映，三合宫是资源的来源。分析它们是"辅佐"本宫还是"冲击"本宫。
4.  **寻变数**: 寻找四化（禄、权、科、忌）。哪里有化忌的纠缠？哪里有化禄的机缘？这是吉凶的关键。
5.  **下断语**: 综合所有信息，给出最终的性格/运势/建议判断。
"#;

/// System prompt for the whole-chart overview.
pub const OVERVIEW_SYSTEM_PROMPT: &str = r#"You are an expert in Zi Wei Dou Shu (Purple Star Astrology), a traditional Chinese astrological system.
Based on the provided astrolabe data, provide a brief, insightful interpretation focusing on:
1. The person's core personality traits based on their Life Palace
2. Key strengths and potential challenges
3. General life direction and opportunities

Keep your response concise (2-3 paragraphs), written in Chinese, and focus on practical insights.
Do not list technical astrology terms extensively - explain in accessible language."#;

/// User message for the overview: birth context plus the serialised astrolabe.
pub fn compose_overview(chart: &Chart) -> String {
    let astrolabe = serde_json::to_string_pretty(&chart.astrolabe).unwrap_or_default();
    let truncated: String = astrolabe.chars().take(OVERVIEW_CHART_LIMIT).collect();

    format!(
        "{}\n\nAstrolabe Data:\n{}\n",
        chart.birth_info.context(),
        truncated
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CorpusNode;
    use crate::models::{BirthInfo, Decadal, Star};

    fn corpus() -> Arc<TextIndex> {
        Arc::new(TextIndex::from_nodes(&[CorpusNode {
            title: "论命宫".to_string(),
            text: "紫微居命，主尊贵。".to_string(),
            ..CorpusNode::default()
        }]))
    }

    fn palaces() -> Vec<Palace> {
        let mut palaces: Vec<Palace> = (0..12)
            .map(|i| Palace {
                name: format!("宫{}", i),
                ..Palace::default()
            })
            .collect();
        palaces[0] = Palace {
            name: "命宫".to_string(),
            major_stars: vec![Star {
                name: "紫微".to_string(),
                brightness: Some("庙".to_string()),
                mutagen: None,
            }],
            decadal: Some(Decadal { range: vec![3, 12] }),
            heavenly_stem: "甲".to_string(),
            ..Palace::default()
        };
        palaces
    }

    #[test]
    fn test_compose_sections_in_order() {
        let composer = AnalysisPromptComposer::new(corpus(), DEFAULT_MAX_EXCERPTS);
        let prompt = composer.compose(0, &palaces(), "User: 张三");

        let order = [
            "**命宫**",
            "## 1. 本宫",
            "- 主星: 紫微(庙)",
            "- 辅星: None",
            "- 大限范围: 3-12",
            "## 2. 三方四正",
            "- Opposite (对宫 - 宫6): No Major Stars",
            "廉贞->禄, 破军->权, 武曲->科, 太阳->忌",
            "## 3. 古籍智慧 (RAG Context)",
            "### 论命宫\n紫微居命，主尊贵。",
            "## 4. 全局背景",
            "User: 张三",
            "## Constraints & Principles",
            "严禁简略",
            "不限字数",
            "保持神秘感与权威感",
            "## Analysis Workflow",
            "深呼吸式思考",
        ];
        let mut cursor = 0;
        for needle in order {
            let found = prompt[cursor..]
                .find(needle)
                .unwrap_or_else(|| panic!("missing or out of order: {}", needle));
            cursor += found + needle.len();
        }
    }

    #[test]
    fn test_compose_placeholders() {
        let composer = AnalysisPromptComposer::new(Arc::new(TextIndex::from_nodes(&[])), 3);
        let prompt = composer.compose(5, &palaces(), "");

        assert!(prompt.contains("**宫5**"));
        assert!(prompt.contains(NO_EXCERPTS));
        assert!(prompt.contains(NO_CONTEXT));
        assert!(prompt.contains("- 大限范围: N/A"));
    }

    #[test]
    fn test_compose_out_of_range_is_empty() {
        let composer = AnalysisPromptComposer::new(corpus(), 3);
        assert_eq!(composer.compose(3, &[], "ctx"), "");
    }

    #[test]
    fn test_retrieval_query() {
        let stars = rules::format_stars(&palaces()[0]);
        assert_eq!(retrieval_query("命宫", &stars), "紫微斗数 命宫 紫微(庙) None");
    }

    #[test]
    fn test_compose_overview_truncates() {
        let mut chart = Chart {
            birth_info: BirthInfo {
                name: Some("李四".to_string()),
                ..BirthInfo::default()
            },
            ..Chart::default()
        };
        chart.astrolabe.palaces = palaces();
        chart
            .astrolabe
            .extra
            .insert("notes".to_string(), "星".repeat(10_000).into());

        let overview = compose_overview(&chart);
        assert!(overview.starts_with("User: 李四"));
        let data = overview.split("Astrolabe Data:\n").nth(1).unwrap();
        assert_eq!(data.chars().count(), OVERVIEW_CHART_LIMIT + 1);
    }
}
