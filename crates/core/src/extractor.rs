//! Per-category compression of registry field text into salient clinical terms.
//!
//! Every category is described by an [`ExtractionSpec`]: an ordered set of
//! regex patterns with priorities, a cap on how many terms are kept, and a
//! fallback transform for text where nothing matches. Patterns are compiled
//! once in [`FieldExtractor::new`]; extraction itself never fails.
//!
//! A pattern contributes the text of its `term` capture group when it has one,
//! otherwise the whole match. A pattern with a `label` contributes the label
//! instead, which is how verbose phrasing ("습기와 빛을 피하여") is mapped onto
//! a short canonical term.

use crate::error::IngestError;
use crate::models::FieldCategory;
use crate::normalizer::normalize_whitespace;
use regex::Regex;
use std::collections::HashMap;

pub const TERM_DELIMITER: &str = ", ";
pub const DEFAULT_CATEGORY: &str = "일반의약품";

#[derive(Debug, Clone, Copy)]
pub struct PatternSpec {
    pub pattern: &'static str,
    pub priority: u8,
    pub label: Option<&'static str>,
}

const fn term(pattern: &'static str, priority: u8) -> PatternSpec {
    PatternSpec {
        pattern,
        priority,
        label: None,
    }
}

const fn labeled(pattern: &'static str, priority: u8, label: &'static str) -> PatternSpec {
    PatternSpec {
        pattern,
        priority,
        label: Some(label),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FallbackSpec {
    pub strip_prefixes: &'static [&'static str],
    pub strip_suffixes: &'static [&'static str],
    pub first_sentence_only: bool,
    pub max_chars: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractionSpec {
    pub category: FieldCategory,
    pub max_terms: usize,
    pub patterns: &'static [PatternSpec],
    pub fallback: FallbackSpec,
}

#[derive(Debug, Clone, Copy)]
pub struct ClassSpec {
    pub label: &'static str,
    pub pattern: &'static str,
}

const EFFECT_PATTERNS: &[PatternSpec] = &[
    term(
        r"편두통|두통|치통|생리통|근육통|관절통|요통|신경통|인후통|발열|오한|해열|진통",
        100,
    ),
    term(
        r"감기|콧물|코막힘|재채기|기침|가래|알레르기성\s*비염|비염|인후염|기관지염",
        90,
    ),
    term(
        r"소화불량|속쓰림|위산과다|위염|위궤양|변비|설사|복통|구토|메스꺼움|식욕부진|복부팽만",
        90,
    ),
    term(
        r"가려움증|가려움|두드러기|습진|피부염|무좀|여드름|화상|상처|벌레\s*물린\s*데|땀띠|건선|알레르기",
        80,
    ),
    term(r"안구건조|눈의\s*피로|결막염|충혈|구내염|치주염|잇몸\s*질환|멀미", 70),
    term(
        r"불면|빈혈|비타민\s*결핍|육체피로|자양강장|골다공증|고혈압|고지혈증|당뇨",
        60,
    ),
    term(
        r"(?P<term>[가-힣]{2,10})(?:의|에)\s*(?:완화|개선|치료|예방|보조치료)",
        40,
    ),
];

const DOSAGE_PATTERNS: &[PatternSpec] = &[
    term(
        r"(?:1일|하루)\s*(?:\d+\s*(?:~\s*\d+\s*)?|수\s*)회",
        100,
    ),
    term(
        r"(?:1일\s*)?최대\s*\d+(?:\.\d+)?\s*(?:정|캡슐|포|mg|밀리그램|회)",
        95,
    ),
    term(r"\d+\s*(?:~\s*\d+\s*)?시간\s*(?:간격|마다)", 90),
    term(
        r"1회\s*\d+(?:\.\d+)?\s*(?:~\s*\d+(?:\.\d+)?\s*)?(?:정|캡슐|포|알|mL|ml|mg|g|방울|매)",
        80,
    ),
    term(r"식전|식후|식간|취침\s*전|공복", 70),
    term(
        r"성인|소아|어린이|만\s*\d+\s*세\s*이상|\d+\s*세\s*(?:이상|미만)",
        60,
    ),
    labeled(r"환부에[가-힣\s]{0,12}(?:바르|도포)", 50, "환부 도포"),
    labeled(r"점안", 50, "점안"),
    labeled(r"씹어서", 50, "씹어서 복용"),
];

const WARNING_PATTERNS: &[PatternSpec] = &[
    term(
        r"임부|임산부|임신부|임신\s*중|임신하고\s*있을\s*가능성|수유부|수유\s*중",
        100,
    ),
    term(r"\d+\s*세\s*(?:미만|이하|이상)(?:의\s*(?:소아|어린이|고령자))?", 95),
    term(
        r"(?:간|신장|심장|콩팥)\s*(?:기능\s*)?(?:질환|장애)",
        90,
    ),
    term(
        r"고혈압|당뇨병|천식|위궤양|갑상선\s*질환|녹내장|전립선\s*비대증",
        85,
    ),
    labeled(
        r"매일\s*세\s*잔\s*이상[가-힣\s]{0,10}술|음주|알코올",
        80,
        "음주 주의",
    ),
    term(r"과민증|과민반응|쇼크", 75),
    term(r"영아|유아|소아|고령자|노인", 70),
    labeled(r"장기간|장기\s*복용", 60, "장기 복용 주의"),
    labeled(r"과량\s*복용|정해진\s*용법", 60, "용법 준수"),
];

const INTERACTION_PATTERNS: &[PatternSpec] = &[
    term(
        r"MAO\s*억제제|모노아민\s*산화효소\s*억제제|와파린|항응고제|아스피린|이뇨제|항생제|진정제|수면제|항히스타민제|항우울제|제산제|철분제|스테로이드|해열진통제|감기약|진해거담제|위장약",
        100,
    ),
    term(r"알코올|카페인|우유|자몽\s*주스|자몽", 80),
    term(
        r"(?P<term>[가-힣A-Za-z]{2,12}(?:제|약))(?:와|과)\s*(?:함께|병용|같이)",
        50,
    ),
];

const SIDE_EFFECT_PATTERNS: &[PatternSpec] = &[
    term(
        r"쇼크|아나필락시스|호흡곤란|스티븐스\s*존슨\s*증후군|중독성\s*표피괴사|황달|간기능\s*이상",
        100,
    ),
    term(r"발진|발적|가려움|두드러기|부종|홍반", 90),
    term(
        r"구역|구토|메스꺼움|식욕부진|설사|변비|복통|속쓰림|위장\s*출혈",
        80,
    ),
    term(r"어지러움|현기증|졸음|두통|불면|신경과민|흥분", 70),
    term(r"배뇨곤란|빈맥|두근거림|혈액\s*이상", 60),
];

const STORAGE_PATTERNS: &[PatternSpec] = &[
    term(
        r"\d+\s*[~∼\-]\s*\d+\s*(?:℃|°C|도)|\d+\s*(?:℃|°C)\s*이하",
        100,
    ),
    term(r"실온|냉장|냉동|차광|기밀용기|밀폐용기|서늘한\s*곳", 90),
    labeled(
        r"(?:습기|직사광선|햇빛|빛)[가-힣\s,]{0,12}피(?:하|해)",
        80,
        "습기·직사광선 차단",
    ),
    labeled(
        r"어린이의?\s*손이?\s*닿지\s*않는\s*곳",
        70,
        "어린이 손에 닿지 않게",
    ),
];

pub const EXTRACTION_TABLE: [ExtractionSpec; 6] = [
    ExtractionSpec {
        category: FieldCategory::Efficacy,
        max_terms: 5,
        patterns: EFFECT_PATTERNS,
        fallback: FallbackSpec {
            strip_prefixes: &["이 약은", "이 약을"],
            strip_suffixes: &[
                "에 사용합니다.",
                "에 사용합니다",
                "에 씁니다.",
                "에 씁니다",
            ],
            first_sentence_only: true,
            max_chars: 100,
        },
    },
    ExtractionSpec {
        category: FieldCategory::Usage,
        max_terms: 4,
        patterns: DOSAGE_PATTERNS,
        fallback: FallbackSpec {
            strip_prefixes: &[],
            strip_suffixes: &["복용합니다.", "복용하십시오.", "사용합니다."],
            first_sentence_only: false,
            max_chars: 80,
        },
    },
    ExtractionSpec {
        category: FieldCategory::Warnings,
        max_terms: 6,
        patterns: WARNING_PATTERNS,
        fallback: FallbackSpec {
            strip_prefixes: &["이 약을 복용하기 전에", "이 약을 사용하기 전에"],
            strip_suffixes: &["의사 또는 약사와 상의하십시오."],
            first_sentence_only: true,
            max_chars: 80,
        },
    },
    ExtractionSpec {
        category: FieldCategory::Interactions,
        max_terms: 4,
        patterns: INTERACTION_PATTERNS,
        fallback: FallbackSpec {
            strip_prefixes: &[
                "다음 약과 함께 복용하지 마십시오.",
                "다음 약과 함께 사용하지 마십시오.",
                "다음과 같은 약과",
            ],
            strip_suffixes: &["주의하십시오.", "의사 또는 약사와 상의하십시오."],
            first_sentence_only: true,
            max_chars: 80,
        },
    },
    ExtractionSpec {
        category: FieldCategory::SideEffects,
        max_terms: 6,
        patterns: SIDE_EFFECT_PATTERNS,
        fallback: FallbackSpec {
            strip_prefixes: &["이 약을 복용한 후", "이 약을 사용한 후"],
            strip_suffixes: &[
                "복용을 즉각 중지하고 의사 또는 약사와 상의하십시오.",
                "의사 또는 약사와 상의하십시오.",
            ],
            first_sentence_only: true,
            max_chars: 80,
        },
    },
    ExtractionSpec {
        category: FieldCategory::Storage,
        max_terms: 3,
        patterns: STORAGE_PATTERNS,
        fallback: FallbackSpec {
            strip_prefixes: &[],
            strip_suffixes: &["보관하십시오.", "보관하십시오", "보관합니다."],
            first_sentence_only: true,
            max_chars: 50,
        },
    },
];

/// Therapeutic classes checked in order against efficacy text; first hit wins.
pub const THERAPEUTIC_CLASSES: [ClassSpec; 7] = [
    ClassSpec {
        label: "해열·진통",
        pattern: r"두통|치통|생리통|편두통|근육통|관절통|요통|신경통|발열|해열|진통",
    },
    ClassSpec {
        label: "감기·호흡기",
        pattern: r"감기|콧물|코막힘|재채기|기침|가래|비염|인후|기관지",
    },
    ClassSpec {
        label: "소화기",
        pattern: r"소화|속쓰림|위산|위염|위궤양|변비|설사|복통|구토|메스꺼움",
    },
    ClassSpec {
        label: "피부",
        pattern: r"피부|습진|무좀|여드름|가려움|두드러기|화상|상처|땀띠|건선",
    },
    ClassSpec {
        label: "알레르기",
        pattern: r"알레르기|알러지",
    },
    ClassSpec {
        label: "눈·구강",
        pattern: r"안구|결막|눈의|구내염|잇몸|치주",
    },
    ClassSpec {
        label: "영양·보충",
        pattern: r"비타민|미네랄|자양강장|영양|빈혈|칼슘",
    },
];

#[derive(Debug, Clone)]
struct CompiledPattern {
    regex: Regex,
    label: Option<&'static str>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    max_terms: usize,
    patterns: Vec<CompiledPattern>,
    fallback: FallbackSpec,
}

#[derive(Debug, Clone)]
pub struct FieldExtractor {
    rules: HashMap<FieldCategory, CompiledRule>,
    classes: Vec<(&'static str, Regex)>,
}

impl FieldExtractor {
    pub fn new() -> Result<Self, IngestError> {
        Self::from_table(&EXTRACTION_TABLE, &THERAPEUTIC_CLASSES)
    }

    pub fn from_table(specs: &[ExtractionSpec], classes: &[ClassSpec]) -> Result<Self, IngestError> {
        let mut rules = HashMap::new();

        for spec in specs {
            if spec.max_terms == 0 {
                return Err(IngestError::InvalidArgument(format!(
                    "extraction rule for {:?} keeps zero terms",
                    spec.category
                )));
            }

            let mut ordered = spec.patterns.to_vec();
            // stable: equal priorities keep table order
            ordered.sort_by(|left, right| right.priority.cmp(&left.priority));

            let patterns = ordered
                .into_iter()
                .map(|pattern| {
                    Ok::<_, IngestError>(CompiledPattern {
                        regex: Regex::new(pattern.pattern)?,
                        label: pattern.label,
                    })
                })
                .collect::<Result<Vec<_>, IngestError>>()?;

            rules.insert(
                spec.category,
                CompiledRule {
                    max_terms: spec.max_terms,
                    patterns,
                    fallback: spec.fallback,
                },
            );
        }

        let classes = classes
            .iter()
            .map(|class| Ok::<_, IngestError>((class.label, Regex::new(class.pattern)?)))
            .collect::<Result<Vec<_>, IngestError>>()?;

        Ok(Self { rules, classes })
    }

    pub fn extract(&self, category: FieldCategory, text: &str) -> String {
        let Some(rule) = self.rules.get(&category) else {
            return truncate_chars(text.trim(), 100);
        };

        let terms = collect_terms(rule, text);
        if terms.is_empty() {
            apply_fallback(&rule.fallback, text)
        } else {
            terms.join(TERM_DELIMITER)
        }
    }

    pub fn extract_effects(&self, text: &str) -> String {
        self.extract(FieldCategory::Efficacy, text)
    }

    pub fn extract_dosage(&self, text: &str) -> String {
        self.extract(FieldCategory::Usage, text)
    }

    pub fn extract_warnings(&self, text: &str) -> String {
        self.extract(FieldCategory::Warnings, text)
    }

    pub fn extract_interactions(&self, text: &str) -> String {
        self.extract(FieldCategory::Interactions, text)
    }

    pub fn extract_side_effects(&self, text: &str) -> String {
        self.extract(FieldCategory::SideEffects, text)
    }

    pub fn extract_storage(&self, text: &str) -> String {
        self.extract(FieldCategory::Storage, text)
    }

    /// Therapeutic class for a document, from its cleaned efficacy text.
    pub fn classify(&self, efficacy: Option<&str>) -> String {
        efficacy
            .and_then(|text| {
                self.classes
                    .iter()
                    .find(|(_, regex)| regex.is_match(text))
                    .map(|(label, _)| (*label).to_string())
            })
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
    }
}

fn collect_terms(rule: &CompiledRule, text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();

    'patterns: for pattern in &rule.patterns {
        for captures in pattern.regex.captures_iter(text) {
            let found = match pattern.label {
                Some(label) => label.to_string(),
                None => captures
                    .name("term")
                    .or_else(|| captures.get(0))
                    .map(|matched| normalize_whitespace(matched.as_str()))
                    .unwrap_or_default(),
            };

            if found.is_empty() || terms.contains(&found) {
                continue;
            }

            terms.push(found);
            if terms.len() >= rule.max_terms {
                break 'patterns;
            }
        }
    }

    terms
}

fn apply_fallback(fallback: &FallbackSpec, text: &str) -> String {
    let original = text.trim();
    let mut simplified = original;

    for prefix in fallback.strip_prefixes {
        if let Some(rest) = simplified.strip_prefix(prefix) {
            simplified = rest.trim_start();
        }
    }

    if fallback.first_sentence_only {
        if let Some(end) = simplified.find(". ") {
            simplified = &simplified[..end + 1];
        }
    }

    for suffix in fallback.strip_suffixes {
        if let Some(rest) = simplified.strip_suffix(suffix) {
            simplified = rest.trim_end();
        }
    }

    if simplified.is_empty() {
        simplified = original;
    }

    truncate_chars(simplified, fallback.max_chars)
}

/// Truncates on a character boundary, marking the cut with `…`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FieldExtractor {
        FieldExtractor::new().expect("built-in table should compile")
    }

    #[test]
    fn effects_pick_symptom_terms() {
        let extractor = extractor();
        assert_eq!(extractor.extract_effects("두통 완화에 사용합니다"), "두통");
        assert_eq!(
            extractor.extract_effects("이 약은 감기의 제증상(콧물, 코막힘, 재채기, 발열, 두통)의 완화에 사용합니다."),
            "발열, 두통, 감기, 콧물, 코막힘"
        );
    }

    #[test]
    fn dosage_keeps_frequency_and_timing() {
        let extractor = extractor();
        assert_eq!(extractor.extract_dosage("1일 3회 식후 복용"), "1일 3회, 식후");
        assert_eq!(
            extractor.extract_dosage("성인은 1회 1~2정, 1일 3~4회 4시간 간격으로 복용합니다. 1일 최대 8정을 초과하지 마십시오."),
            "1일 3~4회, 1일 최대 8정, 4시간 간격, 1회 1~2정"
        );
    }

    #[test]
    fn labeled_patterns_emit_canonical_terms() {
        let extractor = extractor();
        assert_eq!(
            extractor.extract_storage("습기와 빛을 피해 실온에서 보관하십시오."),
            "실온, 습기·직사광선 차단"
        );
        assert_eq!(
            extractor.extract_warnings("매일 세 잔 이상 정기적으로 술을 마시는 사람은 의사와 상의하십시오."),
            "음주 주의"
        );
    }

    #[test]
    fn interactions_find_drug_classes() {
        let extractor = extractor();
        assert_eq!(
            extractor.extract_interactions("다른 해열진통제, 감기약과 함께 복용하지 마십시오. 와파린을 복용하는 경우 상의하십시오."),
            "해열진통제, 감기약, 와파린"
        );
    }

    #[test]
    fn terms_are_capped_per_category() {
        let extractor = extractor();
        let result = extractor.extract_storage("2~8℃ 냉장, 차광, 밀폐용기, 실온 금지, 서늘한 곳");
        assert_eq!(result.split(TERM_DELIMITER).count(), 3);
        assert!(result.starts_with("2~8℃"));
    }

    #[test]
    fn fallback_strips_boilerplate_and_truncates() {
        let extractor = extractor();
        assert_eq!(
            extractor.extract_effects("이 약은 무언가 특별한 증상에 사용합니다."),
            "무언가 특별한 증상"
        );

        let long = "가".repeat(120);
        let truncated = extractor.extract_effects(&long);
        assert_eq!(truncated.chars().count(), 101);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn every_extractor_is_total() {
        let extractor = extractor();
        let inputs = [
            "abcde",
            ".....",
            "     x     ",
            "🙂🙂🙂🙂🙂",
            "1일 3회",
            "이 약은",
            "<p>&amp;</p>",
            "다음 약과 함께 복용하지 마십시오.",
        ];

        for category in FieldCategory::ALL {
            for input in inputs {
                let output = extractor.extract(category, input);
                assert!(
                    !output.is_empty() || input.trim().is_empty(),
                    "{category:?} returned empty output for {input:?}"
                );
            }
        }
    }

    #[test]
    fn table_is_extensible_without_code_changes() {
        const CUSTOM: &[PatternSpec] = &[term(r"zzz", 10), term(r"yyy", 90)];
        let specs = [ExtractionSpec {
            category: FieldCategory::Efficacy,
            max_terms: 2,
            patterns: CUSTOM,
            fallback: EXTRACTION_TABLE[0].fallback,
        }];
        let extractor = FieldExtractor::from_table(&specs, &[]).expect("custom table");

        assert_eq!(extractor.extract_effects("zzz then yyy"), "yyy, zzz");
        assert_eq!(extractor.classify(Some("zzz")), DEFAULT_CATEGORY);
        assert_eq!(extractor.extract_storage("냉장 보관"), "냉장 보관");
    }

    #[test]
    fn invalid_pattern_fails_construction() {
        const BROKEN: &[PatternSpec] = &[term(r"(unclosed", 10)];
        let specs = [ExtractionSpec {
            category: FieldCategory::Storage,
            max_terms: 1,
            patterns: BROKEN,
            fallback: EXTRACTION_TABLE[5].fallback,
        }];
        assert!(matches!(
            FieldExtractor::from_table(&specs, &[]),
            Err(IngestError::RegexError(_))
        ));
    }

    #[test]
    fn classify_uses_first_matching_class() {
        let extractor = extractor();
        assert_eq!(extractor.classify(Some("두통 완화에 사용합니다")), "해열·진통");
        assert_eq!(extractor.classify(Some("위산과다, 속쓰림")), "소화기");
        assert_eq!(extractor.classify(Some("특이 사항")), DEFAULT_CATEGORY);
        assert_eq!(extractor.classify(None), DEFAULT_CATEGORY);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("가나다라", 2), "가나…");
        assert_eq!(truncate_chars("가나", 2), "가나");
    }
}
