use std::fmt;

const EMERGENCY_KEYWORDS: &[&str] = &["응급", "급성", "중독", "쇼크", "호흡곤란", "의식잃음"];
const PREGNANCY_KEYWORDS: &[&str] = &["임신", "임산부", "수유", "모유"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyWarning {
    Emergency,
    PregnancyOrNursing,
}

impl SafetyWarning {
    pub fn message(self) -> &'static str {
        match self {
            SafetyWarning::Emergency => {
                "🚨 응급상황이 의심됩니다. 즉시 119에 연락하거나 응급실로 가세요!"
            }
            SafetyWarning::PregnancyOrNursing => {
                "⚠️ 임신/수유 중에는 반드시 의사와 상담 후 복용하세요."
            }
        }
    }

    pub fn is_emergency(self) -> bool {
        self == SafetyWarning::Emergency
    }
}

impl fmt::Display for SafetyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// At most one warning per class, emergency first.
pub fn check_emergency_keywords(query: &str) -> Vec<SafetyWarning> {
    let mut warnings = Vec::new();
    if EMERGENCY_KEYWORDS.iter().any(|keyword| query.contains(keyword)) {
        warnings.push(SafetyWarning::Emergency);
    }
    if PREGNANCY_KEYWORDS.iter().any(|keyword| query.contains(keyword)) {
        warnings.push(SafetyWarning::PregnancyOrNursing);
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_question_has_no_warnings() {
        assert!(check_emergency_keywords("두통에 먹는 약 알려줘").is_empty());
    }

    #[test]
    fn repeated_keywords_yield_one_warning_per_class() {
        let warnings = check_emergency_keywords("급성 중독 증상인데 임신 중이고 수유도 해요");
        assert_eq!(
            warnings,
            vec![SafetyWarning::Emergency, SafetyWarning::PregnancyOrNursing]
        );
        assert!(warnings[0].is_emergency());
        assert!(warnings[1].to_string().contains("임신/수유"));
    }

    #[test]
    fn pregnancy_alone_is_not_an_emergency() {
        let warnings = check_emergency_keywords("임산부가 먹어도 되는 감기약");
        assert_eq!(warnings, vec![SafetyWarning::PregnancyOrNursing]);
        assert!(!warnings[0].is_emergency());
    }
}
