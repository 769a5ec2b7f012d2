//! Cleanup of raw registry field text.

use regex::Regex;

const TAG_PATTERN: &str = r"<[^>]+>";

const MIN_CONTENT_CHARS: usize = 4;

/// Markers the registry uses for "no information". Matched as
/// case-insensitive substrings.
const NO_INFORMATION_MARKERS: [&str; 8] = [
    "해당없음",
    "없음",
    "-",
    "N/A",
    "정보없음",
    "none",
    "no info",
    "not applicable",
];

const ENTITIES: [(&str, &str); 6] = [
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&#39;", "'"),
];

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn decode_entities(text: &str) -> String {
    ENTITIES
        .iter()
        .fold(text.to_string(), |acc, (entity, replacement)| {
            acc.replace(entity, replacement)
        })
}

/// Field text cleanup with the tag pattern compiled once.
#[derive(Debug, Clone)]
pub struct TextCleaner {
    tags: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            tags: Regex::new(TAG_PATTERN)?,
        })
    }

    /// Removes `<...>` tags. An empty `<>` or a `<` with no later `>` stays.
    pub fn strip_tags(&self, text: &str) -> String {
        self.tags.replace_all(text, "").into_owned()
    }

    pub fn clean(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let without_tags = self.strip_tags(text);
        let decoded = decode_entities(&without_tags);
        normalize_whitespace(&decoded)
    }
}

pub fn is_valid_content(content: Option<&str>) -> bool {
    let Some(content) = content else {
        return false;
    };

    let trimmed = content.trim();
    if trimmed.chars().count() < MIN_CONTENT_CHARS {
        return false;
    }

    let lowered = trimmed.to_lowercase();
    !NO_INFORMATION_MARKERS
        .iter()
        .any(|marker| lowered.contains(&marker.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn clean_strips_tags_and_entities() -> Result<(), regex::Error> {
        let cleaner = TextCleaner::new()?;
        let raw = "<p>이 약은&nbsp;두통,\n\n치통의 <b>완화</b>에 사용합니다.</p> &lt;성인&gt;";
        assert_eq!(cleaner.clean(raw), "이 약은 두통, 치통의 완화에 사용합니다. <성인>");
        Ok(())
    }

    #[test]
    fn stray_angle_brackets() -> Result<(), regex::Error> {
        let cleaner = TextCleaner::new()?;
        assert_eq!(cleaner.strip_tags("a < b and <> c"), "a  c");
        assert_eq!(cleaner.strip_tags("a < b"), "a < b");
        assert_eq!(cleaner.strip_tags("x <> y"), "x <> y");
        assert_eq!(cleaner.strip_tags("x<br/>y"), "xy");
        assert_eq!(cleaner.clean("1회 <1정> 복용"), "1회 복용");
        Ok(())
    }

    #[test]
    fn validity_rejects_missing_short_and_blacklisted_text() {
        assert!(!is_valid_content(None));
        assert!(!is_valid_content(Some("   ")));
        assert!(!is_valid_content(Some("두통")));
        assert!(!is_valid_content(Some("해당 정보 없음 확인")));
        assert!(!is_valid_content(Some("n/a for children")));
        assert!(!is_valid_content(Some("상호작용 - 확인 필요")));
        assert!(is_valid_content(Some("두통 완화에 사용합니다")));
    }
}
