use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

/// One item of the registry's `body.items` list.
///
/// Every text field is lenient: `null`, numbers and nested values all decode
/// to `None`, so a single odd field never rejects the whole record.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawRecord {
    #[serde(rename = "itemName", default, deserialize_with = "text_or_none")]
    pub item_name: Option<String>,
    #[serde(rename = "entpName", default, deserialize_with = "text_or_none")]
    pub company_name: Option<String>,
    #[serde(rename = "itemSeq", default, deserialize_with = "text_or_none")]
    pub item_seq: Option<String>,
    #[serde(rename = "mainItemIngr", default, deserialize_with = "text_or_none")]
    pub main_ingredient: Option<String>,
    #[serde(rename = "efcyQesitm", default, deserialize_with = "text_or_none")]
    pub efficacy: Option<String>,
    #[serde(rename = "useMethodQesitm", default, deserialize_with = "text_or_none")]
    pub usage: Option<String>,
    #[serde(rename = "atpnWarnQesitm", default, deserialize_with = "text_or_none")]
    pub boxed_warning: Option<String>,
    #[serde(rename = "atpnQesitm", default, deserialize_with = "text_or_none")]
    pub precautions: Option<String>,
    #[serde(rename = "intrcQesitm", default, deserialize_with = "text_or_none")]
    pub interactions: Option<String>,
    #[serde(rename = "seQesitm", default, deserialize_with = "text_or_none")]
    pub side_effects: Option<String>,
    #[serde(rename = "depositMethodQesitm", default, deserialize_with = "text_or_none")]
    pub storage: Option<String>,
}

fn text_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => Some(text),
        _ => None,
    })
}

/// Semantic field categories, in the fixed order used for embedding text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FieldCategory {
    Efficacy,
    Usage,
    Warnings,
    Interactions,
    SideEffects,
    Storage,
}

impl FieldCategory {
    pub const ALL: [FieldCategory; 6] = [
        FieldCategory::Efficacy,
        FieldCategory::Usage,
        FieldCategory::Warnings,
        FieldCategory::Interactions,
        FieldCategory::SideEffects,
        FieldCategory::Storage,
    ];

    /// Label written into embedding text and persisted as `fieldStructure`.
    /// Changing these invalidates every stored embedding.
    pub fn label(self) -> &'static str {
        match self {
            FieldCategory::Efficacy => "효과",
            FieldCategory::Usage => "복용법",
            FieldCategory::Warnings => "주의_금기사항",
            FieldCategory::Interactions => "상호작용_병용",
            FieldCategory::SideEffects => "부작용",
            FieldCategory::Storage => "보관법",
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrugFields {
    #[serde(default)]
    pub efficacy: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub warnings: Option<String>,
    #[serde(default)]
    pub interactions: Option<String>,
    #[serde(default)]
    pub side_effects: Option<String>,
    #[serde(default)]
    pub storage: Option<String>,
}

impl DrugFields {
    pub fn get(&self, category: FieldCategory) -> Option<&str> {
        match category {
            FieldCategory::Efficacy => self.efficacy.as_deref(),
            FieldCategory::Usage => self.usage.as_deref(),
            FieldCategory::Warnings => self.warnings.as_deref(),
            FieldCategory::Interactions => self.interactions.as_deref(),
            FieldCategory::SideEffects => self.side_effects.as_deref(),
            FieldCategory::Storage => self.storage.as_deref(),
        }
    }

    pub fn set(&mut self, category: FieldCategory, value: String) {
        let slot = match category {
            FieldCategory::Efficacy => &mut self.efficacy,
            FieldCategory::Usage => &mut self.usage,
            FieldCategory::Warnings => &mut self.warnings,
            FieldCategory::Interactions => &mut self.interactions,
            FieldCategory::SideEffects => &mut self.side_effects,
            FieldCategory::Storage => &mut self.storage,
        };
        *slot = Some(value);
    }

    /// Populated fields in embedding order.
    pub fn populated(&self) -> impl Iterator<Item = (FieldCategory, &str)> + '_ {
        FieldCategory::ALL
            .into_iter()
            .filter_map(move |category| self.get(category).map(|value| (category, value)))
    }

    pub fn is_empty(&self) -> bool {
        self.populated().next().is_none()
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub drug_name: String,
    pub product_name: String,
    pub company_name: String,
    #[serde(default)]
    pub ingredient_name: Option<String>,
    pub source: String,
    pub url: String,
    pub category: String,
    pub fields: DrugFields,
}

/// Corpus-level uniqueness key: (product name, category, company name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub product_name: String,
    pub category: String,
    pub company_name: String,
}

impl Document {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            product_name: self.product_name.clone(),
            category: self.category.clone(),
            company_name: self.company_name.clone(),
        }
    }

    /// Text handed to the embedding provider. Field order is fixed so the same
    /// document embeds identically across rebuilds.
    pub fn embedding_text(&self) -> String {
        let mut text = self.product_name.clone();
        if let Some(ingredient) = self
            .ingredient_name
            .as_deref()
            .filter(|value| !value.trim().is_empty())
        {
            text.push_str(&format!(" ({})", ingredient.trim()));
        }

        for (category, value) in self.fields.populated() {
            text.push('\n');
            text.push_str(category.label());
            text.push_str(": ");
            text.push_str(value);
        }

        text
    }

    /// Single-line field summary used in rendered context.
    pub fn content(&self) -> String {
        self.fields
            .populated()
            .map(|(category, value)| format!("{}: {}", category.label(), value))
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResultOrigin {
    Vector,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub document: Document,
    pub similarity_score: f32,
    pub rank: usize,
    pub origin: ResultOrigin,
}

/// A hit from the vector index: cosine score plus position in the corpus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredIndex {
    pub score: f32,
    pub corpus_index: usize,
}
