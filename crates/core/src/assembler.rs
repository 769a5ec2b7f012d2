use crate::error::IngestError;
use crate::extractor::FieldExtractor;
use crate::models::{Document, DrugFields, FieldCategory, RawRecord};
use crate::normalizer::{is_valid_content, TextCleaner};
use url::Url;

pub const REGISTRY_SOURCE: &str = "식약처 의약품개요정보";
pub const NEDRUG_SEARCH_URL: &str = "https://nedrug.mfds.go.kr/search";

/// Cleaned field text must be longer than this many UTF-8 bytes to be kept.
const MIN_FIELD_BYTES: usize = 15;

#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    extractor: FieldExtractor,
    cleaner: TextCleaner,
}

impl DocumentAssembler {
    pub fn new() -> Result<Self, IngestError> {
        Self::with_extractor(FieldExtractor::new()?)
    }

    pub fn with_extractor(extractor: FieldExtractor) -> Result<Self, IngestError> {
        Ok(Self {
            extractor,
            cleaner: TextCleaner::new()?,
        })
    }

    pub fn extractor(&self) -> &FieldExtractor {
        &self.extractor
    }

    /// Turns one registry record into at most one document.
    ///
    /// `search_term` becomes the document's drug name when given, so documents
    /// found through a live query carry the term the user searched for.
    pub fn assemble(&self, record: &RawRecord, search_term: Option<&str>) -> Option<Document> {
        let product_name = record.item_name.as_deref().unwrap_or_default().trim();
        if product_name.is_empty() {
            return None;
        }

        let accepted = self.accepted_fields(record);
        if accepted.is_empty() {
            return None;
        }

        let mut fields = DrugFields::default();
        let mut cleaned_efficacy = None;
        for (category, cleaned) in accepted {
            if category == FieldCategory::Efficacy {
                cleaned_efficacy = Some(cleaned.clone());
            }
            fields.set(category, self.extractor.extract(category, &cleaned));
        }

        let drug_name = search_term
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .unwrap_or(product_name)
            .to_string();

        Some(Document {
            url: nedrug_search_url(&drug_name),
            source: format!("{REGISTRY_SOURCE} - {product_name}"),
            product_name: product_name.to_string(),
            company_name: record
                .company_name
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_string(),
            ingredient_name: record
                .main_ingredient
                .as_deref()
                .map(|value| self.cleaner.clean(value))
                .filter(|value| !value.is_empty()),
            category: self.extractor.classify(cleaned_efficacy.as_deref()),
            drug_name,
            fields,
        })
    }

    pub fn assemble_all(&self, records: &[RawRecord], search_term: Option<&str>) -> Vec<Document> {
        records
            .iter()
            .filter_map(|record| self.assemble(record, search_term))
            .collect()
    }

    fn accept_field(&self, raw: Option<&str>) -> Option<String> {
        if !is_valid_content(raw) {
            return None;
        }
        let cleaned = self.cleaner.clean(raw.unwrap_or_default());
        (cleaned.len() > MIN_FIELD_BYTES).then_some(cleaned)
    }

    fn accepted_fields(&self, record: &RawRecord) -> Vec<(FieldCategory, String)> {
        let warnings = [
            self.accept_field(record.boxed_warning.as_deref()),
            self.accept_field(record.precautions.as_deref()),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
        let warnings = (!warnings.is_empty()).then(|| warnings.join(" "));

        [
            (FieldCategory::Efficacy, self.accept_field(record.efficacy.as_deref())),
            (FieldCategory::Usage, self.accept_field(record.usage.as_deref())),
            (FieldCategory::Warnings, warnings),
            (FieldCategory::Interactions, self.accept_field(record.interactions.as_deref())),
            (FieldCategory::SideEffects, self.accept_field(record.side_effects.as_deref())),
            (FieldCategory::Storage, self.accept_field(record.storage.as_deref())),
        ]
        .into_iter()
        .filter_map(|(category, value)| value.map(|cleaned| (category, cleaned)))
        .collect()
    }
}

pub fn nedrug_search_url(drug_name: &str) -> String {
    Url::parse_with_params(NEDRUG_SEARCH_URL, &[("keyword", drug_name)])
        .map(String::from)
        .unwrap_or_else(|_| NEDRUG_SEARCH_URL.to_string())
}
