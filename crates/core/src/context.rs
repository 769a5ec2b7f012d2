use crate::models::RetrievalResult;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub rank: usize,
    pub source: String,
    pub drug_name: String,
    pub category: String,
    pub company_name: String,
    pub similarity: f32,
    pub url: String,
}

/// Prompt context: one numbered block per result, in rank order.
pub fn render_context(results: &[RetrievalResult]) -> String {
    let mut context = String::new();
    for (position, result) in results.iter().enumerate() {
        let document = &result.document;
        context.push_str(&format!(
            "\n[문서 {}] {}\n출처: {}\n약물: {}\n카테고리: {}\n",
            position + 1,
            document.content(),
            document.source,
            document.drug_name,
            document.category
        ));
    }
    context
}

pub fn sources(results: &[RetrievalResult]) -> Vec<SourceInfo> {
    results
        .iter()
        .enumerate()
        .map(|(position, result)| SourceInfo {
            rank: position + 1,
            source: result.document.source.clone(),
            drug_name: result.document.drug_name.clone(),
            category: result.document.category.clone(),
            company_name: result.document.company_name.clone(),
            similarity: result.similarity_score,
            url: result.document.url.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, DrugFields, ResultOrigin};

    fn result(product: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            document: Document {
                drug_name: product.to_string(),
                product_name: product.to_string(),
                company_name: "한국얀센".to_string(),
                ingredient_name: None,
                source: format!("식약처 의약품개요정보 - {product}"),
                url: format!("https://nedrug.mfds.go.kr/search?keyword={product}"),
                category: "해열·진통".to_string(),
                fields: DrugFields {
                    efficacy: Some("두통, 발열".to_string()),
                    usage: Some("1일 3회".to_string()),
                    ..Default::default()
                },
            },
            similarity_score: score,
            rank: 1,
            origin: ResultOrigin::Vector,
        }
    }

    #[test]
    fn context_blocks_are_numbered_in_order() {
        let context = render_context(&[result("타이레놀정", 0.9), result("펜잘큐정", 0.8)]);

        assert!(context.contains("[문서 1] 효과: 두통, 발열 / 복용법: 1일 3회"));
        assert!(context.contains("출처: 식약처 의약품개요정보 - 타이레놀정"));
        assert!(context.contains("[문서 2]"));
        assert!(context.contains("약물: 펜잘큐정"));
        assert!(context.contains("카테고리: 해열·진통"));
    }

    #[test]
    fn sources_carry_rank_and_similarity() {
        let listed = sources(&[result("타이레놀정", 0.9), result("펜잘큐정", 0.8)]);

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].rank, 2);
        assert_eq!(listed[1].drug_name, "펜잘큐정");
        assert!((listed[0].similarity - 0.9).abs() < f32::EPSILON);
        assert_eq!(listed[0].company_name, "한국얀센");
    }

    #[test]
    fn empty_results_render_nothing() {
        assert!(render_context(&[]).is_empty());
        assert!(sources(&[]).is_empty());
    }
}
