use crate::config::DomainSpec;

/// Used when a domain names neither categories nor keywords, so we never
/// send an unconstrained query.
pub const FALLBACK_QUERY: &str = "cat:cs.AI";

/// Build the arXiv `search_query` for one domain.
///
/// Categories are OR-ed together, each keyword is searched in both title and
/// abstract, and the two clauses are AND-ed when both are present.
pub fn build_query(domain: &DomainSpec) -> String {
    let categories: Vec<String> = domain
        .categories
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| format!("cat:{c}"))
        .collect();

    let keywords: Vec<String> = domain
        .keywords
        .iter()
        .map(|k| k.trim().replace('"', ""))
        .filter(|k| !k.is_empty())
        .flat_map(|k| [format!("ti:\"{k}\""), format!("abs:\"{k}\"")])
        .collect();

    let cat_clause = disjunction(&categories);
    let kw_clause = disjunction(&keywords);

    match (cat_clause, kw_clause) {
        (Some(cat), Some(kw)) => format!("{cat} AND {kw}"),
        (Some(clause), None) | (None, Some(clause)) => clause,
        (None, None) => FALLBACK_QUERY.to_string(),
    }
}

fn disjunction(parts: &[String]) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(format!("({})", parts.join(" OR ")))
    }
}
