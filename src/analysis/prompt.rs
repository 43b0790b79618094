use crate::config::DomainSpec;

/// Category used when no domains are configured at all.
pub const FALLBACK_CATEGORY: &str = "other";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueEntry {
    pub slug: String,
    pub description: String,
}

/// The output categories a backend may assign, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    entries: Vec<CatalogueEntry>,
}

impl Catalogue {
    pub fn from_domains(domains: &[DomainSpec]) -> Self {
        let entries = domains
            .iter()
            .map(|d| CatalogueEntry {
                slug: d.output_category.clone(),
                description: format!("{} (keywords: {})", d.name, d.keywords.join(", ")),
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogueEntry] {
        &self.entries
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.entries.iter().any(|e| e.slug == slug)
    }

    /// Slug that invalid categories are coerced to.
    pub fn default_slug(&self) -> &str {
        self.entries
            .first()
            .map(|e| e.slug.as_str())
            .unwrap_or(FALLBACK_CATEGORY)
    }
}

pub fn build_prompt(title: &str, abstract_text: &str, catalogue: &Catalogue) -> String {
    let categories = catalogue
        .entries()
        .iter()
        .map(|e| format!("  - {}: {}", e.slug, e.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analyze the following research paper and return the result as JSON.\n\n\
        Title: {title}\n\n\
        Abstract: {abstract_text}\n\n\
        Return a JSON object in exactly this shape (no markdown code fences):\n\
        {{\n\
        \x20 \"summary\": \"one-sentence summary (under 30 words)\",\n\
        \x20 \"key_contributions\": [\"contribution 1\", \"contribution 2\", \"contribution 3\"],\n\
        \x20 \"methodology\": \"brief description of the method (under 50 words)\",\n\
        \x20 \"tags\": [\"tag1\", \"tag2\", \"tag3\"],\n\
        \x20 \"category\": \"the single most relevant category slug from the list below\",\n\
        \x20 \"relevance_score\": integer from 1 to 10,\n\
        \x20 \"relevance_reason\": \"why this score (under 30 words)\"\n\
        }}\n\n\
        key_contributions must have 2 to 4 entries.\n\n\
        Available categories:\n{categories}\n\n\
        Scoring rubric:\n\
        - 9-10: core, directly addresses a key problem of the category\n\
        - 7-8: highly relevant, covers an important aspect of the category\n\
        - 5-6: moderately relevant, some reference value\n\
        - 3-4: marginal, touches only some concepts\n\
        - 1-2: unrelated\n\n\
        Return only the JSON object, with no other text."
    )
}
