use regex::Regex;
use serde_json::{Map, Value};

use super::prompt::Catalogue;
use crate::error::AnalysisError;
use crate::models::AnalysisResult;

pub const DEFAULT_SCORE: i64 = 5;
pub const MIN_SCORE: i64 = 1;
pub const MAX_SCORE: i64 = 10;

/// Turns raw backend text into a checked [`AnalysisResult`].
pub struct ResponseValidator {
    catalogue: Catalogue,
    open_fence: Regex,
    close_fence: Regex,
}

impl ResponseValidator {
    pub fn new(catalogue: Catalogue) -> Self {
        Self {
            catalogue,
            open_fence: Regex::new(r"^```[\w+-]*[ \t]*\r?\n?").expect("valid fence regex"),
            close_fence: Regex::new(r"\r?\n?```\s*$").expect("valid fence regex"),
        }
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn validate(&self, response: &str) -> Result<AnalysisResult, AnalysisError> {
        let text = self.strip_fences(response);
        let mut data = parse_object(text)?;

        let category_ok = data
            .get("category")
            .and_then(Value::as_str)
            .is_some_and(|c| self.catalogue.contains(c));
        if !category_ok {
            data.insert(
                "category".to_string(),
                Value::String(self.catalogue.default_slug().to_string()),
            );
        }

        let score = coerce_score(data.get("relevance_score"))?;
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(AnalysisError::Schema(format!(
                "relevance_score {score} outside {MIN_SCORE}..={MAX_SCORE}"
            )));
        }
        data.insert("relevance_score".to_string(), Value::from(score));

        serde_json::from_value(Value::Object(data))
            .map_err(|e| AnalysisError::Schema(e.to_string()))
    }

    fn strip_fences<'a>(&self, response: &'a str) -> &'a str {
        let trimmed = response.trim();
        if !trimmed.starts_with("```") {
            return trimmed;
        }
        let start = self.open_fence.find(trimmed).map(|m| m.end()).unwrap_or(0);
        let body = &trimmed[start..];
        let end = self
            .close_fence
            .find(body)
            .map(|m| m.start())
            .unwrap_or(body.len());
        body[..end].trim()
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, AnalysisError> {
    let direct_err = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => return Ok(map),
        Ok(other) => format!("expected a JSON object, got {}", kind(&other)),
        Err(e) => e.to_string(),
    };

    let span = first_balanced_object(text).ok_or_else(|| {
        AnalysisError::Parse(format!("no JSON object in response: {direct_err}"))
    })?;

    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AnalysisError::Parse(format!(
            "expected a JSON object, got {}",
            kind(&other)
        ))),
        Err(e) => Err(AnalysisError::Parse(format!(
            "failed to parse JSON response: {e}"
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The first `{...}` span whose braces balance, skipping braces inside
/// JSON strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn coerce_score(value: Option<&Value>) -> Result<i64, AnalysisError> {
    let value = match value {
        None | Some(Value::Null) => return Ok(DEFAULT_SCORE),
        Some(v) => v,
    };

    let truncate = |f: f64| f.is_finite().then(|| f.trunc() as i64);
    let score = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    };

    score.ok_or_else(|| {
        AnalysisError::Schema(format!("relevance_score is not an integer: {value}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainSpec;

    fn validator() -> ResponseValidator {
        let domains = ["agents", "memory"].map(|slug| DomainSpec {
            name: slug.to_string(),
            categories: vec![],
            keywords: vec![],
            output_category: slug.to_string(),
        });
        ResponseValidator::new(Catalogue::from_domains(&domains))
    }

    fn body(category: &str, score: &str) -> String {
        format!(
            r#"{{"summary":"x","key_contributions":["a","b"],"methodology":"m","tags":["t"],"category":"{category}","relevance_score":{score},"relevance_reason":"r"}}"#
        )
    }

    #[test]
    fn plain_json_is_accepted() {
        let result = validator().validate(&body("memory", "8")).unwrap();
        assert_eq!(result.category, "memory");
        assert_eq!(result.relevance_score, 8);
        assert_eq!(result.key_contributions, vec!["a", "b"]);
    }

    #[test]
    fn fenced_json_parses_like_bare_json() {
        let v = validator();
        let bare = v.validate(&body("agents", "7")).unwrap();
        let fenced = v
            .validate(&format!("```json\n{}\n```", body("agents", "7")))
            .unwrap();
        let untagged = v
            .validate(&format!("  ```\n{}\n```  ", body("agents", "7")))
            .unwrap();
        assert_eq!(bare, fenced);
        assert_eq!(bare, untagged);
    }

    #[test]
    fn embedded_object_is_extracted() {
        let text = format!(
            "Sure! Here is the analysis:\n{}\nLet me know if you need more.",
            body("agents", "6")
        );
        assert_eq!(validator().validate(&text).unwrap().relevance_score, 6);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let text = r#"Result: {"summary":"uses {braces} and \"quotes\"","key_contributions":["a","b"],"methodology":"m","tags":[],"category":"agents","relevance_score":9,"relevance_reason":"r"} trailing }"#;
        let result = validator().validate(text).unwrap();
        assert_eq!(result.summary, r#"uses {braces} and "quotes""#);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            validator().validate("I cannot help with that."),
            Err(AnalysisError::Parse(_))
        ));
        assert!(matches!(
            validator().validate("{ \"summary\": "),
            Err(AnalysisError::Parse(_))
        ));
    }

    #[test]
    fn unknown_category_is_coerced_to_first_slug() {
        let v = validator();
        assert_eq!(v.validate(&body("robotics", "8")).unwrap().category, "agents");
        let missing = r#"{"summary":"x","key_contributions":["a"],"methodology":"m","tags":[],"relevance_score":8,"relevance_reason":"r"}"#;
        assert_eq!(v.validate(missing).unwrap().category, "agents");
    }

    #[test]
    fn score_bounds_are_inclusive() {
        let v = validator();
        assert_eq!(v.validate(&body("agents", "1")).unwrap().relevance_score, 1);
        assert_eq!(v.validate(&body("agents", "10")).unwrap().relevance_score, 10);
        assert!(matches!(
            v.validate(&body("agents", "0")),
            Err(AnalysisError::Schema(_))
        ));
        assert!(matches!(
            v.validate(&body("agents", "11")),
            Err(AnalysisError::Schema(_))
        ));
        assert!(matches!(
            v.validate(&body("agents", "\"0\"")),
            Err(AnalysisError::Schema(_))
        ));
    }

    #[test]
    fn score_is_coerced_to_integer() {
        let v = validator();
        assert_eq!(v.validate(&body("agents", "\"7\"")).unwrap().relevance_score, 7);
        assert_eq!(v.validate(&body("agents", "8.6")).unwrap().relevance_score, 8);
        assert_eq!(v.validate(&body("agents", "null")).unwrap().relevance_score, 5);
        assert!(matches!(
            v.validate(&body("agents", "\"high\"")),
            Err(AnalysisError::Schema(_))
        ));
    }

    #[test]
    fn missing_score_defaults_to_five() {
        let text = r#"{"summary":"x","key_contributions":["a"],"methodology":"m","tags":[],"category":"memory","relevance_reason":"r"}"#;
        assert_eq!(validator().validate(text).unwrap().relevance_score, 5);
    }

    #[test]
    fn missing_required_field_is_a_schema_error() {
        let text = r#"{"summary":"x","methodology":"m","tags":[],"category":"memory","relevance_score":5,"relevance_reason":"r"}"#;
        assert!(matches!(
            validator().validate(text),
            Err(AnalysisError::Schema(_))
        ));
        let wrong_type = r#"{"summary":"x","key_contributions":"a, b","methodology":"m","tags":[],"category":"memory","relevance_score":5,"relevance_reason":"r"}"#;
        assert!(matches!(
            validator().validate(wrong_type),
            Err(AnalysisError::Schema(_))
        ));
    }
}
