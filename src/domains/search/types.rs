//! Value types exchanged with the search backend and returned to clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::SearchError;

/// Reasoning effort hint forwarded to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThinkingLevel {
    Minimal,
    Low,
    Medium,
    High,
}

impl ThinkingLevel {
    /// All accepted levels, in increasing order of effort.
    pub const ALL: [ThinkingLevel; 4] = [Self::Minimal, Self::Low, Self::Medium, Self::High];

    /// Wire name of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "MINIMAL",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    /// Parse an optional level where an empty (or blank) string means "unset".
    pub fn parse_optional(raw: &str) -> Result<Option<Self>, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }
}

impl FromStr for ThinkingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown thinking level '{}' (expected one of MINIMAL, LOW, MEDIUM, HIGH)",
                    s
                )
            })
    }
}

impl fmt::Display for ThinkingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placeholder substituted by the raw question in a query template.
pub const TEMPLATE_PLACEHOLDER: &str = "%s";

/// A query template with exactly one `%s` substitution point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    prefix: String,
    suffix: String,
}

impl QueryTemplate {
    /// Validate a raw template string.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.matches(TEMPLATE_PLACEHOLDER).count() {
            1 => {
                let (prefix, suffix) = raw
                    .split_once(TEMPLATE_PLACEHOLDER)
                    .ok_or_else(|| "template placeholder vanished".to_string())?;
                Ok(Self {
                    prefix: prefix.to_string(),
                    suffix: suffix.to_string(),
                })
            }
            0 => Err(format!(
                "query template must contain the '{}' placeholder",
                TEMPLATE_PLACEHOLDER
            )),
            n => Err(format!(
                "query template must contain exactly one '{}' placeholder, found {}",
                TEMPLATE_PLACEHOLDER, n
            )),
        }
    }

    /// Substitute the question into the template.
    pub fn render(&self, question: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + question.len() + self.suffix.len());
        out.push_str(&self.prefix);
        out.push_str(question);
        out.push_str(&self.suffix);
        out
    }
}

impl fmt::Display for QueryTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, TEMPLATE_PLACEHOLDER, self.suffix)
    }
}

/// A validated search request coming from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// The natural-language question; never empty.
    pub question: String,
    /// Per-request output limit; `None` means "use the server default".
    pub max_tokens: Option<u32>,
    /// Per-request reasoning hint overriding the configured default.
    pub thinking_level: Option<ThinkingLevel>,
}

/// A single source backing the generated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub domain: String,
    pub url: String,
}

/// Answer text plus its ordered groundings, as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    #[serde(rename = "groundings")]
    pub sources: Vec<Source>,
}

impl SearchResult {
    /// Render the result as the JSON payload sent back in the tool response.
    pub fn to_json(&self) -> Result<String, SearchError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Fully resolved parameters of one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub thinking_level: Option<ThinkingLevel>,
    pub thinking_budget: Option<i32>,
}

/// A source attribution as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    pub title: String,
    pub domain: String,
    pub url: String,
}

/// Raw backend output before it is mapped into a [`SearchResult`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub generated_text: String,
    pub attributions: Vec<Attribution>,
}

impl From<Generation> for SearchResult {
    fn from(generation: Generation) -> Self {
        Self {
            text: generation.generated_text,
            sources: generation
                .attributions
                .into_iter()
                .map(|attr| Source {
                    title: attr.title,
                    domain: attr.domain,
                    url: attr.url,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thinking_level_parse_case_insensitive() {
        assert_eq!("high".parse::<ThinkingLevel>(), Ok(ThinkingLevel::High));
        assert_eq!(" Minimal ".parse::<ThinkingLevel>(), Ok(ThinkingLevel::Minimal));
        assert!("extreme".parse::<ThinkingLevel>().is_err());
    }

    #[test]
    fn test_thinking_level_empty_is_unset() {
        assert_eq!(ThinkingLevel::parse_optional(""), Ok(None));
        assert_eq!(ThinkingLevel::parse_optional("  "), Ok(None));
        assert_eq!(
            ThinkingLevel::parse_optional("low"),
            Ok(Some(ThinkingLevel::Low))
        );
    }

    #[test]
    fn test_query_template_single_placeholder() {
        let template = QueryTemplate::parse("Answer briefly: %s (cite sources)").unwrap();
        assert_eq!(
            template.render("why is the sky blue?"),
            "Answer briefly: why is the sky blue? (cite sources)"
        );
        assert_eq!(template.to_string(), "Answer briefly: %s (cite sources)");
    }

    #[test]
    fn test_query_template_rejects_missing_or_repeated_placeholder() {
        assert!(QueryTemplate::parse("no placeholder here").is_err());
        assert!(QueryTemplate::parse("%s and %s").is_err());
    }

    #[test]
    fn test_query_template_does_not_expand_question() {
        let template = QueryTemplate::parse("Q: %s").unwrap();
        assert_eq!(template.render("100%s sure"), "Q: 100%s sure");
    }

    #[test]
    fn test_search_result_payload_shape() {
        let result = SearchResult {
            text: "T".to_string(),
            sources: vec![Source {
                title: "A".to_string(),
                domain: "a.com".to_string(),
                url: "http://a.com".to_string(),
            }],
        };

        let json = result.to_json().unwrap();
        let decoded: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded["text"], "T");
        assert_eq!(
            decoded["groundings"][0],
            serde_json::json!({"title": "A", "domain": "a.com", "url": "http://a.com"})
        );
    }

    #[test]
    fn test_generation_preserves_attribution_order() {
        let generation = Generation {
            generated_text: "answer".to_string(),
            attributions: vec![
                Attribution {
                    title: "first".to_string(),
                    domain: "one.example".to_string(),
                    url: "https://one.example".to_string(),
                },
                Attribution {
                    title: "second".to_string(),
                    domain: "two.example".to_string(),
                    url: "https://two.example".to_string(),
                },
            ],
        };

        let result = SearchResult::from(generation);
        assert_eq!(result.text, "answer");
        let titles: Vec<_> = result.sources.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
    }
}
