//! Natural-language understanding results and match criteria.
//!
//! An NLU adapter turns a text message into an [`NluResult`]: ranked intents,
//! extracted entities, and optional sentiment/language classification.
//! Branches match against a result with [`NluCriteria`], a conjunction of
//! per-attribute criteria with `is`/`matches`/`contains` operators and a
//! minimum score.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One classified item in an NLU result (an intent, entity, etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NluItem {
    /// Classifier label, e.g. the intent name.
    pub name: String,
    /// Extracted value for entities, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Classifier confidence in `0.0..=1.0`. Absent means unscored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl NluItem {
    /// A named item without value or score.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            score: None,
        }
    }

    /// A named item with a confidence score.
    pub fn scored(name: impl Into<String>, score: f64) -> Self {
        Self {
            name: name.into(),
            value: None,
            score: Some(score),
        }
    }
}

/// The structured output of an NLU adapter for one message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NluResult {
    /// Ranked intents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intents: Vec<NluItem>,
    /// Extracted entities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<NluItem>,
    /// Sentiment classification, if the adapter provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<NluItem>,
    /// Detected language, if the adapter provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<NluItem>,
    /// Overall confidence of the analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl NluResult {
    fn items(&self, attribute: NluAttribute) -> Vec<&NluItem> {
        match attribute {
            NluAttribute::Intent => self.intents.iter().collect(),
            NluAttribute::Entity => self.entities.iter().collect(),
            NluAttribute::Sentiment => self.sentiment.iter().collect(),
            NluAttribute::Language => self.language.iter().collect(),
        }
    }
}

/// Which part of an [`NluResult`] a criterion inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NluAttribute {
    Intent,
    Entity,
    Sentiment,
    Language,
}

/// How a criterion compares item names against its value.
#[derive(Debug, Clone)]
pub enum NluOperator {
    /// Item name equals the value exactly.
    Is(String),
    /// Item name matches the pattern.
    Matches(Regex),
    /// Item name contains the value as a substring.
    Contains(String),
}

/// One attribute test: operator plus an optional minimum score.
#[derive(Debug, Clone)]
pub struct NluCriterion {
    /// Attribute to inspect.
    pub attribute: NluAttribute,
    /// Comparison operator.
    pub operator: NluOperator,
    /// Items scoring below this threshold are ignored. Unscored items pass.
    pub score: Option<f64>,
}

impl NluCriterion {
    /// Exact-name criterion.
    pub fn is(attribute: NluAttribute, value: impl Into<String>) -> Self {
        Self {
            attribute,
            operator: NluOperator::Is(value.into()),
            score: None,
        }
    }

    /// Substring criterion.
    pub fn contains(attribute: NluAttribute, value: impl Into<String>) -> Self {
        Self {
            attribute,
            operator: NluOperator::Contains(value.into()),
            score: None,
        }
    }

    /// Pattern criterion. Fails early on an invalid pattern so branch
    /// registration surfaces the error.
    pub fn matches(attribute: NluAttribute, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            attribute,
            operator: NluOperator::Matches(Regex::new(pattern)?),
            score: None,
        })
    }

    /// Require a minimum score for items considered by this criterion.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    fn accepts(&self, item: &NluItem) -> bool {
        if let Some(threshold) = self.score {
            if let Some(score) = item.score {
                if score < threshold {
                    return false;
                }
            }
        }
        match &self.operator {
            NluOperator::Is(value) => item.name == *value,
            NluOperator::Matches(re) => re.is_match(&item.name),
            NluOperator::Contains(value) => item.name.contains(value.as_str()),
        }
    }
}

/// A conjunction of criteria; every criterion must accept at least one item.
#[derive(Debug, Clone, Default)]
pub struct NluCriteria {
    criteria: Vec<NluCriterion>,
}

impl NluCriteria {
    /// Empty criteria set (matches any non-empty result).
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single intent-name criterion.
    pub fn intent(name: impl Into<String>) -> Self {
        Self::new().and(NluCriterion::is(NluAttribute::Intent, name))
    }

    /// Add a criterion.
    pub fn and(mut self, criterion: NluCriterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Evaluate against a result. Returns the accepted items per criterion
    /// as match data, or `None` when any criterion finds no accepted item.
    pub fn apply(&self, result: &NluResult) -> Option<Value> {
        let mut accepted = Vec::with_capacity(self.criteria.len());
        for criterion in &self.criteria {
            let hits: Vec<Value> = result
                .items(criterion.attribute)
                .into_iter()
                .filter(|item| criterion.accepts(item))
                .map(|item| serde_json::to_value(item).unwrap_or(Value::Null))
                .collect();
            if hits.is_empty() {
                return None;
            }
            accepted.push(Value::Array(hits));
        }
        Some(Value::Array(accepted))
    }

    /// Whether any criteria have been added.
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}
