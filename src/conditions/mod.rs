//! Declarative match conditions compiled to regular expressions.
//!
//! A [`Conditions`] value is built from one of:
//! - an expression literal in the form `/pattern/flags`,
//! - a pre-compiled [`regex::Regex`],
//! - a single [`Condition`] key map,
//! - a list of Conditions, or
//! - a named collection of Conditions.
//!
//! Each [`Condition`] maps semantic keys (`is`, `starts`, `ends`, `contains`,
//! `excludes`, `before`, `after`, `range`) to one or more values. Values
//! within a key are OR-ed; keys concatenate in declaration order into a
//! single pattern where only the last capture group remains capturing.
//!
//! The `excludes` key is the one divergence from a literal pattern
//! concatenation: the `regex` engine has no lookaround, so `excludes`
//! compiles to its own pattern held with negative polarity and
//! [`Conditions::exec`] succeeds for it when that pattern does NOT match.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ExpressionError;

/// One value or several; values within a condition key are OR-ed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn values(&self) -> Vec<&str> {
        match self {
            OneOrMany::One(v) => vec![v.as_str()],
            OneOrMany::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for OneOrMany {
    fn from(v: &str) -> Self {
        OneOrMany::One(v.to_string())
    }
}

impl From<String> for OneOrMany {
    fn from(v: String) -> Self {
        OneOrMany::One(v)
    }
}

impl From<Vec<String>> for OneOrMany {
    fn from(vs: Vec<String>) -> Self {
        OneOrMany::Many(vs)
    }
}

/// A semantic key map. Keys concatenate in field declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
    /// Whole input equals the value.
    pub is: Option<OneOrMany>,
    /// Input begins with the value.
    pub starts: Option<OneOrMany>,
    /// Input ends with the value.
    pub ends: Option<OneOrMany>,
    /// Value appears as a word or substring.
    pub contains: Option<OneOrMany>,
    /// Value does NOT appear anywhere.
    pub excludes: Option<OneOrMany>,
    /// Captures the text preceding the value.
    pub before: Option<OneOrMany>,
    /// Captures the text following the value.
    pub after: Option<OneOrMany>,
    /// Numeric range `"lo-hi"`, both bounds in `0-999`.
    pub range: Option<OneOrMany>,
}

/// Per-Conditions matching options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConditionsOptions {
    /// Apply word boundaries around matched values.
    pub match_word: bool,
    /// Case-insensitive matching.
    pub ignore_case: bool,
    /// Treat punctuation inside matched values as optional.
    pub ignore_punctuation: bool,
}

impl Default for ConditionsOptions {
    fn default() -> Self {
        Self {
            match_word: true,
            ignore_case: true,
            ignore_punctuation: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// A compiled pattern fragment for one condition key. The capture group body
/// is kept separate so that assembly can demote all but the last group to
/// non-capturing.
struct Segment {
    pre: String,
    group: String,
    post: String,
    /// Escaped value alternation at the segment's tail, available for
    /// deduplication by a following `after` of the same value.
    tail_value: Option<String>,
}

fn escape_value(value: &str, ignore_punctuation: bool) -> String {
    let mut out = String::new();
    for c in value.chars() {
        let is_punct = matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '"');
        if c.is_alphanumeric() || c == ' ' || c == '_' {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
        if is_punct && ignore_punctuation {
            out.push('?');
        }
    }
    out
}

fn alternation(values: &OneOrMany, opts: &ConditionsOptions) -> String {
    values
        .values()
        .iter()
        .map(|v| escape_value(v, opts.ignore_punctuation))
        .collect::<Vec<_>>()
        .join("|")
}

/// Expand `"lo-hi"` into an explicit numeric alternation, longest first so
/// leftmost-first alternation prefers the full number.
fn range_alternation(values: &OneOrMany) -> Result<String, ExpressionError> {
    let mut numbers: Vec<String> = Vec::new();
    for value in values.values() {
        let (lo, hi) = value
            .split_once('-')
            .ok_or_else(|| ExpressionError::InvalidRange(value.to_string()))?;
        let lo: u32 = lo
            .trim()
            .parse()
            .map_err(|_| ExpressionError::InvalidRange(value.to_string()))?;
        let hi: u32 = hi
            .trim()
            .parse()
            .map_err(|_| ExpressionError::InvalidRange(value.to_string()))?;
        if lo > hi || hi > 999 {
            return Err(ExpressionError::InvalidRange(value.to_string()));
        }
        numbers.extend((lo..=hi).map(|n| n.to_string()));
    }
    numbers.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    numbers.dedup();
    Ok(numbers.join("|"))
}

struct Compiled {
    regex: Option<Regex>,
    negations: Vec<Regex>,
}

fn compile_condition(
    condition: &Condition,
    opts: &ConditionsOptions,
) -> Result<Compiled, ExpressionError> {
    let word = |b: &str| if opts.match_word { b.to_string() } else { String::new() };
    let mut segments: Vec<Segment> = Vec::new();
    let mut negations: Vec<Regex> = Vec::new();
    let flags = if opts.ignore_case { "(?i)" } else { "" };

    if let Some(values) = &condition.is {
        let alt = alternation(values, opts);
        segments.push(Segment {
            pre: "^".to_string(),
            group: alt.clone(),
            post: "$".to_string(),
            tail_value: Some(alt),
        });
    }
    if let Some(values) = &condition.starts {
        let alt = alternation(values, opts);
        segments.push(Segment {
            pre: "^".to_string(),
            group: alt.clone(),
            post: word("\\b"),
            tail_value: Some(alt),
        });
    }
    if let Some(values) = &condition.ends {
        let alt = alternation(values, opts);
        segments.push(Segment {
            pre: word("\\b"),
            group: alt,
            post: "$".to_string(),
            tail_value: None,
        });
    }
    if let Some(values) = &condition.contains {
        let alt = alternation(values, opts);
        segments.push(Segment {
            pre: word("\\b"),
            group: alt.clone(),
            post: word("\\b"),
            tail_value: Some(alt),
        });
    }
    if let Some(values) = &condition.excludes {
        let alt = alternation(values, opts);
        let boundary = word("\\b");
        negations.push(Regex::new(&format!(
            "{flags}{boundary}({alt}){boundary}"
        ))?);
    }
    if let Some(values) = &condition.before {
        let alt = alternation(values, opts);
        segments.push(Segment {
            pre: String::new(),
            group: ".*".to_string(),
            post: format!("(?:\\s?{alt})"),
            tail_value: Some(alt),
        });
    }
    if let Some(values) = &condition.after {
        let alt = alternation(values, opts);
        // Dedupe the join: when the previous segment already consumed this
        // value, only an optional separator remains before the capture.
        let pre = match segments.last().and_then(|s| s.tail_value.as_ref()) {
            Some(tail) if *tail == alt => "\\s?".to_string(),
            _ => format!("(?:{alt}\\s?)"),
        };
        segments.push(Segment {
            pre,
            group: ".*".to_string(),
            post: String::new(),
            tail_value: None,
        });
    }
    if let Some(values) = &condition.range {
        let alt = range_alternation(values)?;
        segments.push(Segment {
            pre: "\\b".to_string(),
            group: alt,
            post: "\\b".to_string(),
            tail_value: None,
        });
    }

    if segments.is_empty() {
        return Ok(Compiled {
            regex: None,
            negations,
        });
    }

    // All capture groups except the last become non-capturing so the last
    // group is the canonical capture.
    let last = segments.len() - 1;
    let mut pattern = String::from(flags);
    for (i, seg) in segments.iter().enumerate() {
        if i == last {
            pattern.push_str(&format!("{}({}){}", seg.pre, seg.group, seg.post));
        } else {
            pattern.push_str(&format!("{}(?:{}){}", seg.pre, seg.group, seg.post));
        }
    }
    Ok(Compiled {
        regex: Some(Regex::new(&pattern)?),
        negations,
    })
}

/// Parse an expression literal of the form `/pattern/flags`.
fn parse_expression(literal: &str) -> Result<Regex, ExpressionError> {
    let invalid = || ExpressionError::InvalidExpression(literal.to_string());
    let rest = literal.strip_prefix('/').ok_or_else(invalid)?;
    let close = rest.rfind('/').ok_or_else(invalid)?;
    let (pattern, flags) = rest.split_at(close);
    let flags = &flags[1..];
    if pattern.is_empty() {
        return Err(invalid());
    }
    let mut inline = String::new();
    for flag in flags.chars() {
        match flag {
            'i' => inline.push_str("(?i)"),
            'm' => inline.push_str("(?m)"),
            's' => inline.push_str("(?s)"),
            // Host-platform flags with no engine counterpart.
            'g' | 'u' => {}
            _ => return Err(invalid()),
        }
    }
    Ok(Regex::new(&format!("{inline}{pattern}"))?)
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Single,
    List,
    Named,
}

#[derive(Debug, Clone)]
struct Entry {
    name: Option<String>,
    regex: Option<Regex>,
    negations: Vec<Regex>,
}

/// A compiled set of match conditions.
#[derive(Debug, Clone)]
pub struct Conditions {
    entries: Vec<Entry>,
    shape: Shape,
}

impl Conditions {
    /// Compile an expression literal (`/pattern/flags`).
    pub fn from_expression(literal: &str) -> Result<Self, ExpressionError> {
        Ok(Self::from_regex(parse_expression(literal)?))
    }

    /// Wrap a pre-compiled pattern.
    pub fn from_regex(regex: Regex) -> Self {
        Self {
            entries: vec![Entry {
                name: None,
                regex: Some(regex),
                negations: Vec::new(),
            }],
            shape: Shape::Single,
        }
    }

    /// Compile a single condition with default options.
    pub fn from_condition(condition: Condition) -> Result<Self, ExpressionError> {
        Self::from_condition_with(condition, ConditionsOptions::default())
    }

    /// Compile a single condition with explicit options.
    pub fn from_condition_with(
        condition: Condition,
        opts: ConditionsOptions,
    ) -> Result<Self, ExpressionError> {
        let compiled = compile_condition(&condition, &opts)?;
        Ok(Self {
            entries: vec![Entry {
                name: None,
                regex: compiled.regex,
                negations: compiled.negations,
            }],
            shape: Shape::Single,
        })
    }

    /// Compile a list of conditions; all must match for success.
    pub fn from_list(
        conditions: Vec<Condition>,
        opts: ConditionsOptions,
    ) -> Result<Self, ExpressionError> {
        let mut entries = Vec::with_capacity(conditions.len());
        for condition in &conditions {
            let compiled = compile_condition(condition, &opts)?;
            entries.push(Entry {
                name: None,
                regex: compiled.regex,
                negations: compiled.negations,
            });
        }
        Ok(Self {
            entries,
            shape: Shape::List,
        })
    }

    /// Compile a named collection of conditions, preserving insertion order.
    pub fn from_named(
        conditions: Vec<(String, Condition)>,
        opts: ConditionsOptions,
    ) -> Result<Self, ExpressionError> {
        let mut entries = Vec::with_capacity(conditions.len());
        for (name, condition) in &conditions {
            let compiled = compile_condition(condition, &opts)?;
            entries.push(Entry {
                name: Some(name.clone()),
                regex: compiled.regex,
                negations: compiled.negations,
            });
        }
        Ok(Self {
            entries,
            shape: Shape::Named,
        })
    }

    /// Run every condition against the input.
    pub fn exec(&self, text: &str) -> ConditionsOutcome {
        let mut results = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let negated = entry.negations.iter().any(|re| re.is_match(text));
            let outcome = match &entry.regex {
                Some(regex) => match regex.captures(text) {
                    Some(caps) if !negated => {
                        let matched_text = caps.get(0).map(|m| m.as_str().to_string());
                        let captures: Vec<Option<String>> = (1..caps.len())
                            .map(|i| caps.get(i).map(|m| m.as_str().to_string()))
                            .collect();
                        let captured = captures
                            .last()
                            .and_then(|c| c.as_deref())
                            .map(trim_captured);
                        ConditionOutcome {
                            matched: true,
                            matched_text,
                            captures,
                            captured,
                        }
                    }
                    _ => ConditionOutcome::unmatched(),
                },
                // Pure `excludes` condition: succeeds when nothing matched.
                None => ConditionOutcome {
                    matched: !negated,
                    matched_text: None,
                    captures: Vec::new(),
                    captured: None,
                },
            };
            results.push((entry.name.clone(), outcome));
        }
        let success = !results.is_empty() && results.iter().all(|(_, o)| o.matched);
        ConditionsOutcome {
            shape: self.shape,
            success,
            results,
        }
    }
}

fn trim_captured(raw: &str) -> String {
    raw.trim_matches(|c: char| matches!(c, ',' | '-' | ':' | ' ' | '\t'))
        .to_string()
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Match result for one condition.
#[derive(Debug, Clone)]
pub struct ConditionOutcome {
    /// Whether the condition matched (for `excludes`, whether it held).
    pub matched: bool,
    /// The full matched text, when a pattern matched.
    pub matched_text: Option<String>,
    /// Raw capture groups in pattern order.
    pub captures: Vec<Option<String>>,
    /// The canonical (last) capture, trimmed of `,-: \t`.
    pub captured: Option<String>,
}

impl ConditionOutcome {
    fn unmatched() -> Self {
        Self {
            matched: false,
            matched_text: None,
            captures: Vec::new(),
            captured: None,
        }
    }
}

/// Aggregated result of running [`Conditions::exec`].
#[derive(Debug, Clone)]
pub struct ConditionsOutcome {
    shape: Shape,
    /// All conditions matched.
    pub success: bool,
    results: Vec<(Option<String>, ConditionOutcome)>,
}

impl ConditionsOutcome {
    /// Per-condition outcomes in declaration order.
    pub fn results(&self) -> impl Iterator<Item = &ConditionOutcome> {
        self.results.iter().map(|(_, o)| o)
    }

    /// Single match when only one condition was supplied, boolean success
    /// otherwise.
    pub fn match_value(&self) -> Value {
        if self.shape == Shape::Single {
            match self.results.first() {
                Some((_, outcome)) if outcome.matched => {
                    let mut arr = vec![outcome
                        .matched_text
                        .clone()
                        .map(Value::String)
                        .unwrap_or(Value::Bool(true))];
                    arr.extend(
                        outcome
                            .captures
                            .iter()
                            .map(|c| c.clone().map(Value::String).unwrap_or(Value::Null)),
                    );
                    Value::Array(arr)
                }
                _ => Value::Null,
            }
        } else {
            Value::Bool(self.success)
        }
    }

    /// The canonical captures: a single value for a single unnamed
    /// condition, a map for a named collection, an array for a list.
    pub fn captured_value(&self) -> Value {
        self.collect(|o| o.captured.clone().map(Value::String).unwrap_or(Value::Null))
    }

    /// The full matched text per condition, shaped like
    /// [`captured_value`](Self::captured_value).
    pub fn matched_value(&self) -> Value {
        self.collect(|o| {
            o.matched_text
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null)
        })
    }

    /// Convenience accessor for the single-condition captured string.
    pub fn captured(&self) -> Option<&str> {
        self.results
            .first()
            .and_then(|(_, o)| o.captured.as_deref())
    }

    fn collect(&self, f: impl Fn(&ConditionOutcome) -> Value) -> Value {
        match self.shape {
            Shape::Single => self.results.first().map(|(_, o)| f(o)).unwrap_or(Value::Null),
            Shape::List => Value::Array(self.results.iter().map(|(_, o)| f(o)).collect()),
            Shape::Named => {
                let mut map = Map::new();
                for (name, outcome) in &self.results {
                    if let Some(name) = name {
                        map.insert(name.clone(), f(outcome));
                    }
                }
                Value::Object(map)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(f: impl FnOnce(&mut Condition)) -> Condition {
        let mut c = Condition::default();
        f(&mut c);
        c
    }

    #[test]
    fn test_expression_literal() {
        let conditions = Conditions::from_expression("/hello/i").unwrap();
        assert!(conditions.exec("well HELLO there").success);
        assert!(!conditions.exec("goodbye").success);
    }

    #[test]
    fn test_malformed_expression() {
        assert!(matches!(
            Conditions::from_expression("hello"),
            Err(ExpressionError::InvalidExpression(_))
        ));
        assert!(matches!(
            Conditions::from_expression("/hello"),
            Err(ExpressionError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_is_natural_input() {
        let conditions =
            Conditions::from_condition(cond(|c| c.is = Some("deploy".into()))).unwrap();
        assert!(conditions.exec("deploy").success);
        assert!(!conditions.exec("deploy now").success);
    }

    #[test]
    fn test_contains_with_wrapping_whitespace() {
        let conditions =
            Conditions::from_condition(cond(|c| c.contains = Some("pizza".into()))).unwrap();
        assert!(conditions.exec(" pizza ").success);
        assert!(conditions.exec("order pizza now").success);
        assert!(!conditions.exec("pizzeria").success);
    }

    #[test]
    fn test_contains_without_word_boundary() {
        let opts = ConditionsOptions {
            match_word: false,
            ..Default::default()
        };
        let conditions =
            Conditions::from_condition_with(cond(|c| c.contains = Some("pizz".into())), opts)
                .unwrap();
        assert!(conditions.exec("pizzeria").success);
    }

    #[test]
    fn test_starts_and_ends() {
        let starts =
            Conditions::from_condition(cond(|c| c.starts = Some("hey".into()))).unwrap();
        assert!(starts.exec("hey there").success);
        assert!(!starts.exec("oh hey").success);

        let ends = Conditions::from_condition(cond(|c| c.ends = Some("bye".into()))).unwrap();
        assert!(ends.exec("ok bye").success);
        assert!(!ends.exec("bye now").success);
    }

    #[test]
    fn test_excludes_inverts() {
        let conditions =
            Conditions::from_condition(cond(|c| c.excludes = Some("spam".into()))).unwrap();
        assert!(conditions.exec("just ham").success);
        assert!(!conditions.exec("ham and spam").success);
    }

    #[test]
    fn test_contains_with_excludes() {
        let conditions = Conditions::from_condition(cond(|c| {
            c.contains = Some("order".into());
            c.excludes = Some("cancel".into());
        }))
        .unwrap();
        assert!(conditions.exec("new order please").success);
        assert!(!conditions.exec("cancel my order").success);
    }

    #[test]
    fn test_after_captures() {
        let conditions =
            Conditions::from_condition(cond(|c| c.after = Some("remind me to".into()))).unwrap();
        let outcome = conditions.exec("remind me to feed the cat");
        assert!(outcome.success);
        assert_eq!(outcome.captured(), Some("feed the cat"));
    }

    #[test]
    fn test_before_captures() {
        let conditions =
            Conditions::from_condition(cond(|c| c.before = Some("please".into()))).unwrap();
        let outcome = conditions.exec("open the door please");
        assert!(outcome.success);
        assert_eq!(outcome.captured(), Some("open the door"));
    }

    #[test]
    fn test_starts_after_composition() {
        // starts + after of the same value: the join is deduplicated and the
        // trailing capture is canonical.
        let conditions = Conditions::from_condition(cond(|c| {
            c.starts = Some("set".into());
            c.after = Some("set".into());
        }))
        .unwrap();
        let outcome = conditions.exec("set alarm 7");
        assert!(outcome.success);
        assert_eq!(outcome.captured(), Some("alarm 7"));
    }

    #[test]
    fn test_before_after_duplicate_capture_dedup() {
        let conditions = Conditions::from_condition(cond(|c| {
            c.before = Some("x".into());
            c.after = Some("x".into());
        }))
        .unwrap();
        let outcome = conditions.exec("x foo");
        assert!(outcome.success);
        assert_eq!(outcome.captured(), Some("foo"));
        // Exactly one canonical capture.
        assert_eq!(outcome.captured_value(), Value::String("foo".to_string()));
    }

    #[test]
    fn test_range() {
        let conditions =
            Conditions::from_condition(cond(|c| c.range = Some("2-30".into()))).unwrap();
        assert!(conditions.exec("pick 25 apples").success);
        assert_eq!(conditions.exec("pick 25 apples").captured(), Some("25"));
        assert!(!conditions.exec("pick 31 apples").success);
    }

    #[test]
    fn test_range_validation() {
        assert!(matches!(
            Conditions::from_condition(cond(|c| c.range = Some("5-1".into()))),
            Err(ExpressionError::InvalidRange(_))
        ));
        assert!(matches!(
            Conditions::from_condition(cond(|c| c.range = Some("0-1000".into()))),
            Err(ExpressionError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_or_values_within_key() {
        let conditions = Conditions::from_condition(cond(|c| {
            c.contains = Some(vec!["cat".to_string(), "dog".to_string()].into());
        }))
        .unwrap();
        assert!(conditions.exec("walk the dog").success);
        assert!(conditions.exec("feed the cat").success);
        assert!(!conditions.exec("feed the fish").success);
    }

    #[test]
    fn test_ignore_case_off() {
        let opts = ConditionsOptions {
            ignore_case: false,
            ..Default::default()
        };
        let conditions =
            Conditions::from_condition_with(cond(|c| c.contains = Some("Hello".into())), opts)
                .unwrap();
        assert!(conditions.exec("Hello there").success);
        assert!(!conditions.exec("hello there").success);
    }

    #[test]
    fn test_ignore_punctuation() {
        let opts = ConditionsOptions {
            ignore_punctuation: true,
            ..Default::default()
        };
        let conditions =
            Conditions::from_condition_with(cond(|c| c.contains = Some("dr. who".into())), opts)
                .unwrap();
        assert!(conditions.exec("calling dr who").success);
        assert!(conditions.exec("calling dr. who").success);
    }

    #[test]
    fn test_named_collection_shapes() {
        let conditions = Conditions::from_named(
            vec![
                ("verb".to_string(), cond(|c| c.starts = Some("open".into()))),
                (
                    "target".to_string(),
                    cond(|c| c.after = Some("open".into())),
                ),
            ],
            ConditionsOptions::default(),
        )
        .unwrap();
        let outcome = conditions.exec("open the pod bay doors");
        assert!(outcome.success);
        let captured = outcome.captured_value();
        assert_eq!(captured["target"], "the pod bay doors");
        // Multiple conditions aggregate `match` to boolean success.
        assert_eq!(outcome.match_value(), Value::Bool(true));
    }

    #[test]
    fn test_list_requires_all() {
        let conditions = Conditions::from_list(
            vec![
                cond(|c| c.contains = Some("sauce".into())),
                cond(|c| c.excludes = Some("pineapple".into())),
            ],
            ConditionsOptions::default(),
        )
        .unwrap();
        assert!(conditions.exec("extra sauce").success);
        assert!(!conditions.exec("extra sauce with pineapple").success);
    }

    #[test]
    fn test_single_match_value_is_match_array() {
        let conditions =
            Conditions::from_condition(cond(|c| c.after = Some("say".into()))).unwrap();
        let outcome = conditions.exec("say hello world");
        match outcome.match_value() {
            Value::Array(items) => assert!(!items.is_empty()),
            other => panic!("expected match array, got {other:?}"),
        }
    }

    #[test]
    fn test_captured_trims_separators() {
        let conditions =
            Conditions::from_condition(cond(|c| c.after = Some("todo".into()))).unwrap();
        let outcome = conditions.exec("todo: buy milk");
        assert_eq!(outcome.captured(), Some("buy milk"));
    }
}
