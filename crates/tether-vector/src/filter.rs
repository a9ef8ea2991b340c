//! Metadata filters and their RediSearch rendering

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::VectorStoreError;
use crate::escape::TokenEscaper;
use crate::schema::{Field, IndexSchema};

/// Comparison applied by a metadata filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "nin")]
    Nin,
    #[serde(rename = "text_match")]
    TextMatch,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "is_empty")]
    IsEmpty,
}

impl FilterOperator {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::In => "in",
            Self::Nin => "nin",
            Self::TextMatch => "text_match",
            Self::Contains => "contains",
            Self::IsEmpty => "is_empty",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value compared by a metadata filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl FilterValue {
    fn as_list(&self) -> Vec<String> {
        match self {
            Self::List(values) => values.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::List(values) => f.write_str(&values.join("|")),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

/// A single `key <operator> value` condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub key: String,
    pub value: FilterValue,
    #[serde(default = "default_operator")]
    pub operator: FilterOperator,
}

impl MetadataFilter {
    pub fn new(key: impl Into<String>, operator: FilterOperator, value: impl Into<FilterValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            operator,
        }
    }

    /// Equality filter
    pub fn eq(key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(key, FilterOperator::Eq, value)
    }
}

const fn default_operator() -> FilterOperator {
    FilterOperator::Eq
}

/// How the filters of a group combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCondition {
    #[default]
    And,
    Or,
}

/// Either a filter or a nested group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Filter(MetadataFilter),
    Group(MetadataFilters),
}

/// A group of filters combined by one condition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilters {
    pub filters: Vec<FilterNode>,
    #[serde(default)]
    pub condition: FilterCondition,
}

impl MetadataFilters {
    /// Conjunction of plain filters
    pub fn all(filters: impl IntoIterator<Item = MetadataFilter>) -> Self {
        Self {
            filters: filters.into_iter().map(FilterNode::Filter).collect(),
            condition: FilterCondition::And,
        }
    }

    /// Disjunction of plain filters
    pub fn any(filters: impl IntoIterator<Item = MetadataFilter>) -> Self {
        Self {
            filters: filters.into_iter().map(FilterNode::Filter).collect(),
            condition: FilterCondition::Or,
        }
    }
}

/// Rendered RediSearch filter
///
/// `*` matches everything and is the identity for both combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpression(String);

impl FilterExpression {
    pub const MATCH_ALL: &'static str = "*";

    pub fn match_all() -> Self {
        Self(Self::MATCH_ALL.to_owned())
    }

    pub(crate) const fn from_raw(expression: String) -> Self {
        Self(expression)
    }

    fn is_match_all(&self) -> bool {
        self.0 == Self::MATCH_ALL
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        self.combine(other, " ")
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        self.combine(other, " | ")
    }

    fn combine(self, other: Self, joiner: &str) -> Self {
        if self.is_match_all() {
            return other;
        }
        if other.is_match_all() {
            return self;
        }
        Self(format!("({}{joiner}{})", self.0, other.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn unsupported(field: &str, operator: FilterOperator) -> VectorStoreError {
    VectorStoreError::UnsupportedFilter {
        field: field.to_owned(),
        operator: operator.to_string(),
    }
}

fn numeric(field: &str, value: &FilterValue) -> Result<String, VectorStoreError> {
    match value {
        FilterValue::Int(v) => Ok(v.to_string()),
        FilterValue::Float(v) => Ok(v.to_string()),
        other => Err(VectorStoreError::InvalidFilterValue {
            field: field.to_owned(),
            reason: format!("numeric comparison needs a number, got `{other}`"),
        }),
    }
}

/// Render one filter against the field it targets
///
/// # Errors
///
/// Fails when the operator does not apply to the field's kind or the value
/// does not fit the operator.
pub fn render_filter(
    field: &Field,
    filter: &MetadataFilter,
    escaper: &TokenEscaper,
) -> Result<FilterExpression, VectorStoreError> {
    let name = filter.key.as_str();
    let op = filter.operator;

    let rendered = match field {
        Field::Tag => {
            let negate = match op {
                FilterOperator::Eq | FilterOperator::In => false,
                FilterOperator::Ne | FilterOperator::Nin => true,
                _ => return Err(unsupported(name, op)),
            };
            let values = filter
                .value
                .as_list()
                .iter()
                .filter(|v| !v.is_empty())
                .map(|v| escaper.escape(v))
                .collect::<Vec<_>>();
            // `@field:{}` is a syntax error; an empty value constrains nothing
            if values.is_empty() {
                return Ok(FilterExpression::match_all());
            }
            let values = values.join("|");
            if negate {
                format!("(-@{name}:{{{values}}})")
            } else {
                format!("@{name}:{{{values}}}")
            }
        }
        Field::Numeric => {
            let v = match op {
                FilterOperator::Eq
                | FilterOperator::Ne
                | FilterOperator::Gt
                | FilterOperator::Gte
                | FilterOperator::Lt
                | FilterOperator::Lte => numeric(name, &filter.value)?,
                _ => return Err(unsupported(name, op)),
            };
            match op {
                FilterOperator::Eq => format!("@{name}:[{v} {v}]"),
                FilterOperator::Ne => format!("(-@{name}:[{v} {v}])"),
                FilterOperator::Gt => format!("@{name}:[({v} +inf]"),
                FilterOperator::Gte => format!("@{name}:[{v} +inf]"),
                FilterOperator::Lt => format!("@{name}:[-inf ({v}]"),
                _ => format!("@{name}:[-inf {v}]"),
            }
        }
        Field::Text => {
            let v = filter.value.to_string();
            match op {
                FilterOperator::Eq => format!("@{name}:(\"{v}\")"),
                FilterOperator::Ne => format!("(-@{name}:\"{v}\")"),
                FilterOperator::TextMatch => format!("@{name}:({v})"),
                _ => return Err(unsupported(name, op)),
            }
        }
        Field::Vector(_) => {
            return Err(VectorStoreError::UnsupportedField {
                field: name.to_owned(),
                kind: field.kind().to_owned(),
            });
        }
    };

    Ok(FilterExpression(rendered))
}

/// Render a filter group, recursing into nested groups
///
/// Filters on keys the schema does not declare are skipped with a warning.
///
/// # Errors
///
/// Propagates the first rendering error.
pub fn to_filter_expression(
    schema: &IndexSchema,
    filters: &MetadataFilters,
    escaper: &TokenEscaper,
) -> Result<FilterExpression, VectorStoreError> {
    let mut expression = FilterExpression::match_all();

    for node in &filters.filters {
        let rendered = match node {
            FilterNode::Group(group) => to_filter_expression(schema, group, escaper)?,
            FilterNode::Filter(filter) => {
                let Some(field) = schema.fields.get(&filter.key) else {
                    tracing::warn!(
                        key = %filter.key,
                        "field is not part of the index schema and cannot be used as a filter"
                    );
                    continue;
                };
                render_filter(field, filter, escaper)?
            }
        };

        expression = match filters.condition {
            FilterCondition::And => expression.and(rendered),
            FilterCondition::Or => expression.or(rendered),
        };
    }

    Ok(expression)
}

/// Legacy string rendering: every filter is an escaped tag match
///
/// `in` filters on one key are merged into a single alternation. Nested
/// groups are not supported here and are skipped with a warning.
pub fn to_legacy_filter(schema: &IndexSchema, filters: &MetadataFilters, escaper: &TokenEscaper) -> String {
    let mut parts = Vec::new();
    let mut in_values: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    for node in &filters.filters {
        let FilterNode::Filter(filter) = node else {
            tracing::warn!("nested filter groups are ignored by legacy filters");
            continue;
        };
        if !schema.fields.contains_key(&filter.key) {
            tracing::warn!(
                key = %filter.key,
                "field is not part of the index schema and cannot be used as a filter"
            );
            continue;
        }

        if filter.operator == FilterOperator::In {
            let values = in_values.entry(filter.key.as_str()).or_default();
            for value in filter.value.as_list().into_iter().filter(|v| !v.is_empty()) {
                if value.split_whitespace().count() > 1 {
                    values.push(format!("\"{value}\""));
                } else {
                    values.push(value);
                }
            }
        } else {
            let value = filter.value.to_string();
            if !value.is_empty() {
                parts.push(format!("@{}:{{{}}}", filter.key, escaper.escape(&value)));
            }
        }
    }

    for (key, values) in in_values.into_iter().filter(|(_, values)| !values.is_empty()) {
        parts.push(format!("@{key}:{{{}}}", escaper.escape(&values.join("|"))));
    }

    if parts.is_empty() {
        return FilterExpression::MATCH_ALL.to_owned();
    }

    let joined = parts.iter().map(|p| format!("({p})")).collect::<Vec<_>>().join(" ");
    format!("({joined})")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> IndexSchema {
        IndexSchema::default()
            .with_metadata_field("author", Field::Tag)
            .with_metadata_field("year", Field::Numeric)
            .with_metadata_field("title", Field::Text)
    }

    fn render(filter: &MetadataFilter) -> Result<String, VectorStoreError> {
        let schema = schema();
        let field = schema.fields.get(&filter.key).unwrap();
        render_filter(field, filter, &TokenEscaper::default()).map(|e| e.to_string())
    }

    #[test]
    fn tag_operators() {
        assert_eq!(render(&MetadataFilter::eq("author", "alice")).unwrap(), "@author:{alice}");
        assert_eq!(
            render(&MetadataFilter::new("author", FilterOperator::Ne, "bob smith")).unwrap(),
            r"(-@author:{bob\ smith})"
        );
        let list = vec!["a".to_owned(), "b".to_owned()];
        assert_eq!(
            render(&MetadataFilter::new("author", FilterOperator::In, list.clone())).unwrap(),
            "@author:{a|b}"
        );
        assert_eq!(
            render(&MetadataFilter::new("author", FilterOperator::Nin, list)).unwrap(),
            "(-@author:{a|b})"
        );
    }

    #[test]
    fn empty_tag_values_match_all() {
        assert_eq!(render(&MetadataFilter::eq("author", "")).unwrap(), "*");
        assert_eq!(
            render(&MetadataFilter::new("author", FilterOperator::In, Vec::<String>::new())).unwrap(),
            "*"
        );
        assert_eq!(
            render(&MetadataFilter::new("author", FilterOperator::Nin, vec![String::new()])).unwrap(),
            "*"
        );
        assert!(render(&MetadataFilter::new("author", FilterOperator::Gt, "")).is_err());

        let filters = MetadataFilters::all([
            MetadataFilter::new("author", FilterOperator::In, Vec::<String>::new()),
            MetadataFilter::new("year", FilterOperator::Gte, 2020),
        ]);
        let expression = to_filter_expression(&schema(), &filters, &TokenEscaper::default()).unwrap();
        assert_eq!(expression.as_str(), "@year:[2020 +inf]");
    }

    #[test]
    fn numeric_operators() {
        let cases = [
            (FilterOperator::Eq, "@year:[2020 2020]"),
            (FilterOperator::Ne, "(-@year:[2020 2020])"),
            (FilterOperator::Gt, "@year:[(2020 +inf]"),
            (FilterOperator::Gte, "@year:[2020 +inf]"),
            (FilterOperator::Lt, "@year:[-inf (2020]"),
            (FilterOperator::Lte, "@year:[-inf 2020]"),
        ];
        for (op, expected) in cases {
            assert_eq!(render(&MetadataFilter::new("year", op, 2020)).unwrap(), expected);
        }
        assert_eq!(
            render(&MetadataFilter::new("year", FilterOperator::Gt, 1.5)).unwrap(),
            "@year:[(1.5 +inf]"
        );
    }

    #[test]
    fn text_operators() {
        assert_eq!(render(&MetadataFilter::eq("title", "rust book")).unwrap(), "@title:(\"rust book\")");
        assert_eq!(
            render(&MetadataFilter::new("title", FilterOperator::Ne, "draft")).unwrap(),
            "(-@title:\"draft\")"
        );
        assert_eq!(
            render(&MetadataFilter::new("title", FilterOperator::TextMatch, "rust*")).unwrap(),
            "@title:(rust*)"
        );
    }

    #[test]
    fn unsupported_operators_fail() {
        let err = render(&MetadataFilter::new("author", FilterOperator::Gt, "a")).unwrap_err();
        assert!(matches!(err, VectorStoreError::UnsupportedFilter { ref operator, .. } if operator == ">"));

        let err = render(&MetadataFilter::new("year", FilterOperator::In, 1)).unwrap_err();
        assert!(matches!(err, VectorStoreError::UnsupportedFilter { .. }));

        let err = render(&MetadataFilter::new("title", FilterOperator::Contains, "x")).unwrap_err();
        assert!(matches!(err, VectorStoreError::UnsupportedFilter { .. }));
    }

    #[test]
    fn numeric_needs_number() {
        let err = render(&MetadataFilter::new("year", FilterOperator::Gt, "soon")).unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidFilterValue { .. }));
    }

    #[test]
    fn vector_field_is_not_filterable() {
        let err = render(&MetadataFilter::eq("vector", "x")).unwrap_err();
        assert!(matches!(err, VectorStoreError::UnsupportedField { ref kind, .. } if kind == "vector"));
    }

    #[test]
    fn conjunction_and_disjunction() {
        let schema = schema();
        let escaper = TokenEscaper::default();

        let and = MetadataFilters::all([
            MetadataFilter::eq("author", "alice"),
            MetadataFilter::new("year", FilterOperator::Gte, 2020),
        ]);
        assert_eq!(
            to_filter_expression(&schema, &and, &escaper).unwrap().as_str(),
            "(@author:{alice} @year:[2020 +inf])"
        );

        let or = MetadataFilters::any([MetadataFilter::eq("author", "alice"), MetadataFilter::eq("author", "bob")]);
        assert_eq!(
            to_filter_expression(&schema, &or, &escaper).unwrap().as_str(),
            "(@author:{alice} | @author:{bob})"
        );
    }

    #[test]
    fn empty_group_matches_all() {
        let expression = to_filter_expression(&schema(), &MetadataFilters::default(), &TokenEscaper::default()).unwrap();
        assert_eq!(expression.as_str(), "*");
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let filters = MetadataFilters::all([MetadataFilter::eq("missing", "x"), MetadataFilter::eq("author", "a")]);
        let expression = to_filter_expression(&schema(), &filters, &TokenEscaper::default()).unwrap();
        assert_eq!(expression.as_str(), "@author:{a}");
    }

    #[test]
    fn nested_groups_recurse() {
        let filters = MetadataFilters {
            filters: vec![
                FilterNode::Filter(MetadataFilter::eq("author", "alice")),
                FilterNode::Group(MetadataFilters::any([
                    MetadataFilter::new("year", FilterOperator::Lt, 2000),
                    MetadataFilter::new("year", FilterOperator::Gt, 2020),
                ])),
            ],
            condition: FilterCondition::And,
        };

        let expression = to_filter_expression(&schema(), &filters, &TokenEscaper::default()).unwrap();
        assert_eq!(
            expression.as_str(),
            "(@author:{alice} (@year:[-inf (2000] | @year:[(2020 +inf]))"
        );
    }

    #[test]
    fn legacy_rendering_merges_in_filters() {
        let filters = MetadataFilters::all([
            MetadataFilter::eq("doc_id", "doc-1"),
            MetadataFilter::new("author", FilterOperator::In, "alice"),
            MetadataFilter::new("author", FilterOperator::In, "bob smith"),
            MetadataFilter::eq("unknown", "x"),
        ]);

        let rendered = to_legacy_filter(&schema(), &filters, &TokenEscaper::default());
        assert_eq!(rendered, r#"((@doc_id:{doc\-1}) (@author:{alice|\"bob\ smith\"}))"#);
    }

    #[test]
    fn legacy_rendering_without_filters_matches_all() {
        assert_eq!(to_legacy_filter(&schema(), &MetadataFilters::default(), &TokenEscaper::default()), "*");
    }

    #[test]
    fn legacy_rendering_skips_empty_values() {
        let filters = MetadataFilters::all([
            MetadataFilter::new("author", FilterOperator::In, Vec::<String>::new()),
            MetadataFilter::eq("title", ""),
        ]);
        assert_eq!(to_legacy_filter(&schema(), &filters, &TokenEscaper::default()), "*");

        let filters = MetadataFilters::all([
            MetadataFilter::new("author", FilterOperator::In, vec![String::new(), "alice".to_owned()]),
        ]);
        assert_eq!(to_legacy_filter(&schema(), &filters, &TokenEscaper::default()), "((@author:{alice}))");
    }

    #[test]
    fn filters_deserialize_from_json() {
        let filters: MetadataFilters = serde_json::from_str(
            r#"{"filters": [{"key": "year", "value": 2020, "operator": ">"}, {"filters": [{"key": "author", "value": ["a", "b"], "operator": "in"}], "condition": "or"}], "condition": "and"}"#,
        )
        .unwrap();

        assert_eq!(filters.filters.len(), 2);
        assert!(matches!(&filters.filters[0], FilterNode::Filter(f) if f.value == FilterValue::Int(2020)));
        assert!(matches!(&filters.filters[1], FilterNode::Group(g) if g.condition == FilterCondition::Or));
    }
}
