//! Filter trees, sort specs and list arguments.
//!
//! The filter tree is what the condition compiler lowers: leaves compare a
//! column against a value, groups combine children under AND/OR. Depth is
//! unbounded.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical combinator of a filter group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    /// All children must hold.
    #[default]
    And,
    /// Any child must hold.
    Or,
}

impl LogicalOp {
    /// SQL keyword.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Comparison operator of a filter leaf.
///
/// Parsing never fails: an unknown operator falls back to [`Self::Eq`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparisonOp {
    /// Equal.
    #[default]
    Eq,
    /// Not equal.
    Neq,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Case-insensitive contains.
    Like,
    /// Negated case-insensitive contains.
    Nlike,
    /// IS NULL.
    Null,
    /// IS NOT NULL.
    NotNull,
    /// NULL or empty string.
    Empty,
    /// Neither NULL nor empty string.
    NotEmpty,
    /// Array membership.
    In,
    /// Negated array membership.
    NotIn,
    /// Inclusive two-element range.
    Between,
    /// Negated inclusive range.
    NotBetween,
    /// Multi-select: contains every given option.
    AllOf,
    /// Multi-select: contains at least one given option.
    AnyOf,
    /// Negation of [`Self::AllOf`].
    NAllOf,
    /// Negation of [`Self::AnyOf`].
    NAnyOf,
}

impl ComparisonOp {
    /// Parse with equality fallback for unknown names.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Self::Eq,
            "neq" | "ne" => Self::Neq,
            "lt" => Self::Lt,
            "lte" | "le" => Self::Lte,
            "gt" => Self::Gt,
            "gte" | "ge" => Self::Gte,
            "like" => Self::Like,
            "nlike" => Self::Nlike,
            "null" | "is" => Self::Null,
            "notnull" | "isnot" => Self::NotNull,
            "empty" => Self::Empty,
            "notempty" => Self::NotEmpty,
            "in" => Self::In,
            "notin" => Self::NotIn,
            "between" | "btw" => Self::Between,
            "notbetween" | "nbtw" => Self::NotBetween,
            "allof" => Self::AllOf,
            "anyof" => Self::AnyOf,
            "nallof" => Self::NAllOf,
            "nanyof" => Self::NAnyOf,
            _ => Self::Eq,
        }
    }

    /// Canonical name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Like => "like",
            Self::Nlike => "nlike",
            Self::Null => "null",
            Self::NotNull => "notnull",
            Self::Empty => "empty",
            Self::NotEmpty => "notempty",
            Self::In => "in",
            Self::NotIn => "notin",
            Self::Between => "between",
            Self::NotBetween => "notbetween",
            Self::AllOf => "allof",
            Self::AnyOf => "anyof",
            Self::NAllOf => "nallof",
            Self::NAnyOf => "nanyof",
        }
    }

    /// Whether this operator takes no right-hand value.
    #[must_use]
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Self::Null | Self::NotNull | Self::Empty | Self::NotEmpty
        )
    }
}

impl Serialize for ComparisonOp {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ComparisonOp {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(Self::parse(&raw))
    }
}

/// A leaf comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterLeaf {
    /// Column key: id, title or storage name.
    #[serde(alias = "fk_column_id")]
    pub column: String,
    /// Comparison operator.
    #[serde(alias = "comparison_op", default)]
    pub op: ComparisonOp,
    /// Right-hand value; ignored for unary operators.
    #[serde(default)]
    pub value: Value,
}

/// A group of children combined under one logical operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    /// Combinator for the children.
    #[serde(alias = "logical_op", default)]
    pub op: LogicalOp,
    /// Child nodes; nesting depth is unbounded.
    pub children: Vec<FilterNode>,
}

/// One node of a filter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    /// Interior node.
    Group(FilterGroup),
    /// Leaf comparison.
    Leaf(FilterLeaf),
}

impl FilterNode {
    /// Shorthand for a leaf.
    pub fn leaf(column: impl Into<String>, op: ComparisonOp, value: Value) -> Self {
        Self::Leaf(FilterLeaf {
            column: column.into(),
            op,
            value,
        })
    }

    /// Shorthand for a group.
    #[must_use]
    pub fn group(op: LogicalOp, children: Vec<FilterNode>) -> Self {
        Self::Group(FilterGroup { op, children })
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending, NULLs last.
    #[default]
    Asc,
    /// Descending, NULLs first.
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Column key: id, title or storage name.
    #[serde(alias = "fk_column_id")]
    pub column: String,
    /// Direction.
    #[serde(default)]
    pub direction: SortDirection,
}

/// Arguments of a list/count request.
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    /// Structured filter trees, implicitly ANDed together.
    pub filters: Vec<FilterNode>,
    /// Sort keys, applied in order.
    pub sorts: Vec<SortSpec>,
    /// Legacy `(field,op,value)~and(...)` filter string.
    pub where_str: Option<String>,
    /// Legacy `+f,-f,f:asc` sort string.
    pub sort_str: Option<String>,
    /// Projection restriction; all non-virtual columns when absent.
    pub fields: Option<Vec<String>>,
    /// Requested page size, clamped by [`ListLimits`].
    pub limit: Option<u64>,
    /// Requested offset.
    pub offset: Option<u64>,
}

/// Page-size clamping configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLimits {
    /// Page size applied when the caller sends none.
    pub default: u64,
    /// Smallest honored page size.
    pub min: u64,
    /// Largest honored page size.
    pub max: u64,
}

impl Default for ListLimits {
    fn default() -> Self {
        Self {
            default: 25,
            min: 1,
            max: 1000,
        }
    }
}

impl ListLimits {
    /// Clamp a requested page size into the configured window.
    #[must_use]
    pub fn clamp(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default)
            .clamp(self.min, self.max)
    }
}

/// Pagination echo returned alongside list results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Effective (clamped) page size.
    pub limit: u64,
    /// Effective offset.
    pub offset: u64,
    /// Whether this is the first page.
    pub is_first: bool,
    /// Whether the page was not filled, i.e. no later page exists.
    pub is_last: bool,
}

/// Aggregate applied by a group-by request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFn {
    /// Row count.
    Count,
    /// Numeric sum.
    Sum,
    /// Numeric average.
    Avg,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
}

impl AggFn {
    /// SQL function name.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// Arguments of a group-by request.
#[derive(Debug, Clone)]
pub struct GroupByArgs {
    /// Column to group on.
    pub column: String,
    /// Aggregate to compute per group.
    pub agg: AggFn,
    /// Column the aggregate runs over; required for everything but count.
    pub agg_column: Option<String>,
    /// Filter trees applied before grouping.
    pub filters: Vec<FilterNode>,
    /// Legacy filter string applied before grouping.
    pub where_str: Option<String>,
    /// Page size for groups.
    pub limit: Option<u64>,
    /// Offset for groups.
    pub offset: Option<u64>,
}
