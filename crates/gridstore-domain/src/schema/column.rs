//! Column model.
//!
//! The logical type of a column is a closed tagged variant: virtual kinds
//! carry their compilation inputs (formula text, relation ids, rollup
//! function) as payload, so every compiler can be a total match over the
//! enum instead of a string-tag switch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One option of a single- or multi-select column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Stored value.
    pub value: String,
    /// Display color, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Aggregation applied by a rollup column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupFn {
    /// Row count over the relation.
    Count,
    /// Sum of the rolled-up column, coerced numeric.
    Sum,
    /// Average of the rolled-up column, coerced numeric.
    Avg,
    /// Minimum of the rolled-up column.
    Min,
    /// Maximum of the rolled-up column.
    Max,
    /// Count of rows where the rolled-up column is NULL or empty.
    CountEmpty,
    /// Complement of [`RollupFn::CountEmpty`].
    CountNotEmpty,
    /// Count of distinct values.
    CountDistinct,
    /// Sum of distinct values, coerced numeric.
    SumDistinct,
    /// Average of distinct values, coerced numeric.
    AvgDistinct,
}

/// Relation kind of a link column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkKind {
    /// Many-to-many, represented as edges in the links table.
    #[serde(rename = "mm")]
    ManyToMany,
    /// Has-many, represented by a foreign-key column in the child's JSON blob.
    #[serde(rename = "hm")]
    HasMany,
    /// Belongs-to, represented by a foreign-key column in the owner's JSON blob.
    #[serde(rename = "bt")]
    BelongsTo,
}

/// Relation declaration carried by a link column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// Relation kind.
    pub kind: LinkKind,
    /// Table on the other side of the relation.
    pub related_table_id: String,
    /// Inverse link column on the related table, when bidirectional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symmetric_column_id: Option<String>,
    /// Storage name of the FK column for has-many (on the child) and
    /// belongs-to (on the owner). Unused for many-to-many.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fk_column_name: Option<String>,
}

/// Logical column type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnKind {
    /// Single-line text.
    Text,
    /// Multi-line text.
    LongText,
    /// Integer-ish number.
    Number,
    /// Arbitrary-precision decimal.
    Decimal,
    /// Currency amount.
    Currency,
    /// Percentage.
    Percent,
    /// Star rating.
    Rating,
    /// Boolean.
    Checkbox,
    /// Calendar date.
    Date,
    /// Date and time.
    DateTime,
    /// Time of day.
    Time,
    /// Duration in seconds.
    Duration,
    /// Email address.
    Email,
    /// Phone number.
    Phone,
    /// URL.
    Url,
    /// One of a fixed option set.
    SingleSelect {
        /// Declared options.
        #[serde(default)]
        options: Vec<SelectOption>,
    },
    /// Any subset of a fixed option set, stored as a JSON array.
    MultiSelect {
        /// Declared options.
        #[serde(default)]
        options: Vec<SelectOption>,
    },
    /// Attachment list, stored as JSON.
    Attachment,
    /// Free-form JSON.
    Json,
    /// Collaborator reference.
    User,
    /// Actor that created the record (system).
    CreatedBy,
    /// Actor that last modified the record (system).
    LastModifiedBy,
    /// Creation timestamp (system).
    CreatedTime,
    /// Last-modification timestamp (system).
    LastModifiedTime,
    /// Server-assigned sequence surrogate.
    AutoNumber,
    /// Barcode payload.
    Barcode,
    /// QR payload.
    QrCode,
    /// Latitude/longitude pair.
    Geo,
    /// Geometry blob.
    Geometry,
    /// Computed from a formula over sibling columns (virtual).
    Formula {
        /// Formula source text.
        expression: String,
    },
    /// Aggregate over a relation (virtual).
    Rollup {
        /// Link column defining the relation.
        link_column_id: String,
        /// Column on the related table being aggregated.
        target_column_id: String,
        /// Aggregation to apply.
        function: RollupFn,
    },
    /// Scalar from the first related record (virtual).
    Lookup {
        /// Link column defining the relation.
        link_column_id: String,
        /// Column on the related table being projected.
        target_column_id: String,
    },
    /// Link to records of another table (virtual).
    Link(LinkSpec),
    /// Cardinality of a relation (virtual).
    LinksCount {
        /// Link column defining the relation.
        link_column_id: String,
    },
}

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnClass {
    /// Materialized to a fixed physical column.
    System,
    /// Computed at query time, never materialized.
    Virtual,
    /// Stored inside the record's JSON blob.
    User,
}

/// Fixed physical column a system column maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemField {
    /// `id`
    Id,
    /// `created_at`
    CreatedAt,
    /// `updated_at`
    UpdatedAt,
    /// `created_by`
    CreatedBy,
    /// `updated_by`
    UpdatedBy,
}

impl SystemField {
    /// Physical column name in the records table.
    #[must_use]
    pub fn physical_name(self) -> &'static str {
        match self {
            Self::Id => crate::constants::records::ID,
            Self::CreatedAt => crate::constants::records::CREATED_AT,
            Self::UpdatedAt => crate::constants::records::UPDATED_AT,
            Self::CreatedBy => crate::constants::records::CREATED_BY,
            Self::UpdatedBy => crate::constants::records::UPDATED_BY,
        }
    }
}

impl ColumnKind {
    /// Whether this kind is computed at query time.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        matches!(
            self,
            Self::Formula { .. }
                | Self::Rollup { .. }
                | Self::Lookup { .. }
                | Self::Link(_)
                | Self::LinksCount { .. }
        )
    }

    /// Whether values of this kind compare and aggregate numerically.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Number
                | Self::Decimal
                | Self::Currency
                | Self::Percent
                | Self::Rating
                | Self::Duration
                | Self::AutoNumber
        )
    }

    /// The link spec, when this kind declares a relation directly.
    #[must_use]
    pub fn link_spec(&self) -> Option<&LinkSpec> {
        match self {
            Self::Link(spec) => Some(spec),
            _ => None,
        }
    }

    /// The fixed physical column this kind maps onto, for system kinds.
    #[must_use]
    pub fn system_field(&self) -> Option<SystemField> {
        match self {
            Self::CreatedTime => Some(SystemField::CreatedAt),
            Self::LastModifiedTime => Some(SystemField::UpdatedAt),
            Self::CreatedBy => Some(SystemField::CreatedBy),
            Self::LastModifiedBy => Some(SystemField::UpdatedBy),
            _ => None,
        }
    }
}

/// A column of a logical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Stable id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Sanitized storage name; key of the value inside the JSON blob for
    /// user columns.
    pub name: String,
    /// Logical type.
    #[serde(flatten)]
    pub kind: ColumnKind,
    /// Whether this column is the logical primary key.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pk: bool,
    /// Whether a value is required on insert.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    /// Default value applied on insert when the key is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Column {
    /// Storage class, derived from the kind and the pk flag.
    #[must_use]
    pub fn class(&self) -> ColumnClass {
        if self.kind.is_virtual() {
            ColumnClass::Virtual
        } else if self.pk || self.kind.system_field().is_some() {
            ColumnClass::System
        } else {
            ColumnClass::User
        }
    }

    /// The physical column this one materializes to, for system columns.
    /// The pk column maps onto the physical `id`.
    #[must_use]
    pub fn system_field(&self) -> Option<SystemField> {
        if self.pk {
            Some(SystemField::Id)
        } else {
            self.kind.system_field()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_column(id: &str) -> Column {
        Column {
            id: id.to_owned(),
            title: id.to_owned(),
            name: id.to_owned(),
            kind: ColumnKind::Text,
            pk: false,
            required: false,
            default: None,
        }
    }

    #[test]
    fn classes_are_derived() {
        let user = text_column("a");
        assert_eq!(user.class(), ColumnClass::User);

        let mut pk = text_column("b");
        pk.pk = true;
        assert_eq!(pk.class(), ColumnClass::System);
        assert_eq!(pk.system_field(), Some(SystemField::Id));

        let mut created = text_column("c");
        created.kind = ColumnKind::CreatedTime;
        assert_eq!(created.class(), ColumnClass::System);
        assert_eq!(created.system_field(), Some(SystemField::CreatedAt));

        let mut formula = text_column("d");
        formula.kind = ColumnKind::Formula {
            expression: "1 + 1".to_owned(),
        };
        assert_eq!(formula.class(), ColumnClass::Virtual);
    }

    #[test]
    fn kind_round_trips_through_json() {
        let kind = ColumnKind::Rollup {
            link_column_id: "lnk".to_owned(),
            target_column_id: "tgt".to_owned(),
            function: RollupFn::CountNotEmpty,
        };
        let encoded = serde_json::to_value(&kind).expect("serialize");
        assert_eq!(encoded["type"], "rollup");
        assert_eq!(encoded["function"], "count_not_empty");
        let decoded: ColumnKind = serde_json::from_value(encoded).expect("deserialize");
        assert_eq!(decoded, kind);
    }

    #[test]
    fn link_kind_uses_short_tags() {
        let spec = LinkSpec {
            kind: LinkKind::ManyToMany,
            related_table_id: "t2".to_owned(),
            symmetric_column_id: None,
            fk_column_name: None,
        };
        let encoded = serde_json::to_value(ColumnKind::Link(spec)).expect("serialize");
        assert_eq!(encoded["type"], "link");
        assert_eq!(encoded["kind"], "mm");
    }
}
