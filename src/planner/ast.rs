//! Query description structures
//!
//! Callers hand over already-structured filter trees; nothing here parses a
//! query language. Operator and connector arrive as loose strings and are
//! checked during normalization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filter operators understood by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
}

impl Operator {
    /// Parses an operator name (case-insensitive)
    pub fn parse(name: &str) -> Option<Self> {
        let op = match name.to_ascii_lowercase().as_str() {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "contains" => Operator::Contains,
            "starts_with" => Operator::StartsWith,
            "ends_with" => Operator::EndsWith,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Contains => "contains",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
        }
    }
}

/// How a condition combines with its siblings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    /// `"or"` in any case maps to `Or`; anything else, including nothing, to `And`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("or") => Connector::Or,
            _ => Connector::And,
        }
    }
}

/// A raw filter condition as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Logical field name
    pub field: String,
    /// Operator name; defaults to `eq`
    #[serde(default)]
    pub operator: Option<String>,
    /// Comparison value
    pub value: Value,
    /// `AND` / `OR`; defaults to `AND`
    #[serde(default)]
    pub connector: Option<String>,
}

impl Condition {
    /// Condition with an explicit operator name
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            operator: Some(operator.into()),
            value,
            connector: None,
        }
    }

    /// Condition with the default operator (`eq`)
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            operator: None,
            value,
            connector: None,
        }
    }

    /// Marks the condition as `OR`-connected
    pub fn or(mut self) -> Self {
        self.connector = Some("OR".into());
        self
    }
}

/// Condition after normalization; field names are physical
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCondition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
    pub connector: Connector,
    /// The store cannot evaluate this condition natively
    pub requires_client_filter: bool,
}

impl NormalizedCondition {
    /// AND-connected equality
    pub fn is_key_equality(&self) -> bool {
        self.connector == Connector::And && self.operator == Operator::Eq
    }

    /// AND-connected membership
    pub fn is_key_membership(&self) -> bool {
        self.connector == Connector::And && self.operator == Operator::In
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Sort specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field to sort by
    pub field: String,
    /// Sort direction
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Join cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    OneToOne,
    OneToMany,
}

/// Cross-model lookup attached to each base row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinEdge {
    /// Model to fetch from
    pub target_model: String,
    pub relation: Relation,
    /// Field on the base rows holding the lookup value
    pub local_field: String,
    /// Field on the target rows matched against it
    pub foreign_field: String,
    /// Cap for one-to-many joins
    #[serde(default)]
    pub limit: Option<usize>,
    /// Output attribute; defaults to the target model name
    #[serde(default)]
    pub alias: Option<String>,
}

impl JoinEdge {
    pub fn one_to_one(
        target_model: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            target_model: target_model.into(),
            relation: Relation::OneToOne,
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            limit: None,
            alias: None,
        }
    }

    pub fn one_to_many(
        target_model: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            relation: Relation::OneToMany,
            ..Self::one_to_one(target_model, local_field, foreign_field)
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// A find request against one model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FindQuery {
    /// Logical model name
    pub model: String,
    #[serde(default, rename = "where")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub select: Option<Vec<String>>,
    #[serde(default)]
    pub joins: Vec<JoinEdge>,
}

impl FindQuery {
    /// Creates a query builder
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Adds a condition
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Adds an equality condition
    pub fn filter_eq(self, field: impl Into<String>, value: Value) -> Self {
        self.with_condition(Condition::eq(field, value))
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_join(mut self, join: JoinEdge) -> Self {
        self.joins.push(join);
        self
    }
}
