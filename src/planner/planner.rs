//! Query planner
//!
//! Turns a [`FindQuery`] into an immutable [`QueryPlan`]: normalized
//! conditions, the chosen access path for the base query and every join
//! edge, and the directives telling the executor what it still has to do
//! in memory.
//!
//! Planning performs no I/O. Missing tables or key schemas fail here,
//! before any request is sent.

use serde::Serialize;
use tracing::debug;

use super::ast::{Connector, FindQuery, NormalizedCondition, Relation, SortDirection, SortSpec};
use super::normalize::normalize_conditions;
use super::strategy::{ExecutionStrategy, KeyMatch, StrategyResolver};
use crate::catalog::{KeySchema, SchemaResolver};
use crate::config::AdapterConfig;
use crate::errors::{AdapterError, AdapterResult};

/// What the executor must do beyond the chosen access path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionDirectives {
    pub base_strategy: ExecutionStrategy,
    /// One entry per join edge, declaration order
    pub join_strategies: Vec<ExecutionStrategy>,
    /// Some condition cannot be pushed down as a native filter
    pub requires_client_filter: bool,
    /// Sort requested but not served by the chosen key
    pub requires_client_sort: bool,
    /// Direction the store should walk the chosen key
    pub server_side_sort: Option<SortDirection>,
    /// Items the fetcher may stop at; `None` fetches everything
    pub fetch_limit: Option<usize>,
}

/// A join edge with every name resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJoin {
    pub target_model: String,
    pub table: String,
    pub key_schema: KeySchema,
    pub relation: Relation,
    /// Physical field on the base model
    pub local_field: String,
    /// Physical field on the target model
    pub foreign_field: String,
    /// Most rows attached per base row
    pub cap: usize,
    /// Attribute the joined rows are attached under
    pub alias: String,
}

/// Immutable query plan
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub model: String,
    pub table: String,
    pub key_schema: KeySchema,
    pub conditions: Vec<NormalizedCondition>,
    /// Sort with a physical field name
    pub sort: Option<SortSpec>,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Projection with physical field names
    pub select: Option<Vec<String>>,
    pub joins: Vec<ResolvedJoin>,
    key: Option<KeyMatch>,
    directives: ExecutionDirectives,
}

impl QueryPlan {
    pub fn directives(&self) -> &ExecutionDirectives {
        &self.directives
    }

    pub fn base_strategy(&self) -> &ExecutionStrategy {
        &self.directives.base_strategy
    }

    /// Key match backing a primary-key or secondary-index query
    pub fn key_match(&self) -> Option<&KeyMatch> {
        self.key.as_ref()
    }

    /// True when any condition is `OR`-connected
    pub fn has_or_connector(&self) -> bool {
        self.conditions.iter().any(|c| c.connector == Connector::Or)
    }
}

/// Query planner
pub struct QueryPlanner<'a> {
    schema: &'a dyn SchemaResolver,
    config: &'a AdapterConfig,
}

impl<'a> QueryPlanner<'a> {
    /// Creates a new planner
    pub fn new(schema: &'a dyn SchemaResolver, config: &'a AdapterConfig) -> Self {
        Self { schema, config }
    }

    /// Plans a find query.
    ///
    /// Same inputs always yield the same plan.
    pub fn plan(&self, query: &FindQuery) -> AdapterResult<QueryPlan> {
        // 1. Model must resolve to a table and key schema
        if query.model.is_empty() {
            return Err(AdapterError::missing_plan_input("Query has no model"));
        }
        let model = query.model.as_str();
        let table = self.schema.table_name(model)?;
        let key_schema = self.schema.primary_key(model)?;

        // 2. Normalize conditions
        let conditions = normalize_conditions(model, &query.conditions, self.schema)?;

        // 3. Base strategy
        let resolver = StrategyResolver::new(self.schema);
        let key = resolver.key_match(model, &conditions)?;
        let base_strategy = match &key {
            Some(key) => match &key.index_name {
                None => ExecutionStrategy::PrimaryKeyQuery,
                Some(index_name) => ExecutionStrategy::SecondaryIndexQuery {
                    index_name: index_name.clone(),
                },
            },
            None => resolver.resolve_base(model, &conditions)?,
        };

        // 4. Client-side work
        let has_or = conditions.iter().any(|c| c.connector == Connector::Or);
        let requires_client_filter = has_or
            || conditions.iter().any(|c| c.requires_client_filter)
            || (base_strategy == ExecutionStrategy::BatchGet && conditions.len() > 1);

        let sort = query.sort.as_ref().map(|s| SortSpec {
            field: self.schema.field_name(model, &s.field),
            direction: s.direction,
        });
        let server_side_sort = match (&sort, &key) {
            (Some(sort), Some(key)) if key.key_schema.sort_key.as_deref() == Some(&sort.field) => {
                Some(sort.direction)
            }
            _ => None,
        };
        let requires_client_sort = sort.is_some() && server_side_sort.is_none();

        let offset = query.offset.unwrap_or(0);
        let fetch_limit = if requires_client_filter || requires_client_sort {
            None
        } else {
            query.limit.map(|limit| limit.saturating_add(offset))
        };

        // 5. Joins
        let mut joins = Vec::with_capacity(query.joins.len());
        let mut join_strategies = Vec::with_capacity(query.joins.len());
        for edge in &query.joins {
            if edge.target_model.is_empty()
                || edge.local_field.is_empty()
                || edge.foreign_field.is_empty()
            {
                return Err(AdapterError::missing_plan_input(
                    "Join requires target model, local field and foreign field",
                ));
            }
            if edge.limit == Some(0) {
                return Err(AdapterError::missing_plan_input(format!(
                    "Join limit for '{}' must be positive",
                    edge.target_model
                )));
            }
            let target = edge.target_model.as_str();
            let foreign_field = self.schema.field_name(target, &edge.foreign_field);
            let resolved = ResolvedJoin {
                target_model: target.to_string(),
                table: self.schema.table_name(target)?,
                key_schema: self.schema.primary_key(target)?,
                relation: edge.relation,
                local_field: self.schema.field_name(model, &edge.local_field),
                foreign_field: foreign_field.clone(),
                cap: match edge.relation {
                    Relation::OneToOne => 1,
                    Relation::OneToMany => edge.limit.unwrap_or(self.config.default_join_limit),
                },
                alias: edge.alias.clone().unwrap_or_else(|| target.to_string()),
            };
            join_strategies.push(resolver.resolve_join(target, &foreign_field)?);
            joins.push(resolved);
        }

        let select = query.select.as_ref().map(|fields| {
            fields
                .iter()
                .map(|f| self.schema.field_name(model, f))
                .collect()
        });

        let directives = ExecutionDirectives {
            base_strategy,
            join_strategies,
            requires_client_filter,
            requires_client_sort,
            server_side_sort,
            fetch_limit,
        };

        debug!(
            model,
            strategy = directives.base_strategy.as_str(),
            client_filter = directives.requires_client_filter,
            client_sort = directives.requires_client_sort,
            joins = joins.len(),
            "query planned"
        );

        Ok(QueryPlan {
            model: model.to_string(),
            table,
            key_schema,
            conditions,
            sort,
            limit: query.limit,
            offset,
            select,
            joins,
            key,
            directives,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{IndexDef, ModelDef, StaticSchema};
    use crate::errors::AdapterErrorCode;
    use crate::planner::ast::{Condition, JoinEdge};
    use serde_json::json;

    fn schema() -> StaticSchema {
        StaticSchema::new()
            .with_model(
                ModelDef::new("session", "sessions", "id")
                    .with_index(IndexDef::composite("user_created_idx", "userId", "createdAt")),
            )
            .with_model(ModelDef::new("user", "users", "id"))
            .with_model(
                ModelDef::new("account", "accounts", "id")
                    .with_index(IndexDef::hash("account_user_idx", "userId")),
            )
    }

    fn plan(query: FindQuery) -> AdapterResult<QueryPlan> {
        let schema = schema();
        let config = AdapterConfig::default();
        QueryPlanner::new(&schema, &config).plan(&query)
    }

    #[test]
    fn test_index_sort_served_by_store() {
        let plan = plan(
            FindQuery::new("session")
                .filter_eq("userId", json!("u1"))
                .with_sort(SortSpec::desc("createdAt"))
                .with_limit(10),
        )
        .unwrap();

        let directives = plan.directives();
        assert_eq!(
            directives.base_strategy,
            ExecutionStrategy::SecondaryIndexQuery {
                index_name: "user_created_idx".into()
            }
        );
        assert_eq!(directives.server_side_sort, Some(SortDirection::Desc));
        assert!(!directives.requires_client_sort);
        assert!(!directives.requires_client_filter);
        assert_eq!(directives.fetch_limit, Some(10));
    }

    #[test]
    fn test_sort_on_other_field_is_client_side() {
        let plan = plan(
            FindQuery::new("session")
                .filter_eq("userId", json!("u1"))
                .with_sort(SortSpec::asc("expiresAt"))
                .with_limit(10),
        )
        .unwrap();
        assert!(plan.directives().requires_client_sort);
        assert_eq!(plan.directives().server_side_sort, None);
        assert_eq!(plan.directives().fetch_limit, None);
    }

    #[test]
    fn test_offset_extends_fetch_limit() {
        let plan = plan(
            FindQuery::new("session")
                .filter_eq("userId", json!("u1"))
                .with_limit(5)
                .with_offset(3),
        )
        .unwrap();
        assert_eq!(plan.directives().fetch_limit, Some(8));
        assert_eq!(plan.offset, 3);
    }

    #[test]
    fn test_or_forces_client_filter() {
        let plan = plan(
            FindQuery::new("session")
                .filter_eq("userId", json!("u1"))
                .with_condition(Condition::eq("ip", json!("1.1.1.1")).or())
                .with_limit(5),
        )
        .unwrap();
        assert!(plan.directives().requires_client_filter);
        assert!(plan.has_or_connector());
        assert_eq!(plan.directives().fetch_limit, None);
    }

    #[test]
    fn test_batch_get_with_extra_conditions_filters_in_memory() {
        let plan = plan(
            FindQuery::new("user")
                .with_condition(Condition::new("id", "in", json!(["a", "b"])))
                .filter_eq("active", json!(true)),
        )
        .unwrap();
        assert_eq!(plan.directives().base_strategy, ExecutionStrategy::BatchGet);
        assert!(plan.directives().requires_client_filter);
    }

    #[test]
    fn test_join_resolution() {
        let plan = plan(
            FindQuery::new("user")
                .filter_eq("id", json!("u1"))
                .with_join(JoinEdge::one_to_many("account", "id", "userId"))
                .with_join(JoinEdge::one_to_many("session", "id", "userId").with_limit(2).with_alias("sessions")),
        )
        .unwrap();
        assert_eq!(plan.joins.len(), 2);
        assert_eq!(plan.joins[0].alias, "account");
        assert_eq!(plan.joins[0].cap, 100);
        assert_eq!(plan.joins[1].cap, 2);
        assert_eq!(plan.joins[1].alias, "sessions");
        assert_eq!(
            plan.directives().join_strategies,
            vec![
                ExecutionStrategy::SecondaryIndexQuery {
                    index_name: "account_user_idx".into()
                },
                ExecutionStrategy::SecondaryIndexQuery {
                    index_name: "user_created_idx".into()
                },
            ]
        );
    }

    #[test]
    fn test_one_to_one_cap() {
        let plan = plan(
            FindQuery::new("session").with_join(JoinEdge::one_to_one("user", "userId", "id").with_limit(9)),
        )
        .unwrap();
        assert_eq!(plan.joins[0].cap, 1);
        assert_eq!(plan.directives().join_strategies[0], ExecutionStrategy::PrimaryKeyQuery);
    }

    #[test]
    fn test_missing_inputs_fail_fast() {
        assert_eq!(
            plan(FindQuery::new("")).unwrap_err().code(),
            AdapterErrorCode::MissingPlanInput
        );
        assert_eq!(
            plan(FindQuery::new("ghost")).unwrap_err().code(),
            AdapterErrorCode::MissingTable
        );
        assert_eq!(
            plan(FindQuery::new("session").with_join(JoinEdge::one_to_one("ghost", "userId", "id")))
                .unwrap_err()
                .code(),
            AdapterErrorCode::MissingTable
        );
        assert_eq!(
            plan(FindQuery::new("session").with_join(JoinEdge::one_to_many("user", "userId", "id").with_limit(0)))
                .unwrap_err()
                .code(),
            AdapterErrorCode::MissingPlanInput
        );
    }

    #[test]
    fn test_planning_is_deterministic() {
        let query = FindQuery::new("session")
            .filter_eq("userId", json!("u1"))
            .with_condition(Condition::new("token", "ends_with", json!("z")));
        let a = plan(query.clone()).unwrap();
        let b = plan(query).unwrap();
        assert_eq!(a.directives(), b.directives());
        assert_eq!(a.conditions, b.conditions);
    }
}
