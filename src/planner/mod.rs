//! Query planning
//!
//! Normalizes caller filters, resolves the access path for the base query
//! and each join edge, and renders native key-condition and filter
//! expressions.
//!
//! # Strategy priority (strict order)
//!
//! 1. Primary key equality
//! 2. Indexed equality (sort-key companion scores higher)
//! 3. Indexed membership (one query per value)
//! 4. Primary key membership (batch get)
//! 5. Scan
//!
//! Planning never performs I/O.

mod ast;
mod expressions;
mod normalize;
mod operators;
mod planner;
mod strategy;

pub use ast::{
    Condition, Connector, FindQuery, JoinEdge, NormalizedCondition, Operator, Relation,
    SortDirection, SortSpec,
};
pub use expressions::{
    build_filter_expression, build_key_condition, partition_condition, render_in_filter,
    ExpressionContext, KeyCondition,
};
pub use normalize::normalize_conditions;
pub use operators::{operator_spec, OperatorSpec, MAX_IN_OPERANDS};
pub use planner::{ExecutionDirectives, QueryPlan, QueryPlanner, ResolvedJoin};
pub use strategy::{distinct_values, ExecutionStrategy, KeyMatch, StrategyResolver};
