//! # Query Compilation Layer
//!
//! Pure translation from logical requests to parameterized SQL. Nothing in
//! this crate executes a query; every compiler returns a [`SqlExpr`], a
//! SQL string with `?` placeholders plus its bound parameters, and the
//! store layer hands the result to an executor port.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`fragment`] | The `SqlExpr` value type all compilers emit |
//! | [`column_ref`] | Column expressions, casts, physical-table mapping |
//! | [`builder`] | SELECT builder carrying the data-isolation predicate |
//! | [`context`] | Compilation context: schema snapshot, table, alias, policy |
//! | [`formula`] | Formula lexer, parser and SQL lowering |
//! | [`relation`] | Rollup / lookup / link-count correlated subqueries |
//! | [`condition`] | Filter-tree lowering to WHERE predicates |
//! | [`sort`] | Sort-list lowering with stable NULL placement |
//! | [`legacy`] | Compatibility parsers for where/sort strings |

pub mod builder;
pub mod column_ref;
pub mod condition;
pub mod context;
pub mod formula;
pub mod fragment;
pub mod legacy;
pub mod relation;
pub mod sort;

pub use builder::SelectBuilder;
pub use context::{CompilePolicy, QueryContext};
pub use formula::registry::{FunctionMode, FunctionRegistry};
pub use fragment::SqlExpr;
