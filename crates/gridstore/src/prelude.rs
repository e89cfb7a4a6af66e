//! Everything a typical caller needs, in one import.

pub use gridstore_domain::error::{Error, ErrorKind, Result};
pub use gridstore_domain::filter::{
    AggFn, ComparisonOp, FilterLeaf, FilterNode, GroupByArgs, ListArgs, ListLimits, LogicalOp,
    PageInfo, SortDirection, SortSpec,
};
pub use gridstore_domain::ids;
pub use gridstore_domain::ports::{Database, DatabaseExecutor, SqlParam, Transaction};
pub use gridstore_domain::record::{Record, WriteContext};
pub use gridstore_domain::schema::{
    Column, ColumnKind, LinkKind, LinkRequest, LinkSpec, PatchOp, RollupFn, Schema, SchemaEnv,
    SelectOption, Table,
};
pub use gridstore_domain::schema::model::{ColumnInit, TableInit};
pub use gridstore_query::{FunctionMode, FunctionRegistry};
pub use gridstore_store::{BulkOptions, CopyOps, CopyOptions, LazyLoader, LinkOps, RecordOps};

pub use crate::model::{Bundle, Model, ModelOptions};
