//! Model façade.
//!
//! The composition root: one [`Model`] binds an immutable schema snapshot,
//! a database handle and a bundle of capabilities for the duration of a
//! request scope. Operation handles are cheap to create and hold no state
//! beyond the shared context, so tasks never share mutable operation
//! instances.

use std::sync::Arc;

use gridstore_domain::error::{Error, Result};
use gridstore_domain::filter::ListLimits;
use gridstore_domain::ports::Database;
use gridstore_domain::schema::Schema;
use gridstore_query::{CompilePolicy, FunctionMode, FunctionRegistry};
use gridstore_store::{CopyOps, LazyLoader, LinkOps, RecordOps, SchemaStore, StoreContext};

/// Capability bundles, smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bundle {
    /// CRUD and bulk operations only; virtual columns are not projected.
    Minimal,
    /// CRUD plus link operations and virtual-column projection.
    #[default]
    Default,
    /// [`Bundle::Default`] plus the batched relation loader.
    Lazy,
    /// [`Bundle::Default`] plus copy operations.
    Copy,
    /// Everything.
    Full,
}

impl Bundle {
    fn has_links(self) -> bool {
        !matches!(self, Self::Minimal)
    }

    fn has_loader(self) -> bool {
        matches!(self, Self::Lazy | Self::Full)
    }

    fn has_copy(self) -> bool {
        matches!(self, Self::Copy | Self::Full)
    }
}

/// Construction options for a [`Model`].
#[derive(Default)]
pub struct ModelOptions {
    /// Capability bundle.
    pub bundle: Bundle,
    /// Page-size clamping window.
    pub limits: ListLimits,
    /// Strict mode: compiler faults surface as `BadRequest` instead of
    /// degrading to NULL.
    pub strict: bool,
    /// Unknown-formula-function policy.
    pub function_mode: FunctionMode,
    /// Extra formula function lowerings, applied over the standard set.
    pub registry: Option<FunctionRegistry>,
}

/// The façade over one schema snapshot and one database handle.
pub struct Model {
    ctx: Arc<StoreContext>,
    bundle: Bundle,
}

impl Model {
    /// Compose a model. The schema snapshot is immutable for the model's
    /// lifetime; schema edits produce a new snapshot and a new model.
    pub fn new(schema: Arc<Schema>, db: Arc<dyn Database>, options: ModelOptions) -> Self {
        let registry = options
            .registry
            .unwrap_or_else(|| FunctionRegistry::with_mode(options.function_mode));
        let mut ctx = StoreContext::new(schema, db);
        ctx.registry = Arc::new(registry);
        ctx.policy = CompilePolicy {
            strict: options.strict,
        };
        ctx.limits = options.limits;
        ctx.include_virtual = options.bundle != Bundle::Minimal;
        Self {
            ctx: Arc::new(ctx),
            bundle: options.bundle,
        }
    }

    /// The bound schema snapshot.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.ctx.schema
    }

    /// Record operations for one table.
    pub fn records(&self, table_id: &str) -> Result<RecordOps> {
        RecordOps::new(Arc::clone(&self.ctx), table_id)
    }

    /// Link operations for one table.
    pub fn links(&self, table_id: &str) -> Result<LinkOps> {
        if !self.bundle.has_links() {
            return Err(Error::bad_request(
                "link operations are not part of the minimal bundle",
            ));
        }
        LinkOps::new(Arc::clone(&self.ctx), table_id)
    }

    /// Batched relation loader for one table.
    pub fn loader(&self, table_id: &str) -> Result<LazyLoader> {
        if !self.bundle.has_loader() {
            return Err(Error::bad_request(
                "the relation loader requires the lazy or full bundle",
            ));
        }
        LazyLoader::new(Arc::clone(&self.ctx), table_id)
    }

    /// Copy operations.
    pub fn copier(&self) -> Result<CopyOps> {
        if !self.bundle.has_copy() {
            return Err(Error::bad_request(
                "copy operations require the copy or full bundle",
            ));
        }
        Ok(CopyOps::new(Arc::clone(&self.ctx)))
    }

    /// The versioned schema store.
    #[must_use]
    pub fn schema_store(&self) -> SchemaStore {
        SchemaStore::new(Arc::clone(&self.ctx))
    }
}
