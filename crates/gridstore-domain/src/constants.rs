//! Physical storage names shared by the query and store layers.
//!
//! The whole engine writes to exactly three physical tables; every logical
//! table is multiplexed into [`RECORDS_TABLE`] behind its `table_id`.

/// Physical table holding every logical record.
pub const RECORDS_TABLE: &str = "gs_records";
/// Physical table holding many-to-many link edges.
pub const LINKS_TABLE: &str = "gs_links";
/// Physical table holding versioned schema snapshots.
pub const SCHEMAS_TABLE: &str = "gs_schemas";

/// Column names of the records table.
pub mod records {
    /// Primary key.
    pub const ID: &str = "id";
    /// Owning logical table id (data-isolation key).
    pub const TABLE_ID: &str = "table_id";
    /// JSON blob of user-column values keyed by storage name.
    pub const DATA: &str = "data";
    /// Creation timestamp.
    pub const CREATED_AT: &str = "created_at";
    /// Last-modification timestamp.
    pub const UPDATED_AT: &str = "updated_at";
    /// Actor that created the row.
    pub const CREATED_BY: &str = "created_by";
    /// Actor that last modified the row.
    pub const UPDATED_BY: &str = "updated_by";
}

/// Column names of the links table.
pub mod links {
    /// Primary key.
    pub const ID: &str = "id";
    /// Record on the owning side of the edge.
    pub const SOURCE_RECORD_ID: &str = "source_record_id";
    /// Record on the related side of the edge.
    pub const TARGET_RECORD_ID: &str = "target_record_id";
    /// Link column the edge belongs to.
    pub const LINK_FIELD_ID: &str = "link_field_id";
    /// Symmetric partner column, when the link is bidirectional.
    pub const INVERSE_FIELD_ID: &str = "inverse_field_id";
    /// Creation timestamp.
    pub const CREATED_AT: &str = "created_at";
}

/// Column names of the schemas table.
pub mod schemas {
    /// Primary key.
    pub const ID: &str = "id";
    /// Domain entity kind ("table", "page", "flow").
    pub const DOMAIN: &str = "domain";
    /// Id of the domain entity the snapshot belongs to.
    pub const ENTITY_ID: &str = "entity_id";
    /// Owning project.
    pub const PROJECT_ID: &str = "project_id";
    /// Environment tag (DEV / PRO).
    pub const ENV: &str = "env";
    /// Monotone version number per (domain, entity, env).
    pub const VERSION: &str = "version";
    /// The snapshot itself.
    pub const SCHEMA: &str = "schema";
    /// Creation timestamp.
    pub const CREATED_AT: &str = "created_at";
    /// Last-modification timestamp.
    pub const UPDATED_AT: &str = "updated_at";
}
