//! Physical-table bootstrap.
//!
//! Generates the `CREATE TABLE IF NOT EXISTS` and index statements for the
//! three physical tables. The Postgres provider applies these on connect;
//! they are idempotent.

use gridstore_domain::constants::{LINKS_TABLE, RECORDS_TABLE, SCHEMAS_TABLE};

/// All bootstrap statements, in application order.
#[must_use]
pub fn statements() -> Vec<String> {
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS \"{RECORDS_TABLE}\" (\
             \"id\" TEXT PRIMARY KEY, \
             \"table_id\" TEXT NOT NULL, \
             \"data\" JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
             \"created_at\" TIMESTAMPTZ NOT NULL DEFAULT now(), \
             \"updated_at\" TIMESTAMPTZ NOT NULL DEFAULT now(), \
             \"created_by\" TEXT, \
             \"updated_by\" TEXT)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{RECORDS_TABLE}_table_created\" \
             ON \"{RECORDS_TABLE}\" (\"table_id\", \"created_at\")"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{RECORDS_TABLE}_data\" \
             ON \"{RECORDS_TABLE}\" USING GIN (\"data\")"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS \"{LINKS_TABLE}\" (\
             \"id\" TEXT PRIMARY KEY, \
             \"source_record_id\" TEXT NOT NULL, \
             \"target_record_id\" TEXT NOT NULL, \
             \"link_field_id\" TEXT NOT NULL, \
             \"inverse_field_id\" TEXT, \
             \"created_at\" TIMESTAMPTZ NOT NULL DEFAULT now())"
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS \"idx_{LINKS_TABLE}_edge\" \
             ON \"{LINKS_TABLE}\" (\"link_field_id\", \"source_record_id\", \"target_record_id\")"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{LINKS_TABLE}_source\" \
             ON \"{LINKS_TABLE}\" (\"source_record_id\")"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{LINKS_TABLE}_target\" \
             ON \"{LINKS_TABLE}\" (\"target_record_id\")"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS \"{SCHEMAS_TABLE}\" (\
             \"id\" TEXT PRIMARY KEY, \
             \"domain\" TEXT NOT NULL, \
             \"entity_id\" TEXT NOT NULL, \
             \"project_id\" TEXT NOT NULL, \
             \"env\" TEXT NOT NULL, \
             \"version\" BIGINT NOT NULL, \
             \"schema\" JSONB NOT NULL, \
             \"created_at\" TIMESTAMPTZ NOT NULL DEFAULT now(), \
             \"updated_at\" TIMESTAMPTZ NOT NULL DEFAULT now())"
        ),
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS \"idx_{SCHEMAS_TABLE}_snapshot\" \
             ON \"{SCHEMAS_TABLE}\" (\"domain\", \"entity_id\", \"env\", \"version\")"
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_are_idempotent_and_cover_all_tables() {
        let stmts = statements();
        assert!(stmts.iter().all(|s| s.contains("IF NOT EXISTS")));
        assert!(stmts.iter().any(|s| s.contains(RECORDS_TABLE)));
        assert!(stmts.iter().any(|s| s.contains(LINKS_TABLE)));
        assert!(stmts.iter().any(|s| s.contains(SCHEMAS_TABLE)));
        // The link-edge unique key guards idempotent linking.
        assert!(
            stmts
                .iter()
                .any(|s| s.contains("UNIQUE") && s.contains("link_field_id"))
        );
    }
}
