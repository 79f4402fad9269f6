//! Permission names and derived resource identity strings.

use palisade_types::{DatabaseId, DatasourceId};

pub const DATABASE_ACCESS: &str = "database_access";
pub const SCHEMA_ACCESS: &str = "schema_access";
pub const DATASOURCE_ACCESS: &str = "datasource_access";
pub const ALL_DATABASE_ACCESS: &str = "all_database_access";
pub const ALL_DATASOURCE_ACCESS: &str = "all_datasource_access";
pub const ALL_QUERY_ACCESS: &str = "all_query_access";

/// Permissions scoped to a single database, schema or datasource.
pub const OBJECT_SPEC_PERMISSIONS: [&str; 3] = [DATABASE_ACCESS, SCHEMA_ACCESS, DATASOURCE_ACCESS];

/// Permissions preserved on a role when a built-in definition is merged onto it.
pub const DATA_ACCESS_PERMISSIONS: [&str; 6] = [
    DATABASE_ACCESS,
    SCHEMA_ACCESS,
    DATASOURCE_ACCESS,
    ALL_DATASOURCE_ACCESS,
    ALL_DATABASE_ACCESS,
    ALL_QUERY_ACCESS,
];

/// Returns whether the permission grants access to data objects.
pub fn is_data_access_permission(name: &str) -> bool {
    DATA_ACCESS_PERMISSIONS.contains(&name)
}

/// `[database].(id:<id>)`
pub fn database_perm(database_name: &str, id: DatabaseId) -> String {
    format!("[{database_name}].(id:{id})")
}

/// `[database].[table](id:<id>)`
pub fn datasource_perm(database_name: &str, table_name: &str, id: DatasourceId) -> String {
    format!("[{database_name}].[{table_name}](id:{id})")
}

/// `[database].[schema]`, or `None` when the schema is absent or empty.
pub fn schema_perm(database_name: &str, schema: Option<&str>) -> Option<String> {
    match schema {
        Some(schema) if !schema.is_empty() => Some(format!("[{database_name}].[{schema}]")),
        _ => None,
    }
}

/// The two halves of a schema permission string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseAndSchema {
    pub database: String,
    pub schema: String,
}

/// Parses `[database].[schema]` back into its parts.
///
/// Returns `None` if the string is not bracketed on both sides of the
/// separating `].[`.
pub fn unpack_database_and_schema(schema_permission: &str) -> Option<DatabaseAndSchema> {
    let inner = schema_permission.strip_prefix('[')?.strip_suffix(']')?;
    let (database, schema) = inner.split_once("].[")?;
    Some(DatabaseAndSchema {
        database: database.to_string(),
        schema: schema.to_string(),
    })
}
