use crate::error::AppError;
use regex::Regex;
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument};

/// What a migration run would do to bring the live database up to the
/// target schema. Derived by diffing against a pristine in-memory database
/// built from the schema constant.
#[derive(Debug, Default)]
pub struct SchemaChanges {
    pub new_tables: Vec<String>,
    pub removed_tables: Vec<String>,
    pub modified_tables: Vec<TableChanges>,
    pub new_indices: Vec<String>,
    pub removed_indices: Vec<String>,
    pub changed_indices: Vec<String>,
}

#[derive(Debug)]
pub struct TableChanges {
    pub name: String,
    pub added_columns: Vec<String>,
    pub removed_columns: Vec<String>,
}

impl SchemaChanges {
    pub fn has_any_changes(&self) -> bool {
        !self.new_tables.is_empty()
            || !self.removed_tables.is_empty()
            || self
                .modified_tables
                .iter()
                .any(|t| !t.added_columns.is_empty() || !t.removed_columns.is_empty())
            || !self.new_indices.is_empty()
            || !self.removed_indices.is_empty()
            || !self.changed_indices.is_empty()
    }

    pub fn is_destructive(&self) -> bool {
        !self.removed_tables.is_empty()
            || !self.removed_indices.is_empty()
            || self
                .modified_tables
                .iter()
                .any(|t| !t.removed_columns.is_empty())
    }
}

#[derive(Debug, Clone)]
struct ColumnInfo {
    name: String,
    decl_type: String,
    not_null: bool,
    default: Option<String>,
}

/// Diff the live database against a target schema without touching it.
#[instrument(skip_all)]
pub async fn get_schema_changes(
    pool: &Pool<Sqlite>,
    target_schema: &str,
) -> Result<SchemaChanges, AppError> {
    let pristine = pristine_database(target_schema).await?;
    analyze_changes(pool, &pristine).await
}

/// Bring the live database up to the target schema.
///
/// Additions (tables, columns, indices) are applied directly; destructive
/// changes are refused unless `allow_deletions` is set. Returns whether any
/// schema change was made.
#[instrument(skip(pool, target_schema))]
pub async fn migrate_database_declaratively(
    pool: Pool<Sqlite>,
    target_schema: &str,
    allow_deletions: bool,
) -> Result<bool, AppError> {
    info!("Starting declarative database migration");

    let pristine = pristine_database(target_schema).await?;
    let changes = analyze_changes(&pool, &pristine).await?;

    if !changes.has_any_changes() {
        info!("No schema changes needed");
        return Ok(false);
    }

    if changes.is_destructive() && !allow_deletions {
        return Err(AppError::Internal(format!(
            "Migration requires destructive changes (tables {:?}, indices {:?}, columns {:?}), but allow_deletions=false",
            changes.removed_tables,
            changes.removed_indices,
            changes
                .modified_tables
                .iter()
                .filter(|t| !t.removed_columns.is_empty())
                .map(|t| (&t.name, &t.removed_columns))
                .collect::<Vec<_>>(),
        )));
    }

    let target_tables = get_table_sql(&pristine).await?;
    let mut schema_changes_made = 0u32;

    let mut tx = pool.begin().await?;
    sqlx::query("PRAGMA defer_foreign_keys = TRUE")
        .execute(&mut *tx)
        .await?;

    for table_name in &changes.new_tables {
        if let Some(sql) = target_tables.get(table_name) {
            info!("Database migration: create table {}", table_name);
            sqlx::query(sql).execute(&mut *tx).await?;
            schema_changes_made += 1;
        }
    }

    for table in &changes.modified_tables {
        if table.removed_columns.is_empty() {
            let target_columns = get_table_columns(&pristine, &table.name).await?;
            for column_name in &table.added_columns {
                let column = target_columns
                    .iter()
                    .find(|c| &c.name == column_name)
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "Column {} missing from pristine table {}",
                            column_name, table.name
                        ))
                    })?;

                let alter_sql = format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    table.name,
                    column_declaration(column)
                );
                info!("Database migration: {}", alter_sql);
                sqlx::query(&alter_sql).execute(&mut *tx).await?;
                schema_changes_made += 1;
            }
        } else {
            rebuild_table(&mut tx, &pristine, table, &target_tables).await?;
            schema_changes_made += 1;
        }
    }

    for table_name in &changes.removed_tables {
        let drop_sql = format!("DROP TABLE {}", table_name);
        info!("Database migration: {}", drop_sql);
        sqlx::query(&drop_sql).execute(&mut *tx).await?;
        schema_changes_made += 1;
    }

    let target_indices = get_index_sql(&pristine).await?;

    for index_name in changes
        .removed_indices
        .iter()
        .chain(changes.changed_indices.iter())
    {
        let drop_sql = format!("DROP INDEX {}", index_name);
        info!("Database migration: {}", drop_sql);
        sqlx::query(&drop_sql).execute(&mut *tx).await?;
        schema_changes_made += 1;
    }

    for index_name in changes
        .new_indices
        .iter()
        .chain(changes.changed_indices.iter())
    {
        if let Some(sql) = target_indices.get(index_name) {
            info!("Database migration: create index {}", index_name);
            sqlx::query(sql).execute(&mut *tx).await?;
            schema_changes_made += 1;
        }
    }

    tx.commit().await?;

    if schema_changes_made > 0 {
        info!("Running VACUUM after migration");
        sqlx::query("VACUUM").execute(&pool).await?;
    }

    info!(
        "Migration completed. Schema changes made: {}",
        schema_changes_made
    );
    Ok(schema_changes_made > 0)
}

async fn pristine_database(target_schema: &str) -> Result<SqlitePool, AppError> {
    // One connection: an in-memory database is per-connection.
    let pristine = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    if !target_schema.trim().is_empty() {
        sqlx::raw_sql(target_schema)
            .execute(&pristine)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create pristine schema: {}", e)))?;
    }
    Ok(pristine)
}

/// Rebuild a table whose target shape dropped columns: create the target
/// shape under a temporary name, copy the common columns, then swap.
async fn rebuild_table(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    pristine: &SqlitePool,
    table: &TableChanges,
    target_tables: &HashMap<String, String>,
) -> Result<(), AppError> {
    info!("Database migration: rebuild table {}", table.name);

    let target_sql = target_tables.get(&table.name).ok_or_else(|| {
        AppError::Internal(format!("Table {} missing from pristine schema", table.name))
    })?;

    let temp_name = format!("{}_migration_new", table.name);
    let temp_sql = rename_create_table(target_sql, &table.name, &temp_name);
    sqlx::query(&temp_sql).execute(&mut **tx).await?;

    let target_columns: HashSet<String> = get_table_columns(pristine, &table.name)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();
    let current_columns = table_columns_tx(tx, &table.name).await?;

    let common: Vec<&String> = current_columns
        .iter()
        .filter(|c| target_columns.contains(*c))
        .collect();

    if !common.is_empty() {
        let columns_str = common
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let copy_sql = format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            temp_name, columns_str, columns_str, table.name
        );
        sqlx::query(&copy_sql).execute(&mut **tx).await?;
    }

    sqlx::query(&format!("DROP TABLE {}", table.name))
        .execute(&mut **tx)
        .await?;
    sqlx::query(&format!(
        "ALTER TABLE {} RENAME TO {}",
        temp_name, table.name
    ))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn rename_create_table(sql: &str, table_name: &str, temp_name: &str) -> String {
    let with_if_not_exists = format!("TABLE IF NOT EXISTS {}", table_name);
    if sql.contains(&with_if_not_exists) {
        sql.replacen(&with_if_not_exists, &format!("TABLE {}", temp_name), 1)
    } else {
        sql.replacen(
            &format!("TABLE {}", table_name),
            &format!("TABLE {}", temp_name),
            1,
        )
    }
}

fn column_declaration(column: &ColumnInfo) -> String {
    let mut decl = column.name.clone();
    if !column.decl_type.is_empty() {
        decl.push(' ');
        decl.push_str(&column.decl_type);
    }
    if column.not_null {
        decl.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        decl.push_str(" DEFAULT ");
        decl.push_str(default);
    }
    decl
}

#[instrument(skip_all)]
async fn analyze_changes(
    pool: &Pool<Sqlite>,
    pristine: &SqlitePool,
) -> Result<SchemaChanges, AppError> {
    let mut changes = SchemaChanges::default();

    let current_tables = get_table_sql(pool).await?;
    let target_tables = get_table_sql(pristine).await?;

    let current_names: HashSet<&String> = current_tables.keys().collect();
    let target_names: HashSet<&String> = target_tables.keys().collect();

    changes.new_tables = target_names
        .difference(&current_names)
        .map(|s| s.to_string())
        .collect();

    changes.removed_tables = current_names
        .difference(&target_names)
        .map(|s| s.to_string())
        .collect();

    for table_name in current_names.intersection(&target_names) {
        let current_columns: HashSet<String> = get_table_columns(pool, table_name)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let target_columns: HashSet<String> = get_table_columns(pristine, table_name)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();

        let added: Vec<String> = target_columns.difference(&current_columns).cloned().collect();
        let removed: Vec<String> = current_columns.difference(&target_columns).cloned().collect();

        if !added.is_empty() || !removed.is_empty() {
            changes.modified_tables.push(TableChanges {
                name: table_name.to_string(),
                added_columns: added,
                removed_columns: removed,
            });
        }
    }

    let current_indices = get_index_sql(pool).await?;
    let target_indices = get_index_sql(pristine).await?;

    let current_index_names: HashSet<&String> = current_indices.keys().collect();
    let target_index_names: HashSet<&String> = target_indices.keys().collect();

    changes.new_indices = target_index_names
        .difference(&current_index_names)
        .map(|s| s.to_string())
        .collect();

    changes.removed_indices = current_index_names
        .difference(&target_index_names)
        .map(|s| s.to_string())
        .collect();

    for index_name in current_index_names.intersection(&target_index_names) {
        let current_sql = normalize_sql(&current_indices[*index_name]);
        let target_sql = normalize_sql(&target_indices[*index_name]);
        if current_sql != target_sql {
            changes.changed_indices.push(index_name.to_string());
        }
    }

    Ok(changes)
}

async fn get_table_sql(pool: &Pool<Sqlite>) -> Result<HashMap<String, String>, AppError> {
    let rows = sqlx::query(
        "SELECT name, sql FROM sqlite_master WHERE type = 'table' AND name != 'sqlite_sequence'",
    )
    .fetch_all(pool)
    .await?;

    let mut tables = HashMap::new();
    for row in rows {
        let name: String = row.get(0);
        let sql: String = row.get(1);
        tables.insert(name, sql);
    }
    Ok(tables)
}

async fn get_index_sql(pool: &Pool<Sqlite>) -> Result<HashMap<String, String>, AppError> {
    let rows =
        sqlx::query("SELECT name, sql FROM sqlite_master WHERE type = 'index' AND sql IS NOT NULL")
            .fetch_all(pool)
            .await?;

    let mut indices = HashMap::new();
    for row in rows {
        let name: String = row.get(0);
        let sql: String = row.get(1);
        indices.insert(name, sql);
    }
    Ok(indices)
}

async fn get_table_columns(
    pool: &Pool<Sqlite>,
    table_name: &str,
) -> Result<Vec<ColumnInfo>, AppError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table_name))
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(column_from_row).collect())
}

async fn table_columns_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    table_name: &str,
) -> Result<Vec<String>, AppError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table_name))
        .fetch_all(&mut **tx)
        .await?;

    Ok(rows.into_iter().map(|row| row.get::<String, _>(1)).collect())
}

fn column_from_row(row: sqlx::sqlite::SqliteRow) -> ColumnInfo {
    ColumnInfo {
        name: row.get(1),
        decl_type: row.get(2),
        not_null: row.get::<i64, _>(3) != 0,
        default: row.get(4),
    }
}

pub fn normalize_sql(sql: &str) -> String {
    // Remove comments
    let re = Regex::new(r"--[^\n]*\n").unwrap();
    let sql = re.replace_all(sql, "");

    // Normalize whitespace
    let re = Regex::new(r"\s+").unwrap();
    let sql = re.replace_all(&sql, " ");

    // Remove spaces around punctuation
    let re = Regex::new(r" *([(),]) *").unwrap();
    let sql = re.replace_all(&sql, "$1");

    // Remove unnecessary quotes from identifiers
    let re = Regex::new(r#""(\w+)""#).unwrap();
    let sql = re.replace_all(&sql, "$1");

    sql.trim().to_string()
}
