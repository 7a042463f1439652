//! Structural view of a migrated database, comparable across engines.
//!
//! Only what both engines can express the same way is captured: column
//! names, nullability, primary keys, single-column unique indexes and
//! foreign keys. Column types are not compared: each engine spells
//! booleans, keys and timestamps differently.

use serde::Serialize;
use sqlx::{PgPool, Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::DataError;

/// Tables that belong to the migration runner, not to the application.
const BOOKKEEPING_TABLES: &[&str] = &["_sqlx_migrations"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaShape {
    pub tables: BTreeMap<String, TableShape>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableShape {
    pub columns: BTreeMap<String, ColumnShape>,
    pub unique: BTreeSet<String>,
    pub foreign_keys: BTreeSet<ForeignKeyShape>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColumnShape {
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ForeignKeyShape {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaDifference {
    MissingTable(String),
    UnexpectedTable(String),
    MissingColumn {
        table: String,
        column: String,
    },
    UnexpectedColumn {
        table: String,
        column: String,
    },
    Nullability {
        table: String,
        column: String,
        expected: bool,
    },
    PrimaryKey {
        table: String,
        column: String,
        expected: bool,
    },
    Unique {
        table: String,
        column: String,
        expected: bool,
    },
    ForeignKey {
        table: String,
        foreign_key: ForeignKeyShape,
        expected: bool,
    },
}

impl ColumnShape {
    pub fn key() -> Self {
        Self {
            nullable: false,
            primary_key: true,
        }
    }

    pub fn required() -> Self {
        Self {
            nullable: false,
            primary_key: false,
        }
    }

    pub fn optional() -> Self {
        Self {
            nullable: true,
            primary_key: false,
        }
    }
}

impl TableShape {
    pub fn column(mut self, name: &str, shape: ColumnShape) -> Self {
        self.columns.insert(name.to_string(), shape);
        self
    }

    pub fn unique(mut self, column: &str) -> Self {
        self.unique.insert(column.to_string());
        self
    }

    pub fn references(mut self, column: &str, table: &str, target: &str) -> Self {
        self.foreign_keys.insert(ForeignKeyShape {
            column: column.to_string(),
            references_table: table.to_string(),
            references_column: target.to_string(),
        });
        self
    }
}

impl SchemaShape {
    pub fn table(mut self, name: &str, table: TableShape) -> Self {
        self.tables.insert(name.to_string(), table);
        self
    }

    fn table_mut(&mut self, name: &str) -> &mut TableShape {
        self.tables.entry(name.to_string()).or_default()
    }

    /// Everything in `actual` that does not match `self`. Empty when the two
    /// are structurally equivalent.
    pub fn diff(&self, actual: &SchemaShape) -> Vec<SchemaDifference> {
        let mut out = Vec::new();

        for name in actual.tables.keys() {
            if !self.tables.contains_key(name) {
                out.push(SchemaDifference::UnexpectedTable(name.clone()));
            }
        }

        for (name, expected) in &self.tables {
            match actual.tables.get(name) {
                Some(found) => diff_table(name, expected, found, &mut out),
                None => out.push(SchemaDifference::MissingTable(name.clone())),
            }
        }

        out
    }
}

fn diff_table(
    table: &str,
    expected: &TableShape,
    actual: &TableShape,
    out: &mut Vec<SchemaDifference>,
) {
    let t = || table.to_string();

    for column in actual.columns.keys() {
        if !expected.columns.contains_key(column) {
            out.push(SchemaDifference::UnexpectedColumn {
                table: t(),
                column: column.clone(),
            });
        }
    }

    for (column, want) in &expected.columns {
        let Some(got) = actual.columns.get(column) else {
            out.push(SchemaDifference::MissingColumn {
                table: t(),
                column: column.clone(),
            });
            continue;
        };
        if want.nullable != got.nullable {
            out.push(SchemaDifference::Nullability {
                table: t(),
                column: column.clone(),
                expected: want.nullable,
            });
        }
        if want.primary_key != got.primary_key {
            out.push(SchemaDifference::PrimaryKey {
                table: t(),
                column: column.clone(),
                expected: want.primary_key,
            });
        }
    }

    for column in expected.unique.symmetric_difference(&actual.unique) {
        out.push(SchemaDifference::Unique {
            table: t(),
            column: column.clone(),
            expected: expected.unique.contains(column),
        });
    }

    for fk in expected
        .foreign_keys
        .symmetric_difference(&actual.foreign_keys)
    {
        out.push(SchemaDifference::ForeignKey {
            table: t(),
            foreign_key: fk.clone(),
            expected: expected.foreign_keys.contains(fk),
        });
    }
}

impl fmt::Display for SchemaDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let presence = |expected: &bool| if *expected { "missing" } else { "unexpected" };
        match self {
            Self::MissingTable(t) => write!(f, "table {t} is missing"),
            Self::UnexpectedTable(t) => write!(f, "table {t} is unexpected"),
            Self::MissingColumn { table, column } => write!(f, "column {table}.{column} is missing"),
            Self::UnexpectedColumn { table, column } => {
                write!(f, "column {table}.{column} is unexpected")
            }
            Self::Nullability {
                table,
                column,
                expected,
            } => {
                let want = if *expected { "nullable" } else { "NOT NULL" };
                write!(f, "column {table}.{column} should be {want}")
            }
            Self::PrimaryKey {
                table,
                column,
                expected,
            } => write!(f, "primary key on {table}.{column} is {}", presence(expected)),
            Self::Unique {
                table,
                column,
                expected,
            } => write!(f, "unique index on {table}.{column} is {}", presence(expected)),
            Self::ForeignKey {
                table,
                foreign_key,
                expected,
            } => write!(
                f,
                "foreign key {table}.{} -> {}.{} is {}",
                foreign_key.column,
                foreign_key.references_table,
                foreign_key.references_column,
                presence(expected)
            ),
        }
    }
}

pub async fn introspect_sqlite(pool: &SqlitePool) -> Result<SchemaShape, DataError> {
    let tables: Vec<String> = sqlx::query_scalar(
        r#"SELECT name FROM sqlite_master
           WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
           ORDER BY name"#,
    )
    .fetch_all(pool)
    .await?;

    let mut shape = SchemaShape::default();
    for name in tables {
        if BOOKKEEPING_TABLES.contains(&name.as_str()) {
            continue;
        }
        let table = introspect_sqlite_table(pool, &name).await?;
        shape.tables.insert(name, table);
    }
    Ok(shape)
}

async fn introspect_sqlite_table(pool: &SqlitePool, name: &str) -> Result<TableShape, DataError> {
    let mut table = TableShape::default();

    let columns = sqlx::query(r#"SELECT name, "notnull", pk FROM pragma_table_info(?)"#)
        .bind(name)
        .fetch_all(pool)
        .await?;
    for row in columns {
        let column: String = row.try_get("name")?;
        let not_null: i64 = row.try_get("notnull")?;
        let pk: i64 = row.try_get("pk")?;
        // SQLite reports INTEGER PRIMARY KEY as nullable; it never is.
        let primary_key = pk > 0;
        table.columns.insert(
            column,
            ColumnShape {
                nullable: not_null == 0 && !primary_key,
                primary_key,
            },
        );
    }

    let indexes: Vec<String> = sqlx::query_scalar(
        r#"SELECT name FROM pragma_index_list(?) WHERE "unique" = 1 AND origin <> 'pk'"#,
    )
    .bind(name)
    .fetch_all(pool)
    .await?;
    for index in indexes {
        let mut cols: Vec<String> = sqlx::query_scalar(r#"SELECT name FROM pragma_index_info(?)"#)
            .bind(&index)
            .fetch_all(pool)
            .await?;
        if cols.len() == 1 {
            table.unique.extend(cols.pop());
        }
    }

    let fks = sqlx::query(r#"SELECT "from", "table", "to" FROM pragma_foreign_key_list(?)"#)
        .bind(name)
        .fetch_all(pool)
        .await?;
    for row in fks {
        let column: String = row.try_get("from")?;
        let target: String = row.try_get("table")?;
        // NULL when the reference omits the column, i.e. the target's primary key.
        let target_column: Option<String> = row.try_get("to")?;
        table.foreign_keys.insert(ForeignKeyShape {
            column,
            references_table: target,
            references_column: target_column.unwrap_or_else(|| "id".to_string()),
        });
    }

    Ok(table)
}

pub async fn introspect_postgres(pool: &PgPool) -> Result<SchemaShape, DataError> {
    let mut shape = SchemaShape::default();

    let columns = sqlx::query(
        r#"
        SELECT table_name::text AS table_name,
               column_name::text AS column_name,
               (is_nullable = 'YES') AS nullable
        FROM information_schema.columns
        WHERE table_schema = current_schema()
        "#,
    )
    .fetch_all(pool)
    .await?;
    for row in columns {
        let table: String = row.try_get("table_name")?;
        if BOOKKEEPING_TABLES.contains(&table.as_str()) {
            continue;
        }
        let column: String = row.try_get("column_name")?;
        let nullable: bool = row.try_get("nullable")?;
        shape.table_mut(&table).columns.insert(
            column,
            ColumnShape {
                nullable,
                primary_key: false,
            },
        );
    }

    // Unique indexes do not show up in information_schema, so read pg_index.
    let indexes = sqlx::query(
        r#"
        SELECT t.relname::text AS table_name,
               a.attname::text AS column_name,
               i.indisprimary AS is_primary
        FROM pg_index i
        JOIN pg_class t ON t.oid = i.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(i.indkey)
        WHERE n.nspname = current_schema()
          AND i.indisunique
          AND i.indnatts = 1
        "#,
    )
    .fetch_all(pool)
    .await?;
    for row in indexes {
        let table: String = row.try_get("table_name")?;
        let Some(entry) = shape.tables.get_mut(&table) else {
            continue;
        };
        let column: String = row.try_get("column_name")?;
        let is_primary: bool = row.try_get("is_primary")?;
        if is_primary {
            if let Some(col) = entry.columns.get_mut(&column) {
                col.primary_key = true;
            }
        } else {
            entry.unique.insert(column);
        }
    }

    let fks = sqlx::query(
        r#"
        SELECT kcu.table_name::text AS table_name,
               kcu.column_name::text AS column_name,
               ccu.table_name::text AS references_table,
               ccu.column_name::text AS references_column
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON kcu.constraint_name = tc.constraint_name
         AND kcu.table_schema = tc.table_schema
        JOIN information_schema.constraint_column_usage ccu
          ON ccu.constraint_name = tc.constraint_name
         AND ccu.table_schema = tc.table_schema
        WHERE tc.constraint_type = 'FOREIGN KEY'
          AND tc.table_schema = current_schema()
        "#,
    )
    .fetch_all(pool)
    .await?;
    for row in fks {
        let table: String = row.try_get("table_name")?;
        let Some(entry) = shape.tables.get_mut(&table) else {
            continue;
        };
        entry.foreign_keys.insert(ForeignKeyShape {
            column: row.try_get("column_name")?,
            references_table: row.try_get("references_table")?,
            references_column: row.try_get("references_column")?,
        });
    }

    Ok(shape)
}
