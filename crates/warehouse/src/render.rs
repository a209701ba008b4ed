//! Rendering of structured statements into Redshift SQL.
//!
//! Identifiers are double-quoted per dotted part and literals single-quoted,
//! with embedded quotes doubled. `Raw` text and the `SELECT` of an
//! `InsertSelect` come from the pipeline definition and are passed through.

use operators::{CopyFormat, Statement};

/// Quote a possibly schema-qualified identifier: `public.users` becomes
/// `"public"."users"`.
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQL text for `statement`.
pub fn render(statement: &Statement) -> String {
    match statement {
        Statement::Raw(sql) => sql.clone(),
        Statement::Clear { table } => format!("DELETE FROM {}", quote_ident(table)),
        Statement::Truncate { table } => format!("TRUNCATE TABLE {}", quote_ident(table)),
        Statement::Copy {
            table,
            source,
            credentials,
            format,
            region,
        } => {
            let format = match format {
                CopyFormat::Auto => "auto",
                CopyFormat::JsonPaths(path) => path.as_str(),
            };
            format!(
                "COPY {} FROM {} ACCESS_KEY_ID {} SECRET_ACCESS_KEY {} FORMAT AS JSON {} REGION {}",
                quote_ident(table),
                quote_literal(source),
                quote_literal(&credentials.access_key),
                quote_literal(&credentials.secret_key),
                quote_literal(format),
                quote_literal(region),
            )
        }
        Statement::InsertSelect { table, select_sql } => {
            format!("INSERT INTO {} {}", quote_ident(table), select_sql.trim())
        }
        Statement::CountRows { table } => format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
    }
}
