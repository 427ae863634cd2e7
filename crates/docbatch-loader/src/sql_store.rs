//! [`Store`] backed by a PostgreSQL `jsonb` document table.
//!
//! Both halves of a batch go out as one statement: identifiers are looked up
//! through `jsonb_array_elements_text`, predicates are evaluated with the
//! jsonpath `@@` operator, and the two result sets are joined with
//! `UNION ALL`. Rows with an `id` answer identifier lookups; rows with an
//! `index` answer the predicate at that position.

use crate::store::{BatchRequest, BatchResponse, Store};
use docbatch_core::{
    Connection, Cx, Document, Error, Outcome, Row, TypeError, Value, quote_ident,
};
use std::collections::HashMap;
use std::future::Future;

/// Names of the document table and its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStoreConfig {
    /// Table holding one row per document
    pub table: String,
    /// `uuid` primary key column
    pub id_column: String,
    /// `jsonb` document column
    pub object_column: String,
}

impl Default for SqlStoreConfig {
    fn default() -> Self {
        Self {
            table: "items".to_string(),
            id_column: "id".to_string(),
            object_column: "object".to_string(),
        }
    }
}

impl SqlStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the identifier column.
    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Set the document column.
    pub fn object_column(mut self, column: impl Into<String>) -> Self {
        self.object_column = column.into();
        self
    }

    /// Build the batch statement.
    ///
    /// `$1` is a JSON array of identifiers, `$2` a JSON array of jsonpath
    /// predicates. Output columns are always `index`, `id`, `object`.
    pub fn batch_sql(&self) -> String {
        let table = quote_ident(&self.table);
        let id = quote_ident(&self.id_column);
        let object = quote_ident(&self.object_column);
        format!(
            "SELECT NULL::bigint AS index, ids.id, \
             (SELECT t.{object} FROM {table} t WHERE t.{id} = ids.id::uuid) AS object \
             FROM jsonb_array_elements_text($1::jsonb) AS ids(id) \
             UNION ALL \
             SELECT queries.index - 1, NULL AS id, \
             COALESCE((SELECT jsonb_agg(t.{id}) FROM {table} t WHERE t.{object} @@ queries.query::jsonpath), '[]'::jsonb) AS object \
             FROM jsonb_array_elements_text($2::jsonb) WITH ORDINALITY AS queries(query, index)"
        )
    }
}

/// A [`Store`] that runs each batch as one query on a borrowed connection.
///
/// The connection is expected to be inside the request's transaction; the
/// store never issues transaction control itself.
#[derive(Debug)]
pub struct SqlStore<'c, C: Connection> {
    conn: &'c C,
    sql: String,
}

impl<'c, C: Connection> SqlStore<'c, C> {
    /// Create a store over the default `items(id uuid, object jsonb)` table.
    pub fn new(conn: &'c C) -> Self {
        Self::with_config(conn, &SqlStoreConfig::default())
    }

    pub fn with_config(conn: &'c C, config: &SqlStoreConfig) -> Self {
        Self {
            conn,
            sql: config.batch_sql(),
        }
    }

    /// The connection this store reads through.
    pub fn connection(&self) -> &'c C {
        self.conn
    }
}

impl<C: Connection> Store for SqlStore<'_, C> {
    fn fetch_batch(
        &self,
        cx: &Cx,
        request: &BatchRequest,
    ) -> impl Future<Output = Outcome<BatchResponse, Error>> + Send {
        let params = encode_params(request);
        let query_count = request.queries.len();
        async move {
            let params = match params {
                Ok(params) => params,
                Err(e) => return Outcome::Err(e),
            };

            match self.conn.query(cx, &self.sql, &params).await {
                Outcome::Ok(rows) => match decode_rows(&rows, query_count) {
                    Ok(response) => Outcome::Ok(response),
                    Err(e) => Outcome::Err(e),
                },
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }
}

#[allow(clippy::result_large_err)]
fn encode_params(request: &BatchRequest) -> Result<[Value; 2], Error> {
    Ok([
        Value::Text(serde_json::to_string(&request.ids)?),
        Value::Text(serde_json::to_string(&request.queries)?),
    ])
}

#[allow(clippy::result_large_err)]
fn decode_rows(rows: &[Row], query_count: usize) -> Result<BatchResponse, Error> {
    let mut documents = HashMap::new();
    let mut matches = vec![Vec::new(); query_count];

    for row in rows {
        let id: Option<String> = row.get_named("id")?;
        if let Some(id) = id {
            let object: Option<Document> = row.get_named("object")?;
            documents.insert(id, object.filter(|doc| !doc.is_null()));
            continue;
        }

        let index: Option<i64> = row.get_named("index")?;
        let slot = index
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| matches.get_mut(i))
            .ok_or_else(|| {
                Error::Type(TypeError {
                    expected: "predicate index within batch",
                    actual: format!("{index:?}"),
                    column: Some("index".to_string()),
                })
            })?;

        let object: Document = row.get_named("object")?;
        *slot = decode_id_list(object)?;
    }

    Ok(BatchResponse { documents, matches })
}

#[allow(clippy::result_large_err)]
fn decode_id_list(object: Document) -> Result<Vec<String>, Error> {
    let items = match object {
        Document::Array(items) => items,
        other => {
            return Err(Error::Type(TypeError {
                expected: "JSON array of identifiers",
                actual: other.to_string(),
                column: Some("object".to_string()),
            }));
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Document::String(id) => Ok(id),
            other => Err(Error::Type(TypeError {
                expected: "identifier string",
                actual: other.to_string(),
                column: Some("object".to_string()),
            })),
        })
        .collect()
}
