//! SQLite-backed implementation of every evidence store trait.
//!
//! | Trait | Tables |
//! |-------|--------|
//! | [`ChunkIndex`] | `chunk_vectors`, `chunks`, `documents` |
//! | [`GraphStore`] | `graph_nodes`, `graph_edges` |
//! | [`TemplateStore`] | `query_templates` (+ whatever tables the templates read) |
//!
//! Vector search is a brute-force cosine scan over the stored BLOBs.
//! Template SQL is run as written after `:name` placeholders are compiled
//! to positional bindings, wrapped so that at most [`ROW_CAP`] rows come
//! back.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, QueryBuilder, Row as _, Sqlite, SqlitePool, TypeInfo, ValueRef};

use evidence_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use evidence_harness_core::models::{Params, QueryTemplate, Row};
use evidence_harness_core::store::{
    ChunkCandidate, ChunkIndex, GraphEdge, GraphNode, GraphStore, TemplateStore, ROW_CAP,
};
use evidence_harness_core::text::compile_placeholders;

/// A chunk ready to be written, with its embedding.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub id: String,
    pub text: String,
    pub hash: String,
    pub meta: Map<String, Value>,
    pub vector: Vec<f32>,
}

/// Row counts per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: i64,
    pub chunks: i64,
    pub embedded: i64,
    pub graph_nodes: i64,
    pub graph_edges: i64,
    pub templates: i64,
}

/// `params_json` is either a bare list or `{"required": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredParams {
    List(Vec<String>),
    Object {
        #[serde(default)]
        required: Vec<String>,
    },
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn upsert_document(
        &self,
        id: &str,
        title: Option<&str>,
        source: &str,
        metadata: &Map<String, Value>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, source, metadata_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                source = excluded.source,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(source)
        .bind(serde_json::to_string(metadata)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace every chunk (and vector) of `document_id` in one transaction.
    pub async fn replace_chunks(
        &self,
        document_id: &str,
        chunks: &[NewChunk],
        model: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for (i, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, text, hash, meta_json) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(document_id)
            .bind(i as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(serde_json::to_string(&chunk.meta)?)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunk_vectors (chunk_id, document_id, model, dims, embedding) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(document_id)
            .bind(model)
            .bind(chunk.vector.len() as i64)
            .bind(vec_to_blob(&chunk.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_node(&self, node: &GraphNode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO graph_nodes (id, label, properties_json) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                label = excluded.label,
                properties_json = excluded.properties_json
            "#,
        )
        .bind(&node.id)
        .bind(&node.label)
        .bind(serde_json::to_string(&node.properties)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_edge(&self, edge: &GraphEdge) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO graph_edges (id, src_id, dst_id, relation, properties_json)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                src_id = excluded.src_id,
                dst_id = excluded.dst_id,
                relation = excluded.relation,
                properties_json = excluded.properties_json
            "#,
        )
        .bind(&edge.id)
        .bind(&edge.src_id)
        .bind(&edge.dst_id)
        .bind(&edge.relation)
        .bind(serde_json::to_string(&edge.properties)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_template(&self, template: &QueryTemplate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO query_templates (id, name, description, sql_text, params_json)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                sql_text = excluded.sql_text,
                params_json = excluded.params_json
            "#,
        )
        .bind(&template.id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.sql_text)
        .bind(serde_json::to_string(&template.required_params)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Run a multi-statement script, e.g. to create the tables templates
    /// query.
    pub async fn execute_script(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            documents: self.count("documents").await?,
            chunks: self.count("chunks").await?,
            embedded: self.count("chunk_vectors").await?,
            graph_nodes: self.count("graph_nodes").await?,
            graph_edges: self.count("graph_edges").await?,
            templates: self.count("query_templates").await?,
        })
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let n: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(n)
    }
}

fn parse_object(json: &str) -> Map<String, Value> {
    serde_json::from_str(json).unwrap_or_default()
}

fn node_from_row(row: &SqliteRow) -> GraphNode {
    let props: String = row.get("properties_json");
    GraphNode {
        id: row.get("id"),
        label: row.get("label"),
        properties: parse_object(&props),
    }
}

fn edge_from_row(row: &SqliteRow) -> GraphEdge {
    let props: String = row.get("properties_json");
    GraphEdge {
        id: row.get("id"),
        src_id: row.get("src_id"),
        dst_id: row.get("dst_id"),
        relation: row.get("relation"),
        properties: parse_object(&props),
    }
}

fn template_from_row(row: &SqliteRow) -> QueryTemplate {
    let params_json: String = row.get("params_json");
    let required_params = match serde_json::from_str::<StoredParams>(&params_json) {
        Ok(StoredParams::List(names)) => names,
        Ok(StoredParams::Object { required }) => required,
        Err(_) => Vec::new(),
    };
    QueryTemplate {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        sql_text: row.get("sql_text"),
        required_params,
    }
}

/// Convert one result row to JSON, typed by each value's storage class.
fn row_to_json(row: &SqliteRow) -> Result<Row> {
    let mut out = Row::new();
    for column in row.columns() {
        let i = column.ordinal();
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::from(row.try_get::<i64, _>(i)?),
                "REAL" => Value::from(row.try_get::<f64, _>(i)?),
                "BLOB" => Value::from(format!("<{} bytes>", row.try_get::<Vec<u8>, _>(i)?.len())),
                _ => Value::from(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[String]) {
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(id.clone());
    }
}

#[async_trait]
impl ChunkIndex for SqliteStore {
    async fn vector_search(
        &self,
        query_vec: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.document_id, cv.embedding, c.text, c.meta_json, d.title
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            LEFT JOIN documents d ON d.id = cv.document_id
            WHERE (? IS NULL OR cv.document_id = ?)
            "#,
        )
        .bind(document_id)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<ChunkCandidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity =
                    (cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64).clamp(-1.0, 1.0);
                let meta_json: String = row.get("meta_json");
                let mut meta = parse_object(&meta_json);
                if let Some(title) = row.get::<Option<String>, _>("title") {
                    meta.entry("title").or_insert(Value::from(title));
                }
                ChunkCandidate {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    text: row.get("text"),
                    similarity,
                    distance: 1.0 - similarity,
                    meta,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);
        Ok(candidates)
    }
}

#[async_trait]
impl TemplateStore for SqliteStore {
    async fn list_templates(&self) -> Result<Vec<QueryTemplate>> {
        let rows = sqlx::query(
            "SELECT id, name, description, sql_text, params_json FROM query_templates ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(template_from_row).collect())
    }

    async fn get_template(&self, id: &str) -> Result<Option<QueryTemplate>> {
        let row = sqlx::query(
            "SELECT id, name, description, sql_text, params_json FROM query_templates WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(template_from_row))
    }

    async fn run(&self, sql_text: &str, params: &Params) -> Result<Vec<Row>> {
        let (compiled, order) = compile_placeholders(sql_text);
        let body = compiled.trim().trim_end_matches(';').trim_end();
        let wrapped = format!("SELECT * FROM ({body}) LIMIT {ROW_CAP}");

        let mut query = sqlx::query(&wrapped);
        for name in &order {
            let value = params
                .get(name)
                .with_context(|| format!("no binding for :{name}"))?;
            query = query.bind(value.clone());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .with_context(|| "template query failed")?;
        rows.iter().map(row_to_json).collect()
    }
}

#[async_trait]
impl GraphStore for SqliteStore {
    async fn find_nodes_by_label_substring(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<GraphNode>> {
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT id, label, properties_json FROM graph_nodes
            WHERE instr(lower(label), lower(?)) > 0
            ORDER BY rowid
            LIMIT ?
            "#,
        )
        .bind(term)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(node_from_row).collect())
    }

    async fn neighbors(&self, node_ids: &[String], limit: usize) -> Result<Vec<GraphEdge>> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, src_id, dst_id, relation, properties_json FROM graph_edges WHERE src_id IN (",
        );
        push_id_list(&mut builder, node_ids);
        builder.push(") OR dst_id IN (");
        push_id_list(&mut builder, node_ids);
        builder.push(") ORDER BY rowid LIMIT ");
        builder.push_bind(limit as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(edge_from_row).collect())
    }

    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>> {
        let row = sqlx::query("SELECT id, label, properties_json FROM graph_nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(node_from_row))
    }
}
