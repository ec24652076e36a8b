//! PostgreSQL store
//!
//! Work items keep their converted field values in a `fields` JSONB column, which
//! the compiled criteria probe with `@>` containment. Connections come from a
//! deadpool pool; every read-then-write runs inside one transaction, and a dropped
//! future rolls that transaction back.

mod params;
mod schema;

pub use params::{number_placeholders, SqlParam};
pub use schema::SCHEMA;

use crate::config::DatabaseConfig;
use crate::criteria::SpaceFilter;
use crate::db::fractional_ordering::{FractionalOrderCalculator, OrderedItem};
use crate::db::store::{LinkStore, Page, StoreResult, WorkItemStore, WorkItemTypeStore};
use crate::db::DatabaseError;
use crate::models::{
    ensure_single_parent, FieldDefinition, NewWorkItemRecord, Topology, TypePath, WorkItemLink,
    WorkItemLinkType, WorkItemRecord, WorkItemRevision, WorkItemType,
};
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{
    Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts,
    Transaction,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

const WORK_ITEM_COLUMNS: &str =
    "id, number, type, version, fields, execution_order, space_id, created_at, updated_at";

const WORK_ITEM_TYPE_COLUMNS: &str = "id, name, description, icon, version, path, fields, \
     space_id, extended_type_id, created_at, updated_at";

const LINK_TYPE_COLUMNS: &str = "id, name, description, forward_name, reverse_name, topology, \
     link_category_id, space_id, version";

const LINK_COLUMNS: &str = "id, version, link_type_id, source_id, target_id, created_at, deleted_at";

#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool from configuration; connections are opened lazily
    pub fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.dbname.clone());
        cfg.user = Some(config.user.clone());
        cfg.password = Some(config.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = PoolConfig::new(config.max_size);
        pool_config.timeouts = Timeouts {
            wait: Some(config.timeout()),
            create: Some(config.timeout()),
            recycle: Some(config.timeout()),
        };
        cfg.pool = Some(pool_config);

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        tracing::info!(
            "Created Postgres pool for {}:{}/{} (max {} connections)",
            config.host,
            config.port,
            config.dbname,
            config.max_size
        );
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Create any missing tables and indexes
    pub async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.batch_execute(SCHEMA)
            .await
            .map_err(|e| DatabaseError::initialization_failed(e.to_string()))
    }

    async fn conn(&self) -> Result<Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }

    async fn order_query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> StoreResult<Option<OrderedItem>> {
        let conn = self.conn().await?;
        let row = conn.query_opt(sql, params).await?;
        row.map(|r| row_to_ordered(&r)).transpose()
    }
}

#[async_trait]
impl WorkItemTypeStore for PgStore {
    async fn get_work_item_type(&self, id: Uuid) -> StoreResult<Option<WorkItemType>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM work_item_types WHERE id = $1", WORK_ITEM_TYPE_COLUMNS);
        let row = conn.query_opt(&sql, &[&id]).await?;
        row.map(|r| row_to_work_item_type(&r)).transpose()
    }

    async fn create_work_item_type(&self, wit: &WorkItemType) -> StoreResult<WorkItemType> {
        let conn = self.conn().await?;
        let fields = serde_json::to_value(&wit.fields)?;
        conn.execute(
            r#"
            INSERT INTO work_item_types (
                id, name, description, icon, version, path, fields,
                space_id, extended_type_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
            &[
                &wit.id,
                &wit.name,
                &wit.description,
                &wit.icon,
                &wit.version,
                &wit.path.as_str(),
                &fields,
                &wit.space_id,
                &wit.extended_type_id,
                &wit.created_at,
                &wit.updated_at,
            ],
        )
        .await?;
        Ok(wit.clone())
    }

    async fn list_work_item_types(&self, space_id: Uuid) -> StoreResult<Vec<WorkItemType>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM work_item_types WHERE space_id = $1 ORDER BY path",
            WORK_ITEM_TYPE_COLUMNS
        );
        let rows = conn.query(&sql, &[&space_id]).await?;
        rows.iter().map(row_to_work_item_type).collect()
    }
}

#[async_trait]
impl WorkItemStore for PgStore {
    async fn get_work_item(&self, id: Uuid) -> StoreResult<Option<WorkItemRecord>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM work_items WHERE id = $1 AND deleted_at IS NULL",
            WORK_ITEM_COLUMNS
        );
        let row = conn.query_opt(&sql, &[&id]).await?;
        row.map(|r| row_to_work_item(&r)).transpose()
    }

    async fn work_item_exists(&self, id: Uuid) -> StoreResult<bool> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM work_items WHERE id = $1 AND deleted_at IS NULL) AS found",
                &[&id],
            )
            .await?;
        Ok(row.try_get("found")?)
    }

    async fn create_work_item(
        &self,
        new: NewWorkItemRecord,
        order_gap: f64,
    ) -> StoreResult<WorkItemRecord> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await?;

        // The upsert locks the space's sequence row until commit, serializing
        // concurrent creates in the same space.
        let number: i64 = tx
            .query_one(
                r#"
                INSERT INTO work_item_number_sequences (space_id, current_val) VALUES ($1, 1)
                ON CONFLICT (space_id)
                DO UPDATE SET current_val = work_item_number_sequences.current_val + 1
                RETURNING current_val
                "#,
                &[&new.space_id],
            )
            .await?
            .try_get("current_val")?;

        let highest: Option<f64> = tx
            .query_one(
                "SELECT max(execution_order) AS highest FROM work_items \
                 WHERE space_id = $1 AND deleted_at IS NULL",
                &[&new.space_id],
            )
            .await?
            .try_get("highest")?;
        let execution_order = FractionalOrderCalculator::calculate_order(highest, None, order_gap);

        let now = Utc::now();
        let record = WorkItemRecord {
            id: new.id,
            number,
            type_id: new.type_id,
            version: 0,
            fields: new.fields,
            execution_order,
            space_id: new.space_id,
            created_at: now,
            updated_at: now,
        };
        let fields = Value::Object(record.fields.clone());

        tx.execute(
            r#"
            INSERT INTO work_items (
                id, number, type, version, fields, execution_order, space_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            &[
                &record.id,
                &record.number,
                &record.type_id,
                &record.version,
                &fields,
                &record.execution_order,
                &record.space_id,
                &record.created_at,
                &record.updated_at,
            ],
        )
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn update_work_item(&self, record: &WorkItemRecord) -> StoreResult<u64> {
        let conn = self.conn().await?;
        let fields = Value::Object(record.fields.clone());
        let rows = conn
            .execute(
                "UPDATE work_items SET fields = $1, version = version + 1, updated_at = now() \
                 WHERE id = $2 AND version = $3 AND deleted_at IS NULL",
                &[&fields, &record.id, &record.version],
            )
            .await?;
        Ok(rows)
    }

    async fn delete_work_item(&self, id: Uuid, expected_version: i64) -> StoreResult<u64> {
        let conn = self.conn().await?;
        let rows = conn
            .execute(
                "UPDATE work_items SET deleted_at = now(), version = version + 1 \
                 WHERE id = $1 AND version = $2 AND deleted_at IS NULL",
                &[&id, &expected_version],
            )
            .await?;
        Ok(rows)
    }

    async fn list_work_items(
        &self,
        filter: &SpaceFilter,
        page: Page,
    ) -> StoreResult<(Vec<WorkItemRecord>, u64)> {
        let (clause, next) = number_placeholders(filter.where_clause(), 1);
        let bound: Vec<SqlParam<'_>> = filter.parameters().iter().map(SqlParam).collect();
        let offset = i64::try_from(page.offset)
            .map_err(|_| DatabaseError::sql_execution("page offset out of range"))?;
        let limit = i64::try_from(page.limit)
            .map_err(|_| DatabaseError::sql_execution("page limit out of range"))?;

        let mut params: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        params.push(&offset);
        params.push(&limit);

        let sql = format!(
            "SELECT {}, count(*) OVER () AS total_count FROM work_items \
             WHERE deleted_at IS NULL AND {} \
             ORDER BY execution_order DESC OFFSET ${} LIMIT ${}",
            WORK_ITEM_COLUMNS,
            clause,
            next,
            next + 1
        );

        let conn = self.conn().await?;
        let rows = conn.query(&sql, &params).await?;

        let total = match rows.first() {
            Some(row) => row.try_get::<_, i64>("total_count")?,
            // The window count is empty past the last page; count separately
            None => {
                let count_sql = format!(
                    "SELECT count(*) AS total_count FROM work_items WHERE deleted_at IS NULL AND {}",
                    clause
                );
                conn.query_one(&count_sql, &params[..params.len() - 2])
                    .await?
                    .try_get::<_, i64>("total_count")?
            }
        };

        let records = rows.iter().map(row_to_work_item).collect::<StoreResult<Vec<_>>>()?;
        tracing::debug!(
            "Listed {} of {} work items in space {}",
            records.len(),
            total,
            filter.space_id()
        );
        Ok((records, total.max(0) as u64))
    }

    async fn highest_order(&self, space_id: Uuid) -> StoreResult<Option<OrderedItem>> {
        self.order_query(
            "SELECT id, execution_order FROM work_items WHERE space_id = $1 AND deleted_at IS NULL \
             ORDER BY execution_order DESC LIMIT 1",
            &[&space_id],
        )
        .await
    }

    async fn lowest_order(&self, space_id: Uuid) -> StoreResult<Option<OrderedItem>> {
        self.order_query(
            "SELECT id, execution_order FROM work_items WHERE space_id = $1 AND deleted_at IS NULL \
             ORDER BY execution_order ASC LIMIT 1",
            &[&space_id],
        )
        .await
    }

    async fn next_order_above(
        &self,
        space_id: Uuid,
        order: f64,
    ) -> StoreResult<Option<OrderedItem>> {
        self.order_query(
            "SELECT id, execution_order FROM work_items WHERE space_id = $1 AND deleted_at IS NULL \
             AND execution_order > $2 ORDER BY execution_order ASC LIMIT 1",
            &[&space_id, &order],
        )
        .await
    }

    async fn next_order_below(
        &self,
        space_id: Uuid,
        order: f64,
    ) -> StoreResult<Option<OrderedItem>> {
        self.order_query(
            "SELECT id, execution_order FROM work_items WHERE space_id = $1 AND deleted_at IS NULL \
             AND execution_order < $2 ORDER BY execution_order DESC LIMIT 1",
            &[&space_id, &order],
        )
        .await
    }

    async fn update_execution_order(
        &self,
        id: Uuid,
        expected_version: i64,
        order: f64,
    ) -> StoreResult<u64> {
        let conn = self.conn().await?;
        let rows = conn
            .execute(
                "UPDATE work_items SET execution_order = $1, version = version + 1, updated_at = now() \
                 WHERE id = $2 AND version = $3 AND deleted_at IS NULL",
                &[&order, &id, &expected_version],
            )
            .await?;
        Ok(rows)
    }

    async fn respace_execution_orders(&self, space_id: Uuid, gap: f64) -> StoreResult<u64> {
        let conn = self.conn().await?;
        let rows = conn
            .execute(
                r#"
                UPDATE work_items AS w
                SET execution_order = ranked.rank::double precision * $2::double precision
                FROM (
                    SELECT id, row_number() OVER (ORDER BY execution_order ASC, number ASC) AS rank
                    FROM work_items
                    WHERE space_id = $1 AND deleted_at IS NULL
                ) AS ranked
                WHERE w.id = ranked.id
                "#,
                &[&space_id, &gap],
            )
            .await?;
        tracing::debug!("Re-spaced {} work items in space {}", rows, space_id);
        Ok(rows)
    }

    async fn record_revision(&self, revision: &WorkItemRevision) -> StoreResult<()> {
        let conn = self.conn().await?;
        let fields = revision.fields.clone().map(Value::Object);
        conn.execute(
            r#"
            INSERT INTO work_item_revisions (
                id, work_item_id, kind, modifier, version, fields, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
            &[
                &revision.id,
                &revision.work_item_id,
                &revision.kind.as_str(),
                &revision.modifier,
                &revision.version,
                &fields,
                &revision.recorded_at,
            ],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LinkStore for PgStore {
    async fn create_link_type(&self, link_type: &WorkItemLinkType) -> StoreResult<WorkItemLinkType> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO work_item_link_types (
                id, name, description, forward_name, reverse_name, topology,
                link_category_id, space_id, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            &[
                &link_type.id,
                &link_type.name,
                &link_type.description,
                &link_type.forward_name,
                &link_type.reverse_name,
                &link_type.topology.as_str(),
                &link_type.link_category_id,
                &link_type.space_id,
                &link_type.version,
            ],
        )
        .await?;
        Ok(link_type.clone())
    }

    async fn get_link_type(&self, id: Uuid) -> StoreResult<Option<WorkItemLinkType>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM work_item_link_types WHERE id = $1", LINK_TYPE_COLUMNS);
        let row = conn.query_opt(&sql, &[&id]).await?;
        row.map(|r| row_to_link_type(&r)).transpose()
    }

    async fn get_link(&self, id: Uuid) -> StoreResult<Option<WorkItemLink>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM work_item_links WHERE id = $1 AND deleted_at IS NULL",
            LINK_COLUMNS
        );
        let row = conn.query_opt(&sql, &[&id]).await?;
        row.map(|r| row_to_link(&r)).transpose()
    }

    async fn find_parent_links(
        &self,
        link_type_id: Uuid,
        target_id: Uuid,
    ) -> StoreResult<Vec<WorkItemLink>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(&parent_links_sql(), &[&link_type_id, &target_id])
            .await?;
        rows.iter().map(row_to_link).collect()
    }

    async fn create_link(
        &self,
        link: &WorkItemLink,
        link_type: &WorkItemLinkType,
    ) -> StoreResult<WorkItemLink> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await?;

        check_topology(&tx, link, link_type).await?;

        tx.execute(
            r#"
            INSERT INTO work_item_links (
                id, version, link_type_id, source_id, target_id, created_at, deleted_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
            &[
                &link.id,
                &link.version,
                &link.link_type_id,
                &link.source_id,
                &link.target_id,
                &link.created_at,
                &link.deleted_at,
            ],
        )
        .await?;

        tx.commit().await?;
        Ok(link.clone())
    }

    async fn update_link(
        &self,
        link: &WorkItemLink,
        link_type: &WorkItemLinkType,
    ) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await?;

        check_topology(&tx, link, link_type).await?;

        let rows = tx
            .execute(
                "UPDATE work_item_links \
                 SET version = version + 1, link_type_id = $1, source_id = $2, target_id = $3 \
                 WHERE id = $4 AND version = $5 AND deleted_at IS NULL",
                &[
                    &link.link_type_id,
                    &link.source_id,
                    &link.target_id,
                    &link.id,
                    &link.version,
                ],
            )
            .await?;

        tx.commit().await?;
        Ok(rows)
    }

    async fn delete_link(&self, id: Uuid) -> StoreResult<bool> {
        let conn = self.conn().await?;
        let rows = conn
            .execute(
                "UPDATE work_item_links SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
                &[&id],
            )
            .await?;
        Ok(rows > 0)
    }
}

fn parent_links_sql() -> String {
    format!(
        "SELECT {} FROM work_item_links \
         WHERE link_type_id = $1 AND target_id = $2 AND deleted_at IS NULL",
        LINK_COLUMNS
    )
}

/// Tree links lock the target row first, so concurrent writers for the same child
/// run their lookup and write one after the other.
async fn check_topology(
    tx: &Transaction<'_>,
    link: &WorkItemLink,
    link_type: &WorkItemLinkType,
) -> StoreResult<()> {
    if link_type.topology == Topology::Tree {
        tx.query_opt(
            "SELECT id FROM work_items WHERE id = $1 FOR UPDATE",
            &[&link.target_id],
        )
        .await?;
    }

    let rows = tx
        .query(&parent_links_sql(), &[&link.link_type_id, &link.target_id])
        .await?;
    let existing = rows.iter().map(row_to_link).collect::<StoreResult<Vec<_>>>()?;
    ensure_single_parent(link_type, link, &existing)?;
    Ok(())
}

fn row_to_ordered(row: &Row) -> StoreResult<OrderedItem> {
    Ok(OrderedItem::new(
        row.try_get("id")?,
        row.try_get("execution_order")?,
    ))
}

fn row_to_work_item(row: &Row) -> StoreResult<WorkItemRecord> {
    let id: Uuid = row.try_get("id")?;
    let fields = match row.try_get::<_, Value>("fields")? {
        Value::Object(map) => map,
        other => {
            return Err(DatabaseError::corrupt(format!(
                "work item {} has non-object fields: {}",
                id, other
            )))
        }
    };

    Ok(WorkItemRecord {
        id,
        number: row.try_get("number")?,
        type_id: row.try_get("type")?,
        version: row.try_get("version")?,
        fields,
        execution_order: row.try_get("execution_order")?,
        space_id: row.try_get("space_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_work_item_type(row: &Row) -> StoreResult<WorkItemType> {
    let path: String = row.try_get("path")?;
    let fields: BTreeMap<String, FieldDefinition> =
        serde_json::from_value(row.try_get::<_, Value>("fields")?)?;

    Ok(WorkItemType {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        icon: row.try_get("icon")?,
        version: row.try_get("version")?,
        path: TypePath::parse(&path).map_err(|e| DatabaseError::corrupt(e.to_string()))?,
        fields,
        space_id: row.try_get("space_id")?,
        extended_type_id: row.try_get("extended_type_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_link_type(row: &Row) -> StoreResult<WorkItemLinkType> {
    let topology: String = row.try_get("topology")?;
    Ok(WorkItemLinkType {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        forward_name: row.try_get("forward_name")?,
        reverse_name: row.try_get("reverse_name")?,
        topology: topology.parse().map_err(DatabaseError::corrupt)?,
        link_category_id: row.try_get("link_category_id")?,
        space_id: row.try_get("space_id")?,
        version: row.try_get("version")?,
    })
}

fn row_to_link(row: &Row) -> StoreResult<WorkItemLink> {
    Ok(WorkItemLink {
        id: row.try_get("id")?,
        version: row.try_get("version")?,
        link_type_id: row.try_get("link_type_id")?,
        source_id: row.try_get("source_id")?,
        target_id: row.try_get("target_id")?,
        created_at: row.try_get("created_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}
