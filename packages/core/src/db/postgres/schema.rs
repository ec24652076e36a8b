//! Minimal idempotent schema for the Postgres store
//!
//! Migrations proper are owned by the deployment; this only creates what is
//! missing so a fresh database can be used directly.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS work_item_types (
    id               UUID PRIMARY KEY,
    name             TEXT NOT NULL,
    description      TEXT,
    icon             TEXT NOT NULL DEFAULT '',
    version          BIGINT NOT NULL DEFAULT 0,
    path             TEXT NOT NULL,
    fields           JSONB NOT NULL DEFAULT '{}',
    space_id         UUID NOT NULL,
    extended_type_id UUID REFERENCES work_item_types (id),
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at       TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_work_item_types_path
    ON work_item_types (path text_pattern_ops);
CREATE INDEX IF NOT EXISTS idx_work_item_types_space
    ON work_item_types (space_id);

CREATE TABLE IF NOT EXISTS work_items (
    id              UUID PRIMARY KEY,
    number          BIGINT NOT NULL,
    type            UUID NOT NULL REFERENCES work_item_types (id),
    version         BIGINT NOT NULL DEFAULT 0,
    fields          JSONB NOT NULL DEFAULT '{}',
    execution_order DOUBLE PRECISION NOT NULL,
    space_id        UUID NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    deleted_at      TIMESTAMPTZ,
    UNIQUE (space_id, number)
);
CREATE INDEX IF NOT EXISTS idx_work_items_fields
    ON work_items USING GIN (fields);
CREATE INDEX IF NOT EXISTS idx_work_items_order
    ON work_items (space_id, execution_order) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS work_item_number_sequences (
    space_id    UUID PRIMARY KEY,
    current_val BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS work_item_link_types (
    id               UUID PRIMARY KEY,
    name             TEXT NOT NULL,
    description      TEXT,
    forward_name     TEXT NOT NULL,
    reverse_name     TEXT NOT NULL,
    topology         TEXT NOT NULL,
    link_category_id UUID NOT NULL,
    space_id         UUID NOT NULL,
    version          BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS work_item_links (
    id           UUID PRIMARY KEY,
    version      BIGINT NOT NULL DEFAULT 0,
    link_type_id UUID NOT NULL REFERENCES work_item_link_types (id),
    source_id    UUID NOT NULL REFERENCES work_items (id),
    target_id    UUID NOT NULL REFERENCES work_items (id),
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    deleted_at   TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS idx_work_item_links_target
    ON work_item_links (link_type_id, target_id) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS work_item_revisions (
    id           UUID PRIMARY KEY,
    work_item_id UUID NOT NULL,
    kind         TEXT NOT NULL,
    modifier     UUID NOT NULL,
    version      BIGINT NOT NULL,
    fields       JSONB,
    recorded_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_work_item_revisions_item
    ON work_item_revisions (work_item_id, recorded_at);
"#;
