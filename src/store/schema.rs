use anyhow::Result;
use sqlx::PgPool;

/// Create the registry tables and indexes if they do not exist
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing PostgreSQL schema...");

    for (name, ddl) in STATEMENTS {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", name, e))?;
    }

    tracing::info!("PostgreSQL schema initialized successfully");
    Ok(())
}

const STATEMENTS: &[(&str, &str)] = &[
    ("transfer_cases_tb", CREATE_CASES_TABLE),
    ("uq_case_open_per_contract", CREATE_OPEN_CASE_INDEX),
    ("uq_case_resolution_number", CREATE_RESOLUTION_INDEX),
    ("case_documents_tb", CREATE_DOCUMENTS_TABLE),
    ("case_parties_tb", CREATE_PARTIES_TABLE),
    ("case_publications_tb", CREATE_PUBLICATIONS_TABLE),
    ("ownership_records_tb", CREATE_OWNERSHIP_TABLE),
    ("uq_ownership_open_per_contract", CREATE_OPEN_HOLDER_INDEX),
    ("beneficiaries_tb", CREATE_BENEFICIARIES_TABLE),
    ("uq_beneficiary_open_per_contract", CREATE_OPEN_BENEFICIARY_INDEX),
    ("sequence_counters_tb", CREATE_SEQUENCES_TABLE),
    ("contract_movements_tb", CREATE_MOVEMENTS_TABLE),
    ("idx_movements_contract", CREATE_MOVEMENTS_INDEX),
    ("contract_events_tb", CREATE_EVENTS_TABLE),
    ("idx_events_case", CREATE_EVENTS_INDEX),
];

// Status ids 10, 20, 30 are DOCS_PENDING, UNDER_REVIEW, APPROVED
const CREATE_CASES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfer_cases_tb (
    case_id            TEXT PRIMARY KEY,
    org_id             BIGINT NOT NULL,
    case_number        TEXT NOT NULL,
    contract_id        BIGINT NOT NULL,
    transfer_type      SMALLINT NOT NULL,
    status             SMALLINT NOT NULL,
    checklist_version  SMALLINT NOT NULL,
    provisional_until  DATE,
    created_at         TIMESTAMPTZ NOT NULL,
    created_by         BIGINT NOT NULL,
    resolved_at        TIMESTAMPTZ,
    resolution_number  TEXT,
    resolution_ref     TEXT,
    new_record_id      TEXT,
    rejection_reason   TEXT,
    reopen_count       INTEGER NOT NULL DEFAULT 0,
    UNIQUE (org_id, case_number),
    CHECK (transfer_type = 4 OR provisional_until IS NULL)
)
"#;

const CREATE_OPEN_CASE_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS uq_case_open_per_contract
    ON transfer_cases_tb (org_id, contract_id)
    WHERE status IN (10, 20, 30)
"#;

const CREATE_RESOLUTION_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS uq_case_resolution_number
    ON transfer_cases_tb (org_id, resolution_number)
    WHERE resolution_number IS NOT NULL
"#;

const CREATE_DOCUMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS case_documents_tb (
    document_id  TEXT PRIMARY KEY,
    case_id      TEXT NOT NULL REFERENCES transfer_cases_tb (case_id),
    org_id       BIGINT NOT NULL,
    kind         TEXT NOT NULL,
    required     BOOLEAN NOT NULL,
    file_ref     TEXT,
    status       SMALLINT NOT NULL,
    uploaded_at  TIMESTAMPTZ,
    verified_at  TIMESTAMPTZ,
    note         TEXT,
    position     SMALLINT NOT NULL,
    UNIQUE (case_id, kind)
)
"#;

const CREATE_PARTIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS case_parties_tb (
    party_id   TEXT PRIMARY KEY,
    case_id    TEXT NOT NULL REFERENCES transfer_cases_tb (case_id),
    org_id     BIGINT NOT NULL,
    person_id  BIGINT NOT NULL,
    role       SMALLINT NOT NULL,
    share      NUMERIC(5, 2),
    added_at   TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_PUBLICATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS case_publications_tb (
    publication_id  TEXT PRIMARY KEY,
    case_id         TEXT NOT NULL REFERENCES transfer_cases_tb (case_id),
    org_id          BIGINT NOT NULL,
    channel         TEXT NOT NULL,
    published_on    DATE NOT NULL,
    reference       TEXT
)
"#;

const CREATE_OWNERSHIP_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ownership_records_tb (
    record_id          TEXT PRIMARY KEY,
    org_id             BIGINT NOT NULL,
    contract_id        BIGINT NOT NULL,
    holder_id          BIGINT NOT NULL,
    start_date         DATE NOT NULL,
    end_date           DATE,
    provisional        BOOLEAN NOT NULL,
    provisional_until  DATE,
    pensioner          BOOLEAN NOT NULL DEFAULT FALSE,
    pensioner_since    DATE,
    case_id            TEXT,
    CHECK (provisional = (provisional_until IS NOT NULL)),
    CHECK (end_date IS NULL OR end_date >= start_date)
)
"#;

const CREATE_OPEN_HOLDER_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS uq_ownership_open_per_contract
    ON ownership_records_tb (org_id, contract_id)
    WHERE end_date IS NULL
"#;

const CREATE_BENEFICIARIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS beneficiaries_tb (
    beneficiary_id  TEXT PRIMARY KEY,
    org_id          BIGINT NOT NULL,
    contract_id     BIGINT NOT NULL,
    person_id       BIGINT NOT NULL,
    active_from     DATE NOT NULL,
    active_until    DATE,
    case_id         TEXT,
    CHECK (active_until IS NULL OR active_until >= active_from)
)
"#;

const CREATE_OPEN_BENEFICIARY_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS uq_beneficiary_open_per_contract
    ON beneficiaries_tb (org_id, contract_id)
    WHERE active_until IS NULL
"#;

const CREATE_SEQUENCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sequence_counters_tb (
    org_id      BIGINT NOT NULL,
    kind        TEXT NOT NULL,
    year        INTEGER NOT NULL,
    last_value  INTEGER NOT NULL,
    PRIMARY KEY (org_id, kind, year)
)
"#;

const CREATE_MOVEMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS contract_movements_tb (
    seq          BIGSERIAL PRIMARY KEY,
    movement_id  TEXT NOT NULL UNIQUE,
    org_id       BIGINT NOT NULL,
    contract_id  BIGINT NOT NULL,
    kind         TEXT NOT NULL,
    holder_id    BIGINT,
    case_id      TEXT,
    record_id    TEXT,
    actor_id     BIGINT NOT NULL,
    occurred_at  TIMESTAMPTZ NOT NULL,
    detail       TEXT NOT NULL
)
"#;

const CREATE_MOVEMENTS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_movements_contract
    ON contract_movements_tb (org_id, contract_id, occurred_at)
"#;

const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS contract_events_tb (
    seq          BIGSERIAL PRIMARY KEY,
    event_id     TEXT NOT NULL UNIQUE,
    org_id       BIGINT NOT NULL,
    contract_id  BIGINT NOT NULL,
    kind         TEXT NOT NULL,
    case_id      TEXT,
    record_id    TEXT,
    actor_id     BIGINT NOT NULL,
    occurred_at  TIMESTAMPTZ NOT NULL,
    detail       TEXT NOT NULL
)
"#;

const CREATE_EVENTS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_case
    ON contract_events_tb (org_id, case_id)
"#;
