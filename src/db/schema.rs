use sqlx::SqlitePool;

/// `SQLite` connection pragmas. Foreign keys default to off per-connection in
/// `SQLite`, so every pool must re-enable them; deferred constraint checking
/// is what lets `protocol_store` rows be inserted for a JID that is attached
/// to a `sessions` row within the same transaction.
const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
";

const CREATE_SESSIONS: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id                  TEXT PRIMARY KEY,
    name                TEXT NOT NULL UNIQUE,
    api_key             TEXT NOT NULL UNIQUE,
    jid                 TEXT UNIQUE,
    status              TEXT NOT NULL DEFAULT 'disconnected'
                        CHECK (status IN ('disconnected','connecting','connected','authenticated','error')),
    proxy_type          TEXT CHECK (proxy_type IS NULL OR proxy_type IN ('http','socks5')),
    proxy_host          TEXT,
    proxy_port          INTEGER,
    proxy_username      TEXT,
    proxy_password      TEXT,
    auto_reconnect      INTEGER NOT NULL DEFAULT 0,
    metadata            TEXT NOT NULL DEFAULT '{}',
    messages_received   INTEGER NOT NULL DEFAULT 0,
    messages_sent       INTEGER NOT NULL DEFAULT 0,
    reconnections       INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    last_connected_at   TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
CREATE INDEX IF NOT EXISTS idx_sessions_name ON sessions(name);
";

const CREATE_WEBHOOKS: &str = "
CREATE TABLE IF NOT EXISTS webhooks (
    id          TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL UNIQUE REFERENCES sessions(id) ON DELETE CASCADE,
    url         TEXT NOT NULL,
    events      TEXT NOT NULL,
    raw_mode    INTEGER NOT NULL DEFAULT 0,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
";

const CREATE_MESSAGES: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id                   TEXT PRIMARY KEY,
    protocol_message_id  TEXT NOT NULL,
    session_id           TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    chat_jid             TEXT NOT NULL,
    from_jid             TEXT NOT NULL,
    to_jid               TEXT,
    message_type         TEXT NOT NULL
                         CHECK (message_type IN ('text','image','audio','video','document','sticker',
                                                  'location','contact','poll','reaction','system','call','unknown')),
    content              TEXT,
    raw_message          TEXT NOT NULL,
    direction            TEXT NOT NULL CHECK (direction IN ('incoming','outgoing')),
    status               TEXT NOT NULL
                         CHECK (status IN ('received','sent','delivered','read','failed','pending',
                                            'server_ack','retry','undecryptable')),
    is_from_me           INTEGER NOT NULL DEFAULT 0,
    is_ephemeral         INTEGER NOT NULL DEFAULT 0,
    timestamp            TEXT NOT NULL,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL,
    UNIQUE(session_id, protocol_message_id)
);
CREATE INDEX IF NOT EXISTS idx_messages_session_chat ON messages(session_id, chat_jid, timestamp DESC);
";

/// Opaque protocol-store placeholder. The gateway never interprets these
/// rows; this table only exists to prove out the cascade-on-JID-delete
/// contract with a deferrable FK.
const CREATE_PROTOCOL_STORE: &str = "
CREATE TABLE IF NOT EXISTS protocol_store (
    jid     TEXT NOT NULL,
    kind    TEXT NOT NULL,
    payload BLOB NOT NULL,
    PRIMARY KEY (jid, kind),
    FOREIGN KEY (jid) REFERENCES sessions(jid) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED
);
";

/// Initializes the full schema. All statements use `IF NOT EXISTS`, so the
/// function is idempotent and safe to call on every start-up.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(PRAGMAS).execute(pool).await?;
    sqlx::raw_sql(CREATE_SESSIONS).execute(pool).await?;
    sqlx::raw_sql(CREATE_WEBHOOKS).execute(pool).await?;
    sqlx::raw_sql(CREATE_MESSAGES).execute(pool).await?;
    sqlx::raw_sql(CREATE_PROTOCOL_STORE).execute(pool).await?;
    Ok(())
}
