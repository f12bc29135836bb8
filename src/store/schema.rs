pub const SCHEMA: &str = r#"
-- Users are created by signup; name and email are both login identifiers
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,       -- argon2id hash with embedded salt
    created_at TEXT DEFAULT (datetime('now'))
);

-- Shared collections of posts
CREATE TABLE IF NOT EXISTS databases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    database_id INTEGER NOT NULL REFERENCES databases(id),
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Tags are global; the canonical title is the identity
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL UNIQUE
);

-- Access roster: 'owner' or 'viewer' per (user, database)
CREATE TABLE IF NOT EXISTS user_database_rels (
    user_id INTEGER NOT NULL REFERENCES users(id),
    database_id INTEGER NOT NULL REFERENCES databases(id),
    permission_type TEXT NOT NULL CHECK (permission_type IN ('owner', 'viewer')),
    PRIMARY KEY (user_id, database_id)
);

CREATE TABLE IF NOT EXISTS post_tag_rels (
    post_id INTEGER NOT NULL REFERENCES posts(id),
    tag_id INTEGER NOT NULL REFERENCES tags(id),
    PRIMARY KEY (post_id, tag_id)
);

-- Tags known within a database, independent of which posts use them
CREATE TABLE IF NOT EXISTS tag_database_rels (
    database_id INTEGER NOT NULL REFERENCES databases(id),
    tag_id INTEGER NOT NULL REFERENCES tags(id),
    PRIMARY KEY (database_id, tag_id)
);

-- Bearer sessions; the raw token is never stored
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    token_hash TEXT NOT NULL,
    token_lookup TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT NOT NULL
);

-- Fixed-window failure counters for abuse rate limiting
CREATE TABLE IF NOT EXISTS failed_attempts (
    key TEXT PRIMARY KEY,
    count INTEGER NOT NULL DEFAULT 0,
    expires_at INTEGER
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_posts_database ON posts(database_id);
CREATE INDEX IF NOT EXISTS idx_user_database_rels_database ON user_database_rels(database_id);
CREATE INDEX IF NOT EXISTS idx_post_tag_rels_tag ON post_tag_rels(tag_id);
CREATE INDEX IF NOT EXISTS idx_tag_database_rels_tag ON tag_database_rels(tag_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_lookup ON sessions(token_lookup);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
"#;
