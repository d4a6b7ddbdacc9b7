//! PostgreSQL schema.
//!
//! Statements are idempotent and applied in order by
//! [`PostgresSocialStore::migrate`](super::PostgresSocialStore::migrate).
//! Handbook ranks live in a `position` column; the `(category, position)`
//! uniqueness is checked at commit so rank shifts may pass through
//! transient duplicates inside a transaction.

/// Schema version recorded alongside the tables.
pub const SCHEMA_VERSION: i32 = 2;

/// DDL statements in application order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS qa_user (
        user_id     TEXT PRIMARY KEY,
        email       TEXT,
        avatar      TEXT,
        role        TEXT NOT NULL DEFAULT 'V' CHECK (role IN ('S', 'T', 'V', 'A'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qa_user_tag (
        id          BIGSERIAL PRIMARY KEY,
        user_id     TEXT NOT NULL REFERENCES qa_user(user_id) ON DELETE CASCADE,
        tag         TEXT NOT NULL,
        UNIQUE (user_id, tag)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qa_question (
        id          BIGSERIAL PRIMARY KEY,
        author      TEXT REFERENCES qa_user(user_id) ON DELETE SET NULL,
        description TEXT,
        topic       TEXT,
        content     TEXT NOT NULL,
        answer_cnt  INTEGER NOT NULL DEFAULT 0 CHECK (answer_cnt >= 0),
        quote       TEXT,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qa_answer (
        id          BIGSERIAL PRIMARY KEY,
        question_id BIGINT REFERENCES qa_question(id) ON DELETE SET NULL,
        author      TEXT REFERENCES qa_user(user_id) ON DELETE SET NULL,
        content     TEXT NOT NULL,
        comment_cnt INTEGER NOT NULL DEFAULT 0 CHECK (comment_cnt >= 0),
        like_cnt    INTEGER NOT NULL DEFAULT 0 CHECK (like_cnt >= 0),
        dislike_cnt INTEGER NOT NULL DEFAULT 0 CHECK (dislike_cnt >= 0),
        quote       TEXT,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qa_post (
        id          BIGSERIAL PRIMARY KEY,
        author      TEXT REFERENCES qa_user(user_id) ON DELETE SET NULL,
        title       TEXT NOT NULL DEFAULT '',
        content     TEXT NOT NULL,
        image_url   TEXT,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qa_comment (
        id          BIGSERIAL PRIMARY KEY,
        answer_id   BIGINT REFERENCES qa_answer(id) ON DELETE SET NULL,
        parent_id   BIGINT REFERENCES qa_comment(id) ON DELETE SET NULL,
        author      TEXT REFERENCES qa_user(user_id) ON DELETE SET NULL,
        content     TEXT NOT NULL,
        reply_cnt   INTEGER NOT NULL DEFAULT 0 CHECK (reply_cnt >= 0),
        like_cnt    INTEGER NOT NULL DEFAULT 0 CHECK (like_cnt >= 0),
        dislike_cnt INTEGER NOT NULL DEFAULT 0 CHECK (dislike_cnt >= 0),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS qa_comment_parent_idx ON qa_comment (parent_id)",
    "CREATE INDEX IF NOT EXISTS qa_comment_answer_idx ON qa_comment (answer_id)",
    r#"
    CREATE TABLE IF NOT EXISTS qa_vote (
        target_kind TEXT NOT NULL CHECK (target_kind IN ('answer', 'comment')),
        target_id   BIGINT NOT NULL,
        voter       TEXT NOT NULL REFERENCES qa_user(user_id) ON DELETE CASCADE,
        value       SMALLINT NOT NULL CHECK (value IN (-1, 0, 1)),
        PRIMARY KEY (target_kind, target_id, voter)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qa_handbook (
        id          BIGSERIAL PRIMARY KEY,
        category    TEXT NOT NULL DEFAULT 'uncategorized',
        position    INTEGER NOT NULL CHECK (position >= 1),
        owner       TEXT REFERENCES qa_user(user_id) ON DELETE SET NULL,
        title       TEXT UNIQUE,
        content     TEXT,
        label       TEXT,
        published   BOOLEAN NOT NULL DEFAULT FALSE,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        CONSTRAINT qa_handbook_slot UNIQUE (category, position) DEFERRABLE INITIALLY DEFERRED
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qa_handbook_draft (
        item_id     BIGINT PRIMARY KEY REFERENCES qa_handbook(id) ON DELETE CASCADE,
        owner       TEXT REFERENCES qa_user(user_id) ON DELETE SET NULL,
        title       TEXT,
        content     TEXT,
        label       TEXT,
        pending     BOOLEAN NOT NULL DEFAULT FALSE,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qa_follow (
        follower    TEXT NOT NULL REFERENCES qa_user(user_id) ON DELETE CASCADE,
        followee    TEXT NOT NULL REFERENCES qa_user(user_id) ON DELETE CASCADE,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (follower, followee),
        CHECK (follower <> followee)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS qa_follow_followee_idx ON qa_follow (followee)",
    r#"
    CREATE TABLE IF NOT EXISTS qa_pair_score (
        user_a      TEXT NOT NULL REFERENCES qa_user(user_id) ON DELETE CASCADE,
        user_b      TEXT NOT NULL REFERENCES qa_user(user_id) ON DELETE CASCADE,
        degree      DOUBLE PRECISION NOT NULL,
        PRIMARY KEY (user_a, user_b)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS qa_pair_score_b_idx ON qa_pair_score (user_b)",
    r#"
    CREATE TABLE IF NOT EXISTS qa_message (
        id          BIGSERIAL PRIMARY KEY,
        source_kind TEXT NOT NULL CHECK (source_kind IN ('question', 'answer', 'post')),
        source_id   BIGINT NOT NULL,
        reply_to    BIGINT REFERENCES qa_message(id) ON DELETE SET NULL,
        content     TEXT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (source_kind, source_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS qa_message_reply_idx ON qa_message (reply_to)",
    r#"
    CREATE TABLE IF NOT EXISTS qa_moment (
        id          BIGSERIAL PRIMARY KEY,
        author      TEXT REFERENCES qa_user(user_id) ON DELETE SET NULL,
        content     TEXT NOT NULL,
        image_url   TEXT,
        quote       TEXT,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS qa_moment_author_idx ON qa_moment (author)",
    r#"
    CREATE TABLE IF NOT EXISTS qa_chat (
        id          BIGSERIAL PRIMARY KEY,
        user_a      TEXT REFERENCES qa_user(user_id) ON DELETE SET NULL,
        user_b      TEXT REFERENCES qa_user(user_id) ON DELETE SET NULL,
        CHECK (user_a <> user_b)
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS qa_chat_pair_idx ON qa_chat (LEAST(user_a, user_b), GREATEST(user_a, user_b))",
    r#"
    CREATE TABLE IF NOT EXISTS qa_chat_message (
        id          BIGSERIAL PRIMARY KEY,
        chat_id     BIGINT NOT NULL REFERENCES qa_chat(id) ON DELETE CASCADE,
        from_user   TEXT REFERENCES qa_user(user_id) ON DELETE SET NULL,
        to_user     TEXT REFERENCES qa_user(user_id) ON DELETE SET NULL,
        content     TEXT,
        quote       TEXT,
        image_url   TEXT,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS qa_chat_message_chat_idx ON qa_chat_message (chat_id, id)",
    r#"
    CREATE TABLE IF NOT EXISTS qa_schema_version (
        version     INTEGER PRIMARY KEY,
        applied_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_idempotent() {
        for stmt in SCHEMA_STATEMENTS {
            assert!(stmt.contains("IF NOT EXISTS"), "not idempotent: {stmt}");
        }
    }

    #[test]
    fn test_slot_uniqueness_is_deferred() {
        let handbook = SCHEMA_STATEMENTS
            .iter()
            .find(|s| s.contains("qa_handbook ("))
            .unwrap();
        assert!(handbook.contains("UNIQUE (category, position) DEFERRABLE INITIALLY DEFERRED"));
    }

    #[test]
    fn test_chat_pair_is_unordered() {
        let index = SCHEMA_STATEMENTS
            .iter()
            .find(|s| s.contains("qa_chat_pair_idx"))
            .unwrap();
        assert!(index.contains("LEAST(user_a, user_b), GREATEST(user_a, user_b)"));
    }
}
