//! Idempotent schema provisioning.
//!
//! Creates every table, constraint, index, and row-level-security policy
//! the API relies on. Safe to run repeatedly; invoked by the `provision`
//! CLI subcommand and by the database-backed integration tests.
//!
//! Policies read the subject from `current_setting('app.current_subject')`,
//! which [`crate::store::begin_scoped`] sets per transaction. Profile tables
//! are writable only through the owning parent; gameplay tables are readable
//! across families (friend search, shared rooms) and the API's ownership
//! checks gate the writes.

use anyhow::{Context, Result};
use sqlx::PgPool;

pub async fn provision(pool: &PgPool) -> Result<()> {
    // --- Parent profiles ---
    sqlx::raw_sql(
        r#"CREATE TABLE IF NOT EXISTS parent_profiles (
            id          UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            subject     TEXT UNIQUE NOT NULL,
            email       TEXT NOT NULL,
            name        TEXT,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    )
    .execute(pool)
    .await?;

    // --- Child profiles (room_id FK added after game_rooms exists) ---
    sqlx::raw_sql(
        r#"CREATE TABLE IF NOT EXISTS child_profiles (
            id                  UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            parent_id           UUID NOT NULL REFERENCES parent_profiles(id) ON DELETE CASCADE,
            name                TEXT NOT NULL,
            age_group           TEXT NOT NULL,
            avatar              TEXT,
            voice_clone_enabled BOOLEAN NOT NULL DEFAULT FALSE,
            voice_clone_id      TEXT,
            is_online           BOOLEAN NOT NULL DEFAULT FALSE,
            last_seen_at        TIMESTAMPTZ DEFAULT now(),
            room_id             UUID,
            created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at          TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    )
    .execute(pool)
    .await?;

    // --- Game rooms ---
    sqlx::raw_sql(
        r#"CREATE TABLE IF NOT EXISTS game_rooms (
            id                UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            room_code         TEXT UNIQUE NOT NULL,
            host_child_id     UUID NOT NULL REFERENCES child_profiles(id) ON DELETE CASCADE,
            game_id           TEXT NOT NULL,
            difficulty        TEXT NOT NULL,
            max_players       INT NOT NULL DEFAULT 4,
            current_players   INT NOT NULL DEFAULT 1,
            status            TEXT NOT NULL DEFAULT 'waiting'
                              CHECK (status IN ('waiting', 'playing', 'finished')),
            has_ai_player     BOOLEAN NOT NULL DEFAULT FALSE,
            ai_player_name    TEXT,
            ai_player_avatar  TEXT,
            selected_category TEXT,
            created_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
            CHECK (current_players <= max_players)
        )"#,
    )
    .execute(pool)
    .await?;

    // child_profiles.room_id → game_rooms, resolvable only now (circular ref)
    sqlx::raw_sql(
        r#"DO $$ BEGIN
             IF NOT EXISTS (
               SELECT 1 FROM information_schema.table_constraints
               WHERE constraint_name = 'child_profiles_room_id_fkey'
             ) THEN
               ALTER TABLE child_profiles
               ADD CONSTRAINT child_profiles_room_id_fkey
                 FOREIGN KEY (room_id) REFERENCES game_rooms(id) ON DELETE SET NULL;
             END IF;
           END $$"#,
    )
    .execute(pool)
    .await?;

    // --- Friend edges ---
    sqlx::raw_sql(
        r#"CREATE TABLE IF NOT EXISTS friend_edges (
            id            UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            requester_id  UUID NOT NULL REFERENCES child_profiles(id) ON DELETE CASCADE,
            addressee_id  UUID NOT NULL REFERENCES child_profiles(id) ON DELETE CASCADE,
            status        TEXT NOT NULL DEFAULT 'pending'
                          CHECK (status IN ('pending', 'accepted', 'blocked')),
            created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
            CHECK (requester_id <> addressee_id)
        )"#,
    )
    .execute(pool)
    .await?;

    // One edge per unordered pair, regardless of direction
    sqlx::raw_sql(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS friend_edges_pair_idx
           ON friend_edges (LEAST(requester_id, addressee_id),
                            GREATEST(requester_id, addressee_id))"#,
    )
    .execute(pool)
    .await?;

    // --- Room participants ---
    sqlx::raw_sql(
        r#"CREATE TABLE IF NOT EXISTS room_participants (
            id            UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            room_id       UUID NOT NULL REFERENCES game_rooms(id) ON DELETE CASCADE,
            child_id      UUID REFERENCES child_profiles(id) ON DELETE CASCADE,
            player_name   TEXT NOT NULL,
            player_avatar TEXT,
            is_ai         BOOLEAN NOT NULL DEFAULT FALSE,
            joined_at     TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    )
    .execute(pool)
    .await?;

    // --- Join requests / invitations ---
    sqlx::raw_sql(
        r#"CREATE TABLE IF NOT EXISTS join_requests (
            id            UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            room_id       UUID REFERENCES game_rooms(id) ON DELETE CASCADE,
            room_code     TEXT NOT NULL,
            child_id      UUID NOT NULL REFERENCES child_profiles(id) ON DELETE CASCADE,
            player_name   TEXT NOT NULL,
            player_avatar TEXT,
            status        TEXT NOT NULL DEFAULT 'pending'
                          CHECK (status IN ('pending', 'approved', 'denied')),
            created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    )
    .execute(pool)
    .await?;

    // --- Game sessions ---
    sqlx::raw_sql(
        r#"CREATE TABLE IF NOT EXISTS game_sessions (
            id                    UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            room_id               UUID NOT NULL REFERENCES game_rooms(id) ON DELETE CASCADE,
            game_id               TEXT NOT NULL,
            difficulty            TEXT NOT NULL,
            selected_category     TEXT,
            game_data             JSONB,
            current_turn_child_id UUID,
            state                 TEXT NOT NULL DEFAULT 'active'
                                  CHECK (state IN ('active', 'paused', 'finished')),
            created_at            TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at            TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    )
    .execute(pool)
    .await?;

    // --- Game scores (append-only) ---
    sqlx::raw_sql(
        r#"CREATE TABLE IF NOT EXISTS game_scores (
            id                 UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            room_id            UUID NOT NULL REFERENCES game_rooms(id) ON DELETE CASCADE,
            session_id         UUID NOT NULL REFERENCES game_sessions(id) ON DELETE CASCADE,
            child_id           UUID REFERENCES child_profiles(id) ON DELETE CASCADE,
            player_name        TEXT NOT NULL,
            player_avatar      TEXT,
            is_ai              BOOLEAN NOT NULL DEFAULT FALSE,
            score              INT NOT NULL DEFAULT 0,
            questions_answered INT NOT NULL DEFAULT 0,
            correct_answers    INT NOT NULL DEFAULT 0,
            time_spent_secs    INT NOT NULL DEFAULT 0,
            created_at         TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    )
    .execute(pool)
    .await?;

    // --- Generated stories ---
    sqlx::raw_sql(
        r#"CREATE TABLE IF NOT EXISTS generated_stories (
            id         UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            child_id   UUID NOT NULL REFERENCES child_profiles(id) ON DELETE CASCADE,
            title      TEXT NOT NULL,
            content    TEXT NOT NULL,
            audio_url  TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    )
    .execute(pool)
    .await?;

    // --- Voice subscriptions ---
    sqlx::raw_sql(
        r#"CREATE TABLE IF NOT EXISTS voice_subscriptions (
            id                     UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            parent_id              UUID UNIQUE NOT NULL REFERENCES parent_profiles(id) ON DELETE CASCADE,
            stripe_customer_id     TEXT,
            stripe_subscription_id TEXT,
            status                 TEXT NOT NULL DEFAULT 'inactive',
            plan_type              TEXT NOT NULL DEFAULT 'basic',
            created_at             TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at             TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    )
    .execute(pool)
    .await?;

    // --- Indexes ---
    sqlx::raw_sql(
        r#"CREATE INDEX IF NOT EXISTS child_profiles_parent_idx ON child_profiles(parent_id);
           CREATE INDEX IF NOT EXISTS child_profiles_room_idx ON child_profiles(room_id);
           CREATE INDEX IF NOT EXISTS friend_edges_requester_idx ON friend_edges(requester_id);
           CREATE INDEX IF NOT EXISTS friend_edges_addressee_idx ON friend_edges(addressee_id);
           CREATE INDEX IF NOT EXISTS room_participants_room_idx ON room_participants(room_id);
           CREATE INDEX IF NOT EXISTS join_requests_room_idx ON join_requests(room_id);
           CREATE INDEX IF NOT EXISTS join_requests_child_idx ON join_requests(child_id);
           CREATE INDEX IF NOT EXISTS game_scores_room_idx ON game_scores(room_id);
           CREATE INDEX IF NOT EXISTS generated_stories_child_idx ON generated_stories(child_id)"#,
    )
    .execute(pool)
    .await?;

    provision_rls(pool).await?;

    tracing::info!("Schema provisioned");
    Ok(())
}

/// Enable row-level security and (re)create the policies.
async fn provision_rls(pool: &PgPool) -> Result<()> {
    // updated_at maintenance
    sqlx::raw_sql(
        r#"CREATE OR REPLACE FUNCTION touch_updated_at()
           RETURNS TRIGGER AS $fn$
           BEGIN NEW.updated_at = now(); RETURN NEW; END;
           $fn$ LANGUAGE plpgsql"#,
    )
    .execute(pool)
    .await?;

    for table in &[
        "parent_profiles",
        "child_profiles",
        "friend_edges",
        "game_rooms",
        "join_requests",
        "game_sessions",
        "voice_subscriptions",
    ] {
        sqlx::raw_sql(&format!(
            r#"DROP TRIGGER IF EXISTS {table}_touch_updated_at ON {table};
               CREATE TRIGGER {table}_touch_updated_at
               BEFORE UPDATE ON {table}
               FOR EACH ROW EXECUTE FUNCTION touch_updated_at()"#
        ))
        .execute(pool)
        .await?;
    }

    // Owner-scoped tables: rows reachable only through the caller's parent row
    sqlx::raw_sql(
        r#"ALTER TABLE parent_profiles ENABLE ROW LEVEL SECURITY;
           DROP POLICY IF EXISTS parent_profiles_owner ON parent_profiles;
           CREATE POLICY parent_profiles_owner ON parent_profiles
             USING (subject = current_setting('app.current_subject', true))
             WITH CHECK (subject = current_setting('app.current_subject', true))"#,
    )
    .execute(pool)
    .await
    .context("failed to provision parent_profiles policy")?;

    sqlx::raw_sql(
        r#"ALTER TABLE voice_subscriptions ENABLE ROW LEVEL SECURITY;
           DROP POLICY IF EXISTS voice_subscriptions_owner ON voice_subscriptions;
           CREATE POLICY voice_subscriptions_owner ON voice_subscriptions
             USING (parent_id IN (
               SELECT id FROM parent_profiles
               WHERE subject = current_setting('app.current_subject', true)))"#,
    )
    .execute(pool)
    .await?;

    // Shared tables: friend search, room rosters, and host-leave all cross
    // family boundaries. The API's ownership checks gate the writes.
    for table in &[
        "child_profiles",
        "friend_edges",
        "game_rooms",
        "room_participants",
        "join_requests",
        "game_sessions",
        "game_scores",
        "generated_stories",
    ] {
        sqlx::raw_sql(&format!(
            r#"ALTER TABLE {table} ENABLE ROW LEVEL SECURITY;
               DROP POLICY IF EXISTS {table}_shared ON {table};
               CREATE POLICY {table}_shared ON {table} USING (true)"#
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}
