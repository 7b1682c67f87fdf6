//! # mf-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `mf-core` domain models. It is the durable store behind the feed
//! engine: posts, their reconciled like counts, and follow edges.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mf_core::models::{NewPost, Post, PostId, PostRange, UserId};
use mf_core::traits::{FollowRepo, PostRepo};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS posts (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        author_id   INTEGER NOT NULL,
        content     TEXT    NOT NULL,
        media_url   TEXT,
        like_count  INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT    NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_posts_author_id ON posts (author_id)",
    "CREATE INDEX IF NOT EXISTS idx_posts_like_count ON posts (like_count)",
    "CREATE TABLE IF NOT EXISTS follows (
        follower_id INTEGER NOT NULL,
        followee_id INTEGER NOT NULL,
        created_at  TEXT    NOT NULL,
        PRIMARY KEY (follower_id, followee_id),
        CHECK (follower_id <> followee_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_follows_followee_id ON follows (followee_id)",
];

const POST_COLUMNS: &str = "id, author_id, content, media_url, like_count, created_at";

pub struct SqlitePostRepo {
    pool: SqlitePool,
}

impl SqlitePostRepo {
    /// Connects and makes sure the tables exist.
    ///
    /// # Developer Note
    /// An in-memory database lives inside a single connection, so the pool
    /// is pinned to one connection for `:memory:` URLs.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        tracing::debug!(url, "sqlite store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Helpers for id conversion: SQLite integers are signed.
fn to_db_id(id: u64) -> i64 {
    id as i64
}

fn row_to_post(row: &SqliteRow) -> anyhow::Result<Post> {
    Ok(Post {
        id: row.try_get::<i64, _>("id")? as PostId,
        author_id: row.try_get::<i64, _>("author_id")? as UserId,
        content: row.try_get("content")?,
        media_url: row.try_get("media_url")?,
        like_count: row.try_get::<i64, _>("like_count")?.max(0) as u64,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn rows_to_posts(rows: Vec<SqliteRow>) -> anyhow::Result<Vec<Post>> {
    rows.iter().map(row_to_post).collect()
}

#[async_trait]
impl PostRepo for SqlitePostRepo {
    async fn create_post(&self, post: NewPost) -> anyhow::Result<Post> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO posts (author_id, content, media_url, like_count, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(to_db_id(post.author_id))
        .bind(&post.content)
        .bind(&post.media_url)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Post {
            id: result.last_insert_rowid() as PostId,
            author_id: post.author_id,
            content: post.content,
            media_url: post.media_url,
            like_count: 0,
            created_at,
        })
    }

    async fn get_post(&self, id: PostId) -> anyhow::Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"))
            .bind(to_db_id(id))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_post).transpose()
    }

    async fn get_posts_by_ids(&self, ids: &[PostId]) -> anyhow::Result<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {POST_COLUMNS} FROM posts WHERE id IN ("));
        {
            let mut separated = query_builder.separated(", ");
            for id in ids {
                separated.push_bind(to_db_id(*id));
            }
        }
        query_builder.push(")");

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows_to_posts(rows)
    }

    async fn list_posts(&self, range: PostRange) -> anyhow::Result<Vec<Post>> {
        let mut query_builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {POST_COLUMNS} FROM posts WHERE 1 = 1"));

        if let Some(before) = range.before {
            query_builder.push(" AND id < ").push_bind(to_db_id(before));
        }

        if let Some(created_before) = range.created_before {
            query_builder.push(" AND created_at < ").push_bind(created_before);
        }

        if let Some(authors) = &range.authors {
            if authors.is_empty() {
                return Ok(Vec::new());
            }
            query_builder.push(" AND author_id IN (");
            {
                let mut separated = query_builder.separated(", ");
                for author in authors {
                    separated.push_bind(to_db_id(*author));
                }
            }
            query_builder.push(")");
        }

        query_builder
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(i64::from(range.limit));

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows_to_posts(rows)
    }

    async fn top_posts_by_likes(&self, limit: u32) -> anyhow::Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY like_count DESC, id DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows_to_posts(rows)
    }

    async fn update_like_count(&self, id: PostId, count: u64) -> anyhow::Result<()> {
        sqlx::query("UPDATE posts SET like_count = ? WHERE id = ?")
            .bind(count as i64)
            .bind(to_db_id(id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_post_ids(&self) -> anyhow::Result<Vec<PostId>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM posts")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|id| id as PostId).collect())
    }
}

#[async_trait]
impl FollowRepo for SqlitePostRepo {
    async fn follow(&self, follower: UserId, followee: UserId) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?, ?, ?)
             ON CONFLICT (follower_id, followee_id) DO NOTHING",
        )
        .bind(to_db_id(follower))
        .bind(to_db_id(followee))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unfollow(&self, follower: UserId, followee: UserId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followee_id = ?")
            .bind(to_db_id(follower))
            .bind(to_db_id(followee))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn followers_of(&self, user: UserId) -> anyhow::Result<Vec<UserId>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT follower_id FROM follows WHERE followee_id = ?")
            .bind(to_db_id(user))
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|id| id as UserId).collect())
    }

    async fn following_of(&self, user: UserId) -> anyhow::Result<Vec<UserId>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT followee_id FROM follows WHERE follower_id = ?")
            .bind(to_db_id(user))
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|id| id as UserId).collect())
    }
}
