//! In-memory post and follow store for unit tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mf_core::models::{NewPost, Post, PostId, PostRange, UserId};
use mf_core::traits::{FollowRepo, PostRepo};

#[derive(Default)]
struct State {
    posts: Vec<Post>,
    follows: BTreeSet<(UserId, UserId)>,
}

#[derive(Default)]
pub struct MemoryRepo {
    state: Mutex<State>,
    top_posts_delay: Option<Duration>,
    pub top_posts_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub fail_top_posts: AtomicBool,
    pub fail_reads: AtomicBool,
    pub fail_followers: AtomicBool,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `top_posts_by_likes` call sleep first, to widen races.
    pub fn with_top_posts_delay(mut self, delay: Duration) -> Self {
        self.top_posts_delay = Some(delay);
        self
    }

    fn insert(&self, author_id: UserId, like_count: u64, created_secs: Option<i64>) -> Post {
        let mut state = self.state.lock().unwrap();
        let id = state.posts.len() as PostId + 1;
        let secs = created_secs.unwrap_or(id as i64 * 10);
        let post = Post {
            id,
            author_id,
            content: format!("post {id}"),
            media_url: None,
            like_count,
            created_at: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
        };
        state.posts.push(post.clone());
        post
    }

    pub fn insert_with_likes(&self, author_id: UserId, likes: u64) -> Post {
        self.insert(author_id, likes, None)
    }

    pub fn insert_at(&self, author_id: UserId, created_secs: i64) -> Post {
        self.insert(author_id, 0, Some(created_secs))
    }

    pub fn add_follow(&self, follower: UserId, followee: UserId) {
        self.state.lock().unwrap().follows.insert((follower, followee));
    }

    pub fn stored_like_count(&self, id: PostId) -> Option<u64> {
        let state = self.state.lock().unwrap();
        state.posts.iter().find(|p| p.id == id).map(|p| p.like_count)
    }

    fn check_reads(&self) -> anyhow::Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl PostRepo for MemoryRepo {
    async fn create_post(&self, post: NewPost) -> anyhow::Result<Post> {
        let mut stored = self.insert(post.author_id, 0, Some(Utc::now().timestamp()));
        stored.content = post.content;
        stored.media_url = post.media_url;
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.posts.iter_mut().find(|p| p.id == stored.id) {
            *slot = stored.clone();
        }
        Ok(stored)
    }

    async fn get_post(&self, id: PostId) -> anyhow::Result<Option<Post>> {
        self.check_reads()?;
        Ok(self.state.lock().unwrap().posts.iter().find(|p| p.id == id).cloned())
    }

    async fn get_posts_by_ids(&self, ids: &[PostId]) -> anyhow::Result<Vec<Post>> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        Ok(state.posts.iter().filter(|p| ids.contains(&p.id)).cloned().collect())
    }

    async fn list_posts(&self, range: PostRange) -> anyhow::Result<Vec<Post>> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        let mut posts: Vec<Post> = state
            .posts
            .iter()
            .filter(|p| range.before.map_or(true, |b| p.id < b))
            .filter(|p| range.created_before.map_or(true, |c| p.created_at < c))
            .filter(|p| range.authors.as_ref().map_or(true, |a| a.contains(&p.author_id)))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.id.cmp(&a.id));
        posts.truncate(range.limit as usize);
        Ok(posts)
    }

    async fn top_posts_by_likes(&self, limit: u32) -> anyhow::Result<Vec<Post>> {
        self.top_posts_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.top_posts_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_top_posts.load(Ordering::SeqCst) {
            anyhow::bail!("top posts query failed");
        }
        let mut posts = self.state.lock().unwrap().posts.clone();
        posts.sort_by(|a, b| b.like_count.cmp(&a.like_count).then(b.id.cmp(&a.id)));
        posts.truncate(limit as usize);
        Ok(posts)
    }

    async fn update_like_count(&self, id: PostId, count: u64) -> anyhow::Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(post) = state.posts.iter_mut().find(|p| p.id == id) {
            post.like_count = count;
        }
        Ok(())
    }

    async fn list_post_ids(&self) -> anyhow::Result<Vec<PostId>> {
        self.check_reads()?;
        Ok(self.state.lock().unwrap().posts.iter().map(|p| p.id).collect())
    }
}

#[async_trait]
impl FollowRepo for MemoryRepo {
    async fn follow(&self, follower: UserId, followee: UserId) -> anyhow::Result<()> {
        anyhow::ensure!(follower != followee, "self-follow rejected by store");
        self.add_follow(follower, followee);
        Ok(())
    }

    async fn unfollow(&self, follower: UserId, followee: UserId) -> anyhow::Result<()> {
        self.state.lock().unwrap().follows.remove(&(follower, followee));
        Ok(())
    }

    async fn followers_of(&self, user: UserId) -> anyhow::Result<Vec<UserId>> {
        if self.fail_followers.load(Ordering::SeqCst) {
            anyhow::bail!("follow edges unavailable");
        }
        let state = self.state.lock().unwrap();
        Ok(state.follows.iter().filter(|(_, to)| *to == user).map(|(from, _)| *from).collect())
    }

    async fn following_of(&self, user: UserId) -> anyhow::Result<Vec<UserId>> {
        let state = self.state.lock().unwrap();
        Ok(state.follows.iter().filter(|(from, _)| *from == user).map(|(_, to)| *to).collect())
    }
}
