//! Cache key scheme shared by writers and readers.
//!
//! These names are internal to the engine, not a wire contract.

use crate::models::{PostId, UserId};

pub const HOT_POSTS: &str = "hot:posts";
pub const HOT_POSTS_EMPTY: &str = "hot:posts:empty";
pub const LIKE_COUNT_PREFIX: &str = "like_count:";

/// Set of liker ids for a post.
pub fn like_set(post_id: PostId) -> String {
    format!("like:{post_id}")
}

/// Fast-read like counter for a post.
pub fn like_count(post_id: PostId) -> String {
    format!("{LIKE_COUNT_PREFIX}{post_id}")
}

/// Per-user push-mode inbox.
pub fn inbox(user_id: UserId) -> String {
    format!("inbox:{user_id}")
}

/// Recovers the post id from a `like_count:<id>` key.
///
/// Returns `None` for anything that is not exactly two `:`-separated parts
/// with a positive integer id.
pub fn parse_like_count_key(key: &str) -> Option<PostId> {
    let mut parts = key.split(':');
    let (prefix, id, rest) = (parts.next()?, parts.next()?, parts.next());
    if rest.is_some() || format!("{prefix}:") != LIKE_COUNT_PREFIX {
        return None;
    }
    match id.parse::<PostId>() {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(id),
    }
}
