// src/timeline/prompt.rs
// Turns posts and threads into the content blocks the filter consumes.

use crate::filter::ContentBlock;

use super::types::{Post, Thread};

/// Quoted context included one level deep.
const QUOTE_DEPTH: u32 = 1;

/// Post → blocks: author plus body, one block per media attachment,
/// quoted context beneath.
pub fn post_blocks(post: &Post) -> Vec<ContentBlock> {
    post_blocks_depth(post, QUOTE_DEPTH)
}

fn post_blocks_depth(post: &Post, depth: u32) -> Vec<ContentBlock> {
    let mut blocks = vec![ContentBlock::text(format!(
        "Tweet by {}: \n {}",
        post.author, post.text
    ))];
    for media in &post.media {
        blocks.push(ContentBlock::Media {
            kind: media.kind.clone(),
            url: media.url.clone(),
            alt_text: media.alt_text.clone(),
        });
    }
    if depth > 0 {
        if let Some(quoted) = &post.quoted {
            blocks.push(ContentBlock::text(format!("Quoted tweet by {}", quoted.author)));
            blocks.extend(post_blocks_depth(quoted, depth - 1));
        }
    }
    blocks
}

/// Thread → one combined block list covering every member, so the whole
/// conversation is judged as a unit.
pub fn thread_blocks(thread: &Thread) -> Vec<ContentBlock> {
    let total = thread.posts.len();
    let mut blocks = vec![ContentBlock::text(format!(
        "Timeline module containing {total} related tweets:"
    ))];
    for (index, post) in thread.posts.iter().enumerate() {
        blocks.push(ContentBlock::text(format!("--- Tweet {} of {} ---", index + 1, total)));
        blocks.extend(post_blocks(post));
    }
    blocks
}
