//! Fixed-size, 1-based page slicing over the post sequence.

use std::num::NonZeroUsize;

use crate::domain::posts::Post;

/// One listing page. Built per request, never persisted.
#[derive(Debug, Clone)]
pub struct Page {
    pub posts: Vec<Post>,
    pub number: NonZeroUsize,
    /// At least one post exists beyond this page.
    pub has_more: bool,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Link to the page with newer posts, absent on page 1.
    pub fn newer_href(&self) -> Option<String> {
        let previous = self.number.get().checked_sub(1)?;
        NonZeroUsize::new(previous).map(page_href)
    }

    /// Link to the page with older posts, present only when `has_more`.
    pub fn older_href(&self) -> Option<String> {
        if !self.has_more {
            return None;
        }
        self.number.checked_add(1).map(page_href)
    }
}

/// Public path of listing page `number`; page 1 is the site root.
pub fn page_href(number: NonZeroUsize) -> String {
    if number.get() == 1 {
        "/".to_string()
    } else {
        format!("/page/{number}/")
    }
}

/// Select `[(number-1)*per_page, number*per_page)` from `posts`.
///
/// Consumes at most one post past the slice to decide `has_more`.
pub fn paginate<I>(posts: I, number: NonZeroUsize, per_page: NonZeroUsize) -> Page
where
    I: IntoIterator<Item = Post>,
{
    let Some(start) = (number.get() - 1).checked_mul(per_page.get()) else {
        return Page {
            posts: Vec::new(),
            number,
            has_more: false,
        };
    };

    let mut slice: Vec<Post> = posts
        .into_iter()
        .skip(start)
        .take(per_page.get().saturating_add(1))
        .collect();

    let has_more = slice.len() > per_page.get();
    slice.truncate(per_page.get());

    Page {
        posts: slice,
        number,
        has_more,
    }
}
