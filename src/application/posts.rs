//! Post enumeration over the on-disk post directory.
//!
//! Posts live exactly two levels below the configured directory
//! (`posts/2013/05-hello.md`). File names are expected to sort
//! chronologically, so reversing path order yields newest-first.

use std::{
    cmp::Ordering,
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::{
    config::{PostOrder, PostsSettings},
    domain::posts::Post,
};

const SOURCE: &str = "scribe::application::posts";

/// Owned, lazily-parsing sequence of posts.
pub type PostIter = Box<dyn Iterator<Item = Post> + Send>;

#[derive(Debug, Clone)]
pub struct PostStore {
    dir: PathBuf,
    url_prefix: String,
    order: PostOrder,
}

impl PostStore {
    pub fn new(settings: &PostsSettings) -> Self {
        Self {
            dir: settings.dir.clone(),
            url_prefix: settings.url_prefix.clone(),
            order: settings.order,
        }
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Candidate post files, newest-first by path.
    pub fn post_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = WalkDir::new(&self.dir)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!(target = SOURCE, error = %err, "skipping unreadable post entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(DirEntry::into_path)
            .collect();

        paths.sort();
        paths.reverse();
        paths
    }

    /// A fresh sequence of every parsable post in the configured order.
    pub fn posts(&self) -> PostIter {
        let paths = self.post_paths();
        match self.order {
            PostOrder::Path => Box::new(paths.into_iter().filter_map(|path| load_post(&path))),
            PostOrder::Date => {
                let mut posts: Vec<Post> = paths.iter().filter_map(|path| load_post(path)).collect();
                posts.sort_by(newest_date_first);
                Box::new(posts.into_iter())
            }
        }
    }

    /// The first post whose route (`<url_prefix><slug>`) equals `route`.
    pub fn find_by_route(&self, route: &str) -> Option<Post> {
        let slug = route.strip_prefix(self.url_prefix.as_str())?;
        if slug.is_empty() {
            return None;
        }
        self.posts().find(|post| post.slug() == slug)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn load_post(path: &Path) -> Option<Post> {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            debug!(
                target = SOURCE,
                path = %path.display(),
                error = %err,
                "skipping unreadable post"
            );
            return None;
        }
    };

    match Post::parse(&source) {
        Ok(post) => Some(post),
        Err(err) => {
            debug!(
                target = SOURCE,
                path = %path.display(),
                error = %err,
                "skipping malformed post"
            );
            None
        }
    }
}

/// Stable comparator: newest `date` first, undated posts after every dated one.
fn newest_date_first(left: &Post, right: &Post) -> Ordering {
    match (left.published_at(), right.published_at()) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
