//! Maps a request path to a rendered listing page, post, feed or not-found.

use std::{num::NonZeroUsize, time::Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::task::JoinError;
use tracing::debug;

use crate::{
    application::{
        pagination::paginate, posts::PostStore, render::RenderPipeline, syndication::rss_feed,
    },
    cache::DiskCache,
    config::{Settings, SiteSettings},
    presentation::views::{
        IndexTemplate, ListingView, PostTemplate, PostView, SiteView, TemplateRenderError,
        render_template,
    },
};

const SOURCE: &str = "scribe::application::dispatch";

static PAGE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A[1-9][0-9]*\z").expect("page number pattern must compile"));

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Template(#[from] TemplateRenderError),
    #[error("post enumeration task failed: {0}")]
    Task(#[from] JoinError),
}

/// Strip the query string and surrounding slashes; the result is the cache key.
pub fn normalize_path(raw: &str) -> &str {
    let path = raw.split_once('?').map_or(raw, |(path, _)| path);
    path.trim_matches('/')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Listing(NonZeroUsize),
    Feed,
    /// Candidate post route, `<url_prefix><slug>`.
    Post(String),
    NotFound,
}

impl Route {
    /// Classify an already normalized path.
    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Route::Listing(NonZeroUsize::MIN);
        }
        if path == "rss.xml" {
            return Route::Feed;
        }
        if let Some(number) = path.strip_prefix("page/")
            && PAGE_NUMBER.is_match(number)
        {
            return number
                .parse::<NonZeroUsize>()
                .map_or(Route::NotFound, Route::Listing);
        }
        Route::Post(path.to_string())
    }

    pub fn content_kind(&self) -> ContentKind {
        match self {
            Route::Feed => ContentKind::Rss,
            Route::Listing(_) | Route::Post(_) | Route::NotFound => ContentKind::Html,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Rss,
}

impl ContentKind {
    pub fn mime(self) -> &'static str {
        match self {
            ContentKind::Html => "text/html; charset=utf-8",
            ContentKind::Rss => "application/rss+xml; charset=utf-8",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub kind: ContentKind,
    pub body: String,
}

pub struct Dispatcher {
    store: PostStore,
    pipeline: RenderPipeline,
    cache: DiskCache,
    site: SiteSettings,
    per_page: NonZeroUsize,
}

impl Dispatcher {
    /// Caching follows `site.live`.
    pub fn new(settings: &Settings, pipeline: RenderPipeline) -> Self {
        Self {
            store: PostStore::new(&settings.posts),
            pipeline,
            cache: DiskCache::new(settings.cache.dir.clone(), settings.site.live),
            site: settings.site.clone(),
            per_page: settings.posts.per_page,
        }
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    pub fn site_view(&self) -> SiteView {
        SiteView::new(&self.site)
    }

    /// Render the response body for `raw_path`; `Ok(None)` means not found.
    pub async fn dispatch(&self, raw_path: &str) -> Result<Option<Rendered>, DispatchError> {
        let key = normalize_path(raw_path);
        let route = Route::parse(key);
        if route == Route::NotFound {
            return Ok(None);
        }

        let kind = route.content_kind();
        let started_at = Instant::now();
        let body = self
            .cache
            .get_or_render(key, || self.render(&route))
            .await?;

        debug!(
            target = SOURCE,
            key,
            route = ?route,
            found = body.is_some(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "request dispatched"
        );
        Ok(body.map(|body| Rendered { kind, body }))
    }

    /// The RSS document, bypassing the cache.
    pub async fn feed(&self) -> Result<String, DispatchError> {
        let store = self.store.clone();
        let posts = tokio::task::spawn_blocking(move || store.posts().collect::<Vec<_>>()).await?;
        Ok(rss_feed(
            &self.site,
            self.store.url_prefix(),
            posts,
            OffsetDateTime::now_utc(),
        ))
    }

    async fn render(&self, route: &Route) -> Result<Option<String>, DispatchError> {
        match route {
            Route::Listing(number) => self.render_listing(*number).await,
            Route::Feed => self.feed().await.map(Some),
            Route::Post(path) => self.render_post(path.clone()).await,
            Route::NotFound => Ok(None),
        }
    }

    async fn render_listing(&self, number: NonZeroUsize) -> Result<Option<String>, DispatchError> {
        let store = self.store.clone();
        let per_page = self.per_page;
        let page =
            tokio::task::spawn_blocking(move || paginate(store.posts(), number, per_page)).await?;
        if page.is_empty() {
            return Ok(None);
        }

        let html = render_template(IndexTemplate {
            site: self.site_view(),
            view: ListingView::new(&page, self.store.url_prefix()),
        })?;
        Ok(Some(html))
    }

    async fn render_post(&self, path: String) -> Result<Option<String>, DispatchError> {
        let store = self.store.clone();
        let Some(post) = tokio::task::spawn_blocking(move || store.find_by_route(&path)).await?
        else {
            return Ok(None);
        };

        let body = self.pipeline.render(post.body()).await;
        let post = post.with_body(body);
        let html = render_template(PostTemplate {
            site: self.site_view(),
            post: PostView::new(&post, self.store.url_prefix()),
        })?;
        Ok(Some(html))
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use config::Config;
    use tempfile::TempDir;

    use super::*;

    fn write_post(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, contents).expect("write post");
    }

    fn settings(root: &Path, live: bool, per_page: i64) -> Settings {
        let config = Config::builder()
            .set_override("posts.dir", root.join("posts").display().to_string())
            .and_then(|b| b.set_override("posts.per_page", per_page))
            .and_then(|b| b.set_override("cache.dir", root.join("cache").display().to_string()))
            .and_then(|b| b.set_override("site.live", live))
            .and_then(|b| b.set_override("site.link", "https://blog.example/"))
            .expect("overrides")
            .build()
            .expect("config");
        Settings::from_config(config).expect("settings")
    }

    fn dispatcher(root: &Path, live: bool, per_page: i64) -> Dispatcher {
        Dispatcher::new(&settings(root, live, per_page), RenderPipeline::default())
    }

    #[test]
    fn normalizes_query_and_slashes() {
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path("/page/2/?utm=x"), "page/2");
        assert_eq!(normalize_path("//posts/hello//"), "posts/hello");
        assert_eq!(normalize_path("?only=query"), "");
    }

    #[test]
    fn parses_routes() {
        assert_eq!(Route::parse(""), Route::Listing(NonZeroUsize::MIN));
        assert_eq!(
            Route::parse("page/12"),
            Route::Listing(NonZeroUsize::new(12).expect("non-zero"))
        );
        assert_eq!(Route::parse("rss.xml"), Route::Feed);
        assert_eq!(Route::parse("page/0"), Route::Post("page/0".into()));
        assert_eq!(Route::parse("page/01"), Route::Post("page/01".into()));
        assert_eq!(
            Route::parse("page/99999999999999999999999999"),
            Route::NotFound
        );
        assert_eq!(Route::parse("posts/hello"), Route::Post("posts/hello".into()));
        assert_eq!(Route::Feed.content_kind(), ContentKind::Rss);
    }

    #[tokio::test]
    async fn single_post_fills_first_page_only() {
        let dir = TempDir::new().expect("temp dir");
        write_post(
            &dir.path().join("posts"),
            "2013/05-hello.md",
            "---\nslug: hello-world\ntitle: Hello\n---\n\nHi there.",
        );
        let dispatcher = dispatcher(dir.path(), false, 9);

        let first = dispatcher.dispatch("/").await.expect("dispatch").expect("page 1");
        assert_eq!(first.kind, ContentKind::Html);
        assert!(first.body.contains("href=\"/posts/hello-world/\""), "{}", first.body);
        assert!(!first.body.contains("/page/2/"), "{}", first.body);

        assert_eq!(dispatcher.dispatch("/page/2/").await.expect("dispatch"), None);
        assert_eq!(dispatcher.dispatch("/nowhere/").await.expect("dispatch"), None);
    }

    #[tokio::test]
    async fn renders_post_through_pipeline() {
        let dir = TempDir::new().expect("temp dir");
        write_post(
            &dir.path().join("posts"),
            "2013/05-hello.md",
            "---\nslug: hello-world\ntitle: Hello\n---\n\n*raw body*",
        );
        let dispatcher = dispatcher(dir.path(), false, 9);

        let post = dispatcher
            .dispatch("/posts/hello-world/")
            .await
            .expect("dispatch")
            .expect("post");
        assert!(post.body.contains("*raw body*"), "{}", post.body);
        assert!(post.body.contains("<title>Hello"), "{}", post.body);
    }

    #[tokio::test]
    async fn feed_route_uses_rss_content_kind() {
        let dir = TempDir::new().expect("temp dir");
        write_post(
            &dir.path().join("posts"),
            "2013/05-hello.md",
            "---\nslug: hello-world\ntitle: Hello\n---\n\nbody",
        );
        let dispatcher = dispatcher(dir.path(), false, 9);

        let feed = dispatcher.dispatch("/rss.xml").await.expect("dispatch").expect("feed");
        assert_eq!(feed.kind, ContentKind::Rss);
        assert!(
            feed.body
                .contains("<link>https://blog.example/posts/hello-world/</link>"),
            "{}",
            feed.body
        );
    }

    #[tokio::test]
    async fn live_mode_serves_stale_cached_body() {
        let dir = TempDir::new().expect("temp dir");
        let posts = dir.path().join("posts");
        write_post(&posts, "2013/05-a.md", "---\nslug: a\ntitle: Alpha\n---\n\nbody");
        let dispatcher = dispatcher(dir.path(), true, 9);

        let first = dispatcher.dispatch("/").await.expect("dispatch").expect("page");
        write_post(&posts, "2013/06-b.md", "---\nslug: b\ntitle: Beta\n---\n\nbody");
        let second = dispatcher.dispatch("/?x=1").await.expect("dispatch").expect("page");

        assert_eq!(first, second);
        assert!(!second.body.contains("Beta"));
        assert!(dispatcher.cache().entry_path("").exists());

        assert_eq!(dispatcher.dispatch("/posts/zzz/").await.expect("dispatch"), None);
        assert!(!dispatcher.cache().entry_path("posts/zzz").exists());
    }

    #[tokio::test]
    async fn page_size_splits_listing() {
        let dir = TempDir::new().expect("temp dir");
        let posts = dir.path().join("posts");
        for (file, slug) in [("01-a.md", "a"), ("02-b.md", "b"), ("03-c.md", "c")] {
            write_post(
                &posts,
                &format!("2013/{file}"),
                &format!("---\nslug: {slug}\ntitle: Post {slug}\n---\n\nbody"),
            );
        }
        let dispatcher = dispatcher(dir.path(), false, 2);

        let first = dispatcher.dispatch("/").await.expect("dispatch").expect("page 1");
        assert!(first.body.contains("Post c") && first.body.contains("Post b"));
        assert!(first.body.contains("href=\"/page/2/\""), "{}", first.body);

        let second = dispatcher.dispatch("/page/2/").await.expect("dispatch").expect("page 2");
        assert!(second.body.contains("Post a"));
        assert!(!second.body.contains("Post c"));

        assert_eq!(dispatcher.dispatch("/page/3/").await.expect("dispatch"), None);
    }
}
