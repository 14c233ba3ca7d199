//! Post model and the front-matter parser.
//!
//! A post file looks like:
//!
//! ```text
//! ---
//! slug: hello-world
//! title: Hello
//! date: 2013-05-12
//! ---
//!
//! Markdown body...
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, format_description::FormatItem,
    macros::format_description,
};

/// Dash line, header block up to the first closing dash line, blank line(s), body.
static DOCUMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A-+\n(.+?)\n-+\n+(.+)\z").expect("document pattern must compile")
});

/// One `key: value` header line. The key runs up to the last `": "` on the line.
static FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.+): (.+)").expect("field pattern must compile"));

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DATE_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const DATE_MINUTE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

pub const SLUG_FIELD: &str = "slug";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PostParseError {
    #[error("post does not start with a dash-delimited front-matter block")]
    MissingFrontMatter,
    #[error("front matter has no `slug` field")]
    MissingSlug,
}

/// Front-matter fields in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    fields: Vec<(String, String)>,
}

impl FrontMatter {
    /// Parse every `key: value` line of a header block. Non-matching lines are ignored.
    pub fn parse(header: &str) -> Self {
        let mut front_matter = Self::default();
        for captures in FIELD.captures_iter(header) {
            front_matter.insert(captures[1].trim(), captures[2].trim());
        }
        front_matter
    }

    /// Insert a field, overwriting an earlier value for the same key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A parsed post. Immutable once built; rendering produces a new value via [`Post::with_body`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    meta: FrontMatter,
    body: String,
}

impl Post {
    /// Split `source` into front matter and body.
    pub fn parse(source: &str) -> Result<Self, PostParseError> {
        let captures = DOCUMENT
            .captures(source)
            .ok_or(PostParseError::MissingFrontMatter)?;

        let meta = FrontMatter::parse(&captures[1]);
        if meta.get(SLUG_FIELD).is_none() {
            return Err(PostParseError::MissingSlug);
        }

        Ok(Self {
            meta,
            body: captures[2].trim().to_string(),
        })
    }

    pub fn meta(&self) -> &FrontMatter {
        &self.meta
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn with_body(self, body: String) -> Self {
        Self { body, ..self }
    }

    pub fn slug(&self) -> &str {
        // Presence is checked in `parse`.
        self.meta.get(SLUG_FIELD).unwrap_or_default()
    }

    /// The `title` field, falling back to the slug.
    pub fn title(&self) -> &str {
        self.meta.get("title").unwrap_or_else(|| self.slug())
    }

    /// The `abstract` field.
    pub fn excerpt(&self) -> &str {
        self.meta.get("abstract").unwrap_or_default()
    }

    pub fn date(&self) -> Option<&str> {
        self.meta.get("date")
    }

    pub fn revised(&self) -> Option<&str> {
        self.meta.get("revised")
    }

    /// Request path (without surrounding slashes) that addresses this post.
    pub fn route(&self, url_prefix: &str) -> String {
        format!("{url_prefix}{}", self.slug())
    }

    /// Public URL path, e.g. `/posts/hello-world/`.
    pub fn url(&self, url_prefix: &str) -> String {
        format!("/{}/", self.route(url_prefix))
    }

    /// The `date` field interpreted as UTC.
    pub fn published_at(&self) -> Option<OffsetDateTime> {
        self.date().and_then(parse_post_date)
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM` and `YYYY-MM-DD HH:MM:SS`.
pub fn parse_post_date(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(datetime) = PrimitiveDateTime::parse(raw, DATE_TIME_FORMAT) {
        return Some(datetime.assume_utc());
    }
    if let Ok(datetime) = PrimitiveDateTime::parse(raw, DATE_MINUTE_FORMAT) {
        return Some(datetime.assume_utc());
    }
    Date::parse(raw, DATE_FORMAT)
        .ok()
        .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const HELLO: &str = "---\nslug: hello-world\ntitle: Hello\ndate: 2013-05-12\n---\n\nFirst paragraph.\n\nSecond paragraph.\n";

    #[test]
    fn parses_metadata_and_body() {
        let post = Post::parse(HELLO).expect("valid post");

        let fields: Vec<_> = post.meta().iter().collect();
        assert_eq!(
            fields,
            vec![
                ("slug", "hello-world"),
                ("title", "Hello"),
                ("date", "2013-05-12"),
            ]
        );
        assert_eq!(post.body(), "First paragraph.\n\nSecond paragraph.");
        assert_eq!(post.slug(), "hello-world");
        assert_eq!(post.title(), "Hello");
    }

    #[test]
    fn trims_keys_and_values() {
        let post = Post::parse("---\n  slug  :   padded   \n---\nbody").expect("valid post");
        assert_eq!(post.meta().get("slug"), Some("padded"));
    }

    #[test]
    fn key_runs_to_last_separator() {
        let post =
            Post::parse("---\nslug: s\ntitle: Rust: the good parts\n---\n\nbody").expect("post");
        assert_eq!(post.meta().get("title: Rust"), Some("the good parts"));
        assert_eq!(post.meta().get("title"), None);
        assert_eq!(post.title(), "s");
    }

    #[test]
    fn repeated_key_overwrites_in_place() {
        let post = Post::parse("---\ntitle: One\nslug: s\ntitle: Two\n---\n\nbody").expect("post");
        let keys: Vec<_> = post.meta().iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["title", "slug"]);
        assert_eq!(post.title(), "Two");
    }

    #[test]
    fn horizontal_rule_stays_in_body() {
        let post = Post::parse("---\nslug: s\n---\n\nabove\n\n---\n\nbelow").expect("post");
        assert_eq!(post.body(), "above\n\n---\n\nbelow");
        assert_eq!(post.meta().iter().count(), 1);
    }

    #[test]
    fn rejects_missing_slug() {
        let err = Post::parse("---\ntitle: No slug\n---\n\nbody").expect_err("missing slug");
        assert_eq!(err, PostParseError::MissingSlug);
    }

    #[test]
    fn rejects_missing_front_matter() {
        assert_eq!(
            Post::parse("just some text").expect_err("no header"),
            PostParseError::MissingFrontMatter
        );
        assert_eq!(
            Post::parse("---\nslug: s\n---\n\n").expect_err("empty body"),
            PostParseError::MissingFrontMatter
        );
    }

    #[test]
    fn builds_routes_from_prefix() {
        let post = Post::parse(HELLO).expect("valid post");
        assert_eq!(post.route("posts/"), "posts/hello-world");
        assert_eq!(post.url("posts/"), "/posts/hello-world/");
    }

    #[test]
    fn parses_supported_date_shapes() {
        assert_eq!(
            parse_post_date("2013-05-12"),
            Some(datetime!(2013-05-12 0:00 UTC))
        );
        assert_eq!(
            parse_post_date("2013-05-12 14:30"),
            Some(datetime!(2013-05-12 14:30 UTC))
        );
        assert_eq!(
            parse_post_date("2013-05-12 14:30:15"),
            Some(datetime!(2013-05-12 14:30:15 UTC))
        );
        assert_eq!(parse_post_date("May 12th"), None);
    }
}
