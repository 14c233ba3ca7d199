use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{
        error::{ErrorReport, HttpError},
        pagination::Page,
    },
    config::SiteSettings,
    domain::posts::Post,
};

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<String, TemplateRenderError> {
    template.render().map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub fn render_not_found_response(site: SiteView, path: &str) -> Response {
    let template = NotFoundTemplate {
        site,
        path: format!("/{path}"),
    };
    let mut response = render_template_response(template, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        format!("No page at `/{path}`"),
    )
    .attach(&mut response);
    response
}

/// Site-wide chrome shared by every page.
#[derive(Debug, Clone)]
pub struct SiteView {
    pub title: String,
    pub description: String,
    pub feed_href: String,
}

impl SiteView {
    pub fn new(site: &SiteSettings) -> Self {
        Self {
            title: site.title.clone(),
            description: site.description.clone(),
            feed_href: "/rss.xml".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostCard {
    pub title: String,
    pub href: String,
    pub excerpt: String,
    pub date: Option<String>,
}

impl PostCard {
    pub fn new(post: &Post, url_prefix: &str) -> Self {
        Self {
            title: post.title().to_string(),
            href: post.url(url_prefix),
            excerpt: post.excerpt().to_string(),
            date: post.date().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListingView {
    pub number: usize,
    pub cards: Vec<PostCard>,
    pub newer_href: Option<String>,
    pub older_href: Option<String>,
}

impl ListingView {
    pub fn new(page: &Page, url_prefix: &str) -> Self {
        Self {
            number: page.number.get(),
            cards: page
                .posts
                .iter()
                .map(|post| PostCard::new(post, url_prefix))
                .collect(),
            newer_href: page.newer_href(),
            older_href: page.older_href(),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub site: SiteView,
    pub view: ListingView,
}

#[derive(Debug, Clone)]
pub struct PostView {
    pub title: String,
    pub href: String,
    pub date: Option<String>,
    pub revised: Option<String>,
    /// Output of the content filters; emitted unescaped.
    pub body_html: String,
}

impl PostView {
    /// `post` must already carry its rendered body.
    pub fn new(post: &Post, url_prefix: &str) -> Self {
        Self {
            title: post.title().to_string(),
            href: post.url(url_prefix),
            date: post.date().map(str::to_string),
            revised: post.revised().map(str::to_string),
            body_html: post.body().to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub site: SiteView,
    pub post: PostView,
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub site: SiteView,
    pub path: String,
}
