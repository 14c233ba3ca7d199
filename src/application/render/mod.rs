//! Content filters turning a post body into HTML.
//!
//! Filters run left to right over the whole body. Markdown goes first;
//! the highlight and Graphviz filters then look for the `~~~ .tag` fence
//! convention, which the Markdown filter leaves untouched in its output.

use std::{ops::Range, sync::Arc};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::RenderSettings;

pub mod command;
pub mod graphviz;
pub mod highlight;
pub mod markdown;
#[cfg(test)]
pub(crate) mod testing;

pub use command::{CommandError, CommandRunner, ProcessRunner};
pub use graphviz::GraphvizFilter;
pub use highlight::HighlightFilter;
pub use markdown::MarkdownFilter;

/// `~~~ .lang` code block: tag in group 1, body in group 2.
pub(crate) static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)~~~\s*\.([a-z]+)\n(.*?)\n~~~").expect("code fence pattern must compile")
});

/// `~~~ .dot-show` diagram block: body in group 1.
pub(crate) static DIAGRAM_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)~~~\s*\.dot-show\n(.*?)\n~~~").expect("diagram fence pattern must compile")
});

/// Either kind of block, used to keep both out of the Markdown renderer.
pub(crate) static ANY_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)~~~\s*\.(?:[a-z]+|dot-show)\n.*?\n~~~").expect("fence pattern must compile")
});

/// One transformation step over a full body.
///
/// Filters never fail: a step that cannot process part of its input leaves
/// that part unchanged.
#[async_trait]
pub trait ContentFilter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, input: String) -> String;
}

/// Ordered list of filters applied left to right.
#[derive(Clone, Default)]
pub struct RenderPipeline {
    filters: Vec<Arc<dyn ContentFilter>>,
}

impl RenderPipeline {
    pub fn new(filters: Vec<Arc<dyn ContentFilter>>) -> Self {
        Self { filters }
    }

    /// Markdown, then code highlighting, then Graphviz.
    pub fn standard(settings: &RenderSettings, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(vec![
            Arc::new(MarkdownFilter::new()),
            Arc::new(HighlightFilter::new(
                runner.clone(),
                settings.pygmentize_path.clone(),
                settings.pygments_style.clone(),
            )),
            Arc::new(GraphvizFilter::new(runner, settings.dot_path.clone())),
        ])
    }

    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|filter| filter.name()).collect()
    }

    pub async fn render(&self, body: &str) -> String {
        let mut current = body.to_string();
        for filter in &self.filters {
            current = filter.apply(current).await;
        }
        current
    }
}

/// Owned copy of one fence match, so replacements can be produced across awaits.
#[derive(Debug, Clone)]
pub(crate) struct FencedBlock {
    pub range: Range<usize>,
    pub tag: Option<String>,
    pub body: String,
}

impl FencedBlock {
    pub(crate) fn original<'a>(&self, input: &'a str) -> &'a str {
        &input[self.range.clone()]
    }
}

/// Collect every match of `pattern`; `tag_group` is optional, `body_group` required.
pub(crate) fn find_blocks(
    input: &str,
    pattern: &Regex,
    tag_group: Option<usize>,
    body_group: usize,
) -> Vec<FencedBlock> {
    pattern
        .captures_iter(input)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let body = captures.get(body_group)?.as_str().to_string();
            let tag = tag_group
                .and_then(|group| captures.get(group))
                .map(|tag| tag.as_str().to_string());
            Some(FencedBlock {
                range: whole.range(),
                tag,
                body,
            })
        })
        .collect()
}

/// Rebuild `input` with each block range swapped for its replacement.
///
/// `replacements` must be sorted by position and non-overlapping, which
/// holds for anything produced by [`find_blocks`].
pub(crate) fn splice(input: &str, replacements: Vec<(Range<usize>, String)>) -> String {
    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;
    for (range, replacement) in replacements {
        output.push_str(&input[cursor..range.start]);
        output.push_str(&replacement);
        cursor = range.end;
    }
    output.push_str(&input[cursor..]);
    output
}
