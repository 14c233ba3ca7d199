use std::{path::PathBuf, sync::Arc, time::Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::{CommandRunner, ContentFilter, DIAGRAM_FENCE, find_blocks, splice};

/// Everything up to and including the root element's size attributes.
static SVG_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\A.*<svg width="[0-9]+pt" height="([0-9]+pt)""#)
        .expect("svg preamble pattern must compile")
});

static XML_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern must compile"));

static ID_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"id="(.*?)""#).expect("id pattern must compile"));

/// Renders `~~~ .dot-show` blocks to inline SVG with `dot -Tsvg`.
pub struct GraphvizFilter {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
}

impl GraphvizFilter {
    pub fn new(runner: Arc<dyn CommandRunner>, program: PathBuf) -> Self {
        Self { runner, program }
    }

    /// Make raw `dot` output embeddable.
    ///
    /// The XML prolog and fixed width are dropped in favour of a max-height
    /// style, comments are removed, and every `id` gets `_<suffix>` so
    /// several diagrams can share one page.
    pub fn postprocess(svg: &str, suffix: u32) -> String {
        let svg = SVG_PREAMBLE.replace(svg, r#"<svg style="max-height:${1};" "#);
        let svg = XML_COMMENT.replace_all(&svg, "");
        ID_ATTRIBUTE
            .replace_all(&svg, format!(r#"id="${{1}}_{suffix}""#).as_str())
            .into_owned()
    }
}

#[async_trait]
impl ContentFilter for GraphvizFilter {
    fn name(&self) -> &'static str {
        "graphviz"
    }

    async fn apply(&self, input: String) -> String {
        let blocks = find_blocks(&input, &DIAGRAM_FENCE, None, 1);
        if blocks.is_empty() {
            return input;
        }

        let args = vec!["-Tsvg".to_string()];
        let mut replacements = Vec::with_capacity(blocks.len());
        for block in blocks {
            let started_at = Instant::now();
            match self.runner.run(&self.program, &args, &block.body).await {
                Ok(svg) => {
                    let suffix = rand::random::<u32>();
                    debug!(
                        target = "scribe::application::render::graphviz",
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        svg_bytes = svg.len(),
                        suffix,
                        "diagram rendered"
                    );
                    replacements.push((block.range.clone(), Self::postprocess(&svg, suffix)));
                }
                Err(err) => {
                    warn!(
                        target = "scribe::application::render::graphviz",
                        program = %self.program.display(),
                        error_code = err.code(),
                        error = %err,
                        "diagram rendering failed; keeping original block"
                    );
                    // The block goes back unescaped, exactly as the post wrote it.
                    replacements.push((block.range.clone(), block.original(&input).to_string()));
                }
            }
        }

        splice(&input, replacements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::{CommandError, testing::ScriptedRunner};

    const DOT_OUTPUT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN"
 "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd">
<!-- Generated by graphviz version 2.43.0 -->
<!-- Title: G Pages: 1 -->
<svg width="62pt" height="116pt"
 viewBox="0.00 0.00 62.00 116.00" xmlns="http://www.w3.org/2000/svg">
<g id="graph0" class="graph">
<!-- a -->
<g id="node1" class="node"><title>a</title></g>
</g>
</svg>
"#;

    #[test]
    fn postprocess_rewrites_root_comments_and_ids() {
        let svg = GraphvizFilter::postprocess(DOT_OUTPUT, 4242);

        assert!(
            svg.starts_with(r#"<svg style="max-height:116pt;" "#),
            "{svg}"
        );
        assert!(!svg.contains("<?xml"), "{svg}");
        assert!(!svg.contains("width=\"62pt\""), "{svg}");
        assert!(!svg.contains("<!--"), "{svg}");
        assert!(svg.contains(r#"<g id="graph0_4242" class="graph">"#), "{svg}");
        assert!(svg.contains(r#"<g id="node1_4242" class="node">"#), "{svg}");
        assert!(svg.contains(r#"viewBox="0.00 0.00 62.00 116.00""#), "{svg}");
    }

    #[test]
    fn postprocess_without_size_attributes_only_touches_comments_and_ids() {
        let svg = GraphvizFilter::postprocess(r#"<svg><!-- x --><g id="a"/></svg>"#, 7);
        assert_eq!(svg, r#"<svg><g id="a_7"/></svg>"#);
    }

    #[tokio::test]
    async fn replaces_diagram_with_svg() {
        let runner = ScriptedRunner::new(|_, _| Ok(DOT_OUTPUT.to_string()));
        let filter = GraphvizFilter::new(runner.clone(), PathBuf::from("dot"));

        let output = filter
            .apply("<p>see</p>\n~~~ .dot-show\ndigraph { a }\n~~~\n<p>done</p>".to_string())
            .await;

        assert!(output.starts_with("<p>see</p>\n<svg style=\"max-height:116pt;\" "), "{output}");
        assert!(output.ends_with("</svg>\n\n<p>done</p>"), "{output}");

        let calls = runner.calls.lock().expect("lock");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, vec!["-Tsvg".to_string()]);
        assert_eq!(calls[0].2, "digraph { a }");
    }

    #[tokio::test]
    async fn each_diagram_uses_one_suffix_for_all_ids() {
        let runner =
            ScriptedRunner::new(|_, _| Ok(r#"<svg><g id="a"/><g id="b"/></svg>"#.to_string()));
        let filter = GraphvizFilter::new(runner, PathBuf::from("dot"));

        let output = filter
            .apply("~~~ .dot-show\nx\n~~~\n~~~ .dot-show\ny\n~~~".to_string())
            .await;

        let ids = Regex::new(r#"id="[ab]_([0-9]+)""#).expect("pattern");
        let suffixes: Vec<&str> = ids
            .captures_iter(&output)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        assert_eq!(suffixes.len(), 4);
        assert_eq!(suffixes[0], suffixes[1]);
        assert_eq!(suffixes[2], suffixes[3]);
    }

    #[tokio::test]
    async fn failure_keeps_original_block() {
        let runner = ScriptedRunner::new(|_, _| {
            Err(CommandError::Exit {
                code: Some(1),
                stderr: "syntax error".to_string(),
            })
        });
        let filter = GraphvizFilter::new(runner, PathBuf::from("dot"));
        let input = "~~~ .dot-show\ndigraph {\n~~~".to_string();
        assert_eq!(filter.apply(input.clone()).await, input);
    }
}
