use std::{path::PathBuf, sync::Arc, time::Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{CODE_FENCE, CommandRunner, ContentFilter, find_blocks, splice};

/// Pipes each `~~~ .lang` block through pygmentize; failed blocks stay as written.
pub struct HighlightFilter {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
    style: String,
}

impl HighlightFilter {
    pub fn new(runner: Arc<dyn CommandRunner>, program: PathBuf, style: String) -> Self {
        Self {
            runner,
            program,
            style,
        }
    }

    fn args(&self, language: &str) -> Vec<String> {
        vec![
            "-f".to_string(),
            "html".to_string(),
            "-O".to_string(),
            format!("style={},encoding=utf-8,startinline", self.style),
            "-l".to_string(),
            language.to_string(),
        ]
    }
}

#[async_trait]
impl ContentFilter for HighlightFilter {
    fn name(&self) -> &'static str {
        "highlight"
    }

    async fn apply(&self, input: String) -> String {
        let blocks = find_blocks(&input, &CODE_FENCE, Some(1), 2);
        if blocks.is_empty() {
            return input;
        }

        let mut replacements = Vec::with_capacity(blocks.len());
        for block in blocks {
            let language = block.tag.as_deref().unwrap_or_default();
            let started_at = Instant::now();
            match self
                .runner
                .run(&self.program, &self.args(language), &block.body)
                .await
            {
                Ok(html) => {
                    debug!(
                        target = "scribe::application::render::highlight",
                        language,
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        "code block highlighted"
                    );
                    replacements.push((block.range.clone(), html));
                }
                Err(err) => {
                    warn!(
                        target = "scribe::application::render::highlight",
                        language,
                        program = %self.program.display(),
                        error_code = err.code(),
                        error = %err,
                        "highlighting failed; keeping original block"
                    );
                    // The block goes back unescaped, exactly as the post wrote it.
                    replacements.push((block.range.clone(), block.original(&input).to_string()));
                }
            }
        }

        splice(&input, replacements)
    }
}
