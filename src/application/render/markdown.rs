use async_trait::async_trait;
use comrak::{markdown_to_html, options::Options};

use super::{ANY_FENCE, ContentFilter, find_blocks, splice};

/// Markdown to HTML via comrak, with `~~~ .tag` blocks passed through verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownFilter;

impl MarkdownFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, input: &str) -> String {
        let options = default_options();
        let blocks = find_blocks(input, &ANY_FENCE, None, 0);
        if blocks.is_empty() {
            return markdown_to_html(input, &options);
        }

        let nonce = format!("{:016x}", rand::random::<u64>());
        let placeholders: Vec<String> = (0..blocks.len())
            .map(|index| format!("<!--scribe-fence:{nonce}:{index}-->"))
            .collect();

        // Blank lines keep each placeholder a standalone HTML block.
        let protected = splice(
            input,
            blocks
                .iter()
                .zip(&placeholders)
                .map(|(block, placeholder)| (block.range.clone(), format!("\n\n{placeholder}\n\n")))
                .collect(),
        );

        let html = markdown_to_html(&protected, &options);

        blocks
            .iter()
            .zip(&placeholders)
            .fold(html, |acc, (block, placeholder)| {
                restore(acc, placeholder, block.original(input))
            })
    }
}

/// Put `original` back where `placeholder` landed in the rendered HTML.
///
/// A fence that sat inside an ordinary code block comes back as escaped
/// text, padding included, and its tildes are encoded so later filters
/// leave it alone.
fn restore(html: String, placeholder: &str, original: &str) -> String {
    if html.contains(placeholder) {
        return html.replacen(placeholder, original, 1);
    }

    let escaped = escape_text(placeholder);
    let literal = escape_text(original).replace("~~~", "&#126;~~");
    let padded = format!("\n\n{escaped}\n\n");
    if html.contains(&padded) {
        html.replacen(&padded, &literal, 1)
    } else {
        html.replacen(&escaped, &literal, 1)
    }
}

fn escape_text(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[async_trait]
impl ContentFilter for MarkdownFilter {
    fn name(&self) -> &'static str {
        "markdown"
    }

    async fn apply(&self, input: String) -> String {
        self.render(&input)
    }
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.footnotes = true;

    // Posts are trusted; inline HTML is emitted as written.
    options.render.r#unsafe = true;

    options
}
