//! RSS 2.0 feed generation.

use time::{OffsetDateTime, format_description::well_known::Rfc2822};

use crate::{config::SiteSettings, domain::posts::Post};

/// Build the RSS 2.0 document for `posts`, in the order given.
///
/// Item links are absolute: `<site.link><url_prefix><slug>/`. `pubDate` is
/// omitted for posts whose `date` field does not parse.
pub fn rss_feed<I>(site: &SiteSettings, url_prefix: &str, posts: I, now: OffsetDateTime) -> String
where
    I: IntoIterator<Item = Post>,
{
    let mut items = String::new();
    for post in posts {
        let link = format!("{}{}/", site.link, post.route(url_prefix));
        let pub_date = post
            .published_at()
            .and_then(|published| published.format(&Rfc2822).ok())
            .map(|date| format!("      <pubDate>{date}</pubDate>\n"))
            .unwrap_or_default();
        items.push_str(&format!(
            "    <item>\n      <title>{}</title>\n      <link>{}</link>\n      <description>{}</description>\n      <guid>{}</guid>\n{}    </item>\n",
            xml_escape(post.title()),
            xml_escape(&link),
            xml_escape(post.excerpt()),
            xml_escape(&link),
            pub_date,
        ));
    }

    let last_build = now
        .format(&Rfc2822)
        .unwrap_or_else(|_| now.to_string());

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n  <channel>\n    <title>{}</title>\n    <link>{}</link>\n    <description>{}</description>\n    <lastBuildDate>{}</lastBuildDate>\n{}  </channel>\n</rss>\n",
        xml_escape(&site.title),
        xml_escape(&site.link),
        xml_escape(&site.description),
        last_build,
        items
    )
}

pub fn xml_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn site() -> SiteSettings {
        SiteSettings {
            title: "Bits & Pieces".to_string(),
            link: "https://example.com/".to_string(),
            description: "Notes".to_string(),
            live: true,
        }
    }

    fn post(source: &str) -> Post {
        Post::parse(source).expect("valid post")
    }

    #[test]
    fn builds_channel_and_items() {
        let posts = vec![
            post("---\nslug: second\ntitle: Salt & Pepper\nabstract: Seasoning.\ndate: 2013-05-12\n---\n\nbody"),
            post("---\nslug: first\ntitle: First\n---\n\nbody"),
        ];
        let xml = rss_feed(&site(), "posts/", posts, datetime!(2014-01-02 03:04:05 UTC));

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<title>Bits &amp; Pieces</title>"), "{xml}");
        assert!(xml.contains("<link>https://example.com/</link>"), "{xml}");
        assert!(
            xml.contains("<lastBuildDate>Thu, 02 Jan 2014 03:04:05 +0000</lastBuildDate>"),
            "{xml}"
        );
        assert_eq!(xml.matches("<item>").count(), 2);
        assert!(xml.contains("<title>Salt &amp; Pepper</title>"), "{xml}");
        assert!(
            xml.contains("<link>https://example.com/posts/second/</link>"),
            "{xml}"
        );
        assert!(
            xml.contains("<guid>https://example.com/posts/second/</guid>"),
            "{xml}"
        );
        assert!(xml.contains("<description>Seasoning.</description>"), "{xml}");
        assert!(
            xml.contains("<pubDate>Sun, 12 May 2013 00:00:00 +0000</pubDate>"),
            "{xml}"
        );
        assert_eq!(xml.matches("<pubDate>").count(), 1);
    }

    #[test]
    fn items_follow_input_order() {
        let posts = vec![
            post("---\nslug: b\n---\n\nbody"),
            post("---\nslug: a\n---\n\nbody"),
        ];
        let xml = rss_feed(&site(), "", posts, datetime!(2014-01-01 0:00 UTC));
        let b = xml.find("https://example.com/b/").expect("b present");
        let a = xml.find("https://example.com/a/").expect("a present");
        assert!(b < a);
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            xml_escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &apos;Jerry&apos;&lt;/a&gt;"
        );
    }
}
