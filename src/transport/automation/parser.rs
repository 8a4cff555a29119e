// HTML extraction for scraped pages.
//
// The web UI marks each post with data-testid="tweet", its body with
// data-testid="tweetText", and its permalink with an href containing
// /status/<id>. Individual posts that fail to parse are logged and skipped;
// one odd element never costs us the rest of the batch.

use chrono::{DateTime, Duration, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::transport::Mention;

/// Selector for a rendered post container.
pub const POST_SELECTOR: &str = "article[data-testid='tweet']";

/// Extract every post in `html` created within `window` of `now`.
///
/// Posts are returned in page order (the live search view lists newest
/// first).
pub fn parse_mentions(html: &str, now: DateTime<Utc>, window: Duration) -> Vec<Mention> {
    let document = Html::parse_document(html);
    let post_selector = Selector::parse(POST_SELECTOR).expect("Invalid post selector");
    let cutoff = now - window;

    let mut mentions = Vec::new();
    let mut skipped = 0usize;

    for article in document.select(&post_selector) {
        match parse_post(article) {
            Ok(mention) if mention.created_at > cutoff => mentions.push(mention),
            Ok(mention) => {
                debug!(remote_id = %mention.remote_id, "Post outside mention window, skipping");
            }
            Err(reason) => {
                skipped += 1;
                warn!(%reason, "Could not parse scraped post, skipping");
            }
        }
    }

    debug!(found = mentions.len(), skipped, "Parsed scraped posts");
    mentions
}

/// Text of the first (root) post on a status page.
pub fn root_post_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let post_selector = Selector::parse(POST_SELECTOR).expect("Invalid post selector");
    let text_selector =
        Selector::parse("[data-testid='tweetText']").expect("Invalid text selector");

    let article = document.select(&post_selector).next()?;
    let text = article
        .select(&text_selector)
        .next()
        .map(|el| el.text().collect::<String>())?;

    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Pull the numeric post id out of a permalink like `/someone/status/12345`.
pub fn status_id_from_href(href: &str) -> Option<String> {
    let re = regex_lite::Regex::new(r"/status/(\d+)").expect("Invalid status regex");
    re.captures(href).map(|caps| caps[1].to_string())
}

fn parse_post(article: ElementRef<'_>) -> Result<Mention, String> {
    let time_selector = Selector::parse("time[datetime]").expect("Invalid time selector");
    let text_selector =
        Selector::parse("[data-testid='tweetText']").expect("Invalid text selector");
    let link_selector = Selector::parse("a[href*='/status/']").expect("Invalid link selector");

    let timestamp = article
        .select(&time_selector)
        .next()
        .and_then(|el| el.value().attr("datetime"))
        .ok_or("missing <time datetime>")?;
    let created_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| format!("bad timestamp {timestamp:?}: {e}"))?
        .with_timezone(&Utc);

    let text = article
        .select(&text_selector)
        .next()
        .map(|el| el.text().collect::<String>())
        .ok_or("missing post text")?;

    let remote_id = article
        .select(&link_selector)
        .filter_map(|el| el.value().attr("href"))
        .find_map(status_id_from_href)
        .ok_or("missing status link")?;

    Ok(Mention {
        remote_id,
        text: text.trim().to_string(),
        created_at,
        conversation_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: &str, when: &str, text: &str) -> String {
        format!(
            r#"<article data-testid="tweet">
                 <a href="/someone/status/{id}"><time datetime="{when}">1h</time></a>
                 <div data-testid="tweetText"><span>{text}</span></div>
               </article>"#
        )
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn extracts_posts_inside_window() {
        let html = format!(
            "<html><body>{}{}</body></html>",
            article("111", "2024-06-01T11:30:00.000Z", "@bruh hola"),
            article("222", "2024-06-01T11:59:00.000Z", "@bruh que onda"),
        );

        let mentions = parse_mentions(&html, now(), Duration::hours(1));
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].remote_id, "111");
        assert_eq!(mentions[0].text, "@bruh hola");
        assert_eq!(mentions[1].remote_id, "222");
        assert!(mentions[0].conversation_id.is_none());
    }

    #[test]
    fn drops_posts_older_than_window() {
        let html = format!(
            "<html><body>{}{}</body></html>",
            article("111", "2024-06-01T09:00:00.000Z", "old"),
            article("222", "2024-06-01T11:45:00.000Z", "new"),
        );

        let mentions = parse_mentions(&html, now(), Duration::hours(1));
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].remote_id, "222");
    }

    #[test]
    fn malformed_post_is_skipped_not_fatal() {
        let broken = r#"<article data-testid="tweet"><div data-testid="tweetText">no time here</div></article>"#;
        let bad_time = article("333", "yesterday-ish", "weird");
        let html = format!(
            "<html><body>{broken}{bad_time}{}</body></html>",
            article("444", "2024-06-01T11:50:00.000Z", "fine"),
        );

        let mentions = parse_mentions(&html, now(), Duration::hours(1));
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].remote_id, "444");
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(parse_mentions("<html></html>", now(), Duration::hours(1)).is_empty());
    }

    #[test]
    fn status_id_parsing() {
        assert_eq!(
            status_id_from_href("/bruh/status/1790000000000000000"),
            Some("1790000000000000000".to_string())
        );
        assert_eq!(
            status_id_from_href("https://twitter.com/x/status/42/photo/1"),
            Some("42".to_string())
        );
        assert_eq!(status_id_from_href("/bruh/likes"), None);
    }

    #[test]
    fn root_text_is_first_post() {
        let html = format!(
            "<html><body>{}{}</body></html>",
            article("1", "2024-06-01T10:00:00Z", "  the root post  "),
            article("2", "2024-06-01T10:05:00Z", "a reply"),
        );
        assert_eq!(root_post_text(&html), Some("the root post".to_string()));
        assert_eq!(root_post_text("<html></html>"), None);
    }
}
