use feed_rs::parser;
use interfaces::Entry;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FeedParseError {
    #[error("feed payload is empty")]
    EmptyPayload,
    #[error("feed parse error: {0}")]
    Feed(#[from] feed_rs::parser::ParseFeedError),
}

pub struct FeedParser;

impl FeedParser {
    /// Parse an RSS/Atom/JSON feed document into entries, keeping feed order.
    pub fn parse(content: &[u8]) -> Result<Vec<Entry>, FeedParseError> {
        if content.iter().all(u8::is_ascii_whitespace) {
            return Err(FeedParseError::EmptyPayload);
        }

        debug!("Parsing feed content ({} bytes)", content.len());
        let feed = parser::parse(content)?;

        Ok(feed.entries.into_iter().map(Self::parse_entry).collect())
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> Entry {
        // Atom entries can carry self/replies/edit links; the permalink is the
        // alternate one, which is also what an rel-less link means.
        let link = entry
            .links
            .iter()
            .find(|link| matches!(link.rel.as_deref(), None | Some("alternate")))
            .or_else(|| entry.links.first())
            .map(|link| link.href.trim().to_string())
            .unwrap_or_default();
        let title = entry
            .title
            .map(|text| text.content)
            .unwrap_or_else(|| "No Title".to_string());
        let summary = entry.summary.map(|text| text.content).unwrap_or_default();

        Entry { link, title, summary }
    }
}
