//! Feed reader
//!
//! Fetches an RSS 2.0 or Atom feed and turns each entry into a
//! [`ReleaseCandidate`], keeping feed order.

use crate::config::Config;
use crate::error::FetchError;
use crate::types::ReleaseCandidate;
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// Source of release candidates
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the feed once. No retry.
    async fn fetch(&self, feed_url: &str) -> Result<Vec<ReleaseCandidate>, FetchError>;
}

/// HTTP feed reader
#[derive(Clone)]
pub struct FeedReader {
    client: reqwest::Client,
}

impl FeedReader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.http_timeout())
            .build()?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl FeedSource for FeedReader {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<ReleaseCandidate>, FetchError> {
        log::debug!("Fetching feed {}", feed_url);

        let response = self.client.get(feed_url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let candidates = parse_feed(&body)?;
        log::debug!("Feed returned {} entries", candidates.len());
        Ok(candidates)
    }
}

/// Parse RSS `<item>` and Atom `<entry>` elements from raw XML
pub fn parse_feed(xml: &[u8]) -> Result<Vec<ReleaseCandidate>, FetchError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut candidates = Vec::new();
    let mut buf = Vec::new();

    // Open element names, outermost first
    let mut path: Vec<Vec<u8>> = Vec::new();
    // Set while inside an entry; holds the depth of the entry element
    let mut current: Option<(usize, EntryBuilder)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.name().as_ref().to_vec();
                path.push(name.clone());

                if current.is_none() && is_entry(&name) {
                    current = Some((path.len(), EntryBuilder::default()));
                } else if let Some((depth, builder)) = current.as_mut() {
                    if path.len() == *depth + 1 {
                        builder.enclosure_from(&e)?;
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some((depth, builder)) = current.as_mut() {
                    if path.len() == *depth {
                        builder.enclosure_from(&e)?;
                    }
                }
            }
            Ok(Event::End(_)) => {
                if let Some((depth, _)) = current.as_ref() {
                    if path.len() == *depth {
                        if let Some((_, builder)) = current.take() {
                            candidates.push(builder.build());
                        }
                    }
                }
                path.pop();
            }
            Ok(Event::Text(e)) => {
                if let Some((depth, builder)) = current.as_mut() {
                    if is_entry_title(&path, *depth) {
                        let text = e
                            .unescape()
                            .map_err(|e| FetchError::Parse(format!("bad title text: {}", e)))?;
                        builder.title.push_str(&text);
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some((depth, builder)) = current.as_mut() {
                    if is_entry_title(&path, *depth) {
                        builder.title.push_str(&String::from_utf8_lossy(&e));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::Parse(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(candidates)
}

fn is_entry(name: &[u8]) -> bool {
    name == b"item" || name == b"entry"
}

/// True when the innermost open element is a direct `<title>` child of the entry
fn is_entry_title(path: &[Vec<u8>], entry_depth: usize) -> bool {
    path.len() == entry_depth + 1 && path.last().is_some_and(|name| name.as_slice() == b"title")
}

#[derive(Default)]
struct EntryBuilder {
    title: String,
    enclosure: Option<String>,
}

impl EntryBuilder {
    /// Take the URL from `<enclosure url=..>` or `<link rel="enclosure" href=..>`.
    /// Only the first enclosure counts.
    fn enclosure_from(&mut self, element: &BytesStart<'_>) -> Result<(), FetchError> {
        if self.enclosure.is_some() {
            return Ok(());
        }

        let url_key: &[u8] = match element.name().as_ref() {
            b"enclosure" => b"url",
            b"link" => {
                if attribute(element, b"rel")?.as_deref() != Some("enclosure") {
                    return Ok(());
                }
                b"href"
            }
            _ => return Ok(()),
        };

        self.enclosure = attribute(element, url_key)?.filter(|url| !url.is_empty());
        Ok(())
    }

    fn build(self) -> ReleaseCandidate {
        ReleaseCandidate {
            title: self.title.trim().to_string(),
            torrent_url: self.enclosure,
        }
    }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, FetchError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| FetchError::Parse(format!("bad attribute: {}", e)))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| FetchError::Parse(format!("bad attribute value: {}", e)))?;
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>YTS RSS</title>
    <item>
      <title><![CDATA[The Movie (2023) [1080p]]]></title>
      <link>https://yts.mx/movies/the-movie-2023</link>
      <enclosure url="https://yts.mx/torrent/download/AAAA" length="1600000000" type="application/x-bittorrent" />
    </item>
    <item>
      <title>Other Movie (2022) [720p]</title>
      <enclosure url="https://yts.mx/torrent/download/BBBB" type="application/x-bittorrent"/>
      <enclosure url="https://yts.mx/torrent/download/SECOND" type="application/x-bittorrent"/>
    </item>
    <item>
      <title>No Enclosure &amp; Friends [1080p]</title>
      <link>https://yts.mx/movies/no-enclosure</link>
    </item>
  </channel>
</rss>"#;

    const SAMPLE_ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Releases</title>
  <entry>
    <title>Atom Movie (2021) [1080p]</title>
    <link rel="alternate" href="https://example.com/atom-movie"/>
    <link rel="enclosure" type="application/x-bittorrent" href="magnet:?xt=urn:btih:0123456789abcdef"/>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_items_in_order() {
        let candidates = parse_feed(SAMPLE_RSS.as_bytes()).unwrap();
        assert_eq!(
            candidates,
            vec![
                ReleaseCandidate::new(
                    "The Movie (2023) [1080p]",
                    Some("https://yts.mx/torrent/download/AAAA".into())
                ),
                ReleaseCandidate::new(
                    "Other Movie (2022) [720p]",
                    Some("https://yts.mx/torrent/download/BBBB".into())
                ),
                ReleaseCandidate::new("No Enclosure & Friends [1080p]", None),
            ]
        );
    }

    #[test]
    fn test_parse_atom_enclosure_link() {
        let candidates = parse_feed(SAMPLE_ATOM.as_bytes()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Atom Movie (2021) [1080p]");
        assert_eq!(
            candidates[0].torrent_url.as_deref(),
            Some("magnet:?xt=urn:btih:0123456789abcdef")
        );
    }

    #[test]
    fn test_channel_title_is_not_an_entry() {
        let xml = r#"<rss><channel><title>Only a channel</title></channel></rss>"#;
        assert!(parse_feed(xml.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let xml = r#"<rss><channel><item><title>Broken</item></channel></rss>"#;
        assert!(matches!(parse_feed(xml.as_bytes()), Err(FetchError::Parse(_))));
    }

    #[tokio::test]
    async fn test_fetch_over_http() {
        let mut server = Server::new_async().await;
        let feed = server
            .mock("GET", "/rss")
            .with_status(200)
            .with_header("content-type", "application/rss+xml")
            .with_body(SAMPLE_RSS)
            .expect(1)
            .create_async()
            .await;

        let reader = FeedReader::new(reqwest::Client::new());
        let candidates = reader
            .fetch(&format!("{}/rss", server.url()))
            .await
            .unwrap();
        assert_eq!(candidates.len(), 3);
        feed.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_http_error_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rss")
            .with_status(503)
            .create_async()
            .await;

        let reader = FeedReader::new(reqwest::Client::new());
        let result = reader.fetch(&format!("{}/rss", server.url())).await;
        assert!(matches!(result, Err(FetchError::Status(503))));
    }
}
