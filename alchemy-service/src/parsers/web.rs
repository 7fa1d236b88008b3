//! Built-in web page fetcher.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, join_all};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{ChunkingConfig, CrawlerConfig};
use crate::dispatch::{WebCapability, WebRequest};
use crate::error::ProcessingError;
use crate::ingestion::SemanticChunker;
use crate::ingestion::html::{extract_links, extract_title, html_to_markdown};
use crate::schemas::{ContentType, DocumentChunk, ParseResponse};

/// One fetched page
#[derive(Debug, Clone)]
struct Page {
    url: Url,
    status: u16,
    title: Option<String>,
    markdown: String,
    /// Same-host links, deduplicated, in document order
    links: Vec<Url>,
}

/// Fetches pages over HTTP and converts them to markdown, optionally
/// following same-host links.
pub struct HttpWebParser {
    client: Client,
    chunker: Option<SemanticChunker>,
    max_links_per_page: usize,
}

impl HttpWebParser {
    pub fn new(crawler: &CrawlerConfig, chunking: &ChunkingConfig) -> Result<Self, ProcessingError> {
        let client = Client::builder()
            .timeout(crawler.timeout())
            .user_agent(crawler.user_agent.clone())
            .build()
            .map_err(ProcessingError::HttpClient)?;

        Ok(Self {
            client,
            chunker: chunking
                .semantic_chunking
                .then(|| SemanticChunker::from(chunking)),
            max_links_per_page: crawler.max_links_per_page,
        })
    }

    /// Fetch one page and everything reachable within `depth - 1` more hops.
    ///
    /// The starting page comes first. Failures below the starting page are
    /// logged and skipped.
    fn crawl<'a>(
        &'a self,
        url: Url,
        depth: u32,
        headers: &'a HeaderMap,
    ) -> BoxFuture<'a, Result<Vec<Page>, ProcessingError>> {
        async move {
            let page = self.fetch(url, headers).await?;
            if depth <= 1 {
                return Ok(vec![page]);
            }

            let children = page
                .links
                .iter()
                .filter(|link| **link != page.url)
                .take(self.max_links_per_page)
                .map(|link| self.crawl(link.clone(), depth - 1, headers));
            let results = join_all(children).await;

            let mut pages = vec![page];
            for result in results {
                match result {
                    Ok(sub_pages) => pages.extend(sub_pages),
                    Err(e) => warn!(error = %e, "Skipping linked page"),
                }
            }
            Ok(pages)
        }
        .boxed()
    }

    async fn fetch(&self, url: Url, headers: &HeaderMap) -> Result<Page, ProcessingError> {
        debug!(url = %url, "Fetching page");

        let response = self
            .client
            .get(url.clone())
            .headers(headers.clone())
            .send()
            .await
            .map_err(|source| ProcessingError::Fetch {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProcessingError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_none_or(|content_type| content_type.contains("html"));
        let body = response
            .text()
            .await
            .map_err(|source| ProcessingError::Fetch {
                url: url.to_string(),
                source,
            })?;

        let (title, markdown, links) = if is_html {
            (
                extract_title(&body),
                html_to_markdown(&body),
                same_host_links(&url, &extract_links(&body)),
            )
        } else {
            (None, body.trim().to_string(), Vec::new())
        };

        Ok(Page {
            url,
            status: status.as_u16(),
            title,
            markdown,
            links,
        })
    }
}

/// Prefix scheme-less input with `https://` and reject non-HTTP schemes.
pub fn normalize_url(raw: &str) -> Result<Url, ProcessingError> {
    let raw = raw.trim();
    let invalid = || ProcessingError::InvalidUrl {
        url: raw.to_string(),
    };

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&candidate).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(url)
}

/// Resolve `hrefs` against `base`, keeping unique http(s) links on the same host.
fn same_host_links(base: &Url, hrefs: &[String]) -> Vec<Url> {
    let mut links: Vec<Url> = Vec::new();
    for href in hrefs {
        let Ok(mut link) = base.join(href) else {
            continue;
        };
        link.set_fragment(None);
        if matches!(link.scheme(), "http" | "https")
            && link.host_str() == base.host_str()
            && !links.contains(&link)
        {
            links.push(link);
        }
    }
    links
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ProcessingError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let invalid = || ProcessingError::InvalidHeader { name: name.clone() };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Chunk every page and renumber the chunks across the whole crawl.
fn chunk_pages(chunker: &SemanticChunker, pages: &[Page]) -> Vec<DocumentChunk> {
    pages
        .iter()
        .flat_map(|page| chunker.chunk(&page.markdown))
        .enumerate()
        .map(|(index, chunk)| DocumentChunk { index, ..chunk })
        .collect()
}

#[async_trait]
impl WebCapability for HttpWebParser {
    fn name(&self) -> &'static str {
        "http-web"
    }

    async fn parse_web(&self, request: WebRequest) -> Result<ParseResponse, ProcessingError> {
        let url = normalize_url(&request.url)?;
        let headers = header_map(&request.headers)?;

        let pages = self.crawl(url.clone(), request.max_depth, &headers).await?;
        let Some((root, linked)) = pages.split_first() else {
            return Err(ProcessingError::InvalidUrl {
                url: url.to_string(),
            });
        };

        let markdown = if linked.is_empty() {
            root.markdown.clone()
        } else {
            pages
                .iter()
                .map(|page| format!("## {}\n\n{}", page.url, page.markdown))
                .collect::<Vec<_>>()
                .join("\n\n---\n\n")
        };

        let mut response = ParseResponse::new(url.as_str(), ContentType::Web)
            .with_metadata("num_pages_crawled", pages.len())
            .with_metadata("links_found", root.links.len())
            .with_metadata("status_code", root.status);
        if let Some(title) = &root.title {
            response = response.with_metadata("title", title.as_str());
        }

        let ignored: Vec<&str> = [
            request.css_selector.as_ref().map(|_| "css_selector"),
            request.extraction_schema.as_ref().map(|_| "extraction_schema"),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !ignored.is_empty() {
            response = response.with_metadata("ignored_options", json!(ignored));
        }

        if let Some(chunker) = &self.chunker {
            response.chunks = chunk_pages(chunker, &pages);
        }
        response.markdown = Some(markdown);

        debug!(
            url = %url,
            pages = pages.len(),
            chunks = response.chunks.len(),
            "Parsed web page"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// (path, status, content type, body)
    type Route = (&'static str, u16, &'static str, &'static str);

    const HOME: &str = r#"<html><head><title>Home</title></head><body>
<h1>Home</h1><p>Welcome.</p>
<a href="/a">A</a> <a href="/b#top">B</a> <a href="/a">A again</a>
<a href="https://elsewhere.test/x">away</a> <a href="mailto:me@example.com">mail</a>
</body></html>"#;

    const PAGE_A: &str = r#"<h1>A</h1><p>Page A.</p><a href="/">home</a>"#;

    /// Serve fixed responses on a local port, one request per connection.
    async fn serve(routes: Vec<Route>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let mut read = 0;
                    loop {
                        let n = socket.read(&mut buf[read..]).await.unwrap();
                        read += n;
                        if n == 0
                            || read == buf.len()
                            || buf[..read].windows(4).any(|w| w == b"\r\n\r\n")
                        {
                            break;
                        }
                    }

                    let request = String::from_utf8_lossy(&buf[..read]).to_string();
                    let path = request.split_whitespace().nth(1).unwrap_or("/");
                    let (status, content_type, body) = routes
                        .iter()
                        .find(|route| route.0 == path)
                        .map(|route| (route.1, route.2, route.3))
                        .unwrap_or((404, "text/plain", "not found"));

                    let response = format!(
                        "HTTP/1.1 {status} STATUS\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                    let _ = socket.shutdown().await;
                });
            }
        });

        addr
    }

    fn site() -> Vec<Route> {
        vec![
            ("/", 200, "text/html; charset=utf-8", HOME),
            ("/a", 200, "text/html", PAGE_A),
            ("/notes.txt", 200, "text/plain", "  plain body \n"),
        ]
    }

    fn parser() -> HttpWebParser {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpWebParser {
            client,
            chunker: Some(SemanticChunker::default()),
            max_links_per_page: 5,
        }
    }

    fn request(addr: SocketAddr, path: &str, depth: u32) -> WebRequest {
        WebRequest {
            max_depth: depth,
            ..WebRequest::new(format!("http://{addr}{path}"))
        }
    }

    #[tokio::test]
    async fn test_single_page() {
        let addr = serve(site()).await;
        let response = parser().parse_web(request(addr, "/", 1)).await.unwrap();

        assert_eq!(response.source, format!("http://{addr}/"));
        assert_eq!(response.content_type, ContentType::Web);
        assert_eq!(response.markdown.as_deref(), Some("# Home\n\nWelcome.\n\nA B A again away mail"));
        assert_eq!(response.metadata["num_pages_crawled"], 1);
        assert_eq!(response.metadata["links_found"], 2);
        assert_eq!(response.metadata["status_code"], 200);
        assert_eq!(response.metadata["title"], "Home");
        assert_eq!(response.chunks.len(), 1);
        assert_eq!(response.chunks[0].section.as_deref(), Some("Home"));
    }

    #[tokio::test]
    async fn test_follows_same_host_links() {
        let addr = serve(site()).await;
        let response = parser().parse_web(request(addr, "/", 2)).await.unwrap();

        // "/b" answers 404 and is skipped
        assert_eq!(response.metadata["num_pages_crawled"], 2);
        let markdown = response.markdown.unwrap();
        assert!(markdown.starts_with(&format!("## http://{addr}/\n\n# Home")));
        assert!(markdown.contains(&format!("\n\n---\n\n## http://{addr}/a\n\n# A\n\nPage A.")));

        for (expected, chunk) in response.chunks.iter().enumerate() {
            assert_eq!(chunk.index, expected);
        }
        assert_eq!(response.chunks.last().unwrap().section.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_plain_text_response() {
        let addr = serve(site()).await;
        let response = parser()
            .parse_web(request(addr, "/notes.txt", 3))
            .await
            .unwrap();
        assert_eq!(response.markdown.as_deref(), Some("plain body"));
        assert_eq!(response.metadata["links_found"], 0);
        assert!(response.metadata.get("title").is_none());
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let addr = serve(site()).await;
        let error = parser()
            .parse_web(request(addr, "/missing", 1))
            .await
            .unwrap_err();
        assert!(matches!(error, ProcessingError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_unapplied_options_are_reported() {
        let addr = serve(site()).await;
        let mut request = request(addr, "/a", 1);
        request.css_selector = Some("main".to_string());

        let response = parser().parse_web(request).await.unwrap();
        assert_eq!(response.metadata["ignored_options"], json!(["css_selector"]));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url(" example.com/docs ").unwrap().as_str(),
            "https://example.com/docs"
        );
        assert_eq!(
            normalize_url("http://example.com").unwrap().as_str(),
            "http://example.com/"
        );
        assert!(normalize_url("ftp://example.com").is_err());
        assert!(normalize_url("http://").is_err());
        assert!(normalize_url("").is_err());
    }

    #[test]
    fn test_same_host_links() {
        let base = Url::parse("https://site.test/guide/").unwrap();
        let hrefs: Vec<String> = ["intro", "/about#team", "intro", "https://other.test/", "javascript:void(0)"]
            .into_iter()
            .map(String::from)
            .collect();

        let links: Vec<String> = same_host_links(&base, &hrefs)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            links,
            vec!["https://site.test/guide/intro", "https://site.test/about"]
        );
    }

    #[test]
    fn test_invalid_header_rejected() {
        let headers = BTreeMap::from([("bad header".to_string(), "x".to_string())]);
        assert!(matches!(
            header_map(&headers),
            Err(ProcessingError::InvalidHeader { name }) if name == "bad header"
        ));
    }
}
