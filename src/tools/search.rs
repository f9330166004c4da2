//! Web 搜索：DuckDuckGo HTML 端点
//!
//! GET {endpoint}?q=... 后用正则取出结果标题 / 链接 / 摘要，并去掉其中的标签与实体；
//! 跳转链接（//duckduckgo.com/l/?uddg=...）还原为真实 URL。最多返回 max_results 条。

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::core::{AgentError, Capability};

pub const DEFAULT_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// 一条搜索结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchHit {
    /// 写入上下文的片段：`title - url\nsnippet`
    pub fn to_fragment(&self) -> String {
        format!("{} - {}\n{}", self.title, self.url, self.snippet)
    }
}

#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, AgentError>;
}

pub struct DuckDuckGoSearcher {
    client: Client,
    endpoint: String,
    max_results: usize,
    link_re: Regex,
    snippet_re: Regex,
    tag_re: Regex,
}

impl DuckDuckGoSearcher {
    pub fn new(
        endpoint: Option<&str>,
        max_results: usize,
        timeout: std::time::Duration,
    ) -> Result<Self, AgentError> {
        const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AgentError::config(format!("search client: {e}")))?;
        let link_re = Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#)
            .map_err(|e| AgentError::config(format!("search regex: {e}")))?;
        let snippet_re = Regex::new(r#"(?s)<(?:a|div)[^>]*class="result__snippet"[^>]*>(.*?)</(?:a|div)>"#)
            .map_err(|e| AgentError::config(format!("search regex: {e}")))?;
        let tag_re = Regex::new(r"<[^>]*>").map_err(|e| AgentError::config(format!("search regex: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string(),
            max_results,
            link_re,
            snippet_re,
            tag_re,
        })
    }

    /// 从结果页 HTML 提取搜索结果
    pub fn parse_results(&self, html: &str) -> Vec<SearchHit> {
        let snippets: Vec<String> = self
            .snippet_re
            .captures_iter(html)
            .map(|c| self.fragment_text(c.get(1).map_or("", |m| m.as_str())))
            .collect();

        self.link_re
            .captures_iter(html)
            .take(self.max_results)
            .enumerate()
            .map(|(i, c)| {
                let href = c.get(1).map_or("", |m| m.as_str());
                let title = self.fragment_text(c.get(2).map_or("", |m| m.as_str()));
                SearchHit {
                    title: if title.is_empty() { "Untitled".to_string() } else { title },
                    url: resolve_href(href),
                    snippet: snippets.get(i).cloned().unwrap_or_default(),
                }
            })
            .collect()
    }

    /// HTML 片段 -> 单行纯文本
    fn fragment_text(&self, fragment: &str) -> String {
        let text = decode_entities(&self.tag_re.replace_all(fragment, ""));
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// 还原 DuckDuckGo 跳转链接；无法解析时原样返回
fn resolve_href(href: &str) -> String {
    let href = href.replace("&amp;", "&");
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.clone()
    };
    Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

#[async_trait]
impl WebSearcher for DuckDuckGoSearcher {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, AgentError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AgentError::failure(Capability::WebSearcher, "empty query"));
        }
        tracing::info!(query = %query, "web search");
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| AgentError::failure(Capability::WebSearcher, format!("Request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(AgentError::failure(
                Capability::WebSearcher,
                format!("HTTP {}", resp.status()),
            ));
        }
        let html = resp
            .text()
            .await
            .map_err(|e| AgentError::failure(Capability::WebSearcher, format!("Read body: {e}")))?;
        Ok(self.parse_results(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PAGE: &str = r#"
<div class="result results_links results_links_deep web-result">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Ftokio.rs%2Ftokio%2Ftutorial&amp;rut=abc">Tutorial | <b>Tokio</b></a>
  </h2>
  <a class="result__snippet" href="//duckduckgo.com/l/?uddg=x">Tokio is an <b>asynchronous</b> runtime for Rust.</a>
</div>
<div class="result">
  <a rel="nofollow" class="result__a" href="https://docs.rs/tokio"></a>
  <a class="result__snippet" href="https://docs.rs/tokio">API docs.</a>
</div>
<div class="result">
  <a rel="nofollow" class="result__a" href="https://github.com/tokio-rs/tokio">tokio-rs/tokio</a>
  <a class="result__snippet" href="https://github.com/tokio-rs/tokio">Source.</a>
</div>
<div class="result">
  <a rel="nofollow" class="result__a" href="https://crates.io/crates/tokio">tokio - crates.io</a>
  <a class="result__snippet" href="https://crates.io/crates/tokio">Crate.</a>
</div>
"#;

    fn searcher(max: usize) -> DuckDuckGoSearcher {
        DuckDuckGoSearcher::new(None, max, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_results_limits_and_decodes() {
        let hits = searcher(3).parse_results(PAGE);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].url, "https://tokio.rs/tokio/tutorial");
        assert_eq!(hits[0].title, "Tutorial | Tokio");
        assert_eq!(hits[0].snippet, "Tokio is an asynchronous runtime for Rust.");
        assert_eq!(hits[1].title, "Untitled");
        assert_eq!(hits[1].url, "https://docs.rs/tokio");
    }

    #[test]
    fn test_fragment_format() {
        let hit = SearchHit {
            title: "Tokio".into(),
            url: "https://tokio.rs".into(),
            snippet: "runtime".into(),
        };
        assert_eq!(hit.to_fragment(), "Tokio - https://tokio.rs\nruntime");
    }

    #[test]
    fn test_entities_decoded() {
        let s = searcher(1);
        assert_eq!(s.fragment_text("Q&amp;A &lt;b&gt; <i>it&#x27;s</i>"), "Q&A <b> it's");
    }

    #[test]
    fn test_no_results() {
        assert!(searcher(3).parse_results("<html><body>No results.</body></html>").is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_is_failure() {
        let err = searcher(3).search("  ").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::ProviderFailure { capability: Capability::WebSearcher, .. }
        ));
    }
}
