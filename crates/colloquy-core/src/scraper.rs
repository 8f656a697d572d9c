use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::OnceLock;
use tracing::debug;

// Captures whole URLs including path and query; trailing sentence
// punctuation is trimmed afterwards.
const URL_PATTERN: &str = r#"https?://[^\s<>"']+"#;

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(URL_PATTERN).expect("url pattern is valid"))
}

/// Returns every URL in `text`, in order of first appearance, duplicates
/// included.
pub fn extract_urls(text: &str) -> Vec<String> {
    url_regex()
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')']).to_string())
        .filter(|u| !u.is_empty())
        .collect()
}

/// Fetches and distills page content referenced in agent responses.
pub struct Scraper {
    http: reqwest::Client,
}

impl Default for Scraper {
    fn default() -> Self {
        Self::new()
    }
}

impl Scraper {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Scrapes each URL and aggregates the distilled text. Per-URL failures
    /// never abort the batch: each becomes a visible inline annotation so
    /// operators can see which source failed without losing the others.
    pub async fn scrape(&self, urls: &[String], selector: Option<&str>) -> String {
        let mut blocks = Vec::new();
        for url in urls {
            match self.scrape_url(url, selector).await {
                Ok(content) if !content.is_empty() => {
                    blocks.push(format!("Content from {url}:\n{content}\n"));
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(url = %url, error = %e, "scrape failed");
                    blocks.push(format!("Error scraping {url}: {e:#}\n"));
                }
            }
        }
        blocks.join("\n")
    }

    async fn scrape_url(&self, url: &str, selector: Option<&str>) -> anyhow::Result<String> {
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Ok(format!("Error: HTTP {}", resp.status().as_u16()));
        }
        let html = resp.text().await?;
        extract_content(&html, selector)
    }
}

/// Distills text from an HTML document. Script and style subtrees are
/// skipped. With a selector, matched elements' text is concatenated; a
/// selector that matches nothing falls back to the first of main, article,
/// body. Without one, body text is used directly.
pub fn extract_content(html: &str, selector: Option<&str>) -> anyhow::Result<String> {
    let document = Html::parse_document(html);

    if let Some(selector_str) = selector {
        let sel = Selector::parse(selector_str)
            .map_err(|e| anyhow::anyhow!("invalid selector '{}': {:?}", selector_str, e))?;
        let matched: Vec<String> = document.select(&sel).map(element_text).collect();
        if !matched.is_empty() {
            return Ok(matched.join("\n"));
        }
        for fallback in ["main", "article", "body"] {
            let sel = Selector::parse(fallback)
                .map_err(|e| anyhow::anyhow!("invalid selector '{}': {:?}", fallback, e))?;
            if let Some(el) = document.select(&sel).next() {
                return Ok(element_text(el));
            }
        }
        return Ok(String::new());
    }

    let body = Selector::parse("body")
        .map_err(|e| anyhow::anyhow!("invalid selector 'body': {:?}", e))?;
    Ok(document
        .select(&body)
        .next()
        .map(element_text)
        .unwrap_or_default())
}

fn element_text(el: ElementRef) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                out.push_str(&t.text);
                out.push(' ');
            }
            Node::Element(e) => {
                if e.name() != "script" && e.name() != "style" {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        collect_text(child_el, out);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_full_urls_in_order() {
        let urls = extract_urls("Visit https://a.com and https://b.org/x?y=1 today");
        assert_eq!(urls, vec!["https://a.com", "https://b.org/x?y=1"]);
    }

    #[test]
    fn keeps_duplicates_and_trims_punctuation() {
        let urls = extract_urls("See https://a.com, then https://a.com.");
        assert_eq!(urls, vec!["https://a.com", "https://a.com"]);
        assert!(extract_urls("no links here").is_empty());
    }

    const PAGE: &str = r#"
        <html>
          <head><style>body { color: red; }</style></head>
          <body>
            <script>var tracked = true;</script>
            <main><p>Main content here.</p></main>
            <div class="aside">Sidebar text.</div>
          </body>
        </html>
    "#;

    #[test]
    fn body_text_skips_script_and_style() {
        let text = extract_content(PAGE, None).unwrap();
        assert!(text.contains("Main content here."));
        assert!(text.contains("Sidebar text."));
        assert!(!text.contains("tracked"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn selector_extracts_matched_elements_only() {
        let text = extract_content(PAGE, Some("div.aside")).unwrap();
        assert_eq!(text, "Sidebar text.");
    }

    #[test]
    fn unmatched_selector_falls_back_to_main() {
        let text = extract_content(PAGE, Some("#missing")).unwrap();
        assert_eq!(text, "Main content here.");
    }

    #[test]
    fn malformed_selector_is_an_error() {
        assert!(extract_content(PAGE, Some("[[[")).is_err());
    }
}
