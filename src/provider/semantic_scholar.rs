//! Semantic Scholar paper provider.
//!
//! Searches the Semantic Scholar Graph API (`/graph/v1/paper/search`) and
//! converts the hits into [`Paper`] documents. With `full_text`, open-access
//! PDFs are downloaded and converted to text with the `pdftotext` tool from
//! poppler; papers whose PDF cannot be fetched or converted keep their
//! title + abstract body.

use std::env;
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{PaperProvider, ProviderError, ProviderResult};
use crate::models::{Author, Paper};

const S2_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";
const SEARCH_FIELDS: &str = "paperId,title,abstract,year,venue,url,citationCount,openAccessPdf,authors";

/// Maximum page size accepted by the search endpoint
const MAX_PAGE_SIZE: usize = 100;

/// The search endpoint refuses offsets past this many results
const MAX_RESULTS: usize = 1000;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    next: Option<usize>,
    #[serde(default)]
    data: Vec<PaperData>,
}

#[derive(Debug, Deserialize)]
struct PaperData {
    #[serde(rename = "paperId")]
    paper_id: String,

    #[serde(default)]
    title: Option<String>,

    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,

    #[serde(default)]
    year: Option<i32>,

    #[serde(default)]
    venue: Option<String>,

    #[serde(default)]
    url: Option<String>,

    #[serde(rename = "citationCount", default)]
    citation_count: Option<u32>,

    #[serde(rename = "openAccessPdf", default)]
    open_access_pdf: Option<OpenAccessPdf>,

    #[serde(default)]
    authors: Vec<AuthorData>,
}

#[derive(Debug, Deserialize)]
struct AuthorData {
    #[serde(rename = "authorId", default)]
    author_id: Option<String>,

    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessPdf {
    #[serde(default)]
    url: Option<String>,
}

impl PaperData {
    /// Convert an API record into a paper. Records without a title are dropped.
    fn into_paper(self) -> Option<Paper> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        let abstract_text = self.abstract_text.unwrap_or_default();
        let text = Paper::summary_text(&title, &abstract_text);

        Some(Paper {
            paper_id: self.paper_id,
            authors: self
                .authors
                .into_iter()
                .filter_map(|a| {
                    a.name.map(|name| Author {
                        name,
                        author_id: a.author_id,
                    })
                })
                .collect(),
            title,
            abstract_text,
            publish_year: self.year,
            venue: self.venue.filter(|v| !v.is_empty()),
            url: self.url,
            citation_count: self.citation_count,
            open_access_pdf: self.open_access_pdf.and_then(|p| p.url).filter(|u| !u.is_empty()),
            text,
        })
    }
}

/// Client for the Semantic Scholar search API.
///
/// # API Key
/// Set `SEMANTIC_SCHOLAR_API_KEY` to send authenticated requests; anonymous
/// access works with lower rate limits.
#[derive(Debug, Clone)]
pub struct SemanticScholarProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarProvider {
    /// Create a provider. If `api_key` is None, `SEMANTIC_SCHOLAR_API_KEY` is consulted.
    pub fn new(api_key: Option<String>) -> ProviderResult<Self> {
        let api_key = api_key.or_else(|| env::var("SEMANTIC_SCHOLAR_API_KEY").ok());

        let client = Client::builder()
            .user_agent(format!("paper-chat/{}", crate::VERSION))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ProviderError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: S2_API_BASE.to_string(),
            api_key,
        })
    }

    /// Point the provider at a different API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_page(&self, topic: &str, offset: usize, limit: usize) -> ProviderResult<SearchResponse> {
        let url = format!(
            "{}/paper/search?query={}&offset={}&limit={}&fields={}",
            self.base_url,
            urlencoding::encode(topic),
            offset,
            limit,
            SEARCH_FIELDS
        );
        debug!("Fetching {}", url);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<SearchResponse>()
                .await
                .map_err(|e| ProviderError::ParseError(e.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimitExceeded(
                "Semantic Scholar returned 429".to_string(),
            )),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ProviderError::NetworkError(format!("HTTP {}: {}", status, body)))
            }
        }
    }

    async fn search(&self, topic: &str, limit: usize) -> ProviderResult<Vec<Paper>> {
        let limit = limit.min(MAX_RESULTS);
        let mut papers = Vec::with_capacity(limit);
        let mut offset = 0;

        while papers.len() < limit {
            let page_size = (limit - papers.len()).min(MAX_PAGE_SIZE);
            let page = self.fetch_page(topic, offset, page_size).await?;
            let received = page.data.len();

            papers.extend(page.data.into_iter().filter_map(PaperData::into_paper));

            match page.next {
                Some(next) if received > 0 && next < MAX_RESULTS => offset = next,
                _ => break,
            }
        }

        papers.truncate(limit);
        Ok(papers)
    }

    /// Replace the body of each paper with its open-access PDF text, where available.
    async fn attach_full_text(&self, papers: &mut [Paper]) {
        for paper in papers.iter_mut() {
            let Some(pdf_url) = paper.open_access_pdf.clone() else {
                debug!("No open-access PDF for '{}'", paper.title);
                continue;
            };

            match self.fetch_pdf_text(&pdf_url).await {
                Ok(text) if !text.trim().is_empty() => {
                    paper.text = format!("{}\n\n{}", paper.title, text.trim());
                }
                Ok(_) => warn!("PDF for '{}' contained no text, keeping abstract", paper.title),
                Err(e) => warn!("Full text unavailable for '{}': {}", paper.title, e),
            }
        }
    }

    async fn fetch_pdf_text(&self, pdf_url: &str) -> ProviderResult<String> {
        let bytes = self
            .client
            .get(pdf_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let mut pdf = tempfile::Builder::new().suffix(".pdf").tempfile()?;
        pdf.write_all(&bytes)?;
        pdf.flush()?;

        let output = tokio::process::Command::new("pdftotext")
            .arg("-layout")
            .arg(pdf.path())
            .arg("-")
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProviderError::ParseError(format!(
                "pdftotext failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PaperProvider for SemanticScholarProvider {
    async fn load_data(&self, topic: &str, limit: usize, full_text: bool) -> ProviderResult<Vec<Paper>> {
        if topic.trim().is_empty() {
            return Err(ProviderError::Other("Search topic cannot be empty".to_string()));
        }

        let mut papers = self.search(topic, limit).await?;
        info!("Semantic Scholar returned {} papers for '{}'", papers.len(), topic);

        if full_text {
            self.attach_full_text(&mut papers).await;
        }

        Ok(papers)
    }

    fn name(&self) -> &str {
        "Semantic Scholar"
    }
}
