use crate::config::{HostConfig, HostTable};
use crate::extractor;
use crate::renderer::{RenderError, Renderer};
use crate::state::PipelineState;
use once_cell::sync::Lazy;
use rand::Rng;
use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::header::{ACCEPT_LANGUAGE, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

pub(crate) const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 Version/14.0 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0.0.0 Safari/537.36",
];

const SEARCH_REFERERS: [&str; 3] = [
    "https://google.com",
    "https://duckduckgo.com",
    "https://www.bing.com",
];

pub const NON_HTML_EXTENSIONS: [&str; 22] = [
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".svg", ".pdf", ".mp4", ".mp3", ".avi", ".mov",
    ".wmv", ".zip", ".tar", ".gz", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".xml",
];

const FETCH_ATTEMPTS: u32 = 3;
const SESSION_RECYCLE_REQUESTS: usize = 50;
const SOFT_BLOCK_MIN_BODY: usize = 500;
const SOFT_BLOCK_MIN_TEXT: usize = 200;
const SOFT_BLOCK_MIN_STRUCTURE: usize = 5;
const CMS_SCRIPT_LIMIT: usize = 1;

static STRUCTURE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p, div, section, article").expect("structure selector"));
static NOSCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("noscript").expect("noscript selector"));
static SCRIPT_SRC_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script[src]").expect("script selector"));
static CMS_RESOURCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"zmi\.js|^/\+\+resource\+\+").expect("cms resource pattern"));

/// True when the URL path ends in a known non-HTML extension.
pub fn has_non_html_extension(url: &str) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    NON_HTML_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

struct HttpSession {
    client: Option<Client>,
    requests_served: usize,
}

enum PlainFetch {
    Body(String),
    Escalate,
    ShortCircuit,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PageVerdict {
    Clean,
    Login,
    ErrorPage,
    SoftBlock,
}

/// Per-host adaptive fetcher. Plain HTTP first, with retries, redirect
/// tracking and soft-block detection; escalates to the render backend when
/// the static response looks withheld. All failures are recorded as short
/// taxonomy strings in the shared state, never raised.
pub struct Fetcher {
    session: Mutex<HttpSession>,
    hosts: HostTable,
    state: Arc<PipelineState>,
    renderer: Arc<Renderer>,
}

impl Fetcher {
    pub fn new(hosts: HostTable, state: Arc<PipelineState>, renderer: Arc<Renderer>) -> Self {
        Self {
            session: Mutex::new(HttpSession {
                client: None,
                requests_served: 0,
            }),
            hosts,
            state,
            renderer,
        }
    }

    /// Fetches one URL and returns its final HTML, or None with the cause
    /// recorded in `error_urls`.
    pub async fn fetch(&self, url: &str) -> Option<String> {
        if has_non_html_extension(url) {
            self.state.record_error(url, "skip-ext");
            return None;
        }
        match self.fetch_plain(url).await {
            PlainFetch::Body(text) => match classify_page(&text) {
                PageVerdict::Login => {
                    self.state.record_error(url, "login-page");
                    None
                }
                PageVerdict::ErrorPage => {
                    self.state.record_error(url, "error-page");
                    None
                }
                PageVerdict::SoftBlock => {
                    debug!(url, "static response looks withheld, escalating to render");
                    self.fetch_rendered(url, Some("soft-block")).await
                }
                PageVerdict::Clean => Some(text),
            },
            PlainFetch::Escalate => self.fetch_rendered(url, Some("soft-block")).await,
            PlainFetch::ShortCircuit => None,
            PlainFetch::Failed => self.fetch_rendered(url, None).await,
        }
    }

    async fn fetch_plain(&self, url: &str) -> PlainFetch {
        let host = self.hosts.for_url(url).clone();
        for attempt in 0..FETCH_ATTEMPTS {
            if attempt > 0 {
                let delay = {
                    let mut rng = rand::thread_rng();
                    host.retry_base_delay_s as f64
                        * 2f64.powi(attempt as i32 - 1)
                        * (0.5 + rng.r#gen::<f64>())
                };
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }

            let client = match self.client_for(&host).await {
                Ok(client) => client,
                Err(error) => {
                    warn!(url, %error, "http client construction failed");
                    if attempt + 1 == FETCH_ATTEMPTS {
                        self.state
                            .record_error(url, &format!("transport: {error}"));
                        return PlainFetch::Failed;
                    }
                    continue;
                }
            };

            let (user_agent, referer) = {
                let mut rng = rand::thread_rng();
                let ua = *USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0]);
                let mut pool: Vec<String> =
                    SEARCH_REFERERS.iter().map(|s| (*s).to_string()).collect();
                if let Some(origin) = self_origin(url) {
                    pool.push(format!("{origin}/"));
                }
                let referer = pool
                    .choose(&mut rng)
                    .cloned()
                    .unwrap_or_else(|| SEARCH_REFERERS[0].to_string());
                (ua, referer)
            };

            let mut request = client
                .get(url)
                .header(USER_AGENT, user_agent)
                .header(REFERER, referer)
                .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
                .timeout(Duration::from_secs(host.total_timeout_s));
            if let Some(origin) = self_origin(url) {
                request = request.header(ORIGIN, origin);
            }

            match request.send().await {
                Ok(response) => {
                    if response.status() != StatusCode::OK {
                        self.state.record_error(
                            url,
                            &format!("http-status:{}", response.status().as_u16()),
                        );
                        return PlainFetch::Failed;
                    }
                    let final_url = response.url().to_string();
                    match response.text().await {
                        Ok(text) => {
                            if body_requires_render(&text) {
                                return PlainFetch::Escalate;
                            }
                            if final_url != url {
                                self.state.remember_redirect(url, &final_url);
                                if self.state.is_processed(&final_url) {
                                    self.state.mark_processed(url);
                                    return PlainFetch::ShortCircuit;
                                }
                            }
                            return PlainFetch::Body(text);
                        }
                        Err(error) => {
                            if attempt + 1 == FETCH_ATTEMPTS {
                                self.state
                                    .record_error(url, &format!("transport: {error}"));
                                return PlainFetch::Failed;
                            }
                        }
                    }
                }
                Err(error) => {
                    if attempt + 1 == FETCH_ATTEMPTS {
                        self.state
                            .record_error(url, &format!("transport: {error}"));
                        return PlainFetch::Failed;
                    }
                }
            }
        }
        PlainFetch::Failed
    }

    async fn fetch_rendered(&self, url: &str, soft_block: Option<&str>) -> Option<String> {
        match self.renderer.render(url).await {
            Ok(rendered) => {
                if rendered.final_url != url {
                    self.state.remember_redirect(url, &rendered.final_url);
                    if self.state.is_processed(&rendered.final_url) {
                        self.state.mark_processed(url);
                        return None;
                    }
                }
                match classify_rendered(&rendered.html) {
                    PageVerdict::Login => {
                        self.state.record_error(url, "login-page-post-js");
                        None
                    }
                    PageVerdict::ErrorPage => {
                        self.state.record_error(url, "error-page-post-js");
                        None
                    }
                    _ => {
                        // A provisional error from the plain path no longer
                        // applies once rendering produced a real page.
                        self.state.clear_error(url);
                        Some(rendered.html)
                    }
                }
            }
            Err(RenderError::TooLarge) => {
                self.state.record_error(url, "too-large");
                None
            }
            Err(RenderError::LoginRedirect(target)) => {
                self.state
                    .record_error(url, &format!("render-failed:login-redirect {target}"));
                None
            }
            Err(error) => {
                if let Some(reason) = soft_block {
                    self.state.record_error(url, reason);
                } else if self.state.error_for(url).is_none() {
                    self.state
                        .record_error(url, &format!("render-failed:{error}"));
                }
                None
            }
        }
    }

    /// One long-lived client, rebuilt every 50 requests to shed keep-alive
    /// state. The client is configured from the host that triggers the
    /// (re)build.
    async fn client_for(&self, host: &HostConfig) -> reqwest::Result<Client> {
        let mut session = self.session.lock().await;
        if session.requests_served >= SESSION_RECYCLE_REQUESTS {
            session.client = None;
            session.requests_served = 0;
        }
        let client = match session.client.clone() {
            Some(client) => client,
            None => {
                let client = Client::builder()
                    .danger_accept_invalid_certs(host.accept_invalid_certs)
                    .pool_max_idle_per_host(host.max_connections)
                    .connect_timeout(Duration::from_secs(host.connect_timeout_s))
                    .build()?;
                session.client = Some(client.clone());
                client
            }
        };
        session.requests_served += 1;
        Ok(client)
    }
}

fn self_origin(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}://{}", parsed.scheme(), host))
}

/// A 200 body that hides the real page even before parsing: too short, or
/// carrying an access-denied / javascript-required gate.
pub(crate) fn body_requires_render(text: &str) -> bool {
    let lowered = text.to_lowercase();
    text.trim().len() < SOFT_BLOCK_MIN_BODY
        || lowered.contains("access denied")
        || lowered.contains("javascript required")
}

fn classify_page(html: &str) -> PageVerdict {
    let document = Html::parse_document(html);
    if extractor::is_login_page(&document) {
        return PageVerdict::Login;
    }
    if extractor::is_error_page(&document) {
        return PageVerdict::ErrorPage;
    }
    if looks_soft_blocked(&document) {
        return PageVerdict::SoftBlock;
    }
    PageVerdict::Clean
}

pub(crate) fn classify_rendered(html: &str) -> PageVerdict {
    let document = Html::parse_document(html);
    if extractor::is_login_page(&document) {
        PageVerdict::Login
    } else if extractor::is_error_page(&document) {
        PageVerdict::ErrorPage
    } else {
        PageVerdict::Clean
    }
}

/// A 200 response that still hides its content: almost no visible text, too
/// little structure, a `<noscript>` gate, or more than one CMS resource
/// script.
fn looks_soft_blocked(document: &Html) -> bool {
    if extractor::visible_text(document).len() < SOFT_BLOCK_MIN_TEXT {
        return true;
    }
    if document.select(&STRUCTURE_SELECTOR).count() < SOFT_BLOCK_MIN_STRUCTURE {
        return true;
    }
    if document.select(&NOSCRIPT_SELECTOR).next().is_some() {
        return true;
    }
    let cms_scripts = document
        .select(&SCRIPT_SRC_SELECTOR)
        .filter(|s| {
            s.value()
                .attr("src")
                .is_some_and(|src| CMS_RESOURCE.is_match(src))
        })
        .count();
    cms_scripts > CMS_SCRIPT_LIMIT
}
