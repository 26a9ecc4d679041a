use std::collections::HashMap;
use url::Url;

/// Per-host fetch and render tunables.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub total_timeout_s: u64,
    pub connect_timeout_s: u64,
    pub max_connections: usize,
    pub retry_base_delay_s: u64,
    pub render_wait_ms: u64,
    pub consent_click_timeout_ms: u64,
    /// Per-host TLS bypass; off unless a host is known to carry
    /// mixed-trust certificates.
    pub accept_invalid_certs: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            total_timeout_s: 300,
            connect_timeout_s: 10,
            max_connections: 10,
            retry_base_delay_s: 2,
            render_wait_ms: 10_000,
            consent_click_timeout_ms: 300,
            accept_invalid_certs: false,
        }
    }
}

/// Host-keyed config table with a default fallback. Lookup is by the URL's
/// host, case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct HostTable {
    overrides: HashMap<String, HostConfig>,
    default: HostConfig,
}

impl HostTable {
    pub fn new(default: HostConfig) -> Self {
        Self {
            overrides: HashMap::new(),
            default,
        }
    }

    pub fn insert(&mut self, host: &str, config: HostConfig) {
        self.overrides.insert(host.to_lowercase(), config);
    }

    pub fn lookup(&self, host: &str) -> &HostConfig {
        self.overrides
            .get(&host.to_lowercase())
            .unwrap_or(&self.default)
    }

    pub fn for_url(&self, url: &str) -> &HostConfig {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| self.lookup(h)))
            .unwrap_or(&self.default)
    }

    /// The tuning table for the research-centre cluster this pipeline was
    /// built against. Slow CMS hosts get one connection, long timeouts and
    /// long render waits; all listed hosts carry mixed-trust certificates.
    /// These numbers are operational policy, not contract.
    pub fn research_cluster_defaults() -> Self {
        let entry = |timeout: u64, connections: usize, retry: u64, wait: u64| HostConfig {
            total_timeout_s: timeout,
            max_connections: connections,
            retry_base_delay_s: retry,
            render_wait_ms: wait,
            accept_invalid_certs: true,
            ..HostConfig::default()
        };
        let mut table = Self::default();
        table.insert("petra3.desy.de", entry(500, 2, 3, 12_000));
        table.insert("indico.desy.de", entry(500, 2, 5, 15_000));
        table.insert("pitz.desy.de", entry(500, 2, 3, 12_000));
        table.insert("www.desy.de", entry(900, 1, 3, 60_000));
        table.insert("desy.de", entry(500, 1, 3, 30_000));
        table.insert("newsletter.desy.de", entry(900, 1, 3, 60_000));
        table.insert("connect.desy.de", entry(500, 1, 3, 30_000));
        table.insert("astroparticle-physics.desy.de", entry(500, 1, 3, 30_000));
        table.insert("innovation.desy.de", entry(500, 1, 3, 30_000));
        table.insert("petra4.desy.de", entry(900, 1, 3, 90_000));
        table.insert("accelerators.desy.de", entry(900, 1, 3, 60_000));
        table.insert("v22.desy.de", entry(500, 1, 3, 30_000));
        table.insert("photon-science.desy.de", entry(500, 1, 3, 30_000));
        table.insert("particle-physics.desy.de", entry(900, 1, 3, 60_000));
        table.insert("pr.desy.de", entry(500, 1, 3, 30_000));
        table.insert("fh.desy.de", entry(900, 1, 3, 60_000));
        table
    }
}

/// Pipeline-level tunables, all passed in by the caller; nothing is read
/// from the environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_depth: u32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Tasks launched per batch; defaults to `min(30, 2 * max_workers)`.
    pub batch_size: Option<usize>,
    /// Truncate the deduplicated URL list to this many entries.
    pub limit: Option<usize>,
    /// Scroll rendered pages top to bottom before reading their content.
    pub render_scroll: bool,
    /// Extra block selectors for the content extractor, appended to the
    /// built-in tag list.
    pub content_tags: Vec<String>,
    pub hosts: HostTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_depth: 0,
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size: None,
            limit: None,
            render_scroll: true,
            content_tags: Vec::new(),
            hosts: HostTable::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_falls_back() {
        let table = HostTable::research_cluster_defaults();
        assert_eq!(table.lookup("WWW.DESY.DE").total_timeout_s, 900);
        assert_eq!(table.lookup("unknown.example.org").total_timeout_s, 300);
        assert!(!table.lookup("unknown.example.org").accept_invalid_certs);
    }

    #[test]
    fn for_url_extracts_the_host() {
        let table = HostTable::research_cluster_defaults();
        assert_eq!(
            table.for_url("https://petra4.desy.de/status.html").render_wait_ms,
            90_000
        );
        assert_eq!(table.for_url("not a url").total_timeout_s, 300);
    }
}
