use regex::Regex;
use std::time::Duration;
use url::Url;

/// Line-anchored `User-agent:` directive in a robots.txt body.
const ROBOTS_AGENT_PATTERN: &str = r"(?im)^\s*User-agent:\s*(.+?)\s*$";

/// HTTP behaviour shared by every feed instance.
///
/// Built once at startup and handed out behind an `Arc`. The robots.txt
/// pattern is compiled here so no request path ever compiles a regex.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Identity sent when no per-URL agent has been learned.
    pub default_user_agent: String,
    /// Identities tried, in order, after a blocking response.
    pub fallback_user_agents: Vec<String>,
    /// Minimum spacing between webhook posts from one client.
    pub post_min_interval: Duration,
    robots_agent: Regex,
}

impl HttpSettings {
    pub fn new(
        default_user_agent: impl Into<String>,
        fallback_user_agents: &[String],
        post_min_interval: Duration,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            default_user_agent: default_user_agent.into(),
            fallback_user_agents: dedup_agents(fallback_user_agents.iter().map(String::as_str)),
            post_min_interval,
            robots_agent: Regex::new(ROBOTS_AGENT_PATTERN)?,
        })
    }

    /// Extracts every `User-agent:` value from a robots.txt body.
    ///
    /// Values are de-duplicated and sorted in descending lexicographic
    /// order, so specific crawler names are tried before the `*` wildcard.
    pub fn robots_agents(&self, body: &str) -> Vec<String> {
        let mut agents = dedup_agents(
            self.robots_agent
                .captures_iter(body)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str()),
        );
        agents.sort_unstable_by(|a, b| b.cmp(a));
        agents
    }
}

/// Drops blank and repeated agents, keeping first-seen order. Case-sensitive.
fn dedup_agents<'a>(agents: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for agent in agents.into_iter().map(str::trim) {
        if !agent.is_empty() && !out.iter().any(|a| a == agent) {
            out.push(agent.to_string());
        }
    }
    out
}

/// `<scheme>://<host>[:port]/robots.txt` for the origin serving `url`.
pub(crate) fn robots_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}/robots.txt", parsed.scheme(), host, port),
        None => format!("{}://{}/robots.txt", parsed.scheme(), host),
    })
}

/// Builds the process-wide `reqwest::Client`.
pub fn build_client(timeout: Duration, default_user_agent: &str) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(default_user_agent)
        .pool_max_idle_per_host(10)
        .build()
}
