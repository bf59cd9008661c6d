use super::Post;
use serde::Deserialize;
use std::collections::HashMap;

/// URL that selects the instance-wide filter.
pub const ALL_URLS: &str = "all";

/// Prefix marking a term that matches item categories instead of text.
const LABEL_PREFIX: &str = "label:";

/// One `[[instances.post_filters]]` table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PostFilterConfig {
    pub url: String,
    #[serde(default)]
    pub filters: Vec<String>,
}

/// Keyword and label filters for one feed instance.
///
/// A filter for the exact feed URL wins over the `all` filter. Without an
/// applicable filter every post passes.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    by_url: HashMap<String, Vec<String>>,
    all: Option<Vec<String>>,
}

impl PostFilter {
    pub fn new(configs: &[PostFilterConfig]) -> Self {
        let mut filter = Self::default();
        for config in configs {
            let url = config.url.trim();
            if url.eq_ignore_ascii_case(ALL_URLS) {
                filter.all = Some(config.filters.clone());
            } else {
                filter.by_url.insert(url.to_string(), config.filters.clone());
            }
        }
        filter
    }

    /// Whether `post`, fetched from `url`, should be announced.
    pub fn should_include(&self, post: &Post, url: &str) -> bool {
        match self.by_url.get(url).or(self.all.as_ref()) {
            Some(terms) => matches_any(post, terms),
            None => true,
        }
    }
}

/// True when `terms` is empty or any term matches.
///
/// Text terms are case-insensitive substrings of the title or description;
/// `label:name` terms match a category case-insensitively.
pub fn matches_any(post: &Post, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }

    let title = post.title.to_lowercase();
    let description = post.description.to_lowercase();

    terms.iter().any(|term| match term.strip_prefix(LABEL_PREFIX) {
        Some(label) => {
            let label = label.trim().to_lowercase();
            post.labels.iter().any(|l| l.trim().to_lowercase() == label)
        }
        None => {
            let needle = term.to_lowercase();
            title.contains(&needle) || description.contains(&needle)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(title: &str, description: &str, labels: &[&str]) -> Post {
        Post {
            title: title.to_string(),
            link: "http://example.com/post".to_string(),
            description: description.to_string(),
            author: "Author".to_string(),
            published: Utc::now(),
            image_url: None,
            tag: "news".to_string(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn terms(t: &[&str]) -> Vec<String> {
        t.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_text_term_matches_title_case_insensitive() {
        assert!(matches_any(&post("Breaking News", "", &[]), &terms(&["breaking"])));
    }

    #[test]
    fn test_text_term_matches_description() {
        assert!(matches_any(&post("Title", "Contains KEYWORD here", &[]), &terms(&["keyword"])));
    }

    #[test]
    fn test_no_match() {
        assert!(!matches_any(&post("Title", "Description", &[]), &terms(&["missing"])));
    }

    #[test]
    fn test_empty_terms_include_everything() {
        assert!(matches_any(&post("Title", "Description", &[]), &[]));
    }

    #[test]
    fn test_label_term() {
        let p = post("Title", "Description", &["Important", "tech"]);
        assert!(matches_any(&p, &terms(&["label:important"])));
        assert!(!matches_any(&p, &terms(&["label:sports"])));
    }

    #[test]
    fn test_label_term_without_labels() {
        assert!(!matches_any(&post("Title", "Description", &[]), &terms(&["label:breaking"])));
    }

    #[test]
    fn test_empty_label_term_matches_blank_label() {
        let p = post("Title", "Description", &["", "important"]);
        assert!(matches_any(&p, &terms(&["label:"])));
    }

    #[test]
    fn test_mixed_terms() {
        let p = post("Breaking News", "Description", &[]);
        assert!(matches_any(&p, &terms(&["label:nonexistent", "breaking"])));

        let p = post("Title", "Description", &["important"]);
        assert!(matches_any(&p, &terms(&["nonexistent-text", "label:important"])));
    }

    #[test]
    fn test_url_filter_beats_all() {
        let filter = PostFilter::new(&[
            PostFilterConfig {
                url: "all".into(),
                filters: terms(&["rust"]),
            },
            PostFilterConfig {
                url: "https://a.example/feed".into(),
                filters: terms(&["go"]),
            },
        ]);
        let p = post("Go 1.22 released", "", &[]);

        assert!(filter.should_include(&p, "https://a.example/feed"));
        assert!(!filter.should_include(&p, "https://b.example/feed"));
    }

    #[test]
    fn test_no_applicable_filter_includes() {
        let filter = PostFilter::new(&[PostFilterConfig {
            url: "https://a.example/feed".into(),
            filters: terms(&["rust"]),
        }]);
        let p = post("Unrelated", "", &[]);

        assert!(filter.should_include(&p, "https://other.example/feed"));
        assert!(PostFilter::default().should_include(&p, "https://a.example/feed"));
    }
}
