pub mod static_archive;

use std::path::PathBuf;
use std::time::Duration;

pub use static_archive::StaticArchive;

/// A configured OAI data source.
///
/// Identity is the normalised base URL; two config entries with the same
/// URL describe the same provider.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    /// Normalised; see [`normalize_base_url`].
    pub base_url: String,
    /// Endpoint group recorded in the overview; empty means ungrouped.
    pub group: String,
    /// Allow-list of metadata prefixes; `None` accepts whatever the
    /// endpoint advertises.
    pub prefixes: Option<Vec<String>>,
    pub timeout: Duration,
    pub kind: ProviderKind,
}

#[derive(Debug, Clone)]
pub enum ProviderKind {
    Live,
    /// Records pre-materialised in a local static-repository XML file.
    Static { archive: PathBuf },
}

impl Provider {
    pub fn is_static(&self) -> bool {
        matches!(self.kind, ProviderKind::Static { .. })
    }

    pub fn allows_prefix(&self, prefix: &str) -> bool {
        match &self.prefixes {
            Some(allowed) => allowed.iter().any(|p| p == prefix),
            None => true,
        }
    }
}

/// Lower-case the scheme and host, drop any trailing slash. Path and
/// query are significant and keep their case.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    match trimmed.find("://") {
        Some(scheme_end) => {
            let after_scheme = scheme_end + 3;
            let authority_end = trimmed[after_scheme..]
                .find('/')
                .map(|i| after_scheme + i)
                .unwrap_or(trimmed.len());
            format!(
                "{}{}",
                trimmed[..authority_end].to_ascii_lowercase(),
                &trimmed[authority_end..]
            )
        }
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_host_case_and_trailing_slash() {
        assert_eq!(
            normalize_base_url("HTTPS://Repo.Example.ORG/oai/"),
            "https://repo.example.org/oai"
        );
    }

    #[test]
    fn path_case_is_preserved() {
        assert_eq!(
            normalize_base_url("http://repo.example.org/OAI/Provider"),
            "http://repo.example.org/OAI/Provider"
        );
    }

    #[test]
    fn prefix_allow_list() {
        let provider = Provider {
            name: "x".into(),
            base_url: "http://repo.example.org/oai".into(),
            group: String::new(),
            prefixes: Some(vec!["oai_dc".into()]),
            timeout: Duration::from_secs(30),
            kind: ProviderKind::Live,
        };
        assert!(provider.allows_prefix("oai_dc"));
        assert!(!provider.allows_prefix("cmdi"));
    }
}
