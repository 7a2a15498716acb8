//! The managed-namespace glob filter.

use globset::{Glob, GlobMatcher};

use crate::model::DEFAULT_NAMESPACE_GLOB;

/// A compiled glob pattern deciding whether a namespace is managed.
///
/// Objects outside the managed set are still mirrored in the Store (the
/// Watcher doesn't filter what it watches), but are never classified as
/// Running/Queued.
#[derive(Debug, Clone)]
pub struct NamespaceFilter {
    pattern: String,
    matcher: GlobMatcher,
}

impl NamespaceFilter {
    pub fn new(pattern: &str) -> Result<Self, globset::Error> {
        let matcher = Glob::new(pattern)?.compile_matcher();
        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
        })
    }

    pub fn is_managed(&self, namespace: &str) -> bool {
        self.matcher.is_match(namespace)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Default for NamespaceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE_GLOB).expect("default namespace glob is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_glob_matches_cicd_suffixed_namespaces() {
        let f = NamespaceFilter::default();
        assert!(f.is_managed("team-a-cicd"));
        assert!(!f.is_managed("cicd")); // needs the literal "-cicd" suffix
        assert!(!f.is_managed("team-a-prod"));
    }

    #[test]
    fn custom_glob_is_honored() {
        let f = NamespaceFilter::new("ci-*").unwrap();
        assert!(f.is_managed("ci-staging"));
        assert!(!f.is_managed("staging-ci"));
    }
}
