use moka::sync::Cache;
use std::{collections::BTreeSet, sync::Arc, time::Duration};

///
/// ResolutionCache
///
/// Owned memo of idempotent resolution results, shared by all
/// requests flowing through one service stack. Entries are immutable
/// once computed; eviction is explicit policy (bounded capacity plus
/// TTL), configured at construction.
///

pub struct ResolutionCache {
    property_refs: Cache<String, Arc<BTreeSet<String>>>,
    client_types: Cache<String, String>,
}

impl ResolutionCache {
    #[must_use]
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            property_refs: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            client_types: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Memoized transitive expansion of a property-ref list.
    pub fn expanded_refs(
        &self,
        refs: &[String],
        expand: impl FnOnce(&[String]) -> BTreeSet<String>,
    ) -> Arc<BTreeSet<String>> {
        // Refs arrive client-ordered; normalize so equivalent requests
        // share one entry.
        let mut sorted: Vec<&str> = refs.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        let cache_key = sorted.join("\n");

        self.property_refs
            .get_with(cache_key, || Arc::new(expand(refs)))
    }

    /// Memoized domain-path to proxy-token resolution.
    pub fn client_type(
        &self,
        domain_path: &str,
        resolve: impl FnOnce() -> Option<String>,
    ) -> Option<String> {
        if let Some(hit) = self.client_types.get(domain_path) {
            return Some(hit);
        }

        let token = resolve()?;
        self.client_types
            .insert(domain_path.to_string(), token.clone());

        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn cache() -> ResolutionCache {
        ResolutionCache::new(64, Duration::from_secs(60))
    }

    #[test]
    fn expansion_runs_once_per_distinct_ref_set() {
        let cache = cache();
        let calls = Cell::new(0u32);
        let refs = vec!["a.b".to_string(), "c".to_string()];

        for _ in 0..3 {
            let expanded = cache.expanded_refs(&refs, |_| {
                calls.set(calls.get() + 1);
                BTreeSet::from(["a".to_string(), "a.b".to_string(), "c".to_string()])
            });
            assert!(expanded.contains("a.b"));
        }

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn ref_order_does_not_split_cache_entries() {
        let cache = cache();
        let calls = Cell::new(0u32);
        let expand = |_: &[String]| {
            calls.set(calls.get() + 1);
            BTreeSet::new()
        };

        cache.expanded_refs(&["x".to_string(), "y".to_string()], expand);
        cache.expanded_refs(&["y".to_string(), "x".to_string()], expand);

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unmapped_client_type_is_not_cached() {
        let cache = cache();
        assert_eq!(cache.client_type("demo::Missing", || None), None);
        assert_eq!(
            cache.client_type("demo::Missing", || Some("demo.FoundProxy".into())),
            Some("demo.FoundProxy".to_string())
        );
    }
}
