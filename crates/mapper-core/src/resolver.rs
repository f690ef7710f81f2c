//! Indirection chain resolution.

use mapper_types::{CycleError, MappingError, MappingStore};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

/// A value is a reference only when the whole string is `${<key>}`.
static MAPPING_LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$\{(.+)\}$").expect("mapping link regex is valid"));

/// Inner key of a `${key}` reference, or `None` for a literal value.
pub fn link_target(value: &str) -> Option<&str> {
    MAPPING_LINK_PATTERN
        .captures(value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Walks `${key}` chains to the key that holds a literal value.
/// Read-only; keeps no state between calls.
pub struct LinkResolver<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for LinkResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> LinkResolver<S>
where
    S: MappingStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Key whose mapping holds the terminal value for `source_key`.
    ///
    /// - an unmapped `source_key` is returned unchanged;
    /// - a literal-valued `source_key` resolves to itself;
    /// - a reference to an unmapped key (dangling) resolves to that key;
    /// - revisiting a key fails with [`CycleError`], whose chain ends with the revisited key.
    pub async fn resolve_target_key(&self, source_key: &str) -> Result<String, MappingError> {
        let Some(source) = self.store.get_by_key(source_key).await? else {
            return Ok(source_key.to_string());
        };

        let mut chain: Vec<String> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut target = source_key.to_string();
        let mut value = source.value;

        while let Some(next) = link_target(&value) {
            let next = next.to_string();
            if !visited.insert(next.clone()) {
                chain.push(next);
                return Err(CycleError { chain }.into());
            }
            chain.push(next.clone());
            target = next;
            match self.store.get_by_key(&target).await? {
                Some(mapping) => value = mapping.value,
                None => break,
            }
        }

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapper_store::InMemoryMappingStore;

    fn link(key: &str) -> String {
        format!("${{{}}}", key)
    }

    fn resolver() -> (Arc<InMemoryMappingStore>, LinkResolver<InMemoryMappingStore>) {
        let store = Arc::new(InMemoryMappingStore::new());
        (Arc::clone(&store), LinkResolver::new(store))
    }

    #[test]
    fn only_whole_value_references_match() {
        assert_eq!(link_target("${a.b}"), Some("a.b"));
        assert_eq!(link_target("${a}tail"), None);
        assert_eq!(link_target("head${a}"), None);
        assert_eq!(link_target("${}"), None);
        assert_eq!(link_target("plain"), None);
    }

    #[tokio::test]
    async fn unmapped_key_resolves_to_itself() {
        let (_store, r) = resolver();
        assert_eq!(r.resolve_target_key("nothing.here").await.unwrap(), "nothing.here");
    }

    #[tokio::test]
    async fn literal_value_resolves_to_source_key() {
        let (store, r) = resolver();
        store.create("k", "value").await.unwrap();
        assert_eq!(r.resolve_target_key("k").await.unwrap(), "k");
    }

    #[tokio::test]
    async fn follows_chains_of_any_length() {
        for n in 1..=6 {
            let (store, r) = resolver();
            for i in 0..n {
                store
                    .create(&format!("k{}", i), &link(&format!("k{}", i + 1)))
                    .await
                    .unwrap();
            }
            store.create(&format!("k{}", n), "12345").await.unwrap();
            assert_eq!(r.resolve_target_key("k0").await.unwrap(), format!("k{}", n));
        }
    }

    #[tokio::test]
    async fn dangling_reference_resolves_to_target_key() {
        let (store, r) = resolver();
        store.create("X", &link("Y")).await.unwrap();
        assert_eq!(r.resolve_target_key("X").await.unwrap(), "Y");
    }

    #[tokio::test]
    async fn two_cycle_is_detected_from_either_end() {
        let (store, r) = resolver();
        store.create("P", &link("Q")).await.unwrap();
        store.create("Q", &link("P")).await.unwrap();

        for start in ["P", "Q"] {
            let err = r.resolve_target_key(start).await.unwrap_err();
            let MappingError::Cycle(cycle) = &err else {
                panic!("expected cycle, got {:?}", err);
            };
            assert!(cycle.chain.contains(&"P".to_string()));
            assert!(cycle.chain.contains(&"Q".to_string()));
        }

        let MappingError::Cycle(cycle) = r.resolve_target_key("P").await.unwrap_err() else {
            unreachable!()
        };
        assert_eq!(cycle.chain, vec!["Q", "P", "Q"]);
    }

    #[tokio::test]
    async fn self_reference_and_lead_in_cycles() {
        let (store, r) = resolver();
        store.create("self", &link("self")).await.unwrap();
        assert!(matches!(
            r.resolve_target_key("self").await,
            Err(MappingError::Cycle(_))
        ));

        store.create("a", &link("b")).await.unwrap();
        store.create("b", &link("c")).await.unwrap();
        store.create("c", &link("d")).await.unwrap();
        store.create("d", &link("b")).await.unwrap();
        for start in ["a", "b", "c", "d"] {
            assert!(matches!(
                r.resolve_target_key(start).await,
                Err(MappingError::Cycle(_))
            ));
        }
    }
}
