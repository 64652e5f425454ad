use crate::classify::Classification;
use serde::Deserialize;

/// How a classified request is satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    NetworkOnlyWithCacheFallback,
}

/// Classification → strategy mapping.
///
/// This is data, not code: config can remap a category without touching the
/// fetch machinery, and tests can exercise policies in isolation.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct PolicyTable {
    pub navigation: Strategy,
    pub static_asset: Strategy,
    pub dynamic: Strategy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            navigation: Strategy::NetworkFirst,
            static_asset: Strategy::CacheFirst,
            dynamic: Strategy::NetworkOnlyWithCacheFallback,
        }
    }
}

impl PolicyTable {
    /// `None` for out-of-scope requests; those are never intercepted.
    pub fn select(&self, classification: Classification) -> Option<Strategy> {
        match classification {
            Classification::Navigation => Some(self.navigation),
            Classification::StaticAsset => Some(self.static_asset),
            Classification::Dynamic => Some(self.dynamic),
            Classification::OutOfScope => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_shipped_policy() {
        let table = PolicyTable::default();
        assert_eq!(
            table.select(Classification::Navigation),
            Some(Strategy::NetworkFirst)
        );
        assert_eq!(
            table.select(Classification::StaticAsset),
            Some(Strategy::CacheFirst)
        );
        assert_eq!(
            table.select(Classification::Dynamic),
            Some(Strategy::NetworkOnlyWithCacheFallback)
        );
        assert_eq!(table.select(Classification::OutOfScope), None);
    }

    #[test]
    fn table_deserializes_from_kebab_case() {
        let table: PolicyTable = toml::from_str(
            r#"
            navigation = "cache-first"
            static_asset = "stale-while-revalidate"
            "#,
        )
        .unwrap();
        assert_eq!(table.navigation, Strategy::CacheFirst);
        assert_eq!(table.static_asset, Strategy::StaleWhileRevalidate);
        // Unspecified rows keep the default mapping.
        assert_eq!(table.dynamic, Strategy::NetworkOnlyWithCacheFallback);
    }
}
