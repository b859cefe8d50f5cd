//! Query routing: which sources a request fans out to and how their
//! hits are combined.
//!
//! Routing is a pure function of the requested selector and mode; it
//! never inspects the question text, so the same request always hits
//! the same indexes.

use crate::error::EngineError;
use crate::models::{Fusion, QueryMode, Source, SourceSelector};

/// A resolved route: the sources to query and the fusion to apply to
/// their result lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub sources: Vec<Source>,
    pub fusion: Fusion,
}

/// Resolve a selector and mode to a concrete route.
///
/// Internal mode restricts the request to curated knowledge bases: the
/// lease index and the `auto` selector are rejected rather than
/// silently widened.
pub fn resolve(selector: &SourceSelector, mode: QueryMode) -> Result<Route, EngineError> {
    match (mode, selector) {
        (QueryMode::Internal, SourceSelector::Auto) => Err(EngineError::UnsupportedSource(
            "source 'auto' is not available in internal mode".to_string(),
        )),
        (QueryMode::Internal, SourceSelector::Concrete(Source::Lease)) => {
            Err(EngineError::UnsupportedSource(
                "source 'lease' is not available in internal mode".to_string(),
            ))
        }
        (_, SourceSelector::Concrete(source)) => Ok(Route {
            sources: vec![*source],
            fusion: Fusion::Single,
        }),
        (_, SourceSelector::Internal) => Ok(Route {
            sources: Source::INTERNAL.to_vec(),
            fusion: Fusion::UnionRank,
        }),
        (QueryMode::General, SourceSelector::Auto) => Ok(Route {
            sources: Source::ALL.to_vec(),
            fusion: Fusion::UnionRank,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concrete_source_routes_single() {
        let route = resolve(&SourceSelector::Concrete(Source::Qa), QueryMode::General).unwrap();
        assert_eq!(route.sources, vec![Source::Qa]);
        assert_eq!(route.fusion, Fusion::Single);
    }

    #[test]
    fn test_auto_general_fans_out_to_all() {
        let route = resolve(&SourceSelector::Auto, QueryMode::General).unwrap();
        assert_eq!(route.sources, Source::ALL.to_vec());
        assert_eq!(route.fusion, Fusion::UnionRank);
    }

    #[test]
    fn test_internal_selector_covers_knowledge_bases() {
        for mode in [QueryMode::General, QueryMode::Internal] {
            let route = resolve(&SourceSelector::Internal, mode).unwrap();
            assert_eq!(route.sources, Source::INTERNAL.to_vec());
            assert_eq!(route.fusion, Fusion::UnionRank);
            assert!(!route.sources.contains(&Source::Lease));
        }
    }

    #[test]
    fn test_internal_mode_allows_concrete_knowledge_bases() {
        for source in Source::INTERNAL {
            let route = resolve(&SourceSelector::Concrete(source), QueryMode::Internal).unwrap();
            assert_eq!(route.sources, vec![source]);
            assert_eq!(route.fusion, Fusion::Single);
        }
    }

    #[test]
    fn test_internal_mode_rejects_auto_and_lease() {
        let err = resolve(&SourceSelector::Auto, QueryMode::Internal).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedSource(_)));

        let err =
            resolve(&SourceSelector::Concrete(Source::Lease), QueryMode::Internal).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedSource(_)));
    }

    #[test]
    fn test_routing_is_deterministic() {
        let a = resolve(&SourceSelector::Auto, QueryMode::General).unwrap();
        let b = resolve(&SourceSelector::Auto, QueryMode::General).unwrap();
        assert_eq!(a, b);
    }
}
