//! Picks the engine adapter for a conversion.
//!
//! A candidate is eligible when it reads the source format and writes the
//! target format, and at least one of those two descriptors is native. Among
//! eligible candidates the first one (registration order) that reads the
//! source natively wins; failing that, the first eligible one.

use std::sync::Arc;

use crate::engine::EngineAdapter;
use crate::file::FileEntity;
use crate::format::normalize_format;

/// Resolves `from` → `to` against `candidates`, kept in registration order.
pub fn resolve_pair(
    candidates: &[Arc<dyn EngineAdapter>],
    from: &str,
    to: &str,
) -> Option<Arc<dyn EngineAdapter>> {
    let from = normalize_format(from);
    let to = normalize_format(to);

    let eligible: Vec<(&Arc<dyn EngineAdapter>, bool)> = candidates
        .iter()
        .filter_map(|adapter| {
            let read = adapter.descriptor(&from).filter(|d| d.from_supported)?;
            let write = adapter.descriptor(&to).filter(|d| d.to_supported)?;
            if !read.is_native && !write.is_native {
                return None;
            }
            Some((adapter, read.is_native))
        })
        .collect();

    eligible
        .iter()
        .find(|(_, native_read)| *native_read)
        .or_else(|| eligible.first())
        .map(|(adapter, _)| Arc::clone(adapter))
}

/// Resolves the adapter for a file's current source and target.
pub fn resolve(file: &FileEntity) -> Option<Arc<dyn EngineAdapter>> {
    resolve_pair(file.candidates(), &file.source().format, &file.target())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineKind;
    use crate::testing::MockEngine;

    fn engine(id: &str) -> MockEngine {
        MockEngine::new(id, EngineKind::TimedMedia)
    }

    fn id(adapter: Option<Arc<dyn EngineAdapter>>) -> Option<String> {
        adapter.map(|a| a.id().to_string())
    }

    #[test]
    fn test_native_reader_wins_over_registration_order() {
        let candidates: Vec<Arc<dyn EngineAdapter>> = vec![
            Arc::new(
                engine("ffmpeg")
                    .with_format("mkv", true, true, false)
                    .with_format("mp3", true, true, true),
            ),
            Arc::new(
                engine("remote")
                    .with_format("mkv", true, true, true)
                    .with_format("mp3", true, true, true),
            ),
        ];
        assert_eq!(id(resolve_pair(&candidates, ".mkv", ".mp3")), Some("remote".to_string()));
    }

    #[test]
    fn test_first_eligible_when_no_native_reader() {
        let candidates: Vec<Arc<dyn EngineAdapter>> = vec![
            Arc::new(
                engine("first")
                    .with_format("svg", true, false, false)
                    .with_format("png", true, true, true),
            ),
            Arc::new(
                engine("second")
                    .with_format("svg", true, false, false)
                    .with_format("png", true, true, true),
            ),
        ];
        assert_eq!(id(resolve_pair(&candidates, "svg", "png")), Some("first".to_string()));
    }

    #[test]
    fn test_all_non_native_pair_is_rejected() {
        let candidates: Vec<Arc<dyn EngineAdapter>> = vec![Arc::new(
            engine("ffmpeg")
                .with_format("mkv", true, true, false)
                .with_format("avi", true, true, false),
        )];
        assert!(resolve_pair(&candidates, ".mkv", ".avi").is_none());
    }

    #[test]
    fn test_capability_direction_matters() {
        let candidates: Vec<Arc<dyn EngineAdapter>> = vec![Arc::new(
            engine("image")
                .with_format("svg", true, false, false)
                .with_format("png", true, true, true),
        )];
        assert!(resolve_pair(&candidates, "png", "svg").is_none());
        assert!(resolve_pair(&candidates, "png", "gif").is_none());
        assert!(resolve_pair(&[], "png", "png").is_none());
    }
}
