use tracing::{info, instrument};

use crate::error::ManifestError;
use crate::model::Manifest;
use crate::source::DataSource;

pub const MANIFEST_PATH: &str = "manifest.json";

/// Fetches, parses and validates `manifest.json`.
#[instrument(skip_all)]
pub async fn load_manifest<S: DataSource>(source: &S) -> Result<Manifest, ManifestError> {
    let bytes = source.fetch(MANIFEST_PATH).await?;
    let manifest: Manifest =
        serde_json::from_slice(&bytes).map_err(|e| ManifestError::Parse(e.to_string()))?;
    let manifest = manifest.validated().map_err(ManifestError::Invalid)?;
    info!(total_slides = manifest.total_slides, "manifest loaded");
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::testkit::MemorySource;

    #[tokio::test]
    async fn loads_and_orders_entries() {
        let source = MemorySource::new().with_file(
            MANIFEST_PATH,
            r##"{"total_slides": 2, "slides": [
                {"index": 1, "name": "b", "filename": "slide_1.json"},
                {"index": 0, "name": "a", "filename": "slide_0.json",
                 "dominant_colors": ["#112233"],
                 "transitions": [{"to": 1, "filename": "transition_0_to_1.json"}]}
            ]}"##,
        );
        let manifest = load_manifest(&source).await.unwrap();
        assert_eq!(manifest.total_slides, 2);
        assert_eq!(manifest.slides[0].name, "a");
        assert_eq!(manifest.slides[0].dominant_colors, vec!["#112233"]);
        assert!(manifest.slides[1].transitions.is_empty());
    }

    #[tokio::test]
    async fn missing_manifest_is_a_fetch_error() {
        let source = MemorySource::new();
        let err = load_manifest(&source).await.unwrap_err();
        assert!(matches!(
            err,
            ManifestError::Fetch(FetchError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let source = MemorySource::new().with_file(MANIFEST_PATH, "{ not json");
        assert!(matches!(
            load_manifest(&source).await,
            Err(ManifestError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn inconsistent_count_is_rejected() {
        let source = MemorySource::new().with_file(
            MANIFEST_PATH,
            r#"{"total_slides": 3, "slides": [{"index": 0, "name": "a", "filename": "a.json"}]}"#,
        );
        assert!(matches!(
            load_manifest(&source).await,
            Err(ManifestError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn empty_manifest_is_valid() {
        let source =
            MemorySource::new().with_file(MANIFEST_PATH, r#"{"total_slides": 0, "slides": []}"#);
        let manifest = load_manifest(&source).await.unwrap();
        assert!(manifest.is_empty());
    }
}
