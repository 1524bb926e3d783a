//! # Module / Weight Caches

use crate::cache::disk::DiskCacheConfig;
use crate::weights::Weights;
use std::path::PathBuf;

const X25: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_SDLC);

/// Build a cache key (bare cache file name) from a name and URL.
pub fn url_to_cache_key(
    name: Option<&str>,
    url: &str,
) -> String {
    let hash = X25.checksum(url.as_bytes()).to_string();
    let base_name = url.rsplit_once('/').map_or(url, |(_, base)| base);
    match name {
        Some(n) => format!("{}-{}-{}", n, hash, base_name),
        None => format!("{}-{}", hash, base_name),
    }
}

/// Get the cache resource key for a pretrained weights file.
///
/// # Arguments
///
/// - `cache_key`: the cache key (the bare cache file name).
///
/// # Returns
///
/// The cache resource key.
pub fn pretrained_weights_resource_key(cache_key: &str) -> Vec<String> {
    vec!["weights".to_string(), cache_key.to_string()]
}

/// Retrieval service for weight payloads.
///
/// Implementations may block, cache, or retry; callers only see the result.
pub trait RetrievalService {
    /// Obtain a local path to the payload of `weights`.
    ///
    /// # Arguments
    ///
    /// - `weights`: the entry to fetch.
    /// - `progress`: report download progress.
    fn fetch(
        &self,
        weights: &Weights,
        progress: bool,
    ) -> anyhow::Result<PathBuf>;
}

/// Read-through [`DiskCacheConfig`] retrieval.
#[derive(Debug, Clone, Default)]
pub struct DiskCacheRetrieval {
    /// The disk cache.
    pub disk_cache: DiskCacheConfig,
}

impl DiskCacheRetrieval {
    /// Cache Key
    ///
    /// The key is ``{qualified name}-{url crc hash}-{url basename}``.
    pub fn cache_key(weights: &Weights) -> String {
        url_to_cache_key(Some(&weights.qualified_name()), weights.url)
    }
}

impl From<DiskCacheConfig> for DiskCacheRetrieval {
    fn from(disk_cache: DiskCacheConfig) -> Self {
        Self { disk_cache }
    }
}

impl RetrievalService for DiskCacheRetrieval {
    fn fetch(
        &self,
        weights: &Weights,
        progress: bool,
    ) -> anyhow::Result<PathBuf> {
        let resource = pretrained_weights_resource_key(&Self::cache_key(weights));
        self.disk_cache
            .fetch_resource(weights.url, &resource, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::{Categories, EvalTransform, WeightsMeta};

    static CACHED: Weights = Weights {
        name: "Cached_V1",
        registry: "Test_Weights",
        url: "https://download.pytorch.org/models/keypointrcnn_resnet50_fpn_coco-fc266e95.pth",
        transforms: EvalTransform::CocoEval,
        meta: WeightsMeta {
            categories: Categories::Count(2),
            keypoint_names: None,
            recipe: None,
            metrics: &[],
        },
    };

    #[test]
    fn test_url_to_cache_key() {
        let url = "https://download.pytorch.org/models/keypointrcnn_resnet50_fpn_coco-fc266e95.pth";
        assert_eq!(
            url_to_cache_key(Some("model"), url),
            "model-4291-keypointrcnn_resnet50_fpn_coco-fc266e95.pth"
        );
        assert_eq!(
            url_to_cache_key(None, url),
            "4291-keypointrcnn_resnet50_fpn_coco-fc266e95.pth"
        );
        assert_eq!(url_to_cache_key(None, "bare.pth"), "62430-bare.pth");
    }

    #[test]
    fn test_disk_cache_retrieval_hit() {
        let dir = tempfile::tempdir().unwrap();
        let retrieval: DiskCacheRetrieval = DiskCacheConfig::new()
            .with_cache_root(Some(dir.path().to_string_lossy().to_string()))
            .into();

        assert_eq!(
            DiskCacheRetrieval::cache_key(&CACHED),
            "Test_Weights.Cached_V1-4291-keypointrcnn_resnet50_fpn_coco-fc266e95.pth"
        );

        let resource = pretrained_weights_resource_key(&DiskCacheRetrieval::cache_key(&CACHED));
        let expected = retrieval
            .disk_cache
            .prepare_resource_path(&resource)
            .unwrap();
        std::fs::write(&expected, b"payload").unwrap();

        let path = retrieval.fetch(&CACHED, false).unwrap();
        assert_eq!(path, expected);
    }
}
