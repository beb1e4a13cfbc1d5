//! Artifact loading and the process-wide artifact cache

use crate::config::ArtifactsConfig;
use crate::error::{ArtifactKind, PricingError, Result};
use crate::models::pipeline::{LabelDecoder, OnnxPipeline, PricePipeline};
use crate::models::schema::Schema;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Trained pipeline plus label decoder, immutable once loaded
pub struct ModelArtifacts {
    pipeline: Box<dyn PricePipeline>,
    decoder: LabelDecoder,
}

impl ModelArtifacts {
    pub fn new(pipeline: Box<dyn PricePipeline>, decoder: LabelDecoder) -> Self {
        Self { pipeline, decoder }
    }

    pub fn pipeline(&self) -> &dyn PricePipeline {
        self.pipeline.as_ref()
    }

    pub fn decoder(&self) -> &LabelDecoder {
        &self.decoder
    }

    /// Schema recorded by the pipeline at load time
    pub fn schema(&self) -> &Schema {
        self.pipeline.schema()
    }
}

impl std::fmt::Debug for ModelArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelArtifacts")
            .field("schema", self.schema())
            .field("classes", &self.decoder.classes())
            .finish()
    }
}

/// Durable storage the artifacts are read from.
///
/// `read` performs the actual storage access and deserialization on every
/// call; memoization is [`ArtifactCache`]'s job.
pub trait ArtifactStore: Send + Sync {
    fn read(&self) -> Result<ModelArtifacts>;
}

/// Reads an ONNX pipeline and a JSON label decoder from the filesystem
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    pipeline_path: PathBuf,
    label_decoder_path: PathBuf,
    onnx_threads: usize,
}

impl FsArtifactStore {
    pub fn new(pipeline_path: impl Into<PathBuf>, label_decoder_path: impl Into<PathBuf>) -> Self {
        Self {
            pipeline_path: pipeline_path.into(),
            label_decoder_path: label_decoder_path.into(),
            onnx_threads: 1,
        }
    }

    pub fn from_config(config: &ArtifactsConfig) -> Self {
        Self::new(&config.pipeline_path, &config.label_decoder_path)
            .with_threads(config.onnx_threads)
    }

    /// Number of threads for ONNX inference
    pub fn with_threads(mut self, onnx_threads: usize) -> Self {
        self.onnx_threads = onnx_threads.max(1);
        self
    }

    pub fn pipeline_path(&self) -> &Path {
        &self.pipeline_path
    }

    pub fn label_decoder_path(&self) -> &Path {
        &self.label_decoder_path
    }

    fn read_decoder(&self) -> Result<LabelDecoder> {
        let path = &self.label_decoder_path;
        let bytes = std::fs::read(path)
            .map_err(|e| PricingError::artifact_load(ArtifactKind::LabelDecoder, path, e))?;
        LabelDecoder::from_json(&bytes)
            .map_err(|e| PricingError::artifact_load(ArtifactKind::LabelDecoder, path, e))
    }

    fn read_pipeline(&self) -> Result<OnnxPipeline> {
        let path = &self.pipeline_path;
        if !path.is_file() {
            return Err(PricingError::artifact_load(
                ArtifactKind::Pipeline,
                path,
                "file not found",
            ));
        }
        OnnxPipeline::load(path, self.onnx_threads)
            .map_err(|e| PricingError::artifact_load(ArtifactKind::Pipeline, path, e))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn read(&self) -> Result<ModelArtifacts> {
        // Decoder first: it is cheap and catches a wrong directory early.
        let decoder = self.read_decoder()?;
        let pipeline = self.read_pipeline()?;

        info!(
            pipeline = %self.pipeline_path.display(),
            classes = decoder.classes().len(),
            "Model artifacts read from storage"
        );

        Ok(ModelArtifacts::new(Box::new(pipeline), decoder))
    }
}

/// Memoized artifact loader.
///
/// The first successful [`load`](Self::load) reads the store and caches the
/// result; later calls return the same `Arc` without touching storage.
/// Concurrent first callers block on the in-flight read instead of issuing
/// their own. A failed read is not cached.
pub struct ArtifactCache<S> {
    store: S,
    cell: OnceCell<Arc<ModelArtifacts>>,
}

impl<S: ArtifactStore> ArtifactCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cell: OnceCell::new(),
        }
    }

    pub fn load(&self) -> Result<Arc<ModelArtifacts>> {
        self.cell
            .get_or_try_init(|| self.store.read().map(Arc::new))
            .cloned()
    }

    /// Whether artifacts have been loaded
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::testing::RuleBasedPipeline;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    /// Store that counts reads and can be told to fail
    struct CountingStore {
        reads: AtomicUsize,
        fail: bool,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                reads: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    impl ArtifactStore for CountingStore {
        fn read(&self) -> Result<ModelArtifacts> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            // Widen the window in which concurrent callers overlap.
            std::thread::sleep(Duration::from_millis(50));
            if self.fail {
                return Err(PricingError::artifact_load(
                    ArtifactKind::Pipeline,
                    "memory://pipeline",
                    "corrupt",
                ));
            }
            Ok(RuleBasedPipeline::artifacts())
        }
    }

    #[test]
    fn test_load_is_memoized() {
        let cache = ArtifactCache::new(CountingStore::new());
        assert!(!cache.is_loaded());

        let first = cache.load().unwrap();
        let second = cache.load().unwrap();

        assert!(cache.is_loaded());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.store().reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_load_reads_once() {
        let cache = ArtifactCache::new(CountingStore::new());
        let callers = 8;
        let barrier = Barrier::new(callers);

        let loaded: Vec<Arc<ModelArtifacts>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..callers)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        cache.load().unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(cache.store().reads.load(Ordering::SeqCst), 1);
        for artifacts in &loaded[1..] {
            assert!(Arc::ptr_eq(&loaded[0], artifacts));
        }
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = ArtifactCache::new(CountingStore {
            reads: AtomicUsize::new(0),
            fail: true,
        });

        let err = cache.load().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactLoad);
        assert!(cache.load().is_err());
        assert!(!cache.is_loaded());
        assert_eq!(cache.store().reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_label_decoder_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(
            dir.path().join("best_pipeline.onnx"),
            dir.path().join("label_encoder_target.json"),
        );

        let err = store.read().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactLoad);
        assert!(err.to_string().contains("label_encoder_target.json"));
    }

    #[test]
    fn test_corrupt_label_decoder_file() {
        let dir = tempfile::tempdir().unwrap();
        let decoder_path = dir.path().join("label_encoder_target.json");
        std::fs::write(&decoder_path, b"\x80\x04\x95 not json").unwrap();

        let store = FsArtifactStore::new(dir.path().join("best_pipeline.onnx"), &decoder_path);
        let err = store.read().unwrap_err();
        assert!(matches!(
            err,
            PricingError::ArtifactLoad {
                artifact: ArtifactKind::LabelDecoder,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_pipeline_file() {
        let dir = tempfile::tempdir().unwrap();
        let decoder_path = dir.path().join("label_encoder_target.json");
        std::fs::write(&decoder_path, br#"["High", "Low", "Medium"]"#).unwrap();

        let store = FsArtifactStore::new(dir.path().join("best_pipeline.onnx"), &decoder_path);
        let err = store.read().unwrap_err();
        assert!(matches!(
            err,
            PricingError::ArtifactLoad {
                artifact: ArtifactKind::Pipeline,
                ..
            }
        ));
        assert!(err.to_string().contains("best_pipeline.onnx"));
    }

    #[test]
    fn test_store_from_config() {
        let config = ArtifactsConfig {
            pipeline_path: "models/best_pipeline.onnx".to_string(),
            label_decoder_path: "models/label_encoder_target.json".to_string(),
            onnx_threads: 0,
        };
        let store = FsArtifactStore::from_config(&config);
        assert_eq!(store.pipeline_path(), Path::new("models/best_pipeline.onnx"));
        assert_eq!(store.onnx_threads, 1);
    }
}
