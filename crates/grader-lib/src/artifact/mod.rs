//! Model artifact bundle, persistence and caching

mod bundle;
mod cache;
mod store;

#[cfg(test)]
mod tests;

pub use bundle::{is_valid_version, short_version, ModelArtifact};
pub use cache::ArtifactCache;
pub use store::{
    ArtifactStore, ReleaseInfo, CLASSIFIER_FILE, CURRENT_FILE, EVALUATION_FILE, FEATURES_FILE,
    RELEASES_DIR, SCALER_FILE,
};
