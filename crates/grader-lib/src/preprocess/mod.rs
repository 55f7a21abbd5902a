//! Feature encoding and scaling

mod features;
mod scaler;

pub use features::{encode, FeatureSchema, DEFAULT_FEATURE_ORDER, MISSING_VALUE};
pub use scaler::StandardScaler;
