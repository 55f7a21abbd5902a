//! Random forest classifier

mod ensemble;
mod tree;

pub(crate) use ensemble::argmax;
pub use ensemble::{
    ClassWeight, ForestConfig, MaxFeatures, RandomForest, DEFAULT_MAX_DEPTH, DEFAULT_N_TREES,
};
pub use tree::{DecisionTree, Node, TreeParams};
