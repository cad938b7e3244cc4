//! Model training
//!
//! Provides the learning side of the pipeline:
//! - Feature transformation (scaling, one-hot encoding, median fallback)
//! - Minority oversampling for the training split
//! - L2 logistic regression and gradient-boosted trees
//! - The capability-detected ensemble combining them

pub mod balance;
pub mod ensemble;
pub mod features;
pub mod linalg;
pub mod linear;
pub mod trees;


pub use balance::ClassBalancer;
pub use ensemble::{Capabilities, Classifier, ExplanationStrategy, Member, ModelEnsemble, ModelKind};
pub use features::{FeatureMatrix, FeatureTransformer};
pub use linear::{sigmoid, LogisticModel};
pub use trees::{BoostedTrees, Node, Tree};
