pub mod aggregator;
pub mod field_classifier;
pub mod json_flattener;
pub mod rule_normalizer;
pub mod trend;

pub use aggregator::*;
pub use field_classifier::FieldClassifier;
pub use json_flattener::*;
pub use rule_normalizer::*;
pub use trend::*;
