//! Behavioral feature engine

pub mod builder;
pub mod encoding;
pub mod layout;
pub mod table;
pub mod window;

pub use builder::{FeatureBuilder, FeatureVector, DEVIATION_EPSILON};
pub use encoding::{CategoryEncoding, UNKNOWN_CATEGORY_CODE};
pub use layout::{FEATURE_COUNT, FEATURE_LAYOUT, FEATURE_VERSION};
pub use table::WindowTable;
pub use window::{UserState, WindowSnapshot, WindowedAggregator};
