pub mod loader;
pub mod regime;
pub mod source;
pub mod synthetic;

pub use loader::{load_dataset, load_regime, write_dataset, write_regime};
pub use regime::{AlignmentError, RegimeFeatures};
pub use source::{FetchError, FoldData, FoldDataSource, InMemorySource};
pub use synthetic::SyntheticKind;
