pub mod loader;
pub mod profiles;
pub mod runtime;

pub use loader::{build_config, load_config, render_default};
pub use profiles::*;
pub use runtime::*;
