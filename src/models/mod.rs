pub mod activity;
pub mod recording;
pub mod sensing;
pub mod settings;
pub mod stats;
pub mod usage;

pub use activity::*;
pub use recording::*;
pub use sensing::*;
pub use settings::*;
pub use stats::*;
pub use usage::*;
