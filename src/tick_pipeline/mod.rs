// =============================================================================
// Tick Pipeline — acquisition, normalization, and the rolling window
// =============================================================================

pub mod acquire;
pub mod normalize;
pub mod window;

pub use acquire::acquire_window;
pub use normalize::try_extract_quote;
pub use window::{Tick, TickWindow};
