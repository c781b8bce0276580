// Price-level indicators
// Camarilla support/resistance grid derived from a prior session

pub mod camarilla;

pub use camarilla::{calculate_camarilla, LevelId, PivotLevels};
