//! Fragcut Job Model
//!
//! Defines the data contracts exchanged between the editing front end and
//! the processing pipeline:
//! - **Job:** The immutable `ProcessingJob` describing one export
//! - **Music:** Background music placement and ducking parameters
//! - **HUD:** Per-element crop rectangles and portrait placement
//! - **Result:** The `ProcessingResult` handed back on completion
//!
//! HUD rectangles are expressed in a 1920x1080 reference frame so layouts
//! survive source resolution changes.

pub mod geometry;
pub mod hud;
pub mod job;
pub mod music;
pub mod result;

pub use geometry::*;
pub use hud::*;
pub use job::*;
pub use music::*;
pub use result::*;
