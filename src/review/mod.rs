//! Human review checkpoint
//!
//! Every agent output stops here until a human submits a well-formed version
//! of it. The surface shows the output; the gate parses what comes back.

pub mod gate;
pub mod surface;

pub use gate::{ReviewGate, ReviewSubmission};
pub use surface::{FileReviewSurface, ReviewSurface, ReviewTicket};
