//! Output generation for enhanced articles and run reports.
//!
//! # Submodules
//!
//! - [`citations`]: the "References" block appended to enhanced article bodies
//! - [`json`]: writes the run summary as JSON into a date-organised directory
//!
//! # Output Structure
//!
//! ```text
//! report_dir/
//! └── 2025-05-06/
//!     ├── 081500-run.json
//!     └── 143000-run.json
//! ```

pub mod citations;
pub mod json;
