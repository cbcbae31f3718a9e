//! Input records: one cold item and its token ids per line.

mod record;

pub use record::{load_jobs, parse_line, Job};
