pub mod normalize;
pub mod severity;
pub mod fingerprint;
pub mod cluster;
pub mod lock;
pub mod store;
pub mod baseline;
pub mod clock;
pub mod report;
pub mod sources;
pub mod notify;
pub mod paths;

pub use baseline::{parse_duration, BaselineFile, BaselineState};
pub use cluster::{cluster, Window, WindowPattern};
pub use fingerprint::pattern_hash;
pub use normalize::normalize_line;
pub use report::{build_report, BuildOutcome, Report, ReportFilters, ReportItem, ReportRequest, Tag};
pub use severity::{classify, Severity};
pub use store::{PatternMap, PatternRecord, PatternStore, StoreError};
