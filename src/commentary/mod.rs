// Commentary domain: normalized line model and the per-match ingestion
// session with its playback throttle.

pub mod line;
pub mod session;
