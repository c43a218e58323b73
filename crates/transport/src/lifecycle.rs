//! Constants governing the connection lifecycle (§4.4 point 3). The
//! reconnect re-association mechanism itself lives in `server::session`,
//! which owns the session registry these timings apply to.

use std::time::Duration;

/// Window after a disconnect during which a reconnect re-associates with
/// the existing session instead of the session being torn down.
pub const RECONNECT_GRACE: Duration = Duration::from_secs(5);
