//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

use crate::hub::HubStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the registry loop answers, `"stopping"` after it exits.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Users with at least one local connection.
    pub users: usize,
    /// Local WebSocket connections.
    pub connections: usize,
}

impl HealthResponse {
    /// Whether the hub is serving.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Build a health response from registry counters. `None` means the
/// registry loop has stopped.
pub fn health_check(start_time: Instant, stats: Option<HubStats>) -> HealthResponse {
    let (status, stats) = match stats {
        Some(stats) => ("ok", stats),
        None => ("stopping", HubStats::default()),
    };
    HealthResponse {
        status,
        uptime_secs: start_time.elapsed().as_secs(),
        users: stats.users,
        connections: stats.connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok_with_stats() {
        let resp = health_check(Instant::now(), Some(HubStats::default()));
        assert_eq!(resp.status, "ok");
        assert!(resp.is_ok());
    }

    #[test]
    fn stopped_registry_reports_stopping() {
        let resp = health_check(Instant::now(), None);
        assert_eq!(resp.status, "stopping");
        assert_eq!(resp.connections, 0);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, Some(HubStats::default()));
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn counts_are_carried() {
        let stats = HubStats {
            users: 2,
            connections: 5,
            user_connections: None,
        };
        let resp = health_check(Instant::now(), Some(stats));
        assert_eq!(resp.users, 2);
        assert_eq!(resp.connections, 5);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), Some(HubStats::default()));
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert!(parsed["uptime_secs"].is_number());
        assert!(parsed["users"].is_number());
        assert!(parsed["connections"].is_number());
    }
}
