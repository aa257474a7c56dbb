//! Link health snapshots for periodic reporting.

use crate::connection::LinkState;
use serde::Serialize;
use warden_event_system::ServerId;

/// State of one link at the time of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub server: ServerId,
    pub name: String,
    pub address: String,
    pub state: LinkState,
}

/// Every managed link, sorted by server identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkHealthReport {
    pub links: Vec<LinkStatus>,
}

impl LinkHealthReport {
    pub fn total(&self) -> usize {
        self.links.len()
    }

    pub fn connected(&self) -> usize {
        self.links
            .iter()
            .filter(|link| link.state == LinkState::Connected)
            .count()
    }

    /// Servers whose link is not up.
    pub fn down(&self) -> impl Iterator<Item = &LinkStatus> {
        self.links
            .iter()
            .filter(|link| link.state != LinkState::Connected)
    }

    /// One-line summary such as `2/3 connected`.
    pub fn summary(&self) -> String {
        format!("{}/{} connected", self.connected(), self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(server: &str, state: LinkState) -> LinkStatus {
        LinkStatus {
            server: ServerId::new("acme", server),
            name: server.to_uppercase(),
            address: "127.0.0.1:28016".to_string(),
            state,
        }
    }

    #[test]
    fn test_summary_counts_connected_links() {
        let report = LinkHealthReport {
            links: vec![
                status("eu", LinkState::Connected),
                status("us", LinkState::Connecting),
                status("asia", LinkState::Connected),
            ],
        };

        assert_eq!(report.summary(), "2/3 connected");
        let down: Vec<&str> = report.down().map(|link| link.server.server.as_str()).collect();
        assert_eq!(down, vec!["us"]);
    }
}
