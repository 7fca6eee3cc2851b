//! Connectivity gate: quoting runs only while the gateway is online and
//! the operator has agreed to quote.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Published connectivity snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityStatus {
    /// Gateway online AND operator agreement.
    pub agree: bool,
    pub online: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Semaphore {
    green_button: bool,
    green_gateway: bool,
    admin_agreement: bool,
}

impl Semaphore {
    pub fn new(agreement: bool) -> Self {
        Self {
            admin_agreement: agreement,
            ..Default::default()
        }
    }

    /// Operator has not agreed or the gateway is down.
    pub fn paused(&self) -> bool {
        !self.green_button
    }

    pub fn offline(&self) -> bool {
        !self.green_gateway
    }

    /// Record gateway connectivity. Returns true when it changed.
    pub fn read_from_gw(&mut self, online: bool) -> bool {
        if self.green_gateway == online {
            return false;
        }
        self.green_gateway = online;
        self.refresh();
        true
    }

    pub fn agree(&mut self, agreement: bool) {
        self.admin_agreement = agreement;
        self.refresh();
    }

    pub fn toggle(&mut self) {
        self.agree(!self.admin_agreement);
    }

    fn refresh(&mut self) {
        let button = self.green_gateway && self.admin_agreement;
        if self.green_button != button {
            self.green_button = button;
            info!(
                state = if button { "CONNECTED" } else { "DISCONNECTED" },
                "Quoting state changed"
            );
        }
    }

    pub fn status(&self) -> ConnectivityStatus {
        ConnectivityStatus {
            agree: self.green_button,
            online: self.green_gateway,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_gateway_and_agreement() {
        let mut s = Semaphore::new(false);
        assert!(s.offline() && s.paused());

        assert!(s.read_from_gw(true));
        assert!(!s.offline());
        assert!(s.paused());

        s.toggle();
        assert!(!s.paused());

        assert!(s.read_from_gw(false));
        assert!(s.offline() && s.paused());
        assert!(!s.read_from_gw(false));
    }

    #[test]
    fn test_status_snapshot() {
        let mut s = Semaphore::new(true);
        s.read_from_gw(true);
        assert_eq!(
            s.status(),
            ConnectivityStatus {
                agree: true,
                online: true
            }
        );
    }
}
