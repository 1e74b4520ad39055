use std::io;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::compute::ComputeError;
use crate::metrics::{ErrorType, MetricsCollector};
use crate::wire::DecodeError;

/// Why a session ended. All of these are recoverable: the server goes back
/// to accepting. Compute failures are not in here; they end the process.
#[derive(Error, Debug)]
pub enum SessionEnd {
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),
    #[error("poll failed: {0}")]
    PollFailed(#[source] io::Error),
    #[error("share send failed: {0}")]
    SendFailed(#[source] io::Error),
}

impl SessionEnd {
    pub fn is_clean(&self) -> bool {
        matches!(self, SessionEnd::PeerClosed)
    }
}

pub struct ErrorHandler {
    metrics: Arc<MetricsCollector>,
}

impl ErrorHandler {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self { metrics }
    }

    pub fn handle_short_packet(&self, peer: &str, err: &DecodeError) {
        warn!(peer, "{err}");
        self.metrics.record_error(ErrorType::ShortPacket);
    }

    pub fn handle_session_end(&self, peer: &str, end: &SessionEnd) {
        if end.is_clean() {
            info!(peer, "Closed connection");
        } else {
            warn!(peer, "Closing connection: {end}");
            self.metrics.record_error(ErrorType::Network);
        }
        self.metrics.record_disconnect();
    }

    pub fn handle_accept_error(&self, err: &io::Error) {
        error!("Accept error: {err}");
        self.metrics.record_error(ErrorType::Network);
    }

    pub fn handle_compute_error(&self, err: &ComputeError) {
        error!("Mine error: {err}");
        self.metrics.record_error(ErrorType::Compute);
    }
}
