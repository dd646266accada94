//! Disconnect probes.
//!
//! The orchestrator polls a probe while palace analyses are in flight and
//! abandons the batch once the probe reports that the consumer has gone.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Reports whether the consumer of a batch is still waiting for it.
#[async_trait]
pub trait DisconnectProbe: Send + Sync {
    /// `true` once the consumer has gone. Safe to call repeatedly.
    async fn is_disconnected(&self) -> bool;
}

/// A probe for consumers that never leave.
#[derive(Debug, Clone, Copy, Default)]
#[allow(dead_code)] // Embedders without an interrupt source
pub struct NeverDisconnected;

#[async_trait]
impl DisconnectProbe for NeverDisconnected {
    async fn is_disconnected(&self) -> bool {
        false
    }
}

/// Treats Ctrl-C as the consumer walking away.
#[derive(Debug, Clone, Default)]
pub struct InterruptProbe {
    interrupted: Arc<AtomicBool>,
}

impl InterruptProbe {
    /// Start listening for Ctrl-C. Must be called inside a Tokio runtime.
    pub fn install() -> Self {
        let probe = Self::default();
        let flag = Arc::clone(&probe.interrupted);

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, abandoning analysis");
                    flag.store(true, Ordering::SeqCst);
                }
                Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
            }
        });

        probe
    }

    /// Mark the consumer as gone.
    #[allow(dead_code)] // Triggered by the signal task; exposed for tests
    pub fn trigger(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DisconnectProbe for InterruptProbe {
    async fn is_disconnected(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}
