use {
    crate::domain::error::codes,
    async_trait::async_trait,
    std::sync::Arc,
    tokio::sync::{mpsc, watch},
    uuid::Uuid,
};

/// Work that must never fail the webhook outcome: analytics, notifications,
/// settlement regeneration, revenue aggregation. Dispatched onto a bounded
/// channel and executed by a background worker; a full channel drops the
/// effect with a warning rather than blocking the event.
#[derive(Debug, Clone)]
pub enum SideEffect {
    TrackCheckoutAnalytics {
        payment_id: Uuid,
        ga_client_id: String,
    },
    AggregateRevenue {
        payment_id: Uuid,
    },
    NotifyPaymentCompleted {
        payment_id: Uuid,
    },
    RegenerateSettlement {
        payment_id: Uuid,
        attendance_id: Option<Uuid>,
    },
}

impl SideEffect {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TrackCheckoutAnalytics { .. } => "track_checkout_analytics",
            Self::AggregateRevenue { .. } => "aggregate_revenue",
            Self::NotifyPaymentCompleted { .. } => "notify_payment_completed",
            Self::RegenerateSettlement { .. } => "regenerate_settlement",
        }
    }

    /// Stable code logged when the effect fails.
    pub fn failure_code(&self) -> &'static str {
        match self {
            Self::TrackCheckoutAnalytics { .. } => codes::GA4_TRACKING_FAILED,
            Self::AggregateRevenue { .. } => codes::SETTLEMENT_REGENERATE_FAILED,
            Self::NotifyPaymentCompleted { .. } => codes::PAYMENT_COMPLETION_NOTIFICATION_FAILED,
            Self::RegenerateSettlement { .. } => codes::SETTLEMENT_REGENERATE_FAILED,
        }
    }
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Executes one side effect against the external service it targets.
/// Implementations live at the edges; the engine only knows this seam.
#[async_trait]
pub trait SideEffectExecutor: Send + Sync {
    async fn execute(&self, effect: SideEffect) -> Result<(), BoxError>;
}

#[derive(Clone)]
pub struct SideEffectQueue {
    tx: mpsc::Sender<SideEffect>,
}

impl SideEffectQueue {
    pub fn new(depth: usize) -> (Self, mpsc::Receiver<SideEffect>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self { tx }, rx)
    }

    /// Enqueue without waiting. Dropping on a full queue is the contract:
    /// side effects are best-effort and must not slow the webhook path.
    pub fn dispatch(&self, effect: SideEffect) {
        match self.tx.try_send(effect) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(effect)) => {
                tracing::warn!(kind = effect.kind(), "side effect queue full, dropping");
            }
            Err(mpsc::error::TrySendError::Closed(effect)) => {
                tracing::warn!(kind = effect.kind(), "side effect worker gone, dropping");
            }
        }
    }
}

/// Drain the side-effect queue until shutdown. Failures are logged with
/// their stable code and never propagate.
pub async fn run_side_effect_worker(
    mut rx: mpsc::Receiver<SideEffect>,
    executor: Arc<dyn SideEffectExecutor>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("side effect worker started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("side effect worker shutting down");
                return;
            }
            effect = rx.recv() => {
                let Some(effect) = effect else {
                    tracing::info!("side effect queue closed");
                    return;
                };
                let kind = effect.kind();
                let code = effect.failure_code();
                if let Err(e) = executor.execute(effect).await {
                    tracing::warn!(kind, code, error = %e, "side effect failed");
                }
            }
        }
    }
}
