use {
    crate::services::side_effects::{BoxError, SideEffect, SideEffectExecutor},
    async_trait::async_trait,
};

/// Default executor: the analytics, notification and settlement services
/// are external collaborators reached through this seam; until they are
/// wired in, every effect is recorded in the log and considered delivered.
pub struct LoggingSideEffects;

#[async_trait]
impl SideEffectExecutor for LoggingSideEffects {
    async fn execute(&self, effect: SideEffect) -> Result<(), BoxError> {
        match effect {
            SideEffect::TrackCheckoutAnalytics {
                payment_id,
                ga_client_id,
            } => {
                tracing::info!(%payment_id, ga_client_id, "analytics: checkout tracked");
            }
            SideEffect::AggregateRevenue { payment_id } => {
                tracing::info!(%payment_id, "revenue summary aggregation requested");
            }
            SideEffect::NotifyPaymentCompleted { payment_id } => {
                tracing::info!(%payment_id, "payment completion notification requested");
            }
            SideEffect::RegenerateSettlement {
                payment_id,
                attendance_id,
            } => {
                tracing::info!(%payment_id, ?attendance_id, "settlement regeneration requested");
            }
        }
        Ok(())
    }
}
