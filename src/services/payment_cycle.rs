//! Single-charge payment cycle shared by the checkout and upsell
//! orchestrators.
//!
//! One call drives one charge to a terminal outcome: the status is polled
//! on a fixed interval while a global deadline runs alongside. The interval
//! and the deadline live inside this function's scope, so every exit path,
//! including task abort, drops both timers. Polling never retries a failed
//! poll call.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::CheckoutConfig;
use crate::gateway::{PaymentStatus, PixGateway};

#[derive(Debug, Clone, Copy)]
pub struct CycleTimings {
    pub poll_interval: Duration,
    pub poll_deadline: Duration,
}

impl From<&CheckoutConfig> for CycleTimings {
    fn from(config: &CheckoutConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            poll_deadline: config.poll_deadline(),
        }
    }
}

/// Terminal outcome of one payment cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Paid { paid_at: DateTime<Utc> },
    Cancelled,
    /// `timed_out` distinguishes the local deadline from a gateway-reported
    /// expiry; the buyer-facing message differs.
    Expired { timed_out: bool },
    Failed { message: String },
}

impl CycleOutcome {
    pub fn status(&self) -> PaymentStatus {
        match self {
            CycleOutcome::Paid { .. } => PaymentStatus::Paid,
            CycleOutcome::Cancelled => PaymentStatus::Cancelled,
            CycleOutcome::Expired { .. } => PaymentStatus::Expired,
            CycleOutcome::Failed { .. } => PaymentStatus::Failed,
        }
    }
}

/// Polls the charge until a terminal status, a poll error, or the deadline.
#[instrument(skip(gateway, timings, charge_id, owner_id), fields(charge_id = %charge_id))]
pub async fn drive_to_terminal(
    gateway: &dyn PixGateway,
    charge_id: &str,
    owner_id: Uuid,
    timings: CycleTimings,
) -> CycleOutcome {
    let deadline = tokio::time::sleep(timings.poll_deadline);
    tokio::pin!(deadline);

    let mut interval = tokio::time::interval_at(
        tokio::time::Instant::now() + timings.poll_interval,
        timings.poll_interval,
    );
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = &mut deadline => {
                warn!("payment confirmation deadline elapsed");
                return CycleOutcome::Expired { timed_out: true };
            }
            _ = interval.tick() => {
                let snapshot = match gateway.get_charge_status(charge_id, owner_id).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        warn!("status poll failed: {}", e);
                        return CycleOutcome::Failed { message: e.to_string() };
                    }
                };

                debug!(status = %snapshot.status, "poll result");
                match snapshot.status {
                    PaymentStatus::WaitingPayment => {}
                    PaymentStatus::Paid => {
                        return CycleOutcome::Paid {
                            paid_at: snapshot.paid_at.unwrap_or_else(Utc::now),
                        };
                    }
                    PaymentStatus::Cancelled => return CycleOutcome::Cancelled,
                    PaymentStatus::Expired => {
                        return CycleOutcome::Expired { timed_out: false };
                    }
                    PaymentStatus::Failed => {
                        return CycleOutcome::Failed {
                            message: "payment reported as failed by the gateway".into(),
                        };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{
        ChargeHandle, ChargeStatusSnapshot, CreateChargeRequest, GatewayError,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Gateway whose poll answers follow a script; the last entry repeats.
    struct ScriptedGateway {
        script: Mutex<Vec<Result<ChargeStatusSnapshot, GatewayError>>>,
        polls: AtomicUsize,
    }

    impl ScriptedGateway {
        fn new(script: Vec<Result<ChargeStatusSnapshot, GatewayError>>) -> Self {
            Self {
                script: Mutex::new(script),
                polls: AtomicUsize::new(0),
            }
        }

        fn waiting() -> Result<ChargeStatusSnapshot, GatewayError> {
            Ok(ChargeStatusSnapshot {
                status: PaymentStatus::WaitingPayment,
                paid_at: None,
            })
        }

        fn terminal(status: PaymentStatus) -> Result<ChargeStatusSnapshot, GatewayError> {
            Ok(ChargeStatusSnapshot {
                status,
                paid_at: matches!(status, PaymentStatus::Paid).then(Utc::now),
            })
        }
    }

    #[async_trait]
    impl PixGateway for ScriptedGateway {
        async fn create_charge(
            &self,
            _request: &CreateChargeRequest,
        ) -> Result<ChargeHandle, GatewayError> {
            unimplemented!("cycle tests never create charges")
        }

        async fn get_charge_status(
            &self,
            _charge_id: &str,
            _owner_id: Uuid,
        ) -> Result<ChargeStatusSnapshot, GatewayError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                match &script[0] {
                    Ok(snapshot) => Ok(snapshot.clone()),
                    Err(_) => Err(GatewayError::InvalidResponse("scripted failure".into())),
                }
            }
        }
    }

    fn timings() -> CycleTimings {
        CycleTimings {
            poll_interval: Duration::from_secs(5),
            poll_deadline: Duration::from_secs(300),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pending_then_paid_resolves_after_two_polls() {
        let gateway = ScriptedGateway::new(vec![
            ScriptedGateway::waiting(),
            ScriptedGateway::terminal(PaymentStatus::Paid),
        ]);

        let outcome =
            drive_to_terminal(&gateway, "ch_1", Uuid::new_v4(), timings()).await;

        assert!(matches!(outcome, CycleOutcome::Paid { .. }));
        assert_eq!(gateway.polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gateway_expiry_is_not_a_timeout() {
        let gateway = ScriptedGateway::new(vec![
            ScriptedGateway::waiting(),
            ScriptedGateway::terminal(PaymentStatus::Expired),
        ]);

        let outcome =
            drive_to_terminal(&gateway, "ch_1", Uuid::new_v4(), timings()).await;

        assert_eq!(outcome, CycleOutcome::Expired { timed_out: false });
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wins_when_no_terminal_status_arrives() {
        let gateway = ScriptedGateway::new(vec![ScriptedGateway::waiting()]);

        let outcome =
            drive_to_terminal(&gateway, "ch_1", Uuid::new_v4(), timings()).await;

        assert_eq!(outcome, CycleOutcome::Expired { timed_out: true });
        // 300s deadline with a 5s interval: the 60th tick coincides with the
        // deadline; the loop must not exceed it.
        assert!(gateway.polls.load(Ordering::SeqCst) <= 60);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_error_terminates_without_retry() {
        let gateway = ScriptedGateway::new(vec![
            ScriptedGateway::waiting(),
            Err(GatewayError::InvalidResponse("boom".into())),
            ScriptedGateway::waiting(),
        ]);

        let outcome =
            drive_to_terminal(&gateway, "ch_1", Uuid::new_v4(), timings()).await;

        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert_eq!(gateway.polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_charge_stops_polling() {
        let gateway = ScriptedGateway::new(vec![
            ScriptedGateway::terminal(PaymentStatus::Cancelled),
        ]);

        let outcome =
            drive_to_terminal(&gateway, "ch_1", Uuid::new_v4(), timings()).await;

        assert_eq!(outcome, CycleOutcome::Cancelled);
        assert_eq!(gateway.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_poll_happens_before_the_first_interval() {
        let gateway = ScriptedGateway::new(vec![ScriptedGateway::waiting()]);
        let handle = tokio::spawn(async move {
            drive_to_terminal(&gateway, "ch_1", Uuid::new_v4(), timings()).await
        });

        // Let the spawned cycle start without advancing past the interval.
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
