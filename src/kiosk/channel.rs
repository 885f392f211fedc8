//! Kiosk Event Channel
//!
//! Every input to the state machine (reader taps, scanner input, operator
//! buttons, timer events) travels through one bounded mpsc channel and is
//! consumed by the session's dispatch loop.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::error::KioskError;

// ============================================================================
// Events
// ============================================================================

/// Which countdown produced a timer event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPurpose {
    /// First gatepass wait, owned by PAYMENT_SUCCESS_AWAIT_QR
    GatepassWait,
    /// Auto-proceed wait, owned by AWAITING_NEXT_QR
    NextGatepassWait,
}

impl TimerPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerPurpose::GatepassWait => "gatepass_wait",
            TimerPurpose::NextGatepassWait => "next_gatepass_wait",
        }
    }
}

/// Input to the kiosk dispatch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KioskEvent {
    /// Reader detected a card
    CardTapped(String),
    /// Scanner capture field changed; carries the full field value
    ScanInput(String),
    /// Scanner quiet period elapsed
    ScanQuiet { generation: u64 },
    ConfirmPayment,
    Proceed,
    Reset,
    CountdownTick {
        timer: TimerPurpose,
        generation: u64,
        remaining: u32,
    },
    CountdownExpired {
        timer: TimerPurpose,
        generation: u64,
    },
    /// Delayed reset (timeout grace or success display) is due
    ResetDue { generation: u64 },
    /// Stop the dispatch loop
    Shutdown,
}

impl KioskEvent {
    pub fn name(&self) -> &'static str {
        match self {
            KioskEvent::CardTapped(_) => "card_tapped",
            KioskEvent::ScanInput(_) => "scan_input",
            KioskEvent::ScanQuiet { .. } => "scan_quiet",
            KioskEvent::ConfirmPayment => "confirm_payment",
            KioskEvent::Proceed => "proceed",
            KioskEvent::Reset => "reset",
            KioskEvent::CountdownTick { .. } => "countdown_tick",
            KioskEvent::CountdownExpired { .. } => "countdown_expired",
            KioskEvent::ResetDue { .. } => "reset_due",
            KioskEvent::Shutdown => "shutdown",
        }
    }
}

// ============================================================================
// Kiosk Channel
// ============================================================================

/// Sender side of the kiosk channel (devices, operator console, timers)
#[derive(Debug, Clone)]
pub struct KioskHandle {
    tx: mpsc::Sender<KioskEvent>,
}

impl KioskHandle {
    /// Queue an event, waiting for capacity
    pub async fn send(&self, event: KioskEvent) -> Result<(), KioskError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| KioskError::ChannelClosed)
    }

    pub async fn card_tapped(&self, raw: impl Into<String>) -> Result<(), KioskError> {
        self.send(KioskEvent::CardTapped(raw.into())).await
    }

    pub async fn scan_input(&self, value: impl Into<String>) -> Result<(), KioskError> {
        self.send(KioskEvent::ScanInput(value.into())).await
    }

    pub async fn confirm_payment(&self) -> Result<(), KioskError> {
        self.send(KioskEvent::ConfirmPayment).await
    }

    pub async fn proceed(&self) -> Result<(), KioskError> {
        self.send(KioskEvent::Proceed).await
    }

    pub async fn reset(&self) -> Result<(), KioskError> {
        self.send(KioskEvent::Reset).await
    }

    pub async fn shutdown(&self) -> Result<(), KioskError> {
        self.send(KioskEvent::Shutdown).await
    }

    /// Queue a timer event the FSM cannot do without (expiry, reset due,
    /// scan quiet), waiting for capacity while the loop is busy.
    ///
    /// Returns false only if the loop is gone.
    pub async fn deliver(&self, event: KioskEvent) -> bool {
        let name = event.name();
        match self.tx.send(event).await {
            Ok(()) => true,
            Err(_) => {
                warn!(event = name, "Kiosk channel closed, timer event dropped");
                false
            }
        }
    }

    /// Non-blocking send for advisory events such as countdown ticks.
    ///
    /// Returns false if the event was dropped (queue full or loop gone).
    pub fn try_notify(&self, event: KioskEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!(event = event.name(), "Kiosk queue full, event dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(event = event.name(), "Kiosk channel closed");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiver side of the kiosk channel (owned by the dispatch loop)
pub struct KioskReceiver {
    rx: mpsc::Receiver<KioskEvent>,
}

impl KioskReceiver {
    /// Receive the next event (waits until available or all handles dropped)
    pub async fn recv(&mut self) -> Option<KioskEvent> {
        self.rx.recv().await
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&mut self) -> Option<KioskEvent> {
        self.rx.try_recv().ok()
    }
}

/// Create a new kiosk channel pair
pub fn kiosk_channel(buffer: usize) -> (KioskHandle, KioskReceiver) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (KioskHandle { tx }, KioskReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_kiosk_channel_send_receive() {
        let (handle, mut receiver) = kiosk_channel(8);

        handle.card_tapped("RFID_C100_TRK55").await.unwrap();
        handle.confirm_payment().await.unwrap();

        assert_eq!(
            receiver.recv().await,
            Some(KioskEvent::CardTapped("RFID_C100_TRK55".into()))
        );
        assert_eq!(receiver.recv().await, Some(KioskEvent::ConfirmPayment));
        assert_eq!(receiver.try_recv(), None);
    }

    #[tokio::test]
    async fn test_try_notify_drops_when_full() {
        let (handle, mut receiver) = kiosk_channel(1);
        let tick = KioskEvent::CountdownTick {
            timer: TimerPurpose::GatepassWait,
            generation: 1,
            remaining: 9,
        };

        assert!(handle.try_notify(tick.clone()));
        assert!(!handle.try_notify(tick.clone()));
        assert_eq!(receiver.try_recv(), Some(tick));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (handle, receiver) = kiosk_channel(4);
        drop(receiver);

        assert!(handle.is_closed());
        let err = handle.reset().await.unwrap_err();
        assert_eq!(err.code(), "CHANNEL_CLOSED");
        assert!(!handle.try_notify(KioskEvent::Reset));
        assert!(!handle.deliver(KioskEvent::ResetDue { generation: 1 }).await);
    }

    #[tokio::test]
    async fn test_deliver_waits_for_capacity() {
        let (handle, mut receiver) = kiosk_channel(1);
        assert!(handle.try_notify(KioskEvent::ScanInput("x".into())));

        let sender = handle.clone();
        let pending = tokio::spawn(async move {
            sender
                .deliver(KioskEvent::CountdownExpired {
                    timer: TimerPurpose::GatepassWait,
                    generation: 3,
                })
                .await
        });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        assert_eq!(receiver.recv().await, Some(KioskEvent::ScanInput("x".into())));
        assert!(pending.await.unwrap());
        assert_eq!(
            receiver.recv().await,
            Some(KioskEvent::CountdownExpired {
                timer: TimerPurpose::GatepassWait,
                generation: 3,
            })
        );
    }
}
