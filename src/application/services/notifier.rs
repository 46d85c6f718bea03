//! Outbound notification channel.
//!
//! Settlement emits a message here after its transaction commits. Delivery
//! is fire-and-forget: the messaging transport is an external collaborator,
//! and a failed or missing consumer must never unwind a financial
//! transaction.

use tokio::sync::mpsc;
use tracing::{debug, info};

/// Messages emitted after a financial transition commits.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    DepositApproved {
        account_id: String,
        deposit_id: String,
        amount_cents: i64,
    },
    DepositClosed {
        account_id: String,
        deposit_id: String,
        status: String,
    },
    CommissionEarned {
        account_id: String,
        deposit_id: String,
        level: i64,
        amount_cents: i64,
    },
    WithdrawalPaid {
        account_id: String,
        withdrawal_id: String,
        amount_cents: i64,
    },
    WithdrawalRejected {
        account_id: String,
        withdrawal_id: String,
    },
    TradeSettled {
        account_id: String,
        trade_id: String,
        status: String,
    },
}

/// Sending half handed to the settlement services.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn channel() -> (Notifier, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Notifier { tx }, rx)
    }

    /// A notifier whose receiver is already gone. Every send becomes a
    /// logged no-op; used in tests and when notifications are disabled.
    pub fn disabled() -> Notifier {
        let (tx, _rx) = mpsc::unbounded_channel();
        Notifier { tx }
    }

    /// Emit a notification. Never fails: a closed channel is logged and
    /// dropped.
    pub fn emit(&self, notification: Notification) {
        if self.tx.send(notification.clone()).is_err() {
            debug!("Notification dropped (no consumer): {:?}", notification);
        }
    }
}

/// Consume notifications and hand them to the (out-of-scope) transport.
/// Here that transport is the log.
pub fn spawn_consumer(mut rx: mpsc::UnboundedReceiver<Notification>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            info!("Notification: {:?}", notification);
        }
    })
}
