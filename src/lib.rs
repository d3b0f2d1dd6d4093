//! Quickdial - one-tap call / text notifications for favourite contacts
//!
//! Up to [`POOL_SIZE`] persistent tray notifications, each bound to a
//! contact and an action. The selection store owns the slots, the reconcile
//! worker keeps the tray in step with the store and the contact directory.

pub mod app;
pub mod config;
pub mod contacts;
pub mod notify;
pub mod reconcile;
pub mod selection;
pub mod utils;

pub use app::{Choice, ChoiceOutcome, PickerEntry, QuickDial};
pub use contacts::{ContactDirectory, ContactRecord, DirectoryError, PhoneKind, SortOrder};
pub use notify::{NotificationSink, RenderData, SinkError};
pub use reconcile::{PassReport, PassTicket, ReconcileError, ReconcileHandle, Reconciler};
pub use selection::{
    ActionType, ContactId, Selection, SelectionError, SelectionStore, SelectionTable, SlotId,
    POOL_SIZE,
};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Safe to call more than once; later
/// calls are ignored.
pub fn init_logging(default_filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
