//! Voice Notes - local record store
//!
//! Durable storage for voice note metadata, transcripts and summaries on an
//! embedded SQLite database, with a live newest-first listing.

pub mod config;
pub mod database;

pub use config::{JournalMode, StoreConfig};
pub use database::{
    close_shared_store, current_shared_store, shared_store, DatabaseError, LiveNotes, NoteStore,
    VoiceNote,
};

/// Installs a stdout `tracing` subscriber for host applications and tests.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Calling this again
/// after a subscriber is installed does nothing.
pub fn init_tracing() {
    use tracing_subscriber::prelude::*;

    /// Format timestamps using the system's local time via chrono
    struct LocalTimer;
    impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
        fn format_time(
            &self,
            w: &mut tracing_subscriber::fmt::format::Writer<'_>,
        ) -> std::fmt::Result {
            write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        }
    }

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
        .try_init();
}
