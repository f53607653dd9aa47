// Beacon intake: wire format, per-beacon pipeline and the TLS listener.

pub mod beacon;
pub mod listener;
pub mod pipeline;
pub mod tls;

pub use beacon::{Beacon, BeaconError, BeaconKind, MAX_BEACON_LEN};
pub use listener::BeaconListener;
pub use pipeline::{DropReason, IntakeOutcome, IntakePipeline, PersistedCheckin};
pub use tls::{load_acceptor, server_config_from_pem, TlsError};
