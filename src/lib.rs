//! Real-time TCP sample ingestion for live plotting frontends.
//!
//! The pipeline: bytes arrive on a socket, the [`LineDecoder`] turns them
//! into [`Sample`]s, a bounded [`SampleQueue`] buffers them, and a periodic
//! tick tells the consumer when fresh data is waiting. The consumer pulls a
//! non-destructive snapshot, transforms it outside any lock, and clears the
//! queue explicitly. [`DataReceiver`] wires it all together around one TCP
//! peer, listening or outbound.

pub mod config;
pub mod decoder;
pub mod error;
pub mod queue;
pub mod receiver;
pub mod types;

pub use config::{load_config, load_config_or_default, AppConfig};
pub use decoder::LineDecoder;
pub use error::IngestError;
pub use queue::SampleQueue;
pub use receiver::{DataReceiver, DataReceiverBuilder};
pub use types::{ConnectionState, ReceiverEvent, Sample};
