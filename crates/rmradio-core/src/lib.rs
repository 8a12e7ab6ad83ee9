//! Station radio engine: playlist building, the host-segment policy and the
//! session store shared by the daemon and its clients.

pub mod catalog;
pub mod config;
pub mod driver;
pub mod model;
pub mod platform;
pub mod playlist;
pub mod policy;
pub mod protocol;
pub mod session;
pub mod shuffle;
pub mod store;

pub use driver::{DriverError, DriverEvent, PlaybackDriver};
pub use model::{Interstitial, InterstitialKind, PlaylistItem, Track};
pub use protocol::{SessionState, StationEvent};
pub use session::{RadioSession, Schedule};
pub use store::SessionStore;
