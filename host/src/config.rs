//! Compile-time configuration.
//!
//! `trouble-pawr` has some configuration settings that are set at compile time.
//!
//! They are set via environment variables at build time: set the variable named
//! `TROUBLE_PAWR_<value>`. For example `TROUBLE_PAWR_EVENT_QUEUE_SIZE=8 cargo build`.
//! You can also set them in the `[env]` section of `.cargo/config.toml`.
//!
//! Unknown `TROUBLE_PAWR_` variables fail the build.

use embassy_time::Duration;

mod raw {
    #![allow(unused)]
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}

/// Number of advertising sets the host can manage at the same time.
///
/// The controller may support fewer, which is checked when a set is created.
///
/// Default: 1.
pub const MAX_ADV_SETS: usize = raw::MAX_ADV_SETS;

/// Per advertising set queue of PAwR events.
///
/// Data requests and responses are dropped with a warning when the
/// application does not drain this queue fast enough.
///
/// Default: 4.
pub const EVENT_QUEUE_SIZE: usize = raw::EVENT_QUEUE_SIZE;

/// Queue of connection events, shared by all advertising sets.
///
/// Default: 2.
pub const CONNECTION_EVENT_QUEUE_SIZE: usize = raw::CONNECTION_EVENT_QUEUE_SIZE;

/// Time to wait for the controller to answer a HCI command.
///
/// Default: 2000 ms.
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(raw::COMMAND_TIMEOUT_MS as u64);

/// Max number of subevents a handler can provide data for in one request.
///
/// Default: 4.
pub const MAX_SUBEVENTS_PER_REQUEST: usize = raw::MAX_SUBEVENTS_PER_REQUEST;
