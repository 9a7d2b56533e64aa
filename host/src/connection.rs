//! Connections initiated by the broadcaster through a PAwR subevent.
use core::cell::RefCell;
use core::task::{Context, Poll};

use embassy_sync::waitqueue::WakerRegistration;
use embassy_time::Duration;

use crate::address::Address;
use crate::advertise::PhyKind;
use crate::command::InitiatingPhyParams;
use crate::event::{ConnectionComplete, Status};
use crate::Error;

/// Reason given to the controller when the host tears down a connection.
pub const DISCONNECT_REASON_REMOTE_USER_TERMINATED: u8 = 0x13;

/// Connection lifecycle events, delivered to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionEvent {
    /// A connection attempt finished. `status` is non-zero if it failed.
    Connected { handle: u16, status: Status, peer: Address },
    Disconnected { handle: u16, reason: u8 },
}

/// Parameters for connecting to a responder.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectParams {
    pub phy: PhyKind,
    pub scan_interval: Duration,
    pub scan_window: Duration,
    pub min_connection_interval: Duration,
    pub max_connection_interval: Duration,
    pub max_latency: u16,
    pub supervision_timeout: Duration,
    pub event_length: Duration,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            phy: PhyKind::Le1M,
            scan_interval: Duration::from_millis(60),
            scan_window: Duration::from_millis(60),
            min_connection_interval: Duration::from_millis(30),
            max_connection_interval: Duration::from_millis(50),
            max_latency: 0,
            supervision_timeout: Duration::from_secs(4),
            event_length: Duration::from_ticks(0),
        }
    }
}

fn to_units(d: Duration, unit_micros: u64, range: core::ops::RangeInclusive<u64>) -> Result<u16, Error> {
    let units = d.as_micros() / unit_micros;
    if range.contains(&units) {
        Ok(units as u16)
    } else {
        Err(Error::InvalidValue)
    }
}

impl ConnectParams {
    pub(crate) fn to_hci(&self) -> Result<(u8, InitiatingPhyParams), Error> {
        let params = InitiatingPhyParams {
            scan_interval: to_units(self.scan_interval, 625, 0x0004..=0xffff)?,
            scan_window: to_units(self.scan_window, 625, 0x0004..=0xffff)?,
            conn_interval_min: to_units(self.min_connection_interval, 1250, 0x0006..=0x0c80)?,
            conn_interval_max: to_units(self.max_connection_interval, 1250, 0x0006..=0x0c80)?,
            max_latency: self.max_latency,
            supervision_timeout: to_units(self.supervision_timeout, 10_000, 0x000a..=0x0c80)?,
            min_ce_length: to_units(self.event_length, 625, 0..=0xffff)?,
            max_ce_length: to_units(self.event_length, 625, 0..=0xffff)?,
        };
        if params.scan_window > params.scan_interval
            || params.conn_interval_min > params.conn_interval_max
            || self.max_latency > 0x01f3
        {
            return Err(Error::InvalidValue);
        }
        Ok((self.phy.mask(), params))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum ConnectionState {
    Idle,
    Connecting { adv_handle: u8, subevent: u8, peer: Address },
    Connected { handle: u16, peer: Address },
}

/// Disconnects the runner has yet to send.
const MAX_PENDING_DISCONNECTS: usize = 2;

struct State {
    connection: ConnectionState,
    disconnects: heapless::Deque<(u16, u8), MAX_PENDING_DISCONNECTS>,
    disconnect_waker: WakerRegistration,
}

/// Tracks the one connection the broadcaster may have pending or open.
pub(crate) struct ConnectionManager {
    state: RefCell<State>,
}

impl ConnectionManager {
    pub(crate) const fn new() -> Self {
        Self {
            state: RefCell::new(State {
                connection: ConnectionState::Idle,
                disconnects: heapless::Deque::new(),
                disconnect_waker: WakerRegistration::new(),
            }),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state.borrow().connection
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.state() == ConnectionState::Idle
    }

    pub(crate) fn is_connected(&self, h: u16) -> bool {
        matches!(self.state(), ConnectionState::Connected { handle, .. } if handle == h)
    }

    /// Record an outgoing connection attempt.
    pub(crate) fn connect(&self, adv_handle: u8, subevent: u8, peer: Address) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        if state.connection != ConnectionState::Idle {
            return Err(Error::Busy);
        }
        state.connection = ConnectionState::Connecting {
            adv_handle,
            subevent,
            peer,
        };
        Ok(())
    }

    /// The controller refused to start the connection attempt.
    pub(crate) fn cancel(&self) {
        let mut state = self.state.borrow_mut();
        if let ConnectionState::Connecting { .. } = state.connection {
            state.connection = ConnectionState::Idle;
        }
    }

    /// Process a connection complete event.
    pub(crate) fn connected(&self, complete: &ConnectionComplete) -> Result<ConnectionEvent, Error> {
        let mut state = self.state.borrow_mut();
        let ConnectionState::Connecting { adv_handle, .. } = state.connection else {
            trace!("[link] connection {} was not initiated by the host", complete.handle);
            return Err(Error::UnexpectedConnection);
        };
        // A failure while connecting ends the pending attempt, whatever handles it carries.
        if complete.status == Status::SUCCESS && complete.adv_handle.is_some_and(|h| h != adv_handle) {
            trace!("[link] connection complete for advertising set {:?}", complete.adv_handle);
            return Err(Error::UnexpectedConnection);
        }
        state.connection = if complete.status == Status::SUCCESS {
            ConnectionState::Connected {
                handle: complete.handle,
                peer: complete.peer,
            }
        } else {
            ConnectionState::Idle
        };
        Ok(ConnectionEvent::Connected {
            handle: complete.handle,
            status: complete.status,
            peer: complete.peer,
        })
    }

    /// Process a disconnection complete event.
    pub(crate) fn disconnected(&self, h: u16, reason: u8) -> Result<ConnectionEvent, Error> {
        let mut state = self.state.borrow_mut();
        // Drop any queued disconnect for the handle, it is gone.
        let pending: heapless::Vec<(u16, u8), MAX_PENDING_DISCONNECTS> =
            state.disconnects.iter().copied().filter(|(handle, _)| *handle != h).collect();
        state.disconnects.clear();
        for entry in pending {
            let _ = state.disconnects.push_back(entry);
        }

        match state.connection {
            ConnectionState::Connected { handle, .. } if handle == h => {
                state.connection = ConnectionState::Idle;
                Ok(ConnectionEvent::Disconnected { handle, reason })
            }
            _ => {
                trace!("[link][disconnect] connection handle {} not found", h);
                Err(Error::NotFound)
            }
        }
    }

    /// Queue a disconnect for the runner to send.
    pub(crate) fn request_disconnect(&self, handle: u16, reason: u8) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        if state.disconnects.iter().any(|(h, _)| *h == handle) {
            return Ok(());
        }
        state.disconnects.push_back((handle, reason)).map_err(|_| Error::Busy)?;
        state.disconnect_waker.wake();
        Ok(())
    }

    pub(crate) fn poll_disconnecting(&self, cx: Option<&mut Context<'_>>) -> Poll<(u16, u8)> {
        let mut state = self.state.borrow_mut();
        if let Some(cx) = cx {
            state.disconnect_waker.register(cx.waker());
        }
        match state.disconnects.pop_front() {
            Some(entry) => Poll::Ready(entry),
            None => Poll::Pending,
        }
    }
}
