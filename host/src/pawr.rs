//! Periodic Advertising with Responses.
//!
//! The controller asks the host for subevent data ahead of each subevent and reports
//! the responses it receives in the response slots. An application either pulls
//! [`PawrEvent`]s from its advertising set, or implements [`PawrHandler`] and lets
//! the set drive it.
use core::mem;

use heapless::Vec;

use crate::address::Address;
use crate::config;
use crate::connection::ConnectionEvent;
use crate::event::{DataStatus, Response};
use crate::Error;

/// Max length of the data sent in one subevent.
pub const MAX_SUBEVENT_DATA_LEN: usize = 251;

/// Max length of the data received in one response slot.
pub const MAX_RESPONSE_DATA_LEN: usize = 251;

/// The controller needs data for `count` subevents starting with `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubeventDataRequest {
    pub adv_handle: u8,
    pub start: u8,
    pub count: u8,
}

impl SubeventDataRequest {
    /// The requested subevents, wrapping around `num_subevents`.
    pub fn subevents(&self, num_subevents: u8) -> impl Iterator<Item = u8> {
        let start = self.start;
        let n = num_subevents.max(1) as u16;
        (0..self.count as u16).map(move |i| ((start as u16 + i) % n) as u8)
    }
}

/// Where and how a response was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResponseInfo {
    pub subevent: u8,
    /// Whether the subevent data was transmitted, 0x00 if so.
    pub tx_status: u8,
    pub tx_power: i8,
    pub rssi: i8,
    pub cte_type: u8,
    pub response_slot: u8,
}

/// Data for one subevent, and the response slots to listen to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubeventData {
    pub subevent: u8,
    pub response_slot_start: u8,
    pub response_slot_count: u8,
    pub data: Vec<u8, MAX_SUBEVENT_DATA_LEN>,
}

impl SubeventData {
    pub fn new(subevent: u8, response_slot_start: u8, response_slot_count: u8, data: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            subevent,
            response_slot_start,
            response_slot_count,
            data: Vec::from_slice(data).map_err(|_| Error::InsufficientSpace)?,
        })
    }
}

/// Subevent data supplied for a single request.
pub type SubeventDataBuffer = Vec<SubeventData, { config::MAX_SUBEVENTS_PER_REQUEST }>;

/// Events delivered to the owner of an advertising set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PawrEvent {
    DataRequest(SubeventDataRequest),
    /// A response, `data` is `None` when reception failed.
    Response {
        info: ResponseInfo,
        data: Option<Vec<u8, MAX_RESPONSE_DATA_LEN>>,
    },
}

/// What to do after a response was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseAction {
    Ignore,
    /// Connect to the responder, in the subevent the response was received in.
    Connect(Address),
}

/// Application callbacks of a PAwR broadcaster.
pub trait PawrHandler {
    /// Fill in `data` for the subevents of `request`.
    ///
    /// Subevents left without data are transmitted empty by the controller.
    fn on_data_request(&mut self, request: &SubeventDataRequest, data: &mut SubeventDataBuffer);

    /// The host or controller did not accept the data from `on_data_request`.
    fn on_data_rejected(&mut self, error: Error) {
        warn!("[pawr] subevent data rejected: {:?}", error);
    }

    fn on_response(&mut self, info: &ResponseInfo, data: Option<&[u8]>) -> ResponseAction;

    fn on_connection_event(&mut self, event: &ConnectionEvent) {
        let _ = event;
    }
}

/// Joins responses the controller reports in fragments.
pub(crate) struct ResponseReassembly {
    slot: Option<(u8, u8)>,
    /// The pending response overflowed, its remaining fragments are dropped.
    overflowed: bool,
    buf: Vec<u8, MAX_RESPONSE_DATA_LEN>,
}

impl ResponseReassembly {
    pub(crate) const fn new() -> Self {
        Self {
            slot: None,
            overflowed: false,
            buf: Vec::new(),
        }
    }

    fn discard(&mut self) {
        if let Some((subevent, slot)) = self.slot.take() {
            debug!("[pawr] dropping incomplete response (subevent {}, slot {})", subevent, slot);
        }
        self.overflowed = false;
        self.buf.clear();
    }

    /// Process one response of a report and return the event to deliver, if any.
    pub(crate) fn process(&mut self, subevent: u8, tx_status: u8, response: &Response<'_>) -> Option<PawrEvent> {
        let key = (subevent, response.response_slot);
        let info = ResponseInfo {
            subevent,
            tx_status,
            tx_power: response.tx_power,
            rssi: response.rssi,
            cte_type: response.cte_type,
            response_slot: response.response_slot,
        };
        match response.data_status {
            DataStatus::Complete => {
                if self.slot != Some(key) {
                    self.discard();
                } else if self.overflowed {
                    self.discard();
                    return None;
                }
                self.slot = None;
                if self.buf.extend_from_slice(response.data).is_err() {
                    warn!("[pawr] response in subevent {} too large", subevent);
                    self.buf.clear();
                    return None;
                }
                Some(PawrEvent::Response {
                    info,
                    data: Some(mem::take(&mut self.buf)),
                })
            }
            DataStatus::Partial => {
                if self.slot != Some(key) {
                    self.discard();
                    self.slot = Some(key);
                }
                if !self.overflowed && self.buf.extend_from_slice(response.data).is_err() {
                    warn!("[pawr] response in subevent {} too large", subevent);
                    self.overflowed = true;
                    self.buf.clear();
                }
                None
            }
            DataStatus::Failed => {
                if self.slot == Some(key) {
                    self.discard();
                }
                Some(PawrEvent::Response { info, data: None })
            }
            DataStatus::Other(status) => {
                warn!("[pawr] unknown response data status {}", status);
                None
            }
        }
    }
}
