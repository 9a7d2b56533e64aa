//! HCI events.
use core::fmt;

use crate::address::{AddrKind, Address, BdAddr};
use crate::codec;
use crate::cursor::ReadCursor;

pub const EVENT_DISCONNECTION_COMPLETE: u8 = 0x05;
pub const EVENT_COMMAND_COMPLETE: u8 = 0x0e;
pub const EVENT_COMMAND_STATUS: u8 = 0x0f;
pub const EVENT_HARDWARE_ERROR: u8 = 0x10;
pub const EVENT_LE_META: u8 = 0x3e;

const LE_CONNECTION_COMPLETE: u8 = 0x01;
const LE_ENHANCED_CONNECTION_COMPLETE: u8 = 0x0a;
const LE_ADV_SET_TERMINATED: u8 = 0x12;
const LE_PERIODIC_ADV_SUBEVENT_DATA_REQUEST: u8 = 0x27;
const LE_PERIODIC_ADV_RESPONSE_REPORT: u8 = 0x28;
const LE_ENHANCED_CONNECTION_COMPLETE_V2: u8 = 0x29;

/// Connection handles carry flags in the upper bits of the 16-bit field.
const HANDLE_MASK: u16 = 0x0fff;

/// HCI status code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status(u8);

impl Status {
    pub const SUCCESS: Status = Status(0x00);
    pub const UNKNOWN_COMMAND: Status = Status(0x01);
    pub const UNKNOWN_CONN_IDENTIFIER: Status = Status(0x02);
    pub const HARDWARE_FAILURE: Status = Status(0x03);
    pub const COMMAND_DISALLOWED: Status = Status(0x0c);
    pub const UNSUPPORTED: Status = Status(0x11);
    pub const INVALID_PARAMS: Status = Status(0x12);
    pub const REMOTE_USER_TERMINATED: Status = Status(0x13);
    pub const LOCAL_HOST_TERMINATED: Status = Status(0x16);
    pub const UNSUPPORTED_REMOTE_FEATURE: Status = Status(0x1a);
    pub const UNKNOWN_ADV_IDENTIFIER: Status = Status(0x42);
    pub const LIMIT_REACHED: Status = Status(0x43);
    pub const CONN_FAILED_TO_ESTABLISH: Status = Status(0x3e);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn into_inner(self) -> u8 {
        self.0
    }

    pub fn to_result(self) -> Result<(), Status> {
        if self == Self::SUCCESS {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// A decoded HCI event.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event<'a> {
    CommandComplete(CommandComplete<'a>),
    CommandStatus {
        status: Status,
        num_packets: u8,
        opcode: u16,
    },
    DisconnectionComplete {
        status: Status,
        handle: u16,
        reason: u8,
    },
    HardwareError {
        code: u8,
    },
    Le(LeEvent<'a>),
    Unknown {
        code: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandComplete<'a> {
    pub num_packets: u8,
    pub opcode: u16,
    /// Return parameters, starting with the status for every command the host sends.
    pub params: &'a [u8],
}

impl<'a> CommandComplete<'a> {
    pub fn status(&self) -> Status {
        self.params.first().map(|s| Status(*s)).unwrap_or(Status::SUCCESS)
    }

    /// Return parameters following the status.
    pub fn return_params(&self) -> &'a [u8] {
        self.params.get(1..).unwrap_or(&[])
    }
}

/// LE Meta subevents.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LeEvent<'a> {
    /// Any of the connection complete variants.
    ConnectionComplete(ConnectionComplete),
    AdvSetTerminated {
        status: Status,
        adv_handle: u8,
        handle: u16,
        num_completed_events: u8,
    },
    SubeventDataRequest {
        adv_handle: u8,
        subevent_start: u8,
        subevent_count: u8,
    },
    ResponseReport(ResponseReport<'a>),
    Unknown {
        subevent: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionComplete {
    pub status: Status,
    pub handle: u16,
    pub role: u8,
    pub peer: Address,
    pub interval: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
    /// Set when the connection was created from a periodic advertising train.
    pub adv_handle: Option<u8>,
    pub sync_handle: Option<u16>,
}

/// Periodic Advertising Response Report.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResponseReport<'a> {
    pub adv_handle: u8,
    pub subevent: u8,
    pub tx_status: u8,
    pub num_responses: u8,
    data: &'a [u8],
}

impl<'a> ResponseReport<'a> {
    pub fn responses(&self) -> ResponseIter<'a> {
        ResponseIter {
            cursor: ReadCursor::new(self.data),
            remaining: self.num_responses,
        }
    }
}

/// Whether a response carries all of its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataStatus {
    Complete,
    /// More data follows in the next report for the same slot.
    Partial,
    /// The controller failed to receive the response.
    Failed,
    Other(u8),
}

impl DataStatus {
    pub fn from_raw(value: u8) -> Self {
        match value {
            0x00 => Self::Complete,
            0x01 => Self::Partial,
            0xff => Self::Failed,
            other => Self::Other(other),
        }
    }
}

/// A single response in a report.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Response<'a> {
    pub tx_power: i8,
    pub rssi: i8,
    pub cte_type: u8,
    pub response_slot: u8,
    pub data_status: DataStatus,
    pub data: &'a [u8],
}

pub struct ResponseIter<'a> {
    cursor: ReadCursor<'a>,
    remaining: u8,
}

impl<'a> ResponseIter<'a> {
    fn read(&mut self) -> Result<Response<'a>, codec::Error> {
        let tx_power = self.cursor.read()?;
        let rssi = self.cursor.read()?;
        let cte_type = self.cursor.read()?;
        let response_slot = self.cursor.read()?;
        let data_status: u8 = self.cursor.read()?;
        let len: u8 = self.cursor.read()?;
        let data = self.cursor.slice(len as usize)?;
        Ok(Response {
            tx_power,
            rssi,
            cte_type,
            response_slot,
            data_status: DataStatus::from_raw(data_status),
            data,
        })
    }
}

impl<'a> Iterator for ResponseIter<'a> {
    type Item = Result<Response<'a>, codec::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let r = self.read();
        // A malformed response ends the report.
        self.remaining = if r.is_ok() { self.remaining - 1 } else { 0 };
        Some(r)
    }
}

impl<'a> Event<'a> {
    /// Decode an event packet, starting with the event code.
    pub fn decode(packet: &'a [u8]) -> Result<Event<'a>, codec::Error> {
        let mut r = ReadCursor::new(packet);
        let code: u8 = r.read()?;
        let len: u8 = r.read()?;
        let params = r.slice(len as usize)?;
        let mut r = ReadCursor::new(params);
        let event = match code {
            EVENT_COMMAND_COMPLETE => Event::CommandComplete(CommandComplete {
                num_packets: r.read()?,
                opcode: r.read()?,
                params: r.remaining(),
            }),
            EVENT_COMMAND_STATUS => Event::CommandStatus {
                status: Status(r.read()?),
                num_packets: r.read()?,
                opcode: r.read()?,
            },
            EVENT_DISCONNECTION_COMPLETE => Event::DisconnectionComplete {
                status: Status(r.read()?),
                handle: r.read::<u16>()? & HANDLE_MASK,
                reason: r.read()?,
            },
            EVENT_HARDWARE_ERROR => Event::HardwareError { code: r.read()? },
            EVENT_LE_META => Event::Le(LeEvent::decode(r)?),
            code => Event::Unknown { code },
        };
        Ok(event)
    }
}

impl<'a> LeEvent<'a> {
    fn decode(mut r: ReadCursor<'a>) -> Result<LeEvent<'a>, codec::Error> {
        let subevent: u8 = r.read()?;
        let event = match subevent {
            LE_CONNECTION_COMPLETE => {
                let status = Status(r.read()?);
                let handle = r.read::<u16>()? & HANDLE_MASK;
                let role = r.read()?;
                let kind = AddrKind::from_raw(r.read()?);
                let addr: BdAddr = r.read()?;
                LeEvent::ConnectionComplete(ConnectionComplete {
                    status,
                    handle,
                    role,
                    peer: Address { kind, addr },
                    interval: r.read()?,
                    latency: r.read()?,
                    supervision_timeout: r.read()?,
                    adv_handle: None,
                    sync_handle: None,
                })
            }
            LE_ENHANCED_CONNECTION_COMPLETE | LE_ENHANCED_CONNECTION_COMPLETE_V2 => {
                let status = Status(r.read()?);
                let handle = r.read::<u16>()? & HANDLE_MASK;
                let role = r.read()?;
                let kind = AddrKind::from_raw(r.read()?);
                let addr: BdAddr = r.read()?;
                // Local and peer resolvable private addresses
                r.slice(12)?;
                let interval = r.read()?;
                let latency = r.read()?;
                let supervision_timeout = r.read()?;
                let _clock_accuracy: u8 = r.read()?;
                let (adv_handle, sync_handle) = if subevent == LE_ENHANCED_CONNECTION_COMPLETE_V2 {
                    // 0xFF and 0xFFFF when the connection was not made through PAwR or failed.
                    let adv_handle: u8 = r.read()?;
                    let sync_handle: u16 = r.read()?;
                    (
                        (adv_handle != 0xff).then_some(adv_handle),
                        (sync_handle != 0xffff).then_some(sync_handle),
                    )
                } else {
                    (None, None)
                };
                LeEvent::ConnectionComplete(ConnectionComplete {
                    status,
                    handle,
                    role,
                    peer: Address { kind, addr },
                    interval,
                    latency,
                    supervision_timeout,
                    adv_handle,
                    sync_handle,
                })
            }
            LE_ADV_SET_TERMINATED => LeEvent::AdvSetTerminated {
                status: Status(r.read()?),
                adv_handle: r.read()?,
                handle: r.read::<u16>()? & HANDLE_MASK,
                num_completed_events: r.read()?,
            },
            LE_PERIODIC_ADV_SUBEVENT_DATA_REQUEST => LeEvent::SubeventDataRequest {
                adv_handle: r.read()?,
                subevent_start: r.read()?,
                subevent_count: r.read()?,
            },
            LE_PERIODIC_ADV_RESPONSE_REPORT => LeEvent::ResponseReport(ResponseReport {
                adv_handle: r.read()?,
                subevent: r.read()?,
                tx_status: r.read()?,
                num_responses: r.read()?,
                data: r.remaining(),
            }),
            subevent => LeEvent::Unknown { subevent },
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_complete_with_return_params() {
        let packet = [0x0e, 0x05, 0x01, 0x86, 0x20, 0x00, 0x00];
        let Event::CommandComplete(cc) = Event::decode(&packet).unwrap() else {
            panic!("expected command complete");
        };
        assert_eq!(cc.opcode, 0x2086);
        assert_eq!(cc.status(), Status::SUCCESS);
        assert_eq!(cc.return_params(), &[0x00]);
    }

    #[test]
    fn command_status_failure() {
        let packet = [0x0f, 0x04, 0x0c, 0x01, 0x85, 0x20];
        assert_eq!(
            Event::decode(&packet).unwrap(),
            Event::CommandStatus {
                status: Status::COMMAND_DISALLOWED,
                num_packets: 1,
                opcode: 0x2085,
            }
        );
        assert_eq!(Status::COMMAND_DISALLOWED.to_result(), Err(Status::new(0x0c)));
    }

    #[test]
    fn truncated_event_is_rejected() {
        assert_eq!(Event::decode(&[0x3e, 0x04, 0x27, 0x00]), Err(codec::Error::InsufficientSpace));
        assert_eq!(Event::decode(&[0x3e, 0x02, 0x27, 0x00]), Err(codec::Error::InsufficientSpace));
    }

    #[test]
    fn subevent_data_request() {
        let packet = [0x3e, 0x04, 0x27, 0x00, 0x00, 0x01];
        assert_eq!(
            Event::decode(&packet).unwrap(),
            Event::Le(LeEvent::SubeventDataRequest {
                adv_handle: 0,
                subevent_start: 0,
                subevent_count: 1,
            })
        );
    }

    #[test]
    fn response_report_with_two_responses() {
        let packet = [
            0x3e, 0x14, 0x28, 0x00, 0x00, 0x00, 0x02, // header, subevent 0
            0x7f, 0xc4, 0xff, 0x00, 0x00, 0x03, 0x02, 0x01, 0x06, // slot 0, complete
            0x7f, 0xb0, 0xff, 0x01, 0xff, 0x00, // slot 1, failed
        ];
        let Event::Le(LeEvent::ResponseReport(report)) = Event::decode(&packet).unwrap() else {
            panic!("expected response report");
        };
        assert_eq!(report.subevent, 0);
        let mut it = report.responses();
        let first = it.next().unwrap().unwrap();
        assert_eq!(first.rssi, -60);
        assert_eq!(first.response_slot, 0);
        assert_eq!(first.data_status, DataStatus::Complete);
        assert_eq!(first.data, &[0x02, 0x01, 0x06]);
        let second = it.next().unwrap().unwrap();
        assert_eq!(second.response_slot, 1);
        assert_eq!(second.data_status, DataStatus::Failed);
        assert!(second.data.is_empty());
        assert!(it.next().is_none());
    }

    #[test]
    fn response_report_lying_about_its_length() {
        let packet = [0x3e, 0x0b, 0x28, 0x00, 0x00, 0x00, 0x02, 0x7f, 0xc4, 0xff, 0x00, 0x00, 0x09];
        let Event::Le(LeEvent::ResponseReport(report)) = Event::decode(&packet).unwrap() else {
            panic!("expected response report");
        };
        let mut it = report.responses();
        assert_eq!(it.next(), Some(Err(codec::Error::InsufficientSpace)));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn enhanced_connection_complete_v2() {
        let mut packet = [0u8; 36];
        packet[..3].copy_from_slice(&[0x3e, 0x22, 0x29]);
        packet[3] = 0x00; // status
        packet[4..6].copy_from_slice(&0x2001u16.to_le_bytes()); // handle with flags
        packet[6] = 0x00; // central
        packet[7] = 0x01; // random
        packet[8..14].copy_from_slice(&[1, 2, 3, 4, 5, 0xc6]);
        packet[26..28].copy_from_slice(&40u16.to_le_bytes());
        packet[33] = 0x00; // adv handle
        packet[34..36].copy_from_slice(&0x0fffu16.to_le_bytes());
        let Event::Le(LeEvent::ConnectionComplete(c)) = Event::decode(&packet).unwrap() else {
            panic!("expected connection complete");
        };
        assert_eq!(c.handle, 0x0001);
        assert_eq!(c.peer, Address::random([1, 2, 3, 4, 5, 0xc6]));
        assert_eq!(c.interval, 40);
        assert_eq!(c.adv_handle, Some(0));
        assert_eq!(c.sync_handle, Some(0x0fff));
    }

    #[test]
    fn failed_connection_has_no_adv_handle() {
        let mut packet = [0u8; 36];
        packet[..3].copy_from_slice(&[0x3e, 0x22, 0x29]);
        packet[3] = 0x3e; // failed to establish
        packet[7] = 0x01;
        packet[8..14].copy_from_slice(&[1, 2, 3, 4, 5, 0xc6]);
        packet[33] = 0xff;
        packet[34..36].copy_from_slice(&0xffffu16.to_le_bytes());
        let Event::Le(LeEvent::ConnectionComplete(c)) = Event::decode(&packet).unwrap() else {
            panic!("expected connection complete");
        };
        assert_eq!(c.status, Status::CONN_FAILED_TO_ESTABLISH);
        assert_eq!(c.adv_handle, None);
        assert_eq!(c.sync_handle, None);
    }

    #[test]
    fn unknown_events_are_not_errors() {
        assert_eq!(
            Event::decode(&[0x13, 0x05, 0x01, 0x00, 0x00, 0x01, 0x00]).unwrap(),
            Event::Unknown { code: 0x13 }
        );
        assert_eq!(
            Event::decode(&[0x3e, 0x01, 0x0d]).unwrap(),
            Event::Le(LeEvent::Unknown { subevent: 0x0d })
        );
    }
}
