//! HCI commands used by the host.
//!
//! Each command knows its opcode, how to write its parameters and how to decode the
//! return parameters of its Command Complete event.
use crate::address::{AddrKind, Address, BdAddr};
use crate::codec;
use crate::cursor::{ReadCursor, WriteCursor};
use crate::pawr::SubeventData;

/// Command packet header: opcode and parameter length.
pub const HEADER_SIZE: usize = 3;

/// Largest parameter block a command packet can carry.
pub const MAX_PARAMS_SIZE: usize = 255;

const fn opcode(ogf: u16, ocf: u16) -> u16 {
    (ogf << 10) | ocf
}

const OGF_LINK_CONTROL: u16 = 0x01;
const OGF_CONTROLLER_BASEBAND: u16 = 0x03;
const OGF_LE: u16 = 0x08;

pub trait HciCommand {
    const OPCODE: u16;
    /// The controller answers with a Command Status event instead of Command Complete.
    const STATUS_ONLY: bool = false;
    type Return;

    fn params_size(&self) -> usize;
    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error>;

    /// Decode the return parameters that follow the status.
    fn decode_return(data: &[u8]) -> Result<Self::Return, codec::Error>;
}

/// Write a complete command packet and return its length.
pub fn encode<C: HciCommand>(cmd: &C, dest: &mut [u8]) -> Result<usize, codec::Error> {
    let size = cmd.params_size();
    if size > MAX_PARAMS_SIZE {
        return Err(codec::Error::InsufficientSpace);
    }
    let mut w = WriteCursor::new(dest);
    w.write(C::OPCODE)?;
    w.write(size as u8)?;
    cmd.write_params(&mut w)?;
    if w.len() != HEADER_SIZE + size {
        return Err(codec::Error::InvalidValue);
    }
    Ok(w.len())
}

macro_rules! no_return {
    () => {
        type Return = ();

        fn decode_return(_: &[u8]) -> Result<(), codec::Error> {
            Ok(())
        }
    };
}

#[derive(Debug, Clone, Copy)]
pub struct Reset;

impl HciCommand for Reset {
    const OPCODE: u16 = opcode(OGF_CONTROLLER_BASEBAND, 0x0003);
    no_return!();

    fn params_size(&self) -> usize {
        0
    }

    fn write_params(&self, _: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        Ok(())
    }
}

/// Bits of the event mask.
pub mod event_mask {
    pub const DISCONNECTION_COMPLETE: u64 = 1 << 4;
    pub const HARDWARE_ERROR: u64 = 1 << 15;
    pub const LE_META: u64 = 1 << 61;
}

/// Bits of the LE event mask.
pub mod le_event_mask {
    pub const CONNECTION_COMPLETE: u64 = 1 << 0;
    pub const ENHANCED_CONNECTION_COMPLETE: u64 = 1 << 9;
    pub const ADV_SET_TERMINATED: u64 = 1 << 17;
    pub const PERIODIC_ADV_SUBEVENT_DATA_REQUEST: u64 = 1 << 38;
    pub const PERIODIC_ADV_RESPONSE_REPORT: u64 = 1 << 39;
    pub const ENHANCED_CONNECTION_COMPLETE_V2: u64 = 1 << 40;
}

#[derive(Debug, Clone, Copy)]
pub struct SetEventMask(pub u64);

impl HciCommand for SetEventMask {
    const OPCODE: u16 = opcode(OGF_CONTROLLER_BASEBAND, 0x0001);
    no_return!();

    fn params_size(&self) -> usize {
        8
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Disconnect {
    pub handle: u16,
    pub reason: u8,
}

impl HciCommand for Disconnect {
    const OPCODE: u16 = opcode(OGF_LINK_CONTROL, 0x0006);
    const STATUS_ONLY: bool = true;
    no_return!();

    fn params_size(&self) -> usize {
        3
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.handle)?;
        w.write(self.reason)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeSetEventMask(pub u64);

impl HciCommand for LeSetEventMask {
    const OPCODE: u16 = opcode(OGF_LE, 0x0001);
    no_return!();

    fn params_size(&self) -> usize {
        8
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.0)
    }
}

/// Bit of the LE features for the PAwR advertiser role.
pub const LE_FEATURE_PAWR_ADVERTISER: u64 = 1 << 43;

#[derive(Debug, Clone, Copy)]
pub struct LeReadLocalSupportedFeatures;

impl HciCommand for LeReadLocalSupportedFeatures {
    const OPCODE: u16 = opcode(OGF_LE, 0x0003);
    type Return = u64;

    fn params_size(&self) -> usize {
        0
    }

    fn write_params(&self, _: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        Ok(())
    }

    fn decode_return(data: &[u8]) -> Result<u64, codec::Error> {
        ReadCursor::new(data).read()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeSetRandomAddr(pub BdAddr);

impl HciCommand for LeSetRandomAddr {
    const OPCODE: u16 = opcode(OGF_LE, 0x0005);
    no_return!();

    fn params_size(&self) -> usize {
        6
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeSetAdvSetRandomAddr {
    pub handle: u8,
    pub addr: BdAddr,
}

impl HciCommand for LeSetAdvSetRandomAddr {
    const OPCODE: u16 = opcode(OGF_LE, 0x0035);
    no_return!();

    fn params_size(&self) -> usize {
        7
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.handle)?;
        w.write(self.addr)
    }
}

/// LE Set Extended Advertising Parameters, first version. Intervals in 0.625 ms units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeSetExtAdvParams {
    pub handle: u8,
    pub props: u16,
    pub primary_interval_min: u32,
    pub primary_interval_max: u32,
    pub channel_map: u8,
    pub own_addr_kind: AddrKind,
    pub filter_policy: u8,
    pub tx_power: i8,
    pub primary_phy: u8,
    pub secondary_max_skip: u8,
    pub secondary_phy: u8,
    pub sid: u8,
    pub scan_request_notify: bool,
}

impl HciCommand for LeSetExtAdvParams {
    const OPCODE: u16 = opcode(OGF_LE, 0x0036);
    /// The TX power selected by the controller.
    type Return = i8;

    fn params_size(&self) -> usize {
        25
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.handle)?;
        w.write(self.props)?;
        w.write_u24(self.primary_interval_min)?;
        w.write_u24(self.primary_interval_max)?;
        w.write(self.channel_map)?;
        w.write(self.own_addr_kind.into_raw())?;
        // No peer, the set is undirected.
        w.write(AddrKind::Public.into_raw())?;
        w.write(BdAddr::default())?;
        w.write(self.filter_policy)?;
        w.write(self.tx_power)?;
        w.write(self.primary_phy)?;
        w.write(self.secondary_max_skip)?;
        w.write(self.secondary_phy)?;
        w.write(self.sid)?;
        w.write(self.scan_request_notify as u8)
    }

    fn decode_return(data: &[u8]) -> Result<i8, codec::Error> {
        ReadCursor::new(data).read()
    }
}

/// Operation code for data that is not fragmented by the host.
const OPERATION_COMPLETE: u8 = 0x03;

#[derive(Debug, Clone, Copy)]
pub struct LeSetExtAdvData<'a> {
    pub handle: u8,
    pub data: &'a [u8],
}

impl HciCommand for LeSetExtAdvData<'_> {
    const OPCODE: u16 = opcode(OGF_LE, 0x0037);
    no_return!();

    fn params_size(&self) -> usize {
        4 + self.data.len()
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.handle)?;
        w.write(OPERATION_COMPLETE)?;
        // The controller should not fragment the data.
        w.write(0x01u8)?;
        w.write(self.data.len() as u8)?;
        w.append(self.data)
    }
}

/// One advertising set to enable or disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvSet {
    pub handle: u8,
    /// Duration in units of 10 ms, 0 for none.
    pub duration: u16,
    /// 0 for no limit.
    pub max_events: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct LeSetExtAdvEnable<'a> {
    pub enable: bool,
    pub sets: &'a [AdvSet],
}

impl HciCommand for LeSetExtAdvEnable<'_> {
    const OPCODE: u16 = opcode(OGF_LE, 0x0039);
    no_return!();

    fn params_size(&self) -> usize {
        2 + 4 * self.sets.len()
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.enable as u8)?;
        w.write(self.sets.len() as u8)?;
        for set in self.sets {
            w.write(set.handle)?;
            w.write(set.duration)?;
            w.write(set.max_events)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeReadNumberOfSupportedAdvSets;

impl HciCommand for LeReadNumberOfSupportedAdvSets {
    const OPCODE: u16 = opcode(OGF_LE, 0x003b);
    type Return = u8;

    fn params_size(&self) -> usize {
        0
    }

    fn write_params(&self, _: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        Ok(())
    }

    fn decode_return(data: &[u8]) -> Result<u8, codec::Error> {
        ReadCursor::new(data).read()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeRemoveAdvSet {
    pub handle: u8,
}

impl HciCommand for LeRemoveAdvSet {
    const OPCODE: u16 = opcode(OGF_LE, 0x003c);
    no_return!();

    fn params_size(&self) -> usize {
        1
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.handle)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeClearAdvSets;

impl HciCommand for LeClearAdvSets {
    const OPCODE: u16 = opcode(OGF_LE, 0x003d);
    no_return!();

    fn params_size(&self) -> usize {
        0
    }

    fn write_params(&self, _: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeSetPeriodicAdvData<'a> {
    pub handle: u8,
    pub data: &'a [u8],
}

impl HciCommand for LeSetPeriodicAdvData<'_> {
    const OPCODE: u16 = opcode(OGF_LE, 0x003f);
    no_return!();

    fn params_size(&self) -> usize {
        3 + self.data.len()
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.handle)?;
        w.write(OPERATION_COMPLETE)?;
        w.write(self.data.len() as u8)?;
        w.append(self.data)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeSetPeriodicAdvEnable {
    pub enable: bool,
    /// Include the ADI field in AUX_SYNC_IND PDUs.
    pub include_adi: bool,
    pub handle: u8,
}

impl HciCommand for LeSetPeriodicAdvEnable {
    const OPCODE: u16 = opcode(OGF_LE, 0x0040);
    no_return!();

    fn params_size(&self) -> usize {
        2
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.enable as u8 | (self.include_adi as u8) << 1)?;
        w.write(self.handle)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeSetPeriodicAdvSubeventData<'a> {
    pub handle: u8,
    pub subevents: &'a [SubeventData],
}

impl HciCommand for LeSetPeriodicAdvSubeventData<'_> {
    const OPCODE: u16 = opcode(OGF_LE, 0x0082);
    /// The advertising handle.
    type Return = u8;

    fn params_size(&self) -> usize {
        2 + self.subevents.iter().map(|s| 4 + s.data.len()).sum::<usize>()
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.handle)?;
        w.write(self.subevents.len() as u8)?;
        for s in self.subevents {
            w.write(s.subevent)?;
            w.write(s.response_slot_start)?;
            w.write(s.response_slot_count)?;
            w.write(s.data.len() as u8)?;
            w.append(&s.data)?;
        }
        Ok(())
    }

    fn decode_return(data: &[u8]) -> Result<u8, codec::Error> {
        ReadCursor::new(data).read()
    }
}

/// Connection parameters for one initiating PHY, in HCI units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitiatingPhyParams {
    pub scan_interval: u16,
    pub scan_window: u16,
    pub conn_interval_min: u16,
    pub conn_interval_max: u16,
    pub max_latency: u16,
    pub supervision_timeout: u16,
    pub min_ce_length: u16,
    pub max_ce_length: u16,
}

/// LE Extended Create Connection, second version, which connects to a PAwR responder
/// through a subevent of the advertising train.
#[derive(Debug, Clone, Copy)]
pub struct LeExtCreateConnV2 {
    pub adv_handle: u8,
    pub subevent: u8,
    pub own_addr_kind: AddrKind,
    pub peer: Address,
    /// Bitmask of initiating PHYs. Exactly one bit set.
    pub phys: u8,
    pub params: InitiatingPhyParams,
}

impl HciCommand for LeExtCreateConnV2 {
    const OPCODE: u16 = opcode(OGF_LE, 0x0085);
    const STATUS_ONLY: bool = true;
    no_return!();

    fn params_size(&self) -> usize {
        12 + 16
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        if self.phys.count_ones() != 1 {
            return Err(codec::Error::InvalidValue);
        }
        w.write(self.adv_handle)?;
        w.write(self.subevent)?;
        // Connect to the given peer, not the filter accept list.
        w.write(0x00u8)?;
        w.write(self.own_addr_kind.into_raw())?;
        w.write(self.peer.kind.into_raw())?;
        w.write(self.peer.addr)?;
        w.write(self.phys)?;
        let p = &self.params;
        w.write(p.scan_interval)?;
        w.write(p.scan_window)?;
        w.write(p.conn_interval_min)?;
        w.write(p.conn_interval_max)?;
        w.write(p.max_latency)?;
        w.write(p.supervision_timeout)?;
        w.write(p.min_ce_length)?;
        w.write(p.max_ce_length)
    }
}

/// LE Set Periodic Advertising Parameters, second version, with the PAwR subevent layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeSetPeriodicAdvParamsV2 {
    pub handle: u8,
    /// Units of 1.25 ms.
    pub interval_min: u16,
    pub interval_max: u16,
    pub properties: u16,
    pub num_subevents: u8,
    /// Units of 1.25 ms.
    pub subevent_interval: u8,
    /// Units of 1.25 ms.
    pub response_slot_delay: u8,
    /// Units of 0.125 ms.
    pub response_slot_spacing: u8,
    pub num_response_slots: u8,
}

impl HciCommand for LeSetPeriodicAdvParamsV2 {
    const OPCODE: u16 = opcode(OGF_LE, 0x0086);
    /// The advertising handle.
    type Return = u8;

    fn params_size(&self) -> usize {
        12
    }

    fn write_params(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        w.write(self.handle)?;
        w.write(self.interval_min)?;
        w.write(self.interval_max)?;
        w.write(self.properties)?;
        w.write(self.num_subevents)?;
        w.write(self.subevent_interval)?;
        w.write(self.response_slot_delay)?;
        w.write(self.response_slot_spacing)?;
        w.write(self.num_response_slots)
    }

    fn decode_return(data: &[u8]) -> Result<u8, codec::Error> {
        ReadCursor::new(data).read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet<C: HciCommand>(cmd: &C) -> heapless::Vec<u8, 259> {
        let mut buf = [0; 259];
        let len = encode(cmd, &mut buf).unwrap();
        heapless::Vec::from_slice(&buf[..len]).unwrap()
    }

    #[test]
    fn opcodes() {
        assert_eq!(Reset::OPCODE, 0x0c03);
        assert_eq!(Disconnect::OPCODE, 0x0406);
        assert_eq!(LeSetExtAdvParams::OPCODE, 0x2036);
        assert_eq!(LeSetPeriodicAdvSubeventData::OPCODE, 0x2082);
        assert_eq!(LeExtCreateConnV2::OPCODE, 0x2085);
        assert_eq!(LeSetPeriodicAdvParamsV2::OPCODE, 0x2086);
        assert!(LeExtCreateConnV2::STATUS_ONLY);
        assert!(!LeSetPeriodicAdvParamsV2::STATUS_ONLY);
    }

    #[test]
    fn reset_has_no_parameters() {
        assert_eq!(&packet(&Reset)[..], &[0x03, 0x0c, 0x00]);
    }

    #[test]
    fn periodic_parameters_v2() {
        let cmd = LeSetPeriodicAdvParamsV2 {
            handle: 0,
            interval_min: 32,
            interval_max: 32,
            properties: 0,
            num_subevents: 1,
            subevent_interval: 28,
            response_slot_delay: 16,
            response_slot_spacing: 50,
            num_response_slots: 2,
        };
        assert_eq!(
            &packet(&cmd)[..],
            &[0x86, 0x20, 0x0c, 0x00, 0x20, 0x00, 0x20, 0x00, 0x00, 0x00, 0x01, 0x1c, 0x10, 0x32, 0x02]
        );
        assert_eq!(LeSetPeriodicAdvParamsV2::decode_return(&[0x00]), Ok(0));
    }

    #[test]
    fn extended_parameters_for_coded_set() {
        let cmd = LeSetExtAdvParams {
            handle: 0,
            props: 0,
            primary_interval_min: 0xa0,
            primary_interval_max: 0xf0,
            channel_map: 0x07,
            own_addr_kind: AddrKind::Random,
            filter_policy: 0,
            tx_power: 0x7f,
            primary_phy: 0x03,
            secondary_max_skip: 0,
            secondary_phy: 0x03,
            sid: 0,
            scan_request_notify: false,
        };
        let p = packet(&cmd);
        assert_eq!(p[2], 25);
        assert_eq!(
            &p[3..],
            &[
                0x00, 0x00, 0x00, 0xa0, 0x00, 0x00, 0xf0, 0x00, 0x00, 0x07, 0x01, 0x00, 0, 0, 0, 0, 0, 0, 0x00, 0x7f,
                0x03, 0x00, 0x03, 0x00, 0x00
            ]
        );
        assert_eq!(LeSetExtAdvParams::decode_return(&[0xf8]), Ok(-8));
    }

    #[test]
    fn subevent_data_with_counter() {
        let data = [SubeventData::new(0, 0, 1, &7u32.to_le_bytes()).unwrap()];
        let cmd = LeSetPeriodicAdvSubeventData {
            handle: 0,
            subevents: &data,
        };
        assert_eq!(
            &packet(&cmd)[..],
            &[0x82, 0x20, 0x0a, 0x00, 0x01, 0x00, 0x00, 0x01, 0x04, 0x07, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn oversized_parameters_are_rejected() {
        let big = [0u8; 252];
        let mut buf = [0; 259];
        assert_eq!(
            encode(&LeSetExtAdvData { handle: 0, data: &big }, &mut buf),
            Err(codec::Error::InsufficientSpace)
        );
        assert_eq!(encode(&LeSetPeriodicAdvData { handle: 0, data: &big }, &mut buf), Ok(255 + 3));

        let data = [
            SubeventData::new(0, 0, 1, &[0; 200]).unwrap(),
            SubeventData::new(1, 0, 1, &[0; 100]).unwrap(),
        ];
        let cmd = LeSetPeriodicAdvSubeventData {
            handle: 0,
            subevents: &data,
        };
        assert_eq!(encode(&cmd, &mut buf), Err(codec::Error::InsufficientSpace));
        // Nothing written.
        assert_eq!(buf[0], 0x3f);
    }

    #[test]
    fn create_connection_through_subevent() {
        let cmd = LeExtCreateConnV2 {
            adv_handle: 0,
            subevent: 0,
            own_addr_kind: AddrKind::Random,
            peer: Address::random([1, 2, 3, 4, 5, 0xc6]),
            phys: 0x01,
            params: InitiatingPhyParams {
                scan_interval: 0x60,
                scan_window: 0x60,
                conn_interval_min: 40,
                conn_interval_max: 40,
                max_latency: 0,
                supervision_timeout: 400,
                min_ce_length: 0,
                max_ce_length: 0,
            },
        };
        let p = packet(&cmd);
        assert_eq!(p[2], 28);
        assert_eq!(&p[3..15], &[0x00, 0x00, 0x00, 0x01, 0x01, 1, 2, 3, 4, 5, 0xc6, 0x01]);
        assert_eq!(&p[19..21], &40u16.to_le_bytes());

        let mut buf = [0; 64];
        let cmd = LeExtCreateConnV2 { phys: 0x05, ..cmd };
        assert_eq!(encode(&cmd, &mut buf), Err(codec::Error::InvalidValue));
    }

    #[test]
    fn periodic_enable_with_adi() {
        let cmd = LeSetPeriodicAdvEnable {
            enable: true,
            include_adi: true,
            handle: 2,
        };
        assert_eq!(&packet(&cmd)[..], &[0x40, 0x20, 0x02, 0x03, 0x02]);
    }
}
