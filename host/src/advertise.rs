//! Advertising set and periodic advertising parameters.
use embassy_time::Duration;

use crate::address::AddrKind;
use crate::command::{LeSetExtAdvParams, LeSetPeriodicAdvParamsV2};
use crate::Error;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
#[repr(i8)]
pub enum TxPower {
    Minus40dBm = -40,
    Minus20dBm = -20,
    Minus16dBm = -16,
    Minus12dBm = -12,
    Minus8dBm = -8,
    Minus4dBm = -4,
    ZerodBm = 0,
    Plus2dBm = 2,
    Plus4dBm = 4,
    Plus8dBm = 8,
    Plus10dBm = 10,
    Plus20dBm = 20,
}

/// HCI value meaning the host has no TX power preference.
const TX_POWER_NO_PREFERENCE: i8 = 0x7f;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum PhyKind {
    Le1M,
    Le2M,
    LeCoded,
}

impl PhyKind {
    pub(crate) fn into_raw(self) -> u8 {
        match self {
            Self::Le1M => 0x01,
            Self::Le2M => 0x02,
            Self::LeCoded => 0x03,
        }
    }

    /// Bit of this PHY in the initiating PHYs bitmask.
    pub(crate) fn mask(self) -> u8 {
        match self {
            Self::Le1M => 0x01,
            Self::Le2M => 0x02,
            Self::LeCoded => 0x04,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Eq, PartialEq, Copy, Clone, Debug, Default)]
pub enum AdvFilterPolicy {
    #[default]
    Unfiltered,
    FilterScan,
    FilterConn,
    FilterConnAndScan,
}

impl AdvFilterPolicy {
    fn into_raw(self) -> u8 {
        match self {
            Self::Unfiltered => 0,
            Self::FilterScan => 1,
            Self::FilterConn => 2,
            Self::FilterConnAndScan => 3,
        }
    }
}

/// Primary advertising channels, bit 0 is channel 37.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct AdvChannelMap(u8);

impl AdvChannelMap {
    pub const ALL: AdvChannelMap = AdvChannelMap(0x07);

    pub const fn new(chan_37: bool, chan_38: bool, chan_39: bool) -> Self {
        Self(chan_37 as u8 | (chan_38 as u8) << 1 | (chan_39 as u8) << 2)
    }
}

impl Default for AdvChannelMap {
    fn default() -> Self {
        Self::ALL
    }
}

/// Parameters of the extended advertising set that carries periodic advertising.
///
/// The set is always non-connectable and non-scannable, which is what periodic
/// advertising requires.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug)]
pub struct AdvertisementParameters {
    pub primary_phy: PhyKind,
    pub secondary_phy: PhyKind,
    /// `None` lets the controller choose.
    pub tx_power: Option<TxPower>,

    /// Advertising interval
    pub interval_min: Duration,
    pub interval_max: Duration,

    pub channel_map: AdvChannelMap,
    pub filter_policy: AdvFilterPolicy,
    /// Advertising SID, 0..=15.
    pub sid: u8,

    /// Timeout duration
    pub timeout: Option<Duration>,
    pub max_events: Option<u8>,
}

impl Default for AdvertisementParameters {
    fn default() -> Self {
        Self {
            primary_phy: PhyKind::Le1M,
            secondary_phy: PhyKind::Le1M,
            tx_power: None,
            interval_min: Duration::from_millis(160),
            interval_max: Duration::from_millis(160),
            channel_map: AdvChannelMap::ALL,
            filter_policy: AdvFilterPolicy::default(),
            sid: 0,
            timeout: None,
            max_events: None,
        }
    }
}

impl AdvertisementParameters {
    pub(crate) fn to_hci(&self, handle: u8, own_addr_kind: AddrKind) -> Result<LeSetExtAdvParams, Error> {
        if self.primary_phy == PhyKind::Le2M || self.sid > 0x0f {
            return Err(Error::InvalidValue);
        }
        let interval_min = adv_interval(self.interval_min)?;
        let interval_max = adv_interval(self.interval_max)?;
        if interval_min > interval_max {
            return Err(Error::InvalidValue);
        }
        Ok(LeSetExtAdvParams {
            handle,
            props: 0,
            primary_interval_min: interval_min,
            primary_interval_max: interval_max,
            channel_map: self.channel_map.0,
            own_addr_kind,
            filter_policy: self.filter_policy.into_raw(),
            tx_power: self.tx_power.map(|p| p as i8).unwrap_or(TX_POWER_NO_PREFERENCE),
            primary_phy: self.primary_phy.into_raw(),
            secondary_max_skip: 0,
            secondary_phy: self.secondary_phy.into_raw(),
            sid: self.sid,
            scan_request_notify: false,
        })
    }

    /// Advertising duration in units of 10 ms, 0 for no timeout.
    pub(crate) fn duration(&self) -> Result<u16, Error> {
        match self.timeout {
            None => Ok(0),
            Some(t) => {
                let units = (t.as_millis() / 10).max(1);
                u16::try_from(units).map_err(|_| Error::InvalidValue)
            }
        }
    }
}

/// Primary advertising interval in units of 0.625 ms.
fn adv_interval(d: Duration) -> Result<u32, Error> {
    let units = d.as_micros() / 625;
    if (0x20..=0x00ff_ffff).contains(&units) {
        Ok(units as u32)
    } else {
        Err(Error::InvalidValue)
    }
}

/// Periodic advertising parameters, including the PAwR subevent layout.
///
/// With `num_subevents` set to 0 this describes plain periodic advertising and
/// the subevent fields are ignored.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PeriodicAdvertisementParameters {
    pub interval_min: Duration,
    pub interval_max: Duration,
    /// Include the TX power in the periodic advertising PDUs.
    pub include_tx_power: bool,
    pub num_subevents: u8,
    /// Time between the start of two consecutive subevents.
    pub subevent_interval: Duration,
    /// Time from the start of a subevent to the first response slot.
    pub response_slot_delay: Duration,
    /// Time between two response slots.
    pub response_slot_spacing: Duration,
    pub num_response_slots: u8,
}

impl Default for PeriodicAdvertisementParameters {
    fn default() -> Self {
        Self {
            interval_min: Duration::from_millis(100),
            interval_max: Duration::from_millis(100),
            include_tx_power: false,
            num_subevents: 0,
            subevent_interval: Duration::from_ticks(0),
            response_slot_delay: Duration::from_ticks(0),
            response_slot_spacing: Duration::from_ticks(0),
            num_response_slots: 0,
        }
    }
}

const MAX_SUBEVENTS: u8 = 128;
const PERIODIC_PROP_INCLUDE_TX_POWER: u16 = 1 << 6;

impl PeriodicAdvertisementParameters {
    /// Check the parameters against the limits of the HCI command.
    pub fn validate(&self) -> Result<(), Error> {
        self.to_hci(0).map(|_| ())
    }

    pub(crate) fn to_hci(&self, handle: u8) -> Result<LeSetPeriodicAdvParamsV2, Error> {
        let interval_min = units(self.interval_min, 1250);
        let interval_max = units(self.interval_max, 1250);
        if interval_min < 0x0006 || interval_min > interval_max {
            return Err(Error::InvalidValue);
        }
        let interval_min = u16::try_from(interval_min).map_err(|_| Error::InvalidValue)?;
        let interval_max = u16::try_from(interval_max).map_err(|_| Error::InvalidValue)?;

        let mut cmd = LeSetPeriodicAdvParamsV2 {
            handle,
            interval_min,
            interval_max,
            properties: if self.include_tx_power {
                PERIODIC_PROP_INCLUDE_TX_POWER
            } else {
                0
            },
            num_subevents: 0,
            subevent_interval: 0,
            response_slot_delay: 0,
            response_slot_spacing: 0,
            num_response_slots: 0,
        };
        if self.num_subevents == 0 {
            return Ok(cmd);
        }
        if self.num_subevents > MAX_SUBEVENTS {
            return Err(Error::InvalidValue);
        }

        let subevent_interval = units(self.subevent_interval, 1250);
        let delay = units(self.response_slot_delay, 1250);
        let spacing = units(self.response_slot_spacing, 125);
        let slots = self.num_response_slots as u64;
        if !(6..=255).contains(&subevent_interval)
            || !(1..=254).contains(&delay)
            || delay >= subevent_interval
            || !(2..=255).contains(&spacing)
            || slots == 0
        {
            return Err(Error::InvalidValue);
        }
        // All response slots must end before the next subevent starts.
        if delay * 10 + slots * spacing > subevent_interval * 10 {
            return Err(Error::InvalidValue);
        }
        if self.num_subevents as u64 * subevent_interval > interval_min as u64 {
            return Err(Error::InvalidValue);
        }

        cmd.num_subevents = self.num_subevents;
        cmd.subevent_interval = subevent_interval as u8;
        cmd.response_slot_delay = delay as u8;
        cmd.response_slot_spacing = spacing as u8;
        cmd.num_response_slots = self.num_response_slots;
        Ok(cmd)
    }
}

fn units(d: Duration, unit_micros: u64) -> u64 {
    d.as_micros() / unit_micros
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pawr() -> PeriodicAdvertisementParameters {
        PeriodicAdvertisementParameters {
            interval_min: Duration::from_millis(40),
            interval_max: Duration::from_millis(40),
            include_tx_power: false,
            num_subevents: 1,
            subevent_interval: Duration::from_millis(35),
            response_slot_delay: Duration::from_millis(20),
            response_slot_spacing: Duration::from_micros(6250),
            num_response_slots: 2,
        }
    }

    #[test]
    fn pawr_parameters_in_hci_units() {
        let cmd = pawr().to_hci(0).unwrap();
        assert_eq!(cmd.interval_min, 32);
        assert_eq!(cmd.interval_max, 32);
        assert_eq!(cmd.subevent_interval, 28);
        assert_eq!(cmd.response_slot_delay, 16);
        assert_eq!(cmd.response_slot_spacing, 50);
        assert_eq!(cmd.num_response_slots, 2);
    }

    #[test]
    fn response_slots_must_fit_the_subevent() {
        let mut p = pawr();
        p.num_response_slots = 3;
        assert_eq!(p.validate(), Err(Error::InvalidValue));
        p.response_slot_spacing = Duration::from_millis(5);
        assert_eq!(p.validate(), Ok(()));

        let mut p = pawr();
        p.response_slot_delay = Duration::from_millis(35);
        assert_eq!(p.validate(), Err(Error::InvalidValue));

        let mut p = pawr();
        p.response_slot_spacing = Duration::from_micros(125);
        assert_eq!(p.validate(), Err(Error::InvalidValue));
    }

    #[test]
    fn subevents_must_fit_the_interval() {
        let mut p = pawr();
        p.num_subevents = 2;
        assert_eq!(p.validate(), Err(Error::InvalidValue));
        p.interval_min = Duration::from_millis(70);
        p.interval_max = Duration::from_millis(70);
        assert_eq!(p.validate(), Ok(()));

        p.interval_max = Duration::from_millis(60);
        assert_eq!(p.validate(), Err(Error::InvalidValue));
    }

    #[test]
    fn plain_periodic_ignores_subevent_fields() {
        let p = PeriodicAdvertisementParameters {
            include_tx_power: true,
            ..Default::default()
        };
        let cmd = p.to_hci(1).unwrap();
        assert_eq!(cmd.interval_min, 80);
        assert_eq!(cmd.properties, 1 << 6);
        assert_eq!(cmd.num_subevents, 0);
        assert_eq!(cmd.num_response_slots, 0);
    }

    #[test]
    fn periodic_interval_limits() {
        let mut p = PeriodicAdvertisementParameters::default();
        p.interval_min = Duration::from_millis(5);
        assert_eq!(p.validate(), Err(Error::InvalidValue));
        p.interval_min = Duration::from_millis(100);
        p.interval_max = Duration::from_secs(82);
        assert_eq!(p.validate(), Err(Error::InvalidValue));
    }

    #[test]
    fn coded_set_with_no_tx_preference() {
        let params = AdvertisementParameters {
            primary_phy: PhyKind::LeCoded,
            secondary_phy: PhyKind::LeCoded,
            interval_min: Duration::from_millis(100),
            interval_max: Duration::from_millis(150),
            ..Default::default()
        };
        let cmd = params.to_hci(0, AddrKind::Random).unwrap();
        assert_eq!(cmd.primary_interval_min, 0xa0);
        assert_eq!(cmd.primary_interval_max, 0xf0);
        assert_eq!(cmd.primary_phy, 0x03);
        assert_eq!(cmd.secondary_phy, 0x03);
        assert_eq!(cmd.tx_power, 0x7f);
        assert_eq!(cmd.props, 0);

        let params = AdvertisementParameters {
            primary_phy: PhyKind::Le2M,
            ..Default::default()
        };
        assert_eq!(params.to_hci(0, AddrKind::Random).err(), Some(Error::InvalidValue));
    }

    #[test]
    fn advertising_timeout_in_10ms_units() {
        let mut params = AdvertisementParameters::default();
        assert_eq!(params.duration(), Ok(0));
        params.timeout = Some(Duration::from_secs(5));
        assert_eq!(params.duration(), Ok(500));
        params.timeout = Some(Duration::from_secs(1000));
        assert_eq!(params.duration(), Err(Error::InvalidValue));
    }
}
