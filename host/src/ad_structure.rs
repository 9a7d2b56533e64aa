//! Advertising data structures.
use crate::address::{AddrKind, Address, BdAddr};
use crate::codec;
use crate::cursor::{ReadCursor, WriteCursor};

pub const AD_FLAG_LE_LIMITED_DISCOVERABLE: u8 = 0b00000001;
pub const LE_GENERAL_DISCOVERABLE: u8 = 0b00000010;
pub const BR_EDR_NOT_SUPPORTED: u8 = 0b00000100;
pub const SIMUL_LE_BR_CONTROLLER: u8 = 0b00001000;
pub const SIMUL_LE_BR_HOST: u8 = 0b00010000;

const AD_FLAGS: u8 = 0x01;
const AD_SERVICE_UUIDS16: u8 = 0x03;
const AD_SHORTENED_LOCAL_NAME: u8 = 0x08;
const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;
const AD_SERVICE_DATA16: u8 = 0x16;
const AD_LE_BLUETOOTH_DEVICE_ADDRESS: u8 = 0x1b;
const AD_MANUFACTURER_SPECIFIC_DATA: u8 = 0xff;

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdStructure<'a> {
    /// Device flags and baseband capabilities.
    ///
    /// This should be sent if any flags apply to the device. If not (ie. the value sent would be
    /// 0), this may be omitted.
    ///
    /// Must not be used in scan response data.
    Flags(u8),

    /// Complete list of 16-bit service UUIDs, little-endian.
    ServiceUuids16(&'a [[u8; 2]]),

    /// Service data with 16-bit service UUID.
    ServiceData16 {
        /// The 16-bit service UUID.
        uuid: u16,
        /// The associated service data. May be empty.
        data: &'a [u8],
    },

    /// Sets the full (unabbreviated) device name.
    ///
    /// This will be shown to the user when this device is found.
    CompleteLocalName(&'a [u8]),

    /// Sets the shortened device name.
    ShortenedLocalName(&'a [u8]),

    /// Set manufacturer specific data
    ManufacturerSpecificData {
        company_identifier: u16,
        payload: &'a [u8],
    },

    /// The device address and its type.
    ///
    /// PAwR responders use this to tell the broadcaster who they are.
    LeBluetoothDeviceAddress(Address),

    /// An unknown or unimplemented AD structure stored as raw bytes.
    Unknown {
        /// Type byte.
        ty: u8,
        /// Raw data transmitted after the type.
        data: &'a [u8],
    },
}

impl<'d> AdStructure<'d> {
    pub fn encode_slice(data: &[AdStructure<'_>], dest: &mut [u8]) -> Result<usize, codec::Error> {
        let mut w = WriteCursor::new(dest);
        for item in data.iter() {
            item.encode(&mut w)?;
        }
        Ok(w.len())
    }

    pub fn encode(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        match self {
            AdStructure::Flags(flags) => {
                w.append(&[0x02, AD_FLAGS, *flags])?;
            }
            AdStructure::ServiceUuids16(uuids) => {
                w.append(&[header_len(uuids.len() * 2 + 1)?, AD_SERVICE_UUIDS16])?;
                for uuid in uuids.iter() {
                    w.append(uuid)?;
                }
            }
            AdStructure::ShortenedLocalName(name) => {
                w.append(&[header_len(name.len() + 1)?, AD_SHORTENED_LOCAL_NAME])?;
                w.append(name)?;
            }
            AdStructure::CompleteLocalName(name) => {
                w.append(&[header_len(name.len() + 1)?, AD_COMPLETE_LOCAL_NAME])?;
                w.append(name)?;
            }
            AdStructure::ServiceData16 { uuid, data } => {
                w.append(&[header_len(data.len() + 3)?, AD_SERVICE_DATA16])?;
                w.write(*uuid)?;
                w.append(data)?;
            }
            AdStructure::ManufacturerSpecificData {
                company_identifier,
                payload,
            } => {
                w.append(&[header_len(payload.len() + 3)?, AD_MANUFACTURER_SPECIFIC_DATA])?;
                w.write(*company_identifier)?;
                w.append(payload)?;
            }
            AdStructure::LeBluetoothDeviceAddress(address) => {
                w.append(&[0x08, AD_LE_BLUETOOTH_DEVICE_ADDRESS])?;
                w.write(address.addr)?;
                // Only bit 0 is defined: 0 = public, 1 = random.
                let kind: u8 = match address.kind {
                    AddrKind::Public | AddrKind::PublicIdentity => 0x00,
                    _ => 0x01,
                };
                w.write(kind)?;
            }
            AdStructure::Unknown { ty, data } => {
                w.append(&[header_len(data.len() + 1)?, *ty])?;
                w.append(data)?;
            }
        }
        Ok(())
    }

    pub fn decode(data: &[u8]) -> impl Iterator<Item = Result<AdStructure<'_>, codec::Error>> {
        AdStructureIter {
            cursor: ReadCursor::new(data),
            done: false,
        }
    }
}

fn header_len(len: usize) -> Result<u8, codec::Error> {
    u8::try_from(len).map_err(|_| codec::Error::InvalidValue)
}

/// Returns the first well formed LE Bluetooth Device Address found in the data.
pub fn find_device_address(data: &[u8]) -> Option<Address> {
    for item in AdStructure::decode(data) {
        match item {
            Ok(AdStructure::LeBluetoothDeviceAddress(address)) => return Some(address),
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    None
}

pub struct AdStructureIter<'d> {
    cursor: ReadCursor<'d>,
    done: bool,
}

impl<'d> AdStructureIter<'d> {
    fn read(&mut self) -> Result<Option<AdStructure<'d>>, codec::Error> {
        let len: u8 = self.cursor.read()?;
        // The rest is zero padding
        if len == 0 {
            return Ok(None);
        }
        let code: u8 = self.cursor.read()?;
        let data = self.cursor.slice(len as usize - 1)?;
        let item = match code {
            AD_FLAGS if data.len() == 1 => AdStructure::Flags(data[0]),
            AD_SHORTENED_LOCAL_NAME => AdStructure::ShortenedLocalName(data),
            AD_COMPLETE_LOCAL_NAME => AdStructure::CompleteLocalName(data),
            AD_SERVICE_DATA16 if data.len() >= 2 => AdStructure::ServiceData16 {
                uuid: u16::from_le_bytes([data[0], data[1]]),
                data: &data[2..],
            },
            AD_MANUFACTURER_SPECIFIC_DATA if data.len() >= 2 => AdStructure::ManufacturerSpecificData {
                company_identifier: u16::from_le_bytes([data[0], data[1]]),
                payload: &data[2..],
            },
            AD_LE_BLUETOOTH_DEVICE_ADDRESS if data.len() == 7 => {
                let mut addr = [0; 6];
                addr.copy_from_slice(&data[..6]);
                AdStructure::LeBluetoothDeviceAddress(Address {
                    kind: if data[6] & 0x01 == 0 {
                        AddrKind::Public
                    } else {
                        AddrKind::Random
                    },
                    addr: BdAddr::new(addr),
                })
            }
            ty => AdStructure::Unknown { ty, data },
        };
        Ok(Some(item))
    }
}

impl<'d> Iterator for AdStructureIter<'d> {
    type Item = Result<AdStructure<'d>, codec::Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cursor.available() == 0 {
            return None;
        }
        match self.read() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
