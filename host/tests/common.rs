use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::Infallible;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;
use tokio::time::Duration;
use trouble_pawr::driver::{HciDriver, HciMessageType};

/// Commands answered with Command Status instead of Command Complete.
const STATUS_ONLY: [u16; 2] = [0x0406, 0x2085];

/// LE Feature bit of the PAwR advertiser role.
pub const PAWR_ADVERTISER: u64 = 1 << 43;

/// A controller that answers every command the way a healthy one would, unless told otherwise.
pub struct MockController {
    inbound: Channel<NoopRawMutex, Vec<u8>, 16>,
    commands: RefCell<Vec<(u16, Vec<u8>)>>,
    failures: RefCell<HashMap<u16, u8>>,
    silenced: RefCell<Vec<u16>>,
    features: u64,
    num_sets: u8,
}

#[allow(unused)]
impl MockController {
    pub fn new() -> Self {
        Self::with_features(PAWR_ADVERTISER)
    }

    pub fn with_features(features: u64) -> Self {
        Self {
            inbound: Channel::new(),
            commands: RefCell::new(Vec::new()),
            failures: RefCell::new(HashMap::new()),
            silenced: RefCell::new(Vec::new()),
            features,
            num_sets: 1,
        }
    }

    /// Reject `opcode` with `status` from now on.
    pub fn fail(&self, opcode: u16, status: u8) {
        self.failures.borrow_mut().insert(opcode, status);
    }

    /// Never answer `opcode`.
    pub fn silence(&self, opcode: u16) {
        self.silenced.borrow_mut().push(opcode);
    }

    /// Queue an event packet for the host, starting with the event code.
    pub fn inject(&self, packet: Vec<u8>) {
        self.inbound.try_send(packet).expect("inbound queue full");
    }

    pub fn opcodes(&self) -> Vec<u16> {
        self.commands.borrow().iter().map(|(opcode, _)| *opcode).collect()
    }

    /// Parameters of every `opcode` command sent so far.
    pub fn sent(&self, opcode: u16) -> Vec<Vec<u8>> {
        self.commands
            .borrow()
            .iter()
            .filter(|(o, _)| *o == opcode)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Wait until `count` commands with `opcode` were sent, and return the last one.
    pub async fn wait_for(&self, opcode: u16, count: usize) -> Vec<u8> {
        loop {
            let sent = self.sent(opcode);
            if sent.len() >= count {
                return sent[count - 1].clone();
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn reply(&self, opcode: u16, params: &[u8]) {
        if self.silenced.borrow().contains(&opcode) {
            return;
        }
        let status = self.failures.borrow().get(&opcode).copied().unwrap_or(0);
        if STATUS_ONLY.contains(&opcode) {
            self.inject(command_status(status, opcode));
            return;
        }
        let mut ret = vec![status];
        if status == 0 {
            match opcode {
                // LE Read Local Supported Features
                0x2003 => ret.extend_from_slice(&self.features.to_le_bytes()),
                // LE Read Number of Supported Advertising Sets
                0x203b => ret.push(self.num_sets),
                // LE Set Extended Advertising Parameters, selected TX power
                0x2036 => ret.push(0xfc),
                // Both return the advertising handle.
                0x2082 | 0x2086 => ret.push(params[0]),
                _ => {}
            }
        }
        self.inject(command_complete(opcode, &ret));
    }
}

impl HciDriver for &MockController {
    type Error = Infallible;

    async fn read(&self, buf: &mut [u8]) -> Result<(HciMessageType, usize), Self::Error> {
        let packet = self.inbound.receive().await;
        buf[..packet.len()].copy_from_slice(&packet);
        Ok((HciMessageType::Event, packet.len()))
    }

    async fn write(&self, kind: HciMessageType, data: &[u8]) -> Result<(), Self::Error> {
        assert_eq!(kind, HciMessageType::Command);
        let opcode = u16::from_le_bytes([data[0], data[1]]);
        let params = &data[3..];
        assert_eq!(data[2] as usize, params.len(), "length of command 0x{:04x}", opcode);
        self.commands.borrow_mut().push((opcode, params.to_vec()));
        self.reply(opcode, params);
        Ok(())
    }
}

#[allow(unused)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn command_complete(opcode: u16, ret: &[u8]) -> Vec<u8> {
    let mut p = vec![0x0e, (3 + ret.len()) as u8, 0x01];
    p.extend_from_slice(&opcode.to_le_bytes());
    p.extend_from_slice(ret);
    p
}

pub fn command_status(status: u8, opcode: u16) -> Vec<u8> {
    let [lo, hi] = opcode.to_le_bytes();
    vec![0x0f, 0x04, status, 0x01, lo, hi]
}

fn le_meta(subevent: u8, params: &[u8]) -> Vec<u8> {
    let mut p = vec![0x3e, (1 + params.len()) as u8, subevent];
    p.extend_from_slice(params);
    p
}

#[allow(unused)]
pub fn subevent_data_request(adv_handle: u8, start: u8, count: u8) -> Vec<u8> {
    le_meta(0x27, &[adv_handle, start, count])
}

/// A response report with one complete response per `(slot, data)`.
#[allow(unused)]
pub fn response_report(adv_handle: u8, subevent: u8, responses: &[(u8, &[u8])]) -> Vec<u8> {
    let mut params = vec![adv_handle, subevent, 0x00, responses.len() as u8];
    for (slot, data) in responses {
        // tx power unavailable, -60 dBm, no CTE
        params.extend_from_slice(&[0x7f, 0xc4, 0xff, *slot, 0x00, data.len() as u8]);
        params.extend_from_slice(data);
    }
    le_meta(0x28, &params)
}

#[allow(unused)]
pub fn connection_complete_v2(status: u8, handle: u16, peer: [u8; 6], adv_handle: u8) -> Vec<u8> {
    let mut params = vec![status];
    params.extend_from_slice(&handle.to_le_bytes());
    // central, random peer address
    params.extend_from_slice(&[0x00, 0x01]);
    params.extend_from_slice(&peer);
    params.extend_from_slice(&[0; 12]);
    params.extend_from_slice(&40u16.to_le_bytes());
    params.extend_from_slice(&0u16.to_le_bytes());
    params.extend_from_slice(&400u16.to_le_bytes());
    params.push(0x00);
    params.push(adv_handle);
    params.extend_from_slice(&0xffffu16.to_le_bytes());
    le_meta(0x29, &params)
}

#[allow(unused)]
pub fn disconnection_complete(handle: u16, reason: u8) -> Vec<u8> {
    let [lo, hi] = handle.to_le_bytes();
    vec![0x05, 0x04, 0x00, lo, hi, reason]
}

/// Response data of a responder announcing its random address.
#[allow(unused)]
pub fn responder_payload(addr: [u8; 6]) -> Vec<u8> {
    let mut p = vec![0x02, 0x01, 0x06, 0x08, 0x1b];
    p.extend_from_slice(&addr);
    p.push(0x01);
    p
}
