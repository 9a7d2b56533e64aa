//! PAwR advertiser.
//!
//! Sends a packet counter in every subevent of a periodic advertising train and logs
//! the address of every responder that answers in one of the response slots.
use core::cell::Cell;

use embassy_futures::select::{select, Either};
use embassy_time::Duration;
use trouble_pawr::pawr::SubeventDataBuffer;
use trouble_pawr::prelude::*;

/// Settings of the demo. The defaults describe one subevent with two response slots.
#[derive(Debug, Clone, Copy)]
pub struct PawrDemoConfig {
    pub address: Address,
    pub name: &'static [u8],
    pub advertisement: AdvertisementParameters,
    pub periodic: PeriodicAdvertisementParameters,
    /// Connect to the first responder that announces its address.
    pub connect_to_responders: bool,
    pub connect_params: ConnectParams,
}

impl Default for PawrDemoConfig {
    fn default() -> Self {
        Self {
            address: Address::random([0xff, 0x8f, 0x1a, 0x05, 0xe4, 0xff]),
            name: b"PAwR conn sample",
            advertisement: AdvertisementParameters {
                primary_phy: PhyKind::LeCoded,
                secondary_phy: PhyKind::LeCoded,
                tx_power: None,
                interval_min: Duration::from_millis(100),
                interval_max: Duration::from_millis(150),
                ..Default::default()
            },
            periodic: PeriodicAdvertisementParameters {
                interval_min: Duration::from_micros(40_000),
                interval_max: Duration::from_micros(40_000),
                include_tx_power: false,
                num_subevents: 1,
                subevent_interval: Duration::from_micros(35_000),
                response_slot_delay: Duration::from_micros(20_000),
                response_slot_spacing: Duration::from_micros(6_250),
                num_response_slots: 2,
            },
            connect_to_responders: false,
            connect_params: ConnectParams::default(),
        }
    }
}

/// Handler of the demo's advertising set.
pub struct PawrDemo {
    counter: u32,
    num_subevents: u8,
    connect_to_responders: bool,
}

impl PawrDemo {
    pub fn new(num_subevents: u8, connect_to_responders: bool) -> Self {
        Self {
            counter: 0,
            num_subevents,
            connect_to_responders,
        }
    }

    /// Number of data requests served so far.
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl PawrHandler for PawrDemo {
    fn on_data_request(&mut self, request: &SubeventDataRequest, data: &mut SubeventDataBuffer) {
        self.counter = self.counter.wrapping_add(1);
        info!("request {} to {} at {}", request.start, request.count, self.counter);

        let payload = self.counter.to_le_bytes();
        for subevent in request.subevents(self.num_subevents) {
            let entry = unwrap!(SubeventData::new(subevent, 0, 1, &payload));
            if data.push(entry).is_err() {
                warn!("no room for subevent {}", subevent);
                break;
            }
        }
    }

    fn on_data_rejected(&mut self, error: Error) {
        warn!("Failed to set subevent data (err {:?})", error);
    }

    fn on_response(&mut self, info: &ResponseInfo, data: Option<&[u8]>) -> ResponseAction {
        let Some(address) = data.and_then(find_device_address) else {
            return ResponseAction::Ignore;
        };
        info!("Address {} in subevent {}", address, info.subevent);
        if self.connect_to_responders {
            ResponseAction::Connect(address)
        } else {
            ResponseAction::Ignore
        }
    }

    fn on_connection_event(&mut self, event: &ConnectionEvent) {
        match *event {
            ConnectionEvent::Connected { status, .. } => info!("Connected (err 0x{:02X})", status.into_inner()),
            ConnectionEvent::Disconnected { reason, .. } => info!("Disconnected (reason 0x{:02X})", reason),
        }
    }
}

fn failed<E: core::fmt::Debug>(step: &str, err: &BleHostError<E>) {
    #[cfg(feature = "defmt")]
    error!("Failed to {} (err {:?})", step, defmt::Debug2Format(err));
    #[cfg(not(feature = "defmt"))]
    error!("Failed to {} (err {:?})", step, err);
}

macro_rules! step {
    ($fut:expr, $what:literal) => {
        match $fut.await {
            Ok(value) => value,
            Err(e) => {
                failed($what, &e);
                return;
            }
        }
    };
}

async fn advertise<D: HciDriver>(host: &BleHost<D>, config: &PawrDemoConfig, ready: &Cell<bool>) {
    host.wait_ready().await;
    ready.set(true);

    let mut set = step!(
        Broadcaster::new(host).create_set(&config.advertisement),
        "create advertising set"
    );
    set.set_connect_params(config.connect_params);

    let mut adv_data = [0; 31];
    let len = match AdStructure::encode_slice(&[AdStructure::CompleteLocalName(config.name)], &mut adv_data[..]) {
        Ok(len) => len,
        Err(e) => {
            failed::<D::Error>("set advertising data", &e.into());
            return;
        }
    };
    step!(set.set_data(&adv_data[..len]), "set advertising data");
    step!(
        set.set_periodic_params(&config.periodic),
        "set periodic advertising parameters"
    );
    step!(set.start_periodic(), "enable periodic advertising");

    info!("Start Periodic Advertising");
    step!(set.start(), "start extended advertising");

    let mut demo = PawrDemo::new(config.periodic.num_subevents, config.connect_to_responders);
    if let Err(e) = set.run(&mut demo).await {
        failed("serve periodic advertising", &e);
    }
}

/// Run the PAwR advertiser on `driver` until a step fails or the driver stops.
pub async fn run<D: HciDriver>(driver: D, config: &PawrDemoConfig) {
    info!("Starting Periodic Advertising Demo");

    let mut host = BleHost::new(driver);
    host.set_random_address(config.address);
    let host = host;
    info!("Our address = {}", config.address);

    let ready = Cell::new(false);
    match select(host.run(), advertise(&host, config, &ready)).await {
        Either::First(Err(e)) if !ready.get() => {
            #[cfg(feature = "defmt")]
            error!("Bluetooth init failed (err {:?})", defmt::Debug2Format(&e));
            #[cfg(not(feature = "defmt"))]
            error!("Bluetooth init failed (err {:?})", e);
        }
        Either::First(Err(e)) => failed("run the host", &e),
        Either::First(Ok(())) | Either::Second(()) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: u8, count: u8) -> SubeventDataRequest {
        SubeventDataRequest {
            adv_handle: 0,
            start,
            count,
        }
    }

    fn info(subevent: u8) -> ResponseInfo {
        ResponseInfo {
            subevent,
            tx_status: 0,
            tx_power: 0x7f,
            rssi: -60,
            cte_type: 0xff,
            response_slot: 1,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = PawrDemoConfig::default();
        unwrap!(config.periodic.validate());
        assert_eq!(config.periodic.num_subevents, 1);
        assert!(config.address.is_static_random());
        assert!(!config.connect_to_responders);
    }

    #[test]
    fn every_request_sends_the_next_counter() {
        let mut demo = PawrDemo::new(1, false);
        let mut data = SubeventDataBuffer::new();
        demo.on_data_request(&request(0, 1), &mut data);
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].subevent, 0);
        assert_eq!(data[0].response_slot_start, 0);
        assert_eq!(data[0].response_slot_count, 1);
        assert_eq!(&data[0].data[..], &[1, 0, 0, 0]);

        let mut data = SubeventDataBuffer::new();
        demo.on_data_request(&request(0, 1), &mut data);
        assert_eq!(&data[0].data[..], &[2, 0, 0, 0]);
        assert_eq!(demo.counter(), 2);
    }

    #[test]
    fn counter_wraps() {
        let mut demo = PawrDemo::new(1, false);
        demo.counter = u32::MAX;
        let mut data = SubeventDataBuffer::new();
        demo.on_data_request(&request(0, 1), &mut data);
        assert_eq!(&data[0].data[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn all_requested_subevents_get_data() {
        let mut demo = PawrDemo::new(3, false);
        let mut data = SubeventDataBuffer::new();
        demo.on_data_request(&request(2, 2), &mut data);
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].subevent, 2);
        assert_eq!(data[1].subevent, 0);
    }

    #[test]
    fn responders_are_recognized_by_address() {
        let mut demo = PawrDemo::new(1, false);
        let payload = [
            0x02, 0x01, 0x06, 0x08, 0x1b, 0x11, 0x22, 0x33, 0x44, 0x55, 0xc6, 0x01,
        ];
        assert_eq!(demo.on_response(&info(0), Some(&payload)), ResponseAction::Ignore);
        assert_eq!(demo.on_response(&info(0), None), ResponseAction::Ignore);

        let mut demo = PawrDemo::new(1, true);
        assert_eq!(
            demo.on_response(&info(0), Some(&payload)),
            ResponseAction::Connect(Address::random([0x11, 0x22, 0x33, 0x44, 0x55, 0xc6]))
        );
        // No address structure, nothing to connect to.
        assert_eq!(demo.on_response(&info(0), Some(&payload[..3])), ResponseAction::Ignore);
    }
}
