//! Functionality for the BLE broadcaster role with periodic advertising.
use embassy_futures::select::{select, Either};

use crate::address::AddrKind;
use crate::advertise::{AdvertisementParameters, PeriodicAdvertisementParameters};
use crate::command::{
    AdvSet, LeExtCreateConnV2, LeReadNumberOfSupportedAdvSets, LeSetAdvSetRandomAddr, LeSetExtAdvData,
    LeSetExtAdvEnable, LeSetPeriodicAdvData, LeSetPeriodicAdvEnable, LeSetPeriodicAdvSubeventData,
};
use crate::connection::{ConnectParams, ConnectionEvent, DISCONNECT_REASON_REMOTE_USER_TERMINATED};
use crate::driver::HciDriver;
use crate::host::{BleHost, OnDrop};
use crate::pawr::{PawrEvent, PawrHandler, ResponseAction, SubeventData, SubeventDataBuffer};
use crate::{Address, BleHostError, Error};

/// Type which implements the BLE broadcaster role.
pub struct Broadcaster<'h, D: HciDriver> {
    host: &'h BleHost<D>,
}

impl<'h, D: HciDriver> Broadcaster<'h, D> {
    pub fn new(host: &'h BleHost<D>) -> Self {
        Self { host }
    }

    /// Create a non-connectable, non-scannable extended advertising set.
    ///
    /// The set is not advertising until [`AdvertisingSet::start`] is called.
    pub async fn create_set(
        &self,
        params: &AdvertisementParameters,
    ) -> Result<AdvertisingSet<'h, D>, BleHostError<D::Error>> {
        let host = self.host;
        let supported = host.command(LeReadNumberOfSupportedAdvSets).await?;
        let handle = host.allocate_set()?;
        let guard = OnDrop::new(|| host.free_set(handle));
        if handle >= supported {
            warn!("[adv] controller supports {} advertising sets", supported);
            return Err(Error::NotSupported.into());
        }

        let own_addr_kind = host.address().map(|a| a.kind).unwrap_or(AddrKind::Public);
        let selected_tx_power = host.command(params.to_hci(handle, own_addr_kind)?).await?;
        if let Some(address) = host.address() {
            host.command(LeSetAdvSetRandomAddr {
                handle,
                addr: address.addr,
            })
            .await?;
        }
        guard.defuse();
        debug!("[adv] created set {}, tx power {} dBm", handle, selected_tx_power);

        Ok(AdvertisingSet {
            host,
            handle,
            params: *params,
            selected_tx_power,
            num_subevents: 0,
            connect_params: ConnectParams::default(),
        })
    }
}

/// An extended advertising set and its periodic advertising train.
///
/// Dropping the set stops it and removes it from the controller.
pub struct AdvertisingSet<'h, D: HciDriver> {
    host: &'h BleHost<D>,
    handle: u8,
    params: AdvertisementParameters,
    selected_tx_power: i8,
    num_subevents: u8,
    connect_params: ConnectParams,
}

impl<'h, D: HciDriver> AdvertisingSet<'h, D> {
    pub fn handle(&self) -> u8 {
        self.handle
    }

    /// TX power chosen by the controller, in dBm.
    pub fn selected_tx_power(&self) -> i8 {
        self.selected_tx_power
    }

    /// Number of PAwR subevents, 0 for plain periodic advertising.
    pub fn num_subevents(&self) -> u8 {
        self.num_subevents
    }

    /// Parameters used when a [`PawrHandler`] asks to connect to a responder.
    pub fn set_connect_params(&mut self, params: ConnectParams) {
        self.connect_params = params;
    }

    /// Set the extended advertising data. Use [`crate::ad_structure::AdStructure::encode_slice`] to build it.
    pub async fn set_data(&self, data: &[u8]) -> Result<(), BleHostError<D::Error>> {
        self.host
            .command(LeSetExtAdvData {
                handle: self.handle,
                data,
            })
            .await
    }

    pub async fn set_periodic_params(
        &mut self,
        params: &PeriodicAdvertisementParameters,
    ) -> Result<(), BleHostError<D::Error>> {
        let cmd = params.to_hci(self.handle)?;
        if params.num_subevents > 0 && !self.host.supports_pawr() {
            return Err(Error::NotSupported.into());
        }
        self.host.command(cmd).await?;
        self.num_subevents = params.num_subevents;
        Ok(())
    }

    /// Set the periodic advertising data, for periodic advertising without subevents.
    pub async fn set_periodic_data(&self, data: &[u8]) -> Result<(), BleHostError<D::Error>> {
        if self.num_subevents > 0 {
            return Err(Error::InvalidValue.into());
        }
        self.host
            .command(LeSetPeriodicAdvData {
                handle: self.handle,
                data,
            })
            .await
    }

    pub async fn start_periodic(&self) -> Result<(), BleHostError<D::Error>> {
        self.periodic_enable(true).await
    }

    pub async fn stop_periodic(&self) -> Result<(), BleHostError<D::Error>> {
        self.periodic_enable(false).await
    }

    async fn periodic_enable(&self, enable: bool) -> Result<(), BleHostError<D::Error>> {
        self.host
            .command(LeSetPeriodicAdvEnable {
                enable,
                include_adi: false,
                handle: self.handle,
            })
            .await
    }

    /// Start extended advertising.
    pub async fn start(&self) -> Result<(), BleHostError<D::Error>> {
        let set = AdvSet {
            handle: self.handle,
            duration: self.params.duration()?,
            max_events: self.params.max_events.unwrap_or(0),
        };
        self.host
            .command(LeSetExtAdvEnable {
                enable: true,
                sets: &[set],
            })
            .await
    }

    /// Stop extended advertising. Periodic advertising keeps running.
    pub async fn stop(&self) -> Result<(), BleHostError<D::Error>> {
        let set = AdvSet {
            handle: self.handle,
            duration: 0,
            max_events: 0,
        };
        self.host
            .command(LeSetExtAdvEnable {
                enable: false,
                sets: &[set],
            })
            .await
    }

    /// Provide data for upcoming subevents, usually in response to a data request.
    pub async fn set_subevent_data(&self, data: &[SubeventData]) -> Result<(), BleHostError<D::Error>> {
        if data.is_empty() || data.iter().any(|d| d.subevent >= self.num_subevents) {
            return Err(Error::InvalidValue.into());
        }
        self.host
            .command(LeSetPeriodicAdvSubeventData {
                handle: self.handle,
                subevents: data,
            })
            .await?;
        Ok(())
    }

    /// Connect to a responder through one of the subevents.
    ///
    /// Returns once the controller accepted the request. The outcome is delivered as
    /// a [`ConnectionEvent`].
    pub async fn connect(
        &self,
        peer: Address,
        subevent: u8,
        params: &ConnectParams,
    ) -> Result<(), BleHostError<D::Error>> {
        if subevent >= self.num_subevents {
            return Err(Error::InvalidValue.into());
        }
        let (phys, phy_params) = params.to_hci()?;
        let connections = &self.host.connections;
        connections.connect(self.handle, subevent, peer)?;
        let guard = OnDrop::new(|| connections.cancel());
        self.host
            .command(LeExtCreateConnV2 {
                adv_handle: self.handle,
                subevent,
                own_addr_kind: self.host.address().map(|a| a.kind).unwrap_or(AddrKind::Public),
                peer,
                phys,
                params: phy_params,
            })
            .await?;
        guard.defuse();
        Ok(())
    }

    /// Ask the runner to disconnect the connection.
    pub fn disconnect(&self, handle: u16) -> Result<(), BleHostError<D::Error>> {
        if !self.host.connections.is_connected(handle) {
            return Err(Error::NotFound.into());
        }
        self.host
            .connections
            .request_disconnect(handle, DISCONNECT_REASON_REMOTE_USER_TERMINATED)?;
        Ok(())
    }

    /// Wait for the next data request or response of this set.
    pub async fn next_event(&self) -> PawrEvent {
        self.host.set_events[self.handle as usize].receive().await
    }

    pub async fn next_connection_event(&self) -> ConnectionEvent {
        self.host.connection_events.receive().await
    }

    /// Serve data requests, responses and connection events with `handler`.
    ///
    /// Rejected subevent data is reported to the handler. Returns only on driver errors.
    pub async fn run<H: PawrHandler>(&self, handler: &mut H) -> Result<(), BleHostError<D::Error>> {
        loop {
            match select(self.next_event(), self.next_connection_event()).await {
                Either::First(PawrEvent::DataRequest(request)) => {
                    let mut data = SubeventDataBuffer::new();
                    handler.on_data_request(&request, &mut data);
                    if data.is_empty() {
                        continue;
                    }
                    match self.set_subevent_data(&data).await {
                        Ok(()) => {}
                        Err(BleHostError::BleHost(e)) => handler.on_data_rejected(e),
                        Err(e) => return Err(e),
                    }
                }
                Either::First(PawrEvent::Response { info, data }) => {
                    let ResponseAction::Connect(peer) = handler.on_response(&info, data.as_deref()) else {
                        continue;
                    };
                    if !self.host.connections.is_idle() {
                        debug!("[adv] already connecting or connected, not connecting to {}", peer);
                        continue;
                    }
                    match self.connect(peer, info.subevent, &self.connect_params).await {
                        Ok(()) => info!("[adv] connecting to {} in subevent {}", peer, info.subevent),
                        Err(BleHostError::BleHost(e)) => warn!("[adv] unable to connect to {}: {:?}", peer, e),
                        Err(e) => return Err(e),
                    }
                }
                Either::Second(event) => handler.on_connection_event(&event),
            }
        }
    }
}

impl<D: HciDriver> Drop for AdvertisingSet<'_, D> {
    fn drop(&mut self) {
        self.host.release_set(self.handle);
    }
}
