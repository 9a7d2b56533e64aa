//! BleHost
//!
//! The host module contains the runner that owns the HCI link to the controller.
use core::cell::{Cell, RefCell};
use core::future::poll_fn;
use core::task::{Context, Poll};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::once_lock::OnceLock;
use embassy_sync::signal::Signal;
use embassy_sync::waitqueue::WakerRegistration;
use embassy_time::with_timeout;
use futures::pin_mut;
use heapless::Vec;

use crate::command::{
    self, event_mask, le_event_mask, AdvSet, Disconnect, HciCommand, LeReadLocalSupportedFeatures, LeRemoveAdvSet,
    LeSetEventMask, LeSetExtAdvEnable, LeSetPeriodicAdvEnable, LeSetRandomAddr, Reset, SetEventMask,
    LE_FEATURE_PAWR_ADVERTISER,
};
use crate::config;
use crate::connection::{ConnectionEvent, ConnectionManager, DISCONNECT_REASON_REMOTE_USER_TERMINATED};
use crate::driver::{HciDriver, HciMessageType};
use crate::event::{Event, LeEvent, Status};
use crate::pawr::{PawrEvent, ResponseReassembly, SubeventDataRequest};
use crate::{Address, BleHostError, Error};

/// Largest packet the host receives.
const MAX_HCI_PACKET_LEN: usize = 259;

/// Largest return parameter block of a Command Complete event.
const MAX_RETURN_PARAMS: usize = 252;

pub(crate) struct OnDrop<F: FnOnce()> {
    f: Option<F>,
}

impl<F: FnOnce()> OnDrop<F> {
    pub(crate) fn new(f: F) -> Self {
        Self { f: Some(f) }
    }

    pub(crate) fn defuse(mut self) {
        self.f.take();
    }
}

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f()
        }
    }
}

struct CommandResponse {
    status: Status,
    params: Vec<u8, MAX_RETURN_PARAMS>,
}

#[derive(Clone, Copy)]
struct PendingCommand {
    opcode: u16,
    status_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum SetState {
    Free,
    Active,
    /// Owner dropped the set, waiting for the runner to remove it.
    RemoveRequested,
    Removing,
}

struct Sets {
    state: [SetState; config::MAX_ADV_SETS],
    reassembly: [ResponseReassembly; config::MAX_ADV_SETS],
    removal_waker: WakerRegistration,
}

/// A BLE Host.
///
/// The BleHost holds the runtime state of the host, and is the entry point
/// for all interactions with the controller.
///
/// [`BleHost::run`] must be polled for the host to make progress. It can run in
/// the same task as the application, joined with a `select` or `join`.
pub struct BleHost<D> {
    address: Option<Address>,
    initialized: OnceLock<()>,
    pub(crate) driver: D,

    commands: Mutex<NoopRawMutex, ()>,
    pending: Cell<Option<PendingCommand>>,
    response: Signal<NoopRawMutex, CommandResponse>,
    features: Cell<u64>,

    sets: RefCell<Sets>,
    pub(crate) set_events: [Channel<NoopRawMutex, PawrEvent, { config::EVENT_QUEUE_SIZE }>; config::MAX_ADV_SETS],

    pub(crate) connections: ConnectionManager,
    pub(crate) connection_events: Channel<NoopRawMutex, ConnectionEvent, { config::CONNECTION_EVENT_QUEUE_SIZE }>,
}

impl<D: HciDriver> BleHost<D> {
    /// Create a new instance of the BLE host.
    pub fn new(driver: D) -> Self {
        Self {
            address: None,
            initialized: OnceLock::new(),
            driver,
            commands: Mutex::new(()),
            pending: Cell::new(None),
            response: Signal::new(),
            features: Cell::new(0),
            sets: RefCell::new(Sets {
                state: [SetState::Free; config::MAX_ADV_SETS],
                reassembly: core::array::from_fn(|_| ResponseReassembly::new()),
                removal_waker: WakerRegistration::new(),
            }),
            set_events: core::array::from_fn(|_| Channel::new()),
            connections: ConnectionManager::new(),
            connection_events: Channel::new(),
        }
    }

    /// Set the random address used by this host.
    pub fn set_random_address(&mut self, address: Address) {
        self.address.replace(address);
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    /// Whether the controller supports the PAwR advertiser role.
    ///
    /// Only meaningful once the host is initialized.
    pub fn supports_pawr(&self) -> bool {
        self.features.get() & LE_FEATURE_PAWR_ADVERTISER != 0
    }

    /// Wait until the runner has initialized the controller.
    pub async fn wait_ready(&self) {
        let _ = self.initialized.get().await;
    }

    /// Run a HCI command and return the response.
    ///
    /// Waits for the host to be initialized.
    pub async fn command<C: HciCommand>(&self, cmd: C) -> Result<C::Return, BleHostError<D::Error>> {
        self.wait_ready().await;
        self.exec(&cmd).await
    }

    async fn exec<C: HciCommand>(&self, cmd: &C) -> Result<C::Return, BleHostError<D::Error>> {
        let mut packet = [0; command::HEADER_SIZE + command::MAX_PARAMS_SIZE];
        let len = command::encode(cmd, &mut packet)?;

        let _guard = self.commands.lock().await;
        self.response.reset();
        self.pending.set(Some(PendingCommand {
            opcode: C::OPCODE,
            status_only: C::STATUS_ONLY,
        }));
        let _pending = OnDrop::new(|| self.pending.set(None));

        trace!("[host] sending command 0x{:04x}", C::OPCODE);
        self.driver
            .write(HciMessageType::Command, &packet[..len])
            .await
            .map_err(BleHostError::Controller)?;

        let response = with_timeout(config::COMMAND_TIMEOUT, self.response.wait())
            .await
            .map_err(|_| {
                warn!("[host] command 0x{:04x} timed out", C::OPCODE);
                Error::Timeout
            })?;
        response.status.to_result().map_err(Error::Hci)?;
        Ok(C::decode_return(&response.params)?)
    }

    /// Claim a free advertising set handle.
    pub(crate) fn allocate_set(&self) -> Result<u8, Error> {
        let mut sets = self.sets.borrow_mut();
        let idx = sets
            .state
            .iter()
            .position(|s| *s == SetState::Free)
            .ok_or(Error::Busy)?;
        sets.state[idx] = SetState::Active;
        sets.reassembly[idx] = ResponseReassembly::new();
        self.set_events[idx].clear();
        Ok(idx as u8)
    }

    /// Hand a set back, the runner stops and removes it from the controller.
    pub(crate) fn release_set(&self, handle: u8) {
        let mut guard = self.sets.borrow_mut();
        let sets = &mut *guard;
        if let Some(state) = sets.state.get_mut(handle as usize) {
            if *state == SetState::Active {
                *state = SetState::RemoveRequested;
                sets.removal_waker.wake();
            }
        }
    }

    /// Free a set that never made it to the controller.
    pub(crate) fn free_set(&self, handle: u8) {
        if let Some(state) = self.sets.borrow_mut().state.get_mut(handle as usize) {
            *state = SetState::Free;
        }
    }

    fn poll_removal(&self, cx: &mut Context<'_>) -> Poll<u8> {
        let mut sets = self.sets.borrow_mut();
        sets.removal_waker.register(cx.waker());
        for (idx, state) in sets.state.iter_mut().enumerate() {
            if *state == SetState::RemoveRequested {
                *state = SetState::Removing;
                return Poll::Ready(idx as u8);
            }
        }
        Poll::Pending
    }

    fn active_set(&self, handle: u8) -> Option<usize> {
        let sets = self.sets.borrow();
        match sets.state.get(handle as usize) {
            Some(SetState::Active) => Some(handle as usize),
            _ => None,
        }
    }

    fn deliver(&self, idx: usize, event: PawrEvent) {
        if self.set_events[idx].try_send(event).is_err() {
            warn!("[host] event queue of advertising set {} is full, dropping event", idx);
        }
    }

    fn deliver_connection_event(&self, event: ConnectionEvent) {
        if self.connection_events.try_send(event).is_err() {
            warn!("[host] connection event queue is full, dropping event");
        }
    }

    // Runner side of a command: the response the current command waits for.
    fn complete_command(&self, opcode: u16, status: Status, params: &[u8], command_status: bool) {
        match self.pending.get() {
            Some(pending) if pending.opcode == opcode => {
                // A command that expects Command Complete can still be rejected with Command Status.
                if command_status && !pending.status_only && status == Status::SUCCESS {
                    return;
                }
                let Ok(params) = Vec::from_slice(params) else {
                    warn!("[host] return parameters of command 0x{:04x} too long", opcode);
                    return;
                };
                self.response.signal(CommandResponse { status, params });
            }
            // Controller readiness notification
            _ if opcode == 0 => {}
            _ => {
                warn!("[host] unexpected response to command 0x{:04x}", opcode);
            }
        }
    }

    fn handle_event(&self, event: Event<'_>) {
        match event {
            Event::CommandComplete(cc) => {
                self.complete_command(cc.opcode, cc.status(), cc.return_params(), false);
            }
            Event::CommandStatus { status, opcode, .. } => {
                self.complete_command(opcode, status, &[], true);
            }
            Event::DisconnectionComplete { status, handle, reason } => {
                if status != Status::SUCCESS {
                    warn!("[host] disconnect of {} failed: {:?}", handle, status);
                    return;
                }
                match self.connections.disconnected(handle, reason) {
                    Ok(event) => {
                        info!("[host] connection {} disconnected, reason 0x{:02x}", handle, reason);
                        self.deliver_connection_event(event);
                    }
                    Err(_) => {
                        debug!("[host] disconnect of unknown connection {}", handle);
                    }
                }
            }
            Event::HardwareError { code } => {
                error!("[host] controller hardware error 0x{:02x}", code);
            }
            Event::Le(LeEvent::ConnectionComplete(complete)) => match self.connections.connected(&complete) {
                Ok(event) => {
                    info!("[host] connection complete {:?}", complete.status);
                    self.deliver_connection_event(event);
                }
                Err(e) => {
                    warn!("[host] unexpected connection {}: {:?}", complete.handle, e);
                    if complete.status == Status::SUCCESS {
                        if let Err(e) = self
                            .connections
                            .request_disconnect(complete.handle, DISCONNECT_REASON_REMOTE_USER_TERMINATED)
                        {
                            warn!("[host] unable to queue disconnect of {}: {:?}", complete.handle, e);
                        }
                    }
                }
            },
            Event::Le(LeEvent::AdvSetTerminated {
                status, adv_handle, ..
            }) => {
                debug!("[host] advertising set {} terminated: {:?}", adv_handle, status);
            }
            Event::Le(LeEvent::SubeventDataRequest {
                adv_handle,
                subevent_start,
                subevent_count,
            }) => {
                let Some(idx) = self.active_set(adv_handle) else {
                    debug!("[host] data request for unknown set {}", adv_handle);
                    return;
                };
                self.deliver(
                    idx,
                    PawrEvent::DataRequest(SubeventDataRequest {
                        adv_handle,
                        start: subevent_start,
                        count: subevent_count,
                    }),
                );
            }
            Event::Le(LeEvent::ResponseReport(report)) => {
                let Some(idx) = self.active_set(report.adv_handle) else {
                    debug!("[host] response report for unknown set {}", report.adv_handle);
                    return;
                };
                for response in report.responses() {
                    let response = match response {
                        Ok(response) => response,
                        Err(e) => {
                            warn!("[host] malformed response report: {:?}", e);
                            break;
                        }
                    };
                    let event = self.sets.borrow_mut().reassembly[idx].process(
                        report.subevent,
                        report.tx_status,
                        &response,
                    );
                    if let Some(event) = event {
                        self.deliver(idx, event);
                    }
                }
            }
            Event::Le(LeEvent::Unknown { subevent }) => {
                trace!("[host] ignoring LE event 0x{:02x}", subevent);
            }
            Event::Unknown { code } => {
                trace!("[host] ignoring event 0x{:02x}", code);
            }
        }
    }

    async fn init(&self) -> Result<(), BleHostError<D::Error>> {
        self.exec(&Reset).await?;
        self.exec(&SetEventMask(
            event_mask::DISCONNECTION_COMPLETE | event_mask::HARDWARE_ERROR | event_mask::LE_META,
        ))
        .await?;
        self.exec(&LeSetEventMask(
            le_event_mask::CONNECTION_COMPLETE
                | le_event_mask::ENHANCED_CONNECTION_COMPLETE
                | le_event_mask::ADV_SET_TERMINATED
                | le_event_mask::PERIODIC_ADV_SUBEVENT_DATA_REQUEST
                | le_event_mask::PERIODIC_ADV_RESPONSE_REPORT
                | le_event_mask::ENHANCED_CONNECTION_COMPLETE_V2,
        ))
        .await?;

        let features = self.exec(&LeReadLocalSupportedFeatures).await?;
        self.features.set(features);
        info!("[host] controller supports PAwR advertiser: {}", self.supports_pawr());

        if let Some(addr) = self.address {
            self.exec(&LeSetRandomAddr(addr.addr)).await?;
            info!("[host] address set to {}", addr);
        }
        Ok(())
    }

    async fn remove_set(&self, handle: u8) -> Result<(), BleHostError<D::Error>> {
        // Either may already be stopped.
        ignore_hci(
            self.exec(&LeSetPeriodicAdvEnable {
                enable: false,
                include_adi: false,
                handle,
            })
            .await,
        )?;
        ignore_hci(
            self.exec(&LeSetExtAdvEnable {
                enable: false,
                sets: &[AdvSet {
                    handle,
                    duration: 0,
                    max_events: 0,
                }],
            })
            .await,
        )?;
        ignore_hci(self.exec(&LeRemoveAdvSet { handle }).await)?;
        self.set_events[handle as usize].clear();
        self.free_set(handle);
        debug!("[host] advertising set {} removed", handle);
        Ok(())
    }

    // Initializes the controller and sends commands on behalf of the runner.
    async fn control(&self) -> Result<(), BleHostError<D::Error>> {
        self.init().await?;
        let _ = self.initialized.init(());
        info!("[host] initialized");

        loop {
            match select(
                poll_fn(|cx| self.connections.poll_disconnecting(Some(cx))),
                poll_fn(|cx| self.poll_removal(cx)),
            )
            .await
            {
                Either::First((handle, reason)) => {
                    ignore_hci(self.exec(&Disconnect { handle, reason }).await)?;
                }
                Either::Second(handle) => {
                    self.remove_set(handle).await?;
                }
            }
        }
    }

    /// Run the host.
    ///
    /// Initializes the controller, then processes events and serves disconnect and
    /// set removal requests. Returns only if the driver fails or the controller
    /// rejects initialization.
    pub async fn run(&self) -> Result<(), BleHostError<D::Error>> {
        let control_fut = self.control();
        pin_mut!(control_fut);

        loop {
            // Task handling receiving data from the controller.
            let rx_fut = async {
                let mut rx = [0u8; MAX_HCI_PACKET_LEN];
                let (kind, len) = self.driver.read(&mut rx).await?;
                match kind {
                    HciMessageType::Event => match Event::decode(&rx[..len]) {
                        Ok(event) => self.handle_event(event),
                        Err(e) => warn!("[host] unable to decode event: {:?}", e),
                    },
                    kind => {
                        trace!("[host] ignoring packet {:?}", kind);
                    }
                }
                Ok::<(), D::Error>(())
            };

            match select(&mut control_fut, rx_fut).await {
                Either::First(result) => return result,
                Either::Second(Ok(())) => {}
                Either::Second(Err(e)) => {
                    #[cfg(feature = "defmt")]
                    warn!("[host] error from controller: {:?}", defmt::Debug2Format(&e));
                    #[cfg(not(feature = "defmt"))]
                    warn!("[host] error from controller: {:?}", e);
                    return Err(BleHostError::Controller(e));
                }
            }
        }
    }
}

/// Log and drop a command rejection, keep driver failures.
fn ignore_hci<T, E>(result: Result<T, BleHostError<E>>) -> Result<(), BleHostError<E>> {
    match result {
        Ok(_) => Ok(()),
        Err(BleHostError::BleHost(e)) => {
            debug!("[host] command rejected: {:?}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}
