//! Shared contexts handed to the co-processor transfer tasks
//!
//! Everything here is built exactly once by [`init_contexts`] before any
//! transfer task starts. The transfer tasks own the queue contents; the
//! references themselves never change afterwards.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::pipe::Pipe;
use embassy_time::Timer;
use embedded_hal::digital::{InputPin, OutputPin};
use heapless::Vec;

use super::status::StatusBridge;

/// Depth of the data-plane and control-plane send queues
pub const QUEUE_LEN: usize = 4;

/// Largest frame exchanged with the co-processor
pub const MAX_FRAME_LEN: usize = 1536;

/// Capacity of the control-plane response pipe
pub const RESPONSE_BUFFER_LEN: usize = 512;

pub type PacketBuffer = Vec<u8, MAX_FRAME_LEN>;
pub type PacketQueue = Channel<CriticalSectionRawMutex, PacketBuffer, QUEUE_LEN>;
pub type ResponsePipe = Pipe<CriticalSectionRawMutex, RESPONSE_BUFFER_LEN>;

/// Packet count shared between a transfer task and its readers
pub struct PacketCounter {
    count: Mutex<CriticalSectionRawMutex, Cell<u32>>,
}

impl PacketCounter {
    pub const fn new() -> Self {
        Self {
            count: Mutex::new(Cell::new(0)),
        }
    }

    pub fn get(&self) -> u32 {
        self.count.lock(|c| c.get())
    }

    pub fn increment(&self) {
        self.count.lock(|c| c.set(c.get().saturating_add(1)));
    }

    pub fn decrement(&self) {
        self.count.lock(|c| c.set(c.get().saturating_sub(1)));
    }
}

impl Default for PacketCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the outbound packets still waiting for the
/// co-processor
#[derive(Clone, Copy)]
pub struct TxBacklog<'a> {
    counter: &'a PacketCounter,
}

impl<'a> TxBacklog<'a> {
    pub fn new(counter: &'a PacketCounter) -> Self {
        Self { counter }
    }

    pub fn pending(&self) -> u32 {
        self.counter.get()
    }
}

/// Queues and counters shared by the transfer tasks
///
/// Meant to live in a `static`:
/// ```ignore
/// static QUEUES: SharedQueues = SharedQueues::new();
/// ```
pub struct SharedQueues {
    pub data_send: PacketQueue,
    pub control_send: PacketQueue,
    pub control_response: ResponsePipe,
    pub tx_waiting: PacketCounter,
    pub rx_waiting: PacketCounter,
}

impl SharedQueues {
    pub const fn new() -> Self {
        Self {
            data_send: Channel::new(),
            control_send: Channel::new(),
            control_response: Pipe::new(),
            tx_waiting: PacketCounter::new(),
            rx_waiting: PacketCounter::new(),
        }
    }
}

impl Default for SharedQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// GPIO lines wired to the co-processor
pub struct CoprocessorPins<FLOW, RESET, NSS, NOTIFY> {
    /// Co-processor ready to accept a transfer
    pub flow: FLOW,
    pub reset: RESET,
    /// SPI chip select
    pub nss: NSS,
    /// Co-processor has data for us
    pub notify: NOTIFY,
}

/// Everything the data-plane transfer task reads
pub struct DataPlaneContext<'a, FLOW, RESET, NSS, NOTIFY> {
    pub pins: CoprocessorPins<FLOW, RESET, NSS, NOTIFY>,
    pub data_send: &'a PacketQueue,
    pub control_send: &'a PacketQueue,
    pub control_response: &'a ResponsePipe,
    pub tx_waiting: &'a PacketCounter,
    pub rx_waiting: &'a PacketCounter,
}

impl<FLOW, RESET, NSS, NOTIFY> DataPlaneContext<'_, FLOW, RESET, NSS, NOTIFY>
where
    FLOW: InputPin,
    RESET: OutputPin,
    NSS: OutputPin,
    NOTIFY: InputPin,
{
    /// Pulse the reset line and leave chip select released
    pub async fn reset_coprocessor(&mut self) -> Result<(), RESET::Error> {
        info!("Performing co-processor hardware reset...");
        // Chip select is active low
        if self.pins.nss.set_high().is_err() {
            warn!("Failed to release co-processor chip select");
        }
        self.pins.reset.set_low()?;
        Timer::after_millis(1).await;
        self.pins.reset.set_high()?;
        Timer::after_millis(2).await;
        Ok(())
    }

    /// Co-processor is ready for a transfer and has something to send
    pub fn rx_ready(&mut self) -> Result<bool, NOTIFY::Error> {
        self.pins.notify.is_high()
    }

    pub fn flow_ready(&mut self) -> Result<bool, FLOW::Error> {
        self.pins.flow.is_high()
    }
}

/// Everything the control-plane router reads
pub struct ControlPlaneContext<'a> {
    bridge: &'a StatusBridge<'a>,
    pub control_send: &'a PacketQueue,
    pub control_response: &'a ResponsePipe,
}

impl ControlPlaneContext<'_> {
    /// Event callback for status frames from the co-processor
    pub fn notify_status(&self, code: u8) {
        self.bridge.on_raw_status(code);
    }
}

pub struct NetContexts<'a, FLOW, RESET, NSS, NOTIFY> {
    pub data_plane: DataPlaneContext<'a, FLOW, RESET, NSS, NOTIFY>,
    pub control_plane: ControlPlaneContext<'a>,
    /// For the connection manager
    pub tx_backlog: TxBacklog<'a>,
}

/// Wire the transfer task contexts to the shared queues
///
/// The status bridge becomes the control plane's event callback. Call
/// once, before spawning the transfer tasks.
pub fn init_contexts<'a, FLOW, RESET, NSS, NOTIFY>(
    queues: &'a SharedQueues,
    bridge: &'a StatusBridge<'a>,
    pins: CoprocessorPins<FLOW, RESET, NSS, NOTIFY>,
) -> NetContexts<'a, FLOW, RESET, NSS, NOTIFY> {
    debug!("Initializing co-processor contexts");

    NetContexts {
        data_plane: DataPlaneContext {
            pins,
            data_send: &queues.data_send,
            control_send: &queues.control_send,
            control_response: &queues.control_response,
            tx_waiting: &queues.tx_waiting,
            rx_waiting: &queues.rx_waiting,
        },
        control_plane: ControlPlaneContext {
            bridge,
            control_send: &queues.control_send,
            control_response: &queues.control_response,
        },
        tx_backlog: TxBacklog::new(&queues.tx_waiting),
    }
}
