//! Per-port request worker
//!
//! A serial bus carries one transaction at a time. [`spawn`] moves a
//! [`Pzem`] into its own task and hands out a cloneable [`PzemHandle`];
//! requests from all handles are queued and executed strictly in arrival
//! order.

use crate::device::Pzem;
use crate::measurement::MeasurementSnapshot;
use crate::reset::ResetOutcome;
use pzem_core::{PzemError, PzemResult};
use pzem_session::FrameExchange;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Requests waiting for the worker before callers are held back
const QUEUE_CAPACITY: usize = 32;

type Reply<T> = oneshot::Sender<PzemResult<T>>;

enum Request {
    ReadMeasurements(Reply<MeasurementSnapshot>),
    SetAlarmThreshold(u16, Reply<()>),
    GetAlarmThreshold(Reply<u16>),
    SetAddress(u8, Reply<()>),
    GetAddress(Reply<u8>),
    ResetEnergy(Reply<ResetOutcome>),
    Calibrate(Reply<()>),
    Close(Reply<()>),
}

/// Cloneable access to a meter owned by a worker task
#[derive(Debug, Clone)]
pub struct PzemHandle {
    sender: mpsc::Sender<Request>,
}

/// Start a worker task owning `pzem`
///
/// The task ends after [`PzemHandle::close`] or once every handle is dropped.
pub fn spawn<L>(pzem: Pzem<L>) -> (PzemHandle, JoinHandle<()>)
where
    L: FrameExchange + 'static,
{
    let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
    let task = tokio::spawn(run(pzem, receiver));
    (PzemHandle { sender }, task)
}

async fn run<L: FrameExchange>(mut pzem: Pzem<L>, mut receiver: mpsc::Receiver<Request>) {
    while let Some(request) = receiver.recv().await {
        match request {
            Request::ReadMeasurements(reply) => {
                let _ = reply.send(pzem.read_measurements().await);
            }
            Request::SetAlarmThreshold(watts, reply) => {
                let _ = reply.send(pzem.set_alarm_threshold(watts).await);
            }
            Request::GetAlarmThreshold(reply) => {
                let _ = reply.send(pzem.get_alarm_threshold().await);
            }
            Request::SetAddress(address, reply) => {
                let _ = reply.send(pzem.set_address(address).await);
            }
            Request::GetAddress(reply) => {
                let _ = reply.send(pzem.get_address().await);
            }
            Request::ResetEnergy(reply) => {
                let _ = reply.send(pzem.reset_energy().await);
            }
            Request::Calibrate(reply) => {
                let _ = reply.send(pzem.calibrate().await);
            }
            Request::Close(reply) => {
                let _ = reply.send(pzem.close().await);
                return;
            }
        }
    }

    if let Err(e) = pzem.close().await {
        log::warn!("Closing meter after last handle dropped failed: {}", e);
    }
}

impl PzemHandle {
    pub async fn read_measurements(&self) -> PzemResult<MeasurementSnapshot> {
        self.call(Request::ReadMeasurements).await
    }

    pub async fn set_alarm_threshold(&self, watts: u16) -> PzemResult<()> {
        self.call(|reply| Request::SetAlarmThreshold(watts, reply)).await
    }

    pub async fn get_alarm_threshold(&self) -> PzemResult<u16> {
        self.call(Request::GetAlarmThreshold).await
    }

    pub async fn set_address(&self, address: u8) -> PzemResult<()> {
        self.call(|reply| Request::SetAddress(address, reply)).await
    }

    pub async fn get_address(&self) -> PzemResult<u8> {
        self.call(Request::GetAddress).await
    }

    pub async fn reset_energy(&self) -> PzemResult<ResetOutcome> {
        self.call(Request::ResetEnergy).await
    }

    pub async fn calibrate(&self) -> PzemResult<()> {
        self.call(Request::Calibrate).await
    }

    /// Close the meter once every request queued before this one is done
    ///
    /// Requests issued afterwards fail with `PzemError::NotConnected`.
    pub async fn close(&self) -> PzemResult<()> {
        self.call(Request::Close).await
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn call<T>(&self, request: impl FnOnce(Reply<T>) -> Request) -> PzemResult<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(request(reply))
            .await
            .map_err(|_| PzemError::NotConnected)?;
        response.await.map_err(|_| PzemError::NotConnected)?
    }
}
