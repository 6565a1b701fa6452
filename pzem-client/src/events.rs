//! Transaction events for callers that want more than log lines

use pzem_core::{DeviceAddress, FunctionCode};
use tokio::sync::mpsc;

/// What happened during one Modbus transaction
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionEvent {
    RequestSent {
        address: DeviceAddress,
        function: FunctionCode,
        attempt: u8,
    },
    ResponseReceived {
        function: FunctionCode,
        len: usize,
    },
    Retrying {
        function: FunctionCode,
        attempt: u8,
        reason: String,
    },
    Failed {
        function: FunctionCode,
        reason: String,
    },
}

/// Optional event channel attached to a client
///
/// Events are dropped silently when no receiver is attached or the
/// receiver has gone away.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<TransactionEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::UnboundedSender<TransactionEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.as_ref().is_some_and(|s| !s.is_closed())
    }

    pub fn emit(&self, event: TransactionEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        assert!(sink.is_enabled());

        sink.emit(TransactionEvent::ResponseReceived {
            function: FunctionCode::ReadInputRegisters,
            len: 25,
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            TransactionEvent::ResponseReceived {
                function: FunctionCode::ReadInputRegisters,
                len: 25,
            }
        );
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        drop(rx);
        assert!(!sink.is_enabled());
        sink.emit(TransactionEvent::Failed {
            function: FunctionCode::ResetEnergy,
            reason: "gone".to_string(),
        });
        assert!(!EventSink::disabled().is_enabled());
    }
}
