use crate::membership::ProcessId;
use crate::protocol::Payload;

/// Application callbacks, invoked on the channel's event loop thread.
///
/// Total-order deliveries arrive with strictly increasing serial numbers. A
/// failover can leave a permanent hole in the sequence.
pub trait CommListener {
    /// Every member is up. Called at most once.
    fn on_all_processes_ready(&mut self) {}

    /// `id` was detected as failed. Never revoked.
    fn on_process_failed(&mut self, _id: ProcessId) {}

    /// Unordered point-to-point message.
    fn on_receive_p2p_message(&mut self, _from: ProcessId, _payload: Payload) {}

    fn on_receive_total_order_message(&mut self, serial: u64, payload: Payload);
}
