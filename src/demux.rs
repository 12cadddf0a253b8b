//! Packet demultiplexer (§4.2): routes inbound packets into per-kind
//! protected queues. Grounded on the source's `NetPacketsGroups`, which maps
//! a `NetPacketsGroupId` to a `ProtectedList<NetGenericHeader>` and looks the
//! group up by id rather than creating one on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::{GroupId, Packet, GROUP_ACK, GROUP_IMAGE};
use crate::queue::ProtectedQueue;

/// Static map from group id to its protected queue. Groups are created once
/// at startup (§4.2: "no dynamic group creation").
pub struct Demultiplexer {
    groups: HashMap<GroupId, Arc<ProtectedQueue<Packet>>>,
}

impl Demultiplexer {
    /// Create the fixed set of groups the driver can consume: the ack
    /// sentinel, the image sentinel, and one group per known `data_type`.
    pub fn new(wait_timeout: Duration) -> Self {
        let mut groups = HashMap::new();
        let known_groups = [
            GROUP_ACK,
            GROUP_IMAGE,
            crate::protocol::answer::data_type::STATUS,
            crate::protocol::answer::data_type::CAMERA_PARAMETERS,
            crate::protocol::answer::data_type::SETTINGS,
            crate::protocol::answer::data_type::ACQUISITION_STATUS,
            crate::protocol::answer::data_type::COMMAND_DONE,
            crate::protocol::answer::data_type::GENERIC_STRING,
        ];
        for id in known_groups {
            groups.insert(id, Arc::new(ProtectedQueue::new(wait_timeout)));
        }
        Self { groups }
    }

    /// Look the packet's group up and enqueue it; on a miss, drop the packet
    /// and log a diagnostic (§4.2: "no dynamic group creation").
    pub fn route(&self, packet: Packet) {
        let Some(group_id) = packet.group_id() else {
            log::warn!("dropping non-routable packet (a command was received on the client side)");
            return;
        };
        match self.groups.get(&group_id) {
            Some(queue) => queue.put(packet),
            None => log::warn!("dropping packet for unmanaged group {group_id:#06x}"),
        }
    }

    /// Borrow the queue for a given group, if it was created at startup.
    pub fn group(&self, group_id: GroupId) -> Option<&Arc<ProtectedQueue<Packet>>> {
        self.groups.get(&group_id)
    }

    pub fn ack_queue(&self) -> &Arc<ProtectedQueue<Packet>> {
        self.groups.get(&GROUP_ACK).expect("ack group always created")
    }

    pub fn image_queue(&self) -> &Arc<ProtectedQueue<Packet>> {
        self.groups.get(&GROUP_IMAGE).expect("image group always created")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AckPacket;

    #[test]
    fn routes_ack_into_ack_group() {
        let demux = Demultiplexer::new(Duration::from_millis(50));
        demux.route(Packet::Ack(AckPacket { camera_identifier: 1, accepted: 1 }));
        assert_eq!(demux.ack_queue().len(), 1);
    }

    #[test]
    fn unmanaged_group_is_dropped_not_panicked() {
        let demux = Demultiplexer::new(Duration::from_millis(50));
        // No group is created for data_type 9999.
        let answer = crate::protocol::AnswerPacket {
            camera_identifier: 1,
            error_code: 0,
            payload: crate::protocol::AnswerPayload::Unknown { data_type: 9999, raw: vec![] },
        };
        demux.route(Packet::Answer(answer));
        assert!(demux.group(9999).is_none());
    }
}
