//! Mutation records and the document observer

use super::NodeId;

/// Kind of observed change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Nodes added to or removed from `target`
    ChildList,

    /// Text of the `target` text node changed
    CharacterData,
}

/// One observed DOM change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,

    /// Observer epoch the record was captured under
    pub epoch: u64,
}

impl MutationRecord {
    /// A child-list record that neither added nor removed anything
    pub fn is_noop(&self) -> bool {
        self.kind == MutationKind::ChildList && self.added.is_empty() && self.removed.is_empty()
    }
}

/// Buffers mutation records while connected
#[derive(Debug, Default)]
pub struct Observer {
    epoch: Option<u64>,
    records: Vec<MutationRecord>,
}

impl Observer {
    /// Start recording under `epoch`
    pub fn connect(&mut self, epoch: u64) {
        self.epoch = Some(epoch);
    }

    /// Stop recording; pending records are discarded
    pub fn disconnect(&mut self) {
        self.epoch = None;
        self.records.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.epoch.is_some()
    }

    pub fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    pub(crate) fn record(
        &mut self,
        kind: MutationKind,
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    ) {
        if let Some(epoch) = self.epoch {
            self.records.push(MutationRecord {
                kind,
                target,
                added,
                removed,
                epoch,
            });
        }
    }

    /// Drain the pending batch
    pub fn take(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn pending(&self) -> usize {
        self.records.len()
    }
}
