// SPDX-License-Identifier: Apache-2.0

//! The owning flow table and its paired lookup indexes.

use crate::flow::{Flow, FlowHandle, FlowId};
use ahash::RandomState;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Owning table of live flows with exact-match lookup from both
/// directions.
///
/// Flow records live in a slab of `max_flows` slots; a flow's slot is
/// `external_port - start_port`, which is total and collision-free because
/// the port pool and the live flows partition the port range exactly. The
/// inside and outside hash indexes map 5-tuples to slot handles and are
/// populated and cleared strictly as a pair, so a flow is either reachable
/// from both directions or from neither.
///
/// All storage is sized at construction; steady-state operation does not
/// allocate or rehash.
#[derive(Debug)]
pub(crate) struct FlowTable {
    external_addr: Ipv4Addr,
    start_port: u16,
    slots: Box<[Option<Flow>]>,
    inside: HashMap<FlowId, FlowHandle, RandomState>,
    outside: HashMap<FlowId, FlowHandle, RandomState>,
}

impl FlowTable {
    pub(crate) fn with_capacity(
        external_addr: Ipv4Addr,
        start_port: u16,
        max_flows: u16,
    ) -> FlowTable {
        let capacity = usize::from(max_flows);
        FlowTable {
            external_addr,
            start_port,
            slots: vec![None; capacity].into_boxed_slice(),
            inside: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            outside: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    fn handle_of(&self, external_port: u16) -> FlowHandle {
        FlowHandle::new(external_port - self.start_port)
    }

    /// Look up a flow by its inside key.
    pub(crate) fn lookup_inside(&self, id: &FlowId) -> Option<FlowHandle> {
        self.inside.get(id).copied()
    }

    /// Look up a flow by its derived outside key.
    pub(crate) fn lookup_outside(&self, id: &FlowId) -> Option<FlowHandle> {
        self.outside.get(id).copied()
    }

    pub(crate) fn get(&self, handle: FlowHandle) -> Option<&Flow> {
        self.slots.get(handle.index())?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: FlowHandle) -> Option<&mut Flow> {
        self.slots.get_mut(handle.index())?.as_mut()
    }

    /// Insert a new flow under its inside key and its derived outside key.
    ///
    /// The caller must have established that the inside key is absent; the
    /// slot for the flow's external port must be free, which follows from
    /// the port having just left the pool.
    pub(crate) fn insert(&mut self, flow: Flow) -> FlowHandle {
        let handle = self.handle_of(flow.external_port);
        let outside = flow.id.outside_key(self.external_addr, flow.external_port);
        let slot = &mut self.slots[handle.index()];
        // The port just left the pool, so its slot must be free; an
        // occupied slot means the pool and the indexes disagree.
        assert!(
            slot.is_none(),
            "slot for external port {} already occupied",
            flow.external_port
        );
        self.inside.insert(flow.id, handle);
        self.outside.insert(outside, handle);
        *slot = Some(flow);
        handle
    }

    /// Remove a flow, clearing its slot and both index entries.
    ///
    /// Returns `None` when the slot is already empty, so a handle can be
    /// resolved at most once per flow lifetime.
    pub(crate) fn remove(&mut self, handle: FlowHandle) -> Option<Flow> {
        let flow = self.slots.get_mut(handle.index())?.take()?;
        self.inside.remove(&flow.id);
        self.outside
            .remove(&flow.id.outside_key(self.external_addr, flow.external_port));
        Some(flow)
    }

    /// Number of live flows.
    pub(crate) fn len(&self) -> usize {
        self.inside.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inside.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// All live flows, slab order. Only the sweep-free test harness walks
    /// the table; the datapath never iterates.
    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (FlowHandle, &Flow)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let handle = FlowHandle::new(u16::try_from(index).unwrap_or(u16::MAX));
            slot.as_ref().map(|flow| (handle, flow))
        })
    }
}
