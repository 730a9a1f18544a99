//! Hierarchical fuse tree of shared per-phase current budgets.
//!
//! Nodes live in an arena indexed by [`NodeId`]. Each slot stores its parent
//! index as a lookup-only back reference, so the tree is acyclic by
//! construction and every station has exactly one path to the root.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, TopologyError};

use super::energy::Phase;
use super::station::{ChargingStation, check_disconnected_phases};

/// Index of a node inside a [`FuseTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

fn connected() -> bool {
    true
}

/// A pre-fuse with a per-phase rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fuse {
    #[serde(rename = "indexL", alias = "id")]
    pub id: u32,
    pub fuse_phase1: f64,
    pub fuse_phase2: f64,
    pub fuse_phase3: f64,
    #[serde(default = "connected")]
    pub phase1_connected: bool,
    #[serde(default = "connected")]
    pub phase2_connected: bool,
    #[serde(default = "connected")]
    pub phase3_connected: bool,
}

impl Fuse {
    /// Fuse with the same rating on all three phases.
    pub fn new(id: u32, fuse_size: f64) -> Self {
        Self {
            id,
            fuse_phase1: fuse_size,
            fuse_phase2: fuse_size,
            fuse_phase3: fuse_size,
            phase1_connected: true,
            phase2_connected: true,
            phase3_connected: true,
        }
    }

    pub fn with_connected(mut self, phase1: bool, phase2: bool, phase3: bool) -> Self {
        self.phase1_connected = phase1;
        self.phase2_connected = phase2;
        self.phase3_connected = phase3;
        self
    }

    pub fn with_fuses(mut self, phase1: f64, phase2: f64, phase3: f64) -> Self {
        self.fuse_phase1 = phase1;
        self.fuse_phase2 = phase2;
        self.fuse_phase3 = phase3;
        self
    }

    pub fn name(&self) -> String {
        format!("l{}", self.id)
    }

    pub fn fuses(&self) -> [f64; 3] {
        [self.fuse_phase1, self.fuse_phase2, self.fuse_phase3]
    }

    pub fn is_phase_connected(&self, phase: Phase) -> bool {
        match phase {
            Phase::Phase1 => self.phase1_connected,
            Phase::Phase2 => self.phase2_connected,
            Phase::Phase3 => self.phase3_connected,
        }
    }

    /// # Errors
    ///
    /// Returns [`ModelError::DisconnectedPhaseRated`] if a disconnected phase
    /// carries a rating.
    pub fn validate(&self) -> Result<(), ModelError> {
        check_disconnected_phases(&self.name(), self.fuses(), |phase| {
            self.is_phase_connected(phase)
        })
    }
}

/// Either a fuse or a charging station.
#[derive(Debug, Clone, PartialEq)]
pub enum FuseTreeNode {
    Fuse(Fuse),
    Station(ChargingStation),
}

impl FuseTreeNode {
    pub fn name(&self) -> String {
        match self {
            FuseTreeNode::Fuse(fuse) => fuse.name(),
            FuseTreeNode::Station(station) => station.name(),
        }
    }

    /// Per-phase ratings. Station ratings refer to station phases, fuse
    /// ratings to grid phases.
    pub fn fuses(&self) -> [f64; 3] {
        match self {
            FuseTreeNode::Fuse(fuse) => fuse.fuses(),
            FuseTreeNode::Station(station) => station.fuses(),
        }
    }

    pub fn is_phase_connected(&self, phase: Phase) -> bool {
        match self {
            FuseTreeNode::Fuse(fuse) => fuse.is_phase_connected(phase),
            FuseTreeNode::Station(station) => station.is_phase_connected(phase),
        }
    }

    pub fn as_station(&self) -> Option<&ChargingStation> {
        match self {
            FuseTreeNode::Station(station) => Some(station),
            FuseTreeNode::Fuse(_) => None,
        }
    }

    pub fn as_fuse(&self) -> Option<&Fuse> {
        match self {
            FuseTreeNode::Fuse(fuse) => Some(fuse),
            FuseTreeNode::Station(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    node: FuseTreeNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Tree of fuses whose leaves are charging stations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FuseTreeRecord", into = "FuseTreeRecord")]
pub struct FuseTree {
    slots: Vec<Slot>,
    station_index: HashMap<u32, NodeId>,
    fuse_ids: HashSet<u32>,
    number_children_bottom_level: usize,
}

impl FuseTree {
    /// Creates a tree consisting of `root` only.
    ///
    /// # Arguments
    ///
    /// * `root` - Root fuse
    /// * `number_children_bottom_level` - Stations per lowest-level fuse
    pub fn new(root: Fuse, number_children_bottom_level: usize) -> Self {
        let mut fuse_ids = HashSet::new();
        fuse_ids.insert(root.id);
        Self {
            slots: vec![Slot {
                node: FuseTreeNode::Fuse(root),
                parent: None,
                children: Vec::new(),
            }],
            station_index: HashMap::new(),
            fuse_ids,
            number_children_bottom_level,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn number_children_bottom_level(&self) -> usize {
        self.number_children_bottom_level
    }

    /// Adds `fuse` as the last child of `parent`.
    ///
    /// # Errors
    ///
    /// * [`TopologyError::UnknownNode`] if `parent` is not in the tree
    /// * [`TopologyError::NotAFuse`] if `parent` is a station
    /// * [`TopologyError::DuplicateFuse`] if a fuse with the same id exists
    pub fn add_fuse(&mut self, parent: NodeId, fuse: Fuse) -> Result<NodeId, TopologyError> {
        self.check_parent(parent)?;
        if self.fuse_ids.contains(&fuse.id) {
            return Err(TopologyError::DuplicateFuse(fuse.id));
        }
        self.fuse_ids.insert(fuse.id);
        Ok(self.push(parent, FuseTreeNode::Fuse(fuse)))
    }

    /// Adds `station` as the last child of `parent`.
    ///
    /// # Errors
    ///
    /// * [`TopologyError::UnknownNode`] if `parent` is not in the tree
    /// * [`TopologyError::NotAFuse`] if `parent` is a station
    /// * [`TopologyError::DuplicateStation`] if the station is already attached
    pub fn add_station(
        &mut self,
        parent: NodeId,
        station: ChargingStation,
    ) -> Result<NodeId, TopologyError> {
        self.check_parent(parent)?;
        if self.station_index.contains_key(&station.id) {
            return Err(TopologyError::DuplicateStation(station.id));
        }
        let station_id = station.id;
        let id = self.push(parent, FuseTreeNode::Station(station));
        self.station_index.insert(station_id, id);
        Ok(id)
    }

    /// Attaches `station` to the first fuse (pre-order) that already has
    /// station children or has no children at all.
    ///
    /// # Errors
    ///
    /// * [`TopologyError::DuplicateStation`] if the station is already attached
    /// * [`TopologyError::NoAttachmentPoint`] if no fuse qualifies
    pub fn attach_station(&mut self, station: ChargingStation) -> Result<NodeId, TopologyError> {
        if self.station_index.contains_key(&station.id) {
            return Err(TopologyError::DuplicateStation(station.id));
        }
        let parent = self
            .find_station_attachment()
            .ok_or(TopologyError::NoAttachmentPoint(station.id))?;
        self.add_station(parent, station)
    }

    /// First fuse in pre-order with direct station children or no children.
    pub fn find_station_attachment(&self) -> Option<NodeId> {
        self.traverse(self.root()).into_iter().find(|id| {
            let slot = &self.slots[id.0];
            matches!(slot.node, FuseTreeNode::Fuse(_))
                && (slot.children.is_empty()
                    || slot
                        .children
                        .iter()
                        .any(|child| self.slots[child.0].node.as_station().is_some()))
        })
    }

    pub fn node(&self, id: NodeId) -> Option<&FuseTreeNode> {
        self.slots.get(id.0).map(|slot| &slot.node)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0).and_then(|slot| slot.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slots
            .get(id.0)
            .map(|slot| slot.children.as_slice())
            .unwrap_or(&[])
    }

    /// Proper ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// Node ids of the subtree rooted at `from`, in pre-order.
    pub fn traverse(&self, from: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        if from.0 >= self.slots.len() {
            return result;
        }
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            result.push(id);
            stack.extend(self.slots[id.0].children.iter().rev());
        }
        result
    }

    pub fn station(&self, station_id: u32) -> Option<&ChargingStation> {
        self.station_node(station_id)
            .and_then(|id| self.node(id))
            .and_then(FuseTreeNode::as_station)
    }

    pub fn station_node(&self, station_id: u32) -> Option<NodeId> {
        self.station_index.get(&station_id).copied()
    }

    pub fn contains_station(&self, station_id: u32) -> bool {
        self.station_index.contains_key(&station_id)
    }

    /// All stations in pre-order.
    pub fn stations(&self) -> Vec<&ChargingStation> {
        self.traverse(self.root())
            .into_iter()
            .filter_map(|id| self.slots[id.0].node.as_station())
            .collect()
    }

    /// Whether current drawn on `station_phase` of the station reaches the
    /// root: the phase is connected at the station and the grid phase it
    /// feeds is connected at every ancestor fuse.
    pub fn is_station_phase_connected(&self, station_id: u32, station_phase: Phase) -> bool {
        let Some(node) = self.station_node(station_id) else {
            return false;
        };
        let Some(station) = self.station(station_id) else {
            return false;
        };
        if !station.is_phase_connected(station_phase) {
            return false;
        }
        let grid_phase = station.phase_matching.to_grid(station_phase);
        self.ancestors(node)
            .all(|ancestor| self.slots[ancestor.0].node.is_phase_connected(grid_phase))
    }

    fn check_parent(&self, parent: NodeId) -> Result<(), TopologyError> {
        match self.slots.get(parent.0) {
            None => Err(TopologyError::UnknownNode(parent.0)),
            Some(slot) => match &slot.node {
                FuseTreeNode::Fuse(_) => Ok(()),
                FuseTreeNode::Station(station) => Err(TopologyError::NotAFuse(station.name())),
            },
        }
    }

    fn push(&mut self, parent: NodeId, node: FuseTreeNode) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            node,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.slots[parent.0].children.push(id);
        id
    }
}

/// JSON shape of a fuse tree: `{"root": [node], "numberChildrenBottomLevel": n}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuseTreeRecord {
    pub root: Vec<NodeRecord>,
    #[serde(default)]
    pub number_children_bottom_level: usize,
}

/// JSON shape of a single fuse tree node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "fuseTreeNodeType")]
pub enum NodeRecord {
    #[serde(rename = "pre-fuse")]
    Fuse {
        #[serde(default)]
        name: String,
        #[serde(flatten)]
        fuse: Fuse,
        #[serde(default)]
        children: Vec<NodeRecord>,
    },
    #[serde(rename = "chargingStation")]
    Station {
        #[serde(default)]
        name: String,
        #[serde(flatten)]
        station: ChargingStation,
    },
}

impl TryFrom<FuseTreeRecord> for FuseTree {
    type Error = TopologyError;

    fn try_from(record: FuseTreeRecord) -> Result<Self, Self::Error> {
        let count = record.root.len();
        let mut roots = record.root.into_iter();
        let (Some(NodeRecord::Fuse { fuse, children, .. }), None) = (roots.next(), roots.next())
        else {
            return Err(TopologyError::InvalidRoot(count));
        };
        let mut tree = FuseTree::new(fuse, record.number_children_bottom_level);
        let root = tree.root();
        tree.add_records(root, children)?;
        Ok(tree)
    }
}

impl FuseTree {
    fn add_records(&mut self, parent: NodeId, records: Vec<NodeRecord>) -> Result<(), TopologyError> {
        for record in records {
            match record {
                NodeRecord::Fuse { fuse, children, .. } => {
                    let id = self.add_fuse(parent, fuse)?;
                    self.add_records(id, children)?;
                }
                NodeRecord::Station { station, .. } => {
                    self.add_station(parent, station)?;
                }
            }
        }
        Ok(())
    }

    fn to_record(&self, id: NodeId) -> NodeRecord {
        let slot = &self.slots[id.0];
        match &slot.node {
            FuseTreeNode::Fuse(fuse) => NodeRecord::Fuse {
                name: fuse.name(),
                fuse: fuse.clone(),
                children: slot.children.iter().map(|c| self.to_record(*c)).collect(),
            },
            FuseTreeNode::Station(station) => NodeRecord::Station {
                name: station.name(),
                station: station.clone(),
            },
        }
    }
}

impl From<FuseTree> for FuseTreeRecord {
    fn from(tree: FuseTree) -> Self {
        Self {
            root: vec![tree.to_record(tree.root())],
            number_children_bottom_level: tree.number_children_bottom_level,
        }
    }
}
