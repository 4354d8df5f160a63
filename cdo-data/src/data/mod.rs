//! Grouped data trees.
//!
//! A [`DataTree`] is an arena of [`DataNode`]s. Node `0` is the owner: it holds
//! the dimension atom spaces, every loaded datum, and the selection state of the
//! whole tree. Children are created by grouping, each fixing one or more atoms,
//! while link-parented roots (group-by results and filtered views) share datums
//! with the node they were derived from.
mod grouping;
mod query;
mod selection;

pub use grouping::{GroupingDimension, GroupingLevel, GroupingOptions, GroupingSpec};
pub use query::DatumFilter;

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    rc::Rc,
};

use cdo_common::{error::CdoError, value::Value};
use indexmap::IndexMap;
use itertools::Itertools;
use tracing::debug;

use crate::{
    atom::Atom,
    complex::{Datum, KEY_SEPARATOR},
    complex_type::{CalculatedValues, CalculationScope, ComplexType},
    dimension::Dimension,
};

/// Separator of the key components composing an absolute key
pub const ABS_KEY_SEPARATOR: &str = ",";
/// Separator of the label components composing an absolute label
pub const ABS_LABEL_SEPARATOR: &str = " ~ ";
/// Separator of the atom labels composing a node label
pub const LABEL_SEPARATOR: &str = ", ";

/// Generational handle of a node.
///
/// Slots of disposed nodes are reused, each reuse bumping the generation, so
/// a handle kept past its node's disposal never aliases a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataId {
    index: usize,
    generation: u32,
}

impl DataId {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Lifecycle state of a node. `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataState {
    Owner,
    Child,
    Disposed,
}

#[derive(Debug)]
pub struct DataNode {
    id: DataId,
    state: DataState,
    parent: Option<DataId>,
    link_parent: Option<DataId>,
    root: DataId,
    owner: DataId,
    depth: usize,
    atoms: IndexMap<String, Rc<Atom>>,
    key: String,
    label: String,
    abs_key: String,
    abs_label: String,
    datums: IndexMap<usize, Rc<Datum>>,
    children: Vec<DataId>,
    children_by_key: Option<HashMap<String, DataId>>,
    link_children: Vec<DataId>,
    group_by_cache: Option<HashMap<String, DataId>>,
    // (dimension, visible only) -> (tree version, sum)
    sums: RefCell<HashMap<(String, bool), (u64, Option<f64>)>>,
}

impl DataNode {
    fn new(id: DataId, state: DataState, owner: DataId) -> Self {
        Self {
            id,
            state,
            parent: None,
            link_parent: None,
            root: id,
            owner,
            depth: 0,
            atoms: IndexMap::new(),
            key: String::new(),
            label: String::new(),
            abs_key: String::new(),
            abs_label: String::new(),
            datums: IndexMap::new(),
            children: Vec::new(),
            children_by_key: Some(HashMap::new()),
            link_children: Vec::new(),
            group_by_cache: Some(HashMap::new()),
            sums: RefCell::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> DataId {
        self.id
    }

    pub fn state(&self) -> DataState {
        self.state
    }

    pub fn is_owner(&self) -> bool {
        self.state == DataState::Owner
    }

    pub fn is_disposed(&self) -> bool {
        self.state == DataState::Disposed
    }

    pub fn parent(&self) -> Option<DataId> {
        self.parent
    }

    pub fn link_parent(&self) -> Option<DataId> {
        self.link_parent
    }

    pub fn root(&self) -> DataId {
        self.root
    }

    pub fn owner(&self) -> DataId {
        self.owner
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The atoms fixed by this node (not including its ancestors')
    pub fn atoms(&self) -> impl Iterator<Item = &Rc<Atom>> {
        self.atoms.values()
    }

    pub fn atom(&self, name: &str) -> Option<&Rc<Atom>> {
        self.atoms.get(name)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn abs_key(&self) -> &str {
        &self.abs_key
    }

    pub fn abs_label(&self) -> &str {
        &self.abs_label
    }

    pub fn datums(&self) -> impl Iterator<Item = &Rc<Datum>> {
        self.datums.values()
    }

    pub fn datum_count(&self) -> usize {
        self.datums.len()
    }

    pub fn contains(&self, datum: &Datum) -> bool {
        self.datums
            .get(&datum.id())
            .is_some_and(|own| std::ptr::eq(own.as_ref(), datum))
    }

    /// Children in insertion order
    pub fn children(&self) -> &[DataId] {
        &self.children
    }

    pub fn link_children(&self) -> &[DataId] {
        &self.link_children
    }
}

/// Arguments of [`DataTree::add_child`]. Both atoms and datums are required.
#[derive(Debug, Clone, Default)]
pub struct ChildSpec {
    atoms: Option<Vec<Rc<Atom>>>,
    datums: Option<Vec<Rc<Datum>>>,
}

impl ChildSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atoms(self, atoms: Vec<Rc<Atom>>) -> Self {
        Self {
            atoms: Some(atoms),
            ..self
        }
    }

    pub fn datums(self, datums: Vec<Rc<Datum>>) -> Self {
        Self {
            datums: Some(datums),
            ..self
        }
    }
}

#[derive(Debug, Default)]
pub struct DataTreeBuilder {
    complex_type: Option<Rc<ComplexType>>,
}

impl DataTreeBuilder {
    pub fn complex_type(self, complex_type: Rc<ComplexType>) -> Self {
        Self {
            complex_type: Some(complex_type),
        }
    }

    pub fn build(self) -> Result<DataTree, CdoError> {
        let complex_type = self
            .complex_type
            .ok_or_else(|| CdoError::argument_required("type"))?;
        Ok(DataTree::new(complex_type))
    }
}

#[derive(Debug)]
pub struct DataTree {
    complex_type: Rc<ComplexType>,
    dimensions: IndexMap<String, Dimension>,
    nodes: Vec<DataNode>,
    // slots of disposed nodes, reused by later allocations
    free_slots: Vec<usize>,
    datums_by_key: HashMap<String, Rc<Datum>>,
    selected: IndexMap<usize, Rc<Datum>>,
    next_datum_id: usize,
    version: u64,
}

impl DataTree {
    pub const OWNER: DataId = DataId {
        index: 0,
        generation: 0,
    };

    pub fn new(complex_type: Rc<ComplexType>) -> Self {
        let dimensions = complex_type
            .dimensions()
            .iter()
            .map(|d| (d.name().to_string(), Dimension::new(d.clone())))
            .collect();
        Self {
            complex_type,
            dimensions,
            nodes: vec![DataNode::new(Self::OWNER, DataState::Owner, Self::OWNER)],
            free_slots: Vec::new(),
            datums_by_key: HashMap::new(),
            selected: IndexMap::new(),
            next_datum_id: 0,
            version: 0,
        }
    }

    pub fn builder() -> DataTreeBuilder {
        DataTreeBuilder::default()
    }

    pub fn complex_type(&self) -> &Rc<ComplexType> {
        &self.complex_type
    }

    pub fn owner(&self) -> DataId {
        Self::OWNER
    }

    /// Monotonic counter bumped by every datum mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Node of a handle. A handle whose slot was reused by a newer node is
    /// reported as disposed.
    pub fn node(&self, id: DataId) -> Result<&DataNode, CdoError> {
        match self.nodes.get(id.index) {
            None => Err(CdoError::argument_invalid("id", format!("Unknown data {id}"))),
            Some(node) if node.id != id => Err(stale(id)),
            Some(node) => Ok(node),
        }
    }

    fn node_mut(&mut self, id: DataId) -> Result<&mut DataNode, CdoError> {
        match self.nodes.get_mut(id.index) {
            None => Err(CdoError::argument_invalid("id", format!("Unknown data {id}"))),
            Some(node) if node.id != id => Err(stale(id)),
            Some(node) => Ok(node),
        }
    }

    fn live_node(&self, id: DataId) -> Result<&DataNode, CdoError> {
        let node = self.node(id)?;
        if node.is_disposed() {
            return Err(stale(id));
        }
        Ok(node)
    }

    /// Whether `id` still names its node, disposed or not
    pub fn contains(&self, id: DataId) -> bool {
        self.nodes.get(id.index).is_some_and(|node| node.id == id)
    }

    /// Number of node slots held by the arena, including free ones
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes not yet disposed
    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|node| !node.is_disposed()).count()
    }

    fn alloc_node(&mut self, state: DataState, owner: DataId) -> DataId {
        match self.free_slots.pop() {
            Some(index) => {
                let id = DataId {
                    index,
                    generation: self.nodes[index].id.generation.wrapping_add(1),
                };
                self.nodes[index] = DataNode::new(id, state, owner);
                id
            }
            None => {
                let id = DataId {
                    index: self.nodes.len(),
                    generation: 0,
                };
                self.nodes.push(DataNode::new(id, state, owner));
                id
            }
        }
    }

    fn live_node_mut(&mut self, id: DataId) -> Result<&mut DataNode, CdoError> {
        self.live_node(id)?;
        self.node_mut(id)
    }

    pub fn dimension(&self, name: &str) -> Result<&Dimension, CdoError> {
        self.dimensions.get(name).ok_or_else(|| {
            CdoError::argument_invalid("name", format!("Undefined dimension '{name}'"))
        })
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values()
    }

    /// Intern a raw value into the owner's atom space of a dimension
    pub fn intern(&mut self, name: &str, value: Option<&Value>) -> Result<Rc<Atom>, CdoError> {
        let dimension = self.dimensions.get_mut(name).ok_or_else(|| {
            CdoError::argument_invalid("name", format!("Undefined dimension '{name}'"))
        })?;
        Ok(dimension.intern(value))
    }

    /// Create a datum from raw values, running all calculations
    pub fn create_datum(
        &mut self,
        values: &IndexMap<String, Option<Value>>,
    ) -> Result<Rc<Datum>, CdoError> {
        let atoms = self.intern_all(values)?;
        self.create_datum_from_atoms(atoms, None)
    }

    /// Create a synthetic datum, flagged with the kind of interpolation that
    /// produced it. Calculations apply to it as to any read datum.
    pub fn create_interpolated_datum(
        &mut self,
        values: &IndexMap<String, Option<Value>>,
        interpolation: &str,
    ) -> Result<Rc<Datum>, CdoError> {
        let atoms = self.intern_all(values)?;
        self.create_datum_from_atoms(atoms, Some(interpolation.to_string()))
    }

    fn intern_all(
        &mut self,
        values: &IndexMap<String, Option<Value>>,
    ) -> Result<IndexMap<String, Rc<Atom>>, CdoError> {
        for name in values.keys() {
            self.check_settable(name)?;
        }
        values
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.intern(name, value.as_ref())?)))
            .collect()
    }

    /// Create a datum from already interned atoms.
    ///
    /// Calculations run in registration order; each sees the atoms read and
    /// calculated before it. Dimensions left unset get their null atom.
    pub fn create_datum_from_atoms(
        &mut self,
        mut atoms: IndexMap<String, Rc<Atom>>,
        interpolation: Option<String>,
    ) -> Result<Rc<Datum>, CdoError> {
        for (name, atom) in atoms.iter() {
            self.check_settable(name)?;
            if !self.dimension(name)?.owns(atom) {
                return Err(CdoError::argument_invalid(
                    "atoms",
                    format!("Atom '{}' does not belong to dimension '{name}'", atom.key()),
                ));
            }
        }

        let complex_type = self.complex_type.clone();
        for calculation in complex_type.calculations() {
            let values = {
                let scope = CalculationScope::new(&atoms, &self.dimensions);
                let mut out = CalculatedValues::new(calculation.names());
                calculation.calculate(&scope, &mut out)?;
                out.into_values()
            };
            for (name, value) in values {
                let atom = self.intern(&name, value.as_ref())?;
                atoms.insert(name, atom);
            }
        }

        let ordered = complex_type
            .dimensions()
            .iter()
            .map(|dim_type| match atoms.get(dim_type.name()) {
                Some(atom) => Ok(atom.clone()),
                None => Ok(self.dimension(dim_type.name())?.null_atom().clone()),
            })
            .collect::<Result<Vec<_>, CdoError>>()?;

        let id = self.next_datum_id;
        self.next_datum_id += 1;
        Ok(Rc::new(Datum::new(id, complex_type, ordered, interpolation)))
    }

    fn check_settable(&self, name: &str) -> Result<(), CdoError> {
        if self.complex_type.is_calculated(name) {
            return Err(CdoError::operation_invalid(format!(
                "Dimension '{name}' is calculated and cannot be set"
            )));
        }
        Ok(())
    }

    /// Load datums into the owner. Datums whose key was already loaded are
    /// skipped. Returns the number of datums added.
    pub fn load(
        &mut self,
        id: DataId,
        datums: impl IntoIterator<Item = Rc<Datum>>,
    ) -> Result<usize, CdoError> {
        if !self.live_node(id)?.is_owner() {
            return Err(CdoError::operation_invalid(
                "Can only load datums in an owner data",
            ));
        }
        let mut added = 0;
        let mut duplicates = 0;
        for datum in datums {
            self.check_complex_type(&datum)?;
            if self.datums_by_key.contains_key(datum.key()) {
                duplicates += 1;
                continue;
            }
            self.datums_by_key
                .insert(datum.key().to_string(), datum.clone());
            if datum.is_selected() {
                self.selected.insert(datum.id(), datum.clone());
            }
            self.nodes[Self::OWNER.index].datums.insert(datum.id(), datum);
            added += 1;
        }
        debug!("Loaded {added} datums ({duplicates} duplicates skipped)");
        if added > 0 {
            self.on_datums_changed(id)?;
        }
        Ok(added)
    }

    fn check_complex_type(&self, datum: &Datum) -> Result<(), CdoError> {
        if !Rc::ptr_eq(datum.complex_type(), &self.complex_type) {
            return Err(CdoError::argument_invalid(
                "datum",
                "Datum was created against a different complex type",
            ));
        }
        Ok(())
    }

    /// Add datums to a node. For the owner this is [`DataTree::load`].
    pub fn add_datums(
        &mut self,
        id: DataId,
        datums: impl IntoIterator<Item = Rc<Datum>>,
    ) -> Result<usize, CdoError> {
        if self.live_node(id)?.is_owner() {
            return self.load(id, datums);
        }
        let mut added = 0;
        for datum in datums {
            self.check_complex_type(&datum)?;
            let node = self.live_node_mut(id)?;
            if node.datums.insert(datum.id(), datum).is_none() {
                added += 1;
            }
        }
        if added > 0 {
            self.on_datums_changed(id)?;
        }
        Ok(added)
    }

    /// Remove a datum from a node. Removing from the owner also drops it from
    /// the selection.
    pub fn remove_datum(&mut self, id: DataId, datum: &Datum) -> Result<bool, CdoError> {
        let node = self.live_node_mut(id)?;
        if !node.contains(datum) {
            return Ok(false);
        }
        node.datums.shift_remove(&datum.id());
        if node.is_owner() {
            self.datums_by_key.remove(datum.key());
            self.selected.shift_remove(&datum.id());
        }
        self.on_datums_changed(id)?;
        Ok(true)
    }

    fn on_datums_changed(&mut self, id: DataId) -> Result<(), CdoError> {
        self.version += 1;
        let cached = self
            .live_node_mut(id)?
            .group_by_cache
            .as_mut()
            .map(|cache| cache.drain().map(|(_, v)| v).collect::<Vec<_>>())
            .unwrap_or_default();
        for view in cached {
            self.dispose(view)?;
        }
        Ok(())
    }

    /// Create a child fixing `spec.atoms` and holding `spec.datums`.
    ///
    /// The child's key, label, absolute key/label and depth are derived here
    /// once and never recomputed.
    pub fn add_child(&mut self, parent: DataId, spec: ChildSpec) -> Result<DataId, CdoError> {
        let atoms = spec.atoms.ok_or_else(|| CdoError::argument_required("atoms"))?;
        let datums = spec
            .datums
            .ok_or_else(|| CdoError::argument_required("datums"))?;

        let mut own_atoms = IndexMap::new();
        for atom in atoms {
            if !self.dimension(atom.dimension())?.owns(&atom) {
                return Err(CdoError::argument_invalid(
                    "atoms",
                    format!(
                        "Atom '{}' does not belong to dimension '{}'",
                        atom.key(),
                        atom.dimension()
                    ),
                ));
            }
            if own_atoms
                .insert(atom.dimension().to_string(), atom.clone())
                .is_some()
            {
                return Err(CdoError::argument_invalid(
                    "atoms",
                    format!("Dimension '{}' is fixed more than once", atom.dimension()),
                ));
            }
        }
        let key = own_atoms.values().map(|a| a.key()).join(KEY_SEPARATOR);
        let label = own_atoms
            .values()
            .map(|a| a.label())
            .filter(|l| !l.is_empty())
            .join(LABEL_SEPARATOR);

        let parent_node = self.live_node(parent)?;
        if parent_node
            .children_by_key
            .as_ref()
            .is_some_and(|map| map.contains_key(&key))
        {
            return Err(CdoError::argument_invalid(
                "atoms",
                format!("A child with key '{key}' already exists"),
            ));
        }

        let owner = parent_node.owner;
        let root = parent_node.root;
        let depth = parent_node.depth + 1;
        let abs_key = join_non_empty(ABS_KEY_SEPARATOR, &parent_node.abs_key, &key);
        let abs_label = join_non_empty(ABS_LABEL_SEPARATOR, &parent_node.abs_label, &label);

        let id = self.alloc_node(DataState::Child, owner);
        let node = self.node_mut(id)?;
        node.parent = Some(parent);
        node.root = root;
        node.depth = depth;
        node.abs_key = abs_key;
        node.abs_label = abs_label;
        node.atoms = own_atoms;
        node.key = key.clone();
        node.label = label;
        node.datums = datums.into_iter().map(|d| (d.id(), d)).collect();

        let parent_node = self.node_mut(parent)?;
        parent_node.children.push(id);
        if let Some(map) = parent_node.children_by_key.as_mut() {
            map.insert(key, id);
        }
        Ok(id)
    }

    /// Create a root node sharing `datums` with `link_parent` without owning
    /// dimensions or selection state
    fn add_link_root(
        &mut self,
        link_parent: DataId,
        datums: Vec<Rc<Datum>>,
    ) -> Result<DataId, CdoError> {
        let owner = self.live_node(link_parent)?.owner;
        let id = self.alloc_node(DataState::Child, owner);
        let node = self.node_mut(id)?;
        node.link_parent = Some(link_parent);
        node.datums = datums.into_iter().map(|d| (d.id(), d)).collect();
        self.node_mut(link_parent)?.link_children.push(id);
        Ok(id)
    }

    pub fn children(&self, id: DataId) -> Result<&[DataId], CdoError> {
        Ok(self.node(id)?.children())
    }

    /// Child with the given key, if any
    pub fn child_by_key(&self, id: DataId, key: &str) -> Result<Option<DataId>, CdoError> {
        Ok(self
            .node(id)?
            .children_by_key
            .as_ref()
            .and_then(|map| map.get(key).copied()))
    }

    /// Child with the given key, failing when there is none
    pub fn require_child(&self, id: DataId, key: &str) -> Result<DataId, CdoError> {
        self.child_by_key(id, key)?.ok_or_else(|| {
            CdoError::argument_invalid("key", format!("There is no child data with key '{key}'"))
        })
    }

    /// Dispose a node: its children and link children first, then detach it
    /// from its parent and link parent. Disposing twice is a no-op.
    ///
    /// The node's slot is released for reuse; its handle stays valid, and
    /// reports a disposed node, until the slot is taken by a new node.
    pub fn dispose(&mut self, id: DataId) -> Result<(), CdoError> {
        match self.nodes.get(id.index) {
            None => return Err(CdoError::argument_invalid("id", format!("Unknown data {id}"))),
            Some(node) if node.id != id || node.is_disposed() => return Ok(()),
            Some(_) => {}
        }
        self.dispose_children(id)?;

        let node = self.node_mut(id)?;
        let parent = node.parent;
        let link_parent = node.link_parent;
        let key = std::mem::take(&mut node.key);
        let owner = node.owner;
        *node = DataNode {
            children_by_key: None,
            group_by_cache: None,
            ..DataNode::new(id, DataState::Disposed, owner)
        };
        if id != Self::OWNER {
            self.free_slots.push(id.index);
        }

        if let Some(parent) = parent {
            let parent = self.node_mut(parent)?;
            parent.children.retain(|c| *c != id);
            if let Some(map) = parent.children_by_key.as_mut() {
                if map.get(&key) == Some(&id) {
                    map.remove(&key);
                }
            }
        }
        if let Some(link_parent) = link_parent {
            let link_parent = self.node_mut(link_parent)?;
            link_parent.link_children.retain(|c| *c != id);
            if let Some(cache) = link_parent.group_by_cache.as_mut() {
                cache.retain(|_, v| *v != id);
            }
        }
        Ok(())
    }

    /// Dispose all children and link children of a node, dropping its cached
    /// groupings. The node itself stays usable.
    pub fn dispose_children(&mut self, id: DataId) -> Result<(), CdoError> {
        let node = self.node_mut(id)?;
        let children = std::mem::take(&mut node.children);
        let link_children = std::mem::take(&mut node.link_children);
        if !node.is_disposed() {
            node.children_by_key = Some(HashMap::new());
            node.group_by_cache = Some(HashMap::new());
        }
        for child in children.into_iter().chain(link_children) {
            self.dispose(child)?;
        }
        Ok(())
    }

    /// Node ids of the subtree rooted at `id`, parents before children
    pub fn pre_order(&self, id: DataId) -> Result<Vec<DataId>, CdoError> {
        let mut out = Vec::new();
        self.visit_pre(id, &mut |node| out.push(node.id))?;
        Ok(out)
    }

    /// Node ids of the subtree rooted at `id`, children before parents
    pub fn post_order(&self, id: DataId) -> Result<Vec<DataId>, CdoError> {
        let mut out = Vec::new();
        self.visit_post(id, &mut |node| out.push(node.id))?;
        Ok(out)
    }

    /// Childless nodes of the subtree rooted at `id`, in pre-order
    pub fn leaves(&self, id: DataId) -> Result<Vec<DataId>, CdoError> {
        let mut out = Vec::new();
        self.visit_pre(id, &mut |node| {
            if node.children.is_empty() {
                out.push(node.id)
            }
        })?;
        Ok(out)
    }

    pub fn visit_pre(
        &self,
        id: DataId,
        f: &mut impl FnMut(&DataNode),
    ) -> Result<(), CdoError> {
        let node = self.node(id)?;
        f(node);
        for &child in &node.children {
            self.visit_pre(child, f)?;
        }
        Ok(())
    }

    pub fn visit_post(
        &self,
        id: DataId,
        f: &mut impl FnMut(&DataNode),
    ) -> Result<(), CdoError> {
        let node = self.node(id)?;
        for &child in &node.children {
            self.visit_post(child, f)?;
        }
        f(node);
        Ok(())
    }

    /// Ids of all datums held by a node
    pub fn datum_ids(&self, id: DataId) -> Result<HashSet<usize>, CdoError> {
        Ok(self.node(id)?.datums.keys().copied().collect())
    }
}

fn stale(id: DataId) -> CdoError {
    CdoError::operation_invalid(format!("Data {id} is disposed"))
}

fn join_non_empty(separator: &str, a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (false, true) => a.to_string(),
        (false, false) => format!("{a}{separator}{b}"),
    }
}
