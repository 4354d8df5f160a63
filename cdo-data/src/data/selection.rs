use std::rc::Rc;

use cdo_common::error::CdoError;

use super::{DataId, DataTree};
use crate::complex::Datum;

impl DataTree {
    fn check_owned(&self, datum: &Datum) -> Result<(), CdoError> {
        if !self.nodes[Self::OWNER.index].contains(datum) {
            return Err(CdoError::argument_invalid(
                "datum",
                format!("Datum '{}' is not loaded in this data", datum.key()),
            ));
        }
        Ok(())
    }

    /// Show or hide a datum. Returns whether its visibility changed.
    ///
    /// Cached groupings are not rebuilt; callers dispose them when needed.
    pub fn set_visible(&mut self, datum: &Rc<Datum>, visible: bool) -> Result<bool, CdoError> {
        self.check_owned(datum)?;
        let changed = datum.set_visible(visible);
        if changed {
            self.version += 1;
        }
        Ok(changed)
    }

    /// Select or deselect a datum, keeping the owner's selection in sync.
    /// Returns whether its selection changed.
    pub fn set_selected(&mut self, datum: &Rc<Datum>, selected: bool) -> Result<bool, CdoError> {
        self.check_owned(datum)?;
        let changed = datum.set_selected(selected);
        if changed {
            if selected {
                self.selected.insert(datum.id(), datum.clone());
            } else {
                self.selected.shift_remove(&datum.id());
            }
            self.version += 1;
        }
        Ok(changed)
    }

    /// Deselect every selected datum of a node. Returns how many changed.
    pub fn clear_selected(&mut self, id: DataId) -> Result<usize, CdoError> {
        let selected = self.selected_datums(id)?;
        for datum in &selected {
            self.set_selected(datum, false)?;
        }
        Ok(selected.len())
    }

    pub fn selected_count(&self, id: DataId) -> Result<usize, CdoError> {
        let node = self.live_node(id)?;
        if node.is_owner() {
            return Ok(self.selected.len());
        }
        Ok(node.datums.values().filter(|d| d.is_selected()).count())
    }

    /// Selected datums of a node. For the owner these come in selection order.
    pub fn selected_datums(&self, id: DataId) -> Result<Vec<Rc<Datum>>, CdoError> {
        let node = self.live_node(id)?;
        if node.is_owner() {
            return Ok(self.selected.values().cloned().collect());
        }
        Ok(node
            .datums
            .values()
            .filter(|d| d.is_selected())
            .cloned()
            .collect())
    }
}
