//! Grid Item Registry / Layout Reconciler
//!
//! Owns the authoritative grid item sequence and its derived layout-engine
//! view, translates layout change events back into item records, enforces
//! aspect-ratio locking during resize, and exposes ordered z-index
//! mutations. Sequence order is the z-order: index 0 is back-most.

use crate::consts::engine_consts::{GRID_COL_COUNT, row_height};
use crate::grid_item::GridItem;

/// One entry of the derived layout-engine view.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutCell {
    pub i: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub is_draggable: bool,
    pub is_resizable: bool,
}

/// Geometry reported by the layout engine for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutChange {
    pub i: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Live geometry of a resize in progress. Dimensions are fractional while
/// the drag handle moves.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeRect {
    pub i: String,
    pub w: f64,
    pub h: f64,
}

/// Configuration handed to the underlying grid engine. Collision handling
/// is the engine's job; `allow_overlap` carries the unrestricted-placement
/// flag through.
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    pub cols: u32,
    pub row_height: f64,
    pub allow_overlap: bool,
}

type OrderObserver = Box<dyn Fn(&[GridItem]) + Send + Sync>;

pub struct GridRegistry {
    items: Vec<GridItem>,
    layout: Vec<LayoutCell>,
    editing: bool,
    movement_locked: bool,
    unrestricted_placement: bool,
    order_observer: Option<OrderObserver>,
}

impl GridRegistry {
    pub fn new(unrestricted_placement: bool) -> Self {
        GridRegistry {
            items: Vec::new(),
            layout: Vec::new(),
            editing: false,
            movement_locked: false,
            unrestricted_placement,
            order_observer: None,
        }
    }

    /// Registers an observer invoked with the reordered sequence after a
    /// successful z-order mutation.
    pub fn set_order_observer(&mut self, observer: OrderObserver) {
        self.order_observer = Some(observer);
    }

    pub fn items(&self) -> &[GridItem] {
        &self.items
    }

    pub fn layout(&self) -> &[LayoutCell] {
        &self.layout
    }

    pub fn grid_config(&self, viewport_width: f64) -> GridConfig {
        GridConfig {
            cols: GRID_COL_COUNT,
            row_height: row_height(viewport_width),
            allow_overlap: self.unrestricted_placement,
        }
    }

    pub fn unrestricted_placement(&self) -> bool {
        self.unrestricted_placement
    }

    /// Replaces the authoritative sequence wholesale and re-derives the
    /// layout view. Layout events and server echoes both land here; they
    /// are never merged field-by-field.
    pub fn set_items(&mut self, items: Vec<GridItem>) {
        self.items = items;
        self.derive_layout();
    }

    pub fn set_editing(&mut self, editing: bool) {
        self.editing = editing;
        self.derive_layout();
    }

    pub fn set_movement_locked(&mut self, locked: bool) {
        self.movement_locked = locked;
        self.derive_layout();
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn is_movement_locked(&self) -> bool {
        self.movement_locked
    }

    fn derive_layout(&mut self) {
        let movable = self.editing && !self.movement_locked;
        self.layout = self
            .items
            .iter()
            .map(|item| LayoutCell {
                i: item.i.clone(),
                x: item.x,
                y: item.y,
                w: item.w,
                h: item.h,
                is_draggable: movable,
                is_resizable: movable,
            })
            .collect();
    }

    /// Merges geometry from a layout change event into the matching items,
    /// preserving source and payload strings. The merged sequence becomes
    /// the new authoritative sequence.
    pub fn apply_layout_change(&mut self, changes: &[LayoutChange]) {
        let merged: Vec<GridItem> = changes
            .iter()
            .filter_map(|change| {
                self.items.iter().find(|item| item.i == change.i).map(|item| GridItem {
                    i: item.i.clone(),
                    x: change.x,
                    y: change.y,
                    w: change.w,
                    h: change.h,
                    source: item.source.clone(),
                    args_string: item.args_string.clone(),
                    metadata_string: item.metadata_string.clone(),
                })
            })
            .collect();
        self.set_items(merged);
    }

    /// Corrects an in-progress resize to preserve the item's aspect ratio,
    /// when its metadata asks for it. The dimension with the smaller delta
    /// is recomputed from the other; the correction is applied to both the
    /// live rect and the placeholder so drag feedback and final geometry
    /// agree.
    pub fn correct_resize(
        &self,
        old: &ResizeRect,
        item: &mut ResizeRect,
        placeholder: &mut ResizeRect,
    ) {
        let Some(grid_item) = self.items.iter().find(|candidate| candidate.i == item.i) else {
            return;
        };
        let Ok(metadata) = grid_item.metadata() else {
            return;
        };
        if !metadata.enforce_aspect_ratio {
            return;
        }
        let Some(aspect_ratio) = metadata.aspect_ratio else {
            return;
        };
        // A zero or non-finite ratio cannot produce usable geometry.
        if aspect_ratio == 0.0 || !aspect_ratio.is_finite() {
            return;
        }

        let height_diff = item.h - old.h;
        let width_diff = item.w - old.w;
        if height_diff.abs() < width_diff.abs() {
            item.h = item.w / aspect_ratio;
            placeholder.h = item.w / aspect_ratio;
        } else {
            item.w = item.h * aspect_ratio;
            placeholder.w = item.h * aspect_ratio;
        }
    }

    // ---- z-order -----------------------------------------------------------

    /// A forward move is offered when placement is unrestricted and the
    /// item is not already front-most.
    pub fn can_bring_forward(&self, index: usize) -> bool {
        self.unrestricted_placement && !self.items.is_empty() && index < self.items.len() - 1
    }

    /// A backward move is offered when placement is unrestricted and the
    /// item is not already back-most.
    pub fn can_send_backward(&self, index: usize) -> bool {
        self.unrestricted_placement && index > 0 && index < self.items.len()
    }

    pub fn bring_to_front(&mut self, index: usize) {
        if self.can_bring_forward(index) {
            self.move_item(index, self.items.len() - 1);
        }
    }

    pub fn bring_forward(&mut self, index: usize) {
        if self.can_bring_forward(index) {
            self.move_item(index, index + 1);
        }
    }

    pub fn send_to_back(&mut self, index: usize) {
        if self.can_send_backward(index) {
            self.move_item(index, 0);
        }
    }

    pub fn send_backward(&mut self, index: usize) {
        if self.can_send_backward(index) {
            self.move_item(index, index - 1);
        }
    }

    /// Repositions one item within the sequence and notifies the order
    /// observer. Moving an item onto its own index is a no-op with no
    /// notification.
    pub fn move_item(&mut self, from: usize, to: usize) {
        if from == to || from >= self.items.len() || to >= self.items.len() {
            return;
        }
        let moving = self.items.remove(from);
        self.items.insert(to, moving);
        self.derive_layout();
        if let Some(observer) = &self.order_observer {
            observer(&self.items);
        }
    }

    // ---- item management ---------------------------------------------------

    pub fn delete_item(&mut self, index: usize) {
        if index < self.items.len() {
            self.items.remove(index);
            self.derive_layout();
        }
    }
}
