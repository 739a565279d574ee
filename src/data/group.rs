//! Trace groups: views sharing one vertical scale, laid out as stacked panes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::data::buffer::ViewId;
use crate::data::cache::InvalidateLevel;
use crate::data::view::View;

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

pub type GroupId = u64;

/// Value range shared by every view of a group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalScale {
    pub min: f64,
    pub max: f64,
    /// Grow/shrink to the drawn samples on every paint.
    pub auto_fit: bool,
}

impl Default for VerticalScale {
    fn default() -> Self {
        Self { min: -1.0, max: 1.0, auto_fit: true }
    }
}

/// An ordered set of views painted into one pane.
#[derive(Debug)]
pub struct TraceGroup {
    id: GroupId,
    name: String,
    weight: f32,
    views: RwLock<Vec<Arc<View>>>,
    visible: AtomicBool,
    scale: Mutex<VerticalScale>,
    layout_dirty: AtomicBool,
}

impl TraceGroup {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_weight(name, 1.0)
    }

    /// `weight` is the share of the viewport height relative to sibling groups.
    pub fn with_weight(name: impl Into<String>, weight: f32) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            weight: weight.max(0.0),
            views: RwLock::new(Vec::new()),
            visible: AtomicBool::new(true),
            scale: Mutex::new(VerticalScale::default()),
            layout_dirty: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn views(&self) -> Vec<Arc<View>> {
        self.views.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn visible_views(&self) -> Vec<Arc<View>> {
        self.views().into_iter().filter(|v| v.is_visible() && !v.is_closed()).collect()
    }

    pub fn len(&self) -> usize {
        self.views.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, view: ViewId) -> bool {
        self.views.read().unwrap_or_else(|p| p.into_inner()).iter().any(|v| v.id() == view)
    }

    fn edit(&self, change: impl FnOnce(&mut Vec<Arc<View>>) -> bool) -> bool {
        let members = {
            let mut views = self.views.write().unwrap_or_else(|p| p.into_inner());
            if !change(&mut views) {
                return false;
            }
            views.clone()
        };
        // colours and the shared scale depend on membership
        for view in &members {
            view.invalidate(InvalidateLevel::Projection);
        }
        self.layout_dirty.store(true, Ordering::Release);
        true
    }

    /// Append `view`; ignored if it is already a member.
    pub fn add_view(&self, view: Arc<View>) -> bool {
        self.edit(|views| {
            if views.iter().any(|v| v.id() == view.id()) {
                return false;
            }
            views.push(view);
            true
        })
    }

    pub fn remove_view(&self, id: ViewId) -> Option<Arc<View>> {
        let mut removed = None;
        self.edit(|views| {
            let Some(pos) = views.iter().position(|v| v.id() == id) else {
                return false;
            };
            removed = Some(views.remove(pos));
            true
        });
        if let Some(view) = &removed {
            view.invalidate(InvalidateLevel::Projection);
        }
        removed
    }

    /// Move the member at `from` to position `to` (clamped).
    pub fn move_view(&self, from: usize, to: usize) -> bool {
        self.edit(|views| {
            if from >= views.len() {
                return false;
            }
            let view = views.remove(from);
            let to = to.min(views.len());
            views.insert(to, view);
            from != to
        })
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    pub fn set_visible(&self, visible: bool) {
        if self.visible.swap(visible, Ordering::AcqRel) != visible {
            self.layout_dirty.store(true, Ordering::Release);
        }
    }

    pub fn scale(&self) -> VerticalScale {
        *self.scale.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Fixed range; disables auto-fit.
    pub fn set_scale(&self, min: f64, max: f64) {
        let mut scale = self.scale.lock().unwrap_or_else(|p| p.into_inner());
        *scale = VerticalScale { min: min.min(max), max: max.max(min), auto_fit: false };
        self.layout_dirty.store(true, Ordering::Release);
    }

    pub fn set_auto_fit(&self, auto_fit: bool) {
        self.scale.lock().unwrap_or_else(|p| p.into_inner()).auto_fit = auto_fit;
    }

    /// Fit the auto scale to `[min, max]`. Raises the layout flag and
    /// returns `true` when the range changed.
    pub fn fit_scale(&self, min: f64, max: f64) -> bool {
        if !min.is_finite() || !max.is_finite() {
            return false;
        }
        let (min, max) = if max - min < f64::EPSILON { (min - 0.5, max + 0.5) } else { (min, max) };
        let mut scale = self.scale.lock().unwrap_or_else(|p| p.into_inner());
        if !scale.auto_fit || (scale.min == min && scale.max == max) {
            return false;
        }
        scale.min = min;
        scale.max = max;
        self.layout_dirty.store(true, Ordering::Release);
        true
    }

    pub fn mark_layout_dirty(&self) {
        self.layout_dirty.store(true, Ordering::Release);
    }

    /// Read-and-clear the layout flag.
    pub fn take_layout_dirty(&self) -> bool {
        self.layout_dirty.swap(false, Ordering::AcqRel)
    }
}

/// All groups of a viewer, in display order.
#[derive(Debug, Default)]
pub struct GroupSet {
    groups: RwLock<Vec<Arc<TraceGroup>>>,
}

impl GroupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, group: Arc<TraceGroup>) {
        self.groups.write().unwrap_or_else(|p| p.into_inner()).push(group);
    }

    pub fn remove(&self, id: GroupId) -> Option<Arc<TraceGroup>> {
        let mut groups = self.groups.write().unwrap_or_else(|p| p.into_inner());
        let pos = groups.iter().position(|g| g.id() == id)?;
        Some(groups.remove(pos))
    }

    pub fn groups(&self) -> Vec<Arc<TraceGroup>> {
        self.groups.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn visible_groups(&self) -> Vec<Arc<TraceGroup>> {
        self.groups().into_iter().filter(|g| g.is_visible()).collect()
    }

    /// Visible views of visible groups, each view once.
    pub fn visible_views(&self) -> Vec<Arc<View>> {
        let mut out: Vec<Arc<View>> = Vec::new();
        for view in self.visible_groups().iter().flat_map(|g| g.visible_views()) {
            if !out.iter().any(|v| v.id() == view.id()) {
                out.push(view);
            }
        }
        out
    }

    /// Stack visible groups top to bottom, sized by weight.
    pub fn layout(&self, viewport: egui::Rect) -> Vec<(Arc<TraceGroup>, egui::Rect)> {
        let groups = self.visible_groups();
        let total: f32 = groups.iter().map(|g| g.weight()).sum();
        if groups.is_empty() || total <= 0.0 {
            return Vec::new();
        }
        let mut top = viewport.top();
        groups
            .into_iter()
            .map(|g| {
                let height = viewport.height() * g.weight() / total;
                let rect = egui::Rect::from_min_size(egui::pos2(viewport.left(), top), egui::vec2(viewport.width(), height));
                top += height;
                (g, rect)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::buffer::SampleBuffer;

    #[test]
    fn membership_change_invalidates_projection() {
        let buffer = SampleBuffer::new("a", 1.0);
        let v1 = View::new("v1", buffer.clone());
        let v2 = View::new("v2", buffer);
        let group = TraceGroup::new("g");
        group.add_view(v1.clone());
        v1.flags().take_projection();
        group.add_view(v2.clone());
        assert!(v1.flags().take_projection());
        assert!(v2.flags().take_projection());
        assert!(!group.add_view(v2.clone()));
        assert!(group.remove_view(v2.id()).is_some());
        assert!(v1.flags().take_projection());
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn fit_scale_flags_layout() {
        let group = TraceGroup::new("g");
        group.take_layout_dirty();
        assert!(group.fit_scale(0.0, 4.0));
        assert!(group.take_layout_dirty());
        assert!(!group.fit_scale(0.0, 4.0));
        group.set_scale(-2.0, 2.0);
        assert!(!group.fit_scale(0.0, 9.0));
    }

    #[test]
    fn layout_stacks_by_weight() {
        let set = GroupSet::new();
        set.add(TraceGroup::with_weight("a", 1.0));
        set.add(TraceGroup::with_weight("b", 3.0));
        let hidden = TraceGroup::new("c");
        hidden.set_visible(false);
        set.add(hidden);
        let rects = set.layout(egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(100.0, 400.0)));
        assert_eq!(rects.len(), 2);
        assert_eq!(rects[0].1.height(), 100.0);
        assert_eq!(rects[1].1.top(), 100.0);
        assert_eq!(rects[1].1.height(), 300.0);
    }
}
