//! Vertical page flow: pages stacked top to bottom with a gap, scrolled by a
//! single offset in CSS pixels.

#[derive(Debug, Clone, Copy, PartialEq)]
struct Slot {
    page: u32,
    top: f32,
    height: f32,
}

#[derive(Debug, Clone)]
pub struct PageFlow {
    slots: Vec<Slot>,
    gap: f32,
    viewport_height: f32,
    offset: f32,
    locked: bool,
    reported: Option<u32>,
}

impl PageFlow {
    pub fn new(gap: f32, viewport_height: f32) -> Self {
        Self {
            slots: Vec::new(),
            gap: gap.max(0.0),
            viewport_height: viewport_height.max(1.0),
            offset: 0.0,
            locked: false,
            reported: None,
        }
    }

    pub fn push(&mut self, page: u32, css_height: f32) {
        let top = self
            .slots
            .last()
            .map_or(0.0, |slot| slot.top + slot.height + self.gap);
        self.slots.push(Slot {
            page,
            top,
            height: css_height.max(0.0),
        });
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.offset = 0.0;
        self.reported = None;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn content_height(&self) -> f32 {
        self.slots
            .last()
            .map_or(0.0, |slot| slot.top + slot.height)
    }

    pub fn max_offset(&self) -> f32 {
        (self.content_height() - self.viewport_height).max(0.0)
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn page_top(&self, page: u32) -> Option<f32> {
        self.slot(page).map(|slot| slot.top)
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// While locked, user scrolling is ignored so pointer input can draw.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn visible_page(&self) -> Option<u32> {
        let probe = self.offset + self.viewport_height / 2.0;
        self.slots
            .iter()
            .find(|slot| probe < slot.top + slot.height + self.gap)
            .or_else(|| self.slots.last())
            .map(|slot| slot.page)
    }

    pub fn settle(&mut self) {
        self.reported = self.visible_page();
    }

    pub fn scroll_by_user(&mut self, offset: f32) -> Option<u32> {
        if self.locked {
            return None;
        }
        self.scroll_to(offset)
    }

    pub fn scroll_to(&mut self, offset: f32) -> Option<u32> {
        let offset = if offset.is_finite() { offset } else { 0.0 };
        self.offset = offset.clamp(0.0, self.max_offset());
        let now = self.visible_page();
        if now != self.reported {
            self.reported = now;
            now
        } else {
            None
        }
    }

    pub fn center_on(&mut self, page: u32) -> Option<u32> {
        let slot = self.slot(page)?;
        let target = slot.top + slot.height / 2.0 - self.viewport_height / 2.0;
        self.scroll_to(target)
    }

    /// Scrolls to the top of the page `count` places after (or before) the
    /// visible one, stopping at the first and last page.
    pub fn step(&mut self, forward: bool, count: u32) -> Option<u32> {
        let current = self.visible_page()?;
        let idx = self.slots.iter().position(|slot| slot.page == current)?;
        let count = count.max(1) as usize;
        let target = if forward {
            idx.saturating_add(count).min(self.slots.len() - 1)
        } else {
            idx.saturating_sub(count)
        };
        if target == idx {
            return None;
        }
        let top = self.slots[target].top;
        self.scroll_to(top)
    }

    fn slot(&self, page: u32) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.page == page)
    }
}
