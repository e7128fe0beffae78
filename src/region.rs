//! Damage and opaque regions.
//!
//! A [`Region`] is a set of disjoint integer rectangles in a single coordinate
//! space. Rectangles are kept disjoint on insertion, so adding a rectangle that
//! is already covered leaves the region untouched.

use std::fmt;

use smithay::utils::{Buffer, Logical, Physical, Point, Rectangle, Size, Transform};

pub struct Region<Kind> {
    rects: Vec<Rectangle<i32, Kind>>,
}

fn is_degenerate<Kind>(rect: &Rectangle<i32, Kind>) -> bool {
    rect.size.w <= 0 || rect.size.h <= 0
}

/// Scale a rectangle, rounding outward so no pixel of the source is lost.
pub(crate) fn scale_rect_outward<A, B>(rect: Rectangle<i32, A>, sx: f64, sy: f64) -> Rectangle<i32, B> {
    let x0 = (rect.loc.x as f64 * sx).floor() as i32;
    let y0 = (rect.loc.y as f64 * sy).floor() as i32;
    let x1 = ((rect.loc.x + rect.size.w) as f64 * sx).ceil() as i32;
    let y1 = ((rect.loc.y + rect.size.h) as f64 * sy).ceil() as i32;
    Rectangle::new(Point::from((x0, y0)), Size::from((x1 - x0, y1 - y0)))
}

impl<Kind> Region<Kind> {
    pub fn new() -> Self {
        Self { rects: Vec::new() }
    }

    pub fn from_rect(rect: Rectangle<i32, Kind>) -> Self {
        let mut region = Self::new();
        region.add_rect(rect);
        region
    }

    pub fn from_rects(rects: impl IntoIterator<Item = Rectangle<i32, Kind>>) -> Self {
        let mut region = Self::new();
        for rect in rects {
            region.add_rect(rect);
        }
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rectangle<i32, Kind>] {
        &self.rects
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Union a rectangle into the region. Degenerate rectangles are ignored.
    pub fn add_rect(&mut self, rect: Rectangle<i32, Kind>) {
        if is_degenerate(&rect) {
            return;
        }

        let pieces = Rectangle::subtract_rects_many_in_place(vec![rect], self.rects.iter().copied());
        self.rects
            .extend(pieces.into_iter().filter(|piece| !is_degenerate(piece)));
    }

    pub fn union(&mut self, other: &Region<Kind>) {
        for rect in &other.rects {
            self.add_rect(*rect);
        }
    }

    pub fn intersect_rect(&self, rect: Rectangle<i32, Kind>) -> Region<Kind> {
        let rects = self
            .rects
            .iter()
            .filter_map(|own| own.intersection(rect))
            .filter(|piece| !is_degenerate(piece))
            .collect();
        Region { rects }
    }

    pub fn intersect(&self, other: &Region<Kind>) -> Region<Kind> {
        // Both operands are disjoint, so the pairwise intersections are too.
        let mut rects = Vec::new();
        for theirs in &other.rects {
            rects.extend(
                self.rects
                    .iter()
                    .filter_map(|own| own.intersection(*theirs))
                    .filter(|piece| !is_degenerate(piece)),
            );
        }
        Region { rects }
    }

    pub fn subtract_rect(&mut self, rect: Rectangle<i32, Kind>) {
        if is_degenerate(&rect) || self.rects.is_empty() {
            return;
        }
        let rects = std::mem::take(&mut self.rects);
        self.rects = Rectangle::subtract_rects_many_in_place(rects, [rect]);
        self.rects.retain(|piece| !is_degenerate(piece));
    }

    pub fn subtract(&mut self, other: &Region<Kind>) {
        if other.is_empty() || self.rects.is_empty() {
            return;
        }
        let rects = std::mem::take(&mut self.rects);
        self.rects = Rectangle::subtract_rects_many_in_place(rects, other.rects.iter().copied());
        self.rects.retain(|piece| !is_degenerate(piece));
    }

    pub fn translate(&mut self, offset: Point<i32, Kind>) {
        for rect in &mut self.rects {
            rect.loc.x += offset.x;
            rect.loc.y += offset.y;
        }
    }

    pub fn translated(&self, offset: Point<i32, Kind>) -> Region<Kind> {
        let mut region = self.clone();
        region.translate(offset);
        region
    }

    /// Scale every rectangle, rounding outward.
    pub fn scaled(&self, sx: f64, sy: f64) -> Region<Kind> {
        Region::from_rects(self.rects.iter().map(|rect| scale_rect_outward(*rect, sx, sy)))
    }

    /// Whether `rect` lies entirely inside the region.
    pub fn covers(&self, rect: Rectangle<i32, Kind>) -> bool {
        if is_degenerate(&rect) {
            return true;
        }
        Rectangle::subtract_rects_many_in_place(vec![rect], self.rects.iter().copied())
            .iter()
            .all(is_degenerate)
    }

    pub fn area(&self) -> i64 {
        self.rects
            .iter()
            .map(|rect| rect.size.w as i64 * rect.size.h as i64)
            .sum()
    }

    pub fn bounding_box(&self) -> Option<Rectangle<i32, Kind>> {
        let first = self.rects.first()?;
        let (mut x0, mut y0) = (first.loc.x, first.loc.y);
        let (mut x1, mut y1) = (first.loc.x + first.size.w, first.loc.y + first.size.h);
        for rect in &self.rects[1..] {
            x0 = x0.min(rect.loc.x);
            y0 = y0.min(rect.loc.y);
            x1 = x1.max(rect.loc.x + rect.size.w);
            y1 = y1.max(rect.loc.y + rect.size.h);
        }
        Some(Rectangle::new(
            Point::from((x0, y0)),
            Size::from((x1 - x0, y1 - y0)),
        ))
    }
}

impl Region<Logical> {
    pub fn to_physical(&self, scale: f64) -> Region<Physical> {
        Region::from_rects(
            self.rects
                .iter()
                .map(|rect| scale_rect_outward(*rect, scale, scale)),
        )
    }
}

impl Region<Physical> {
    pub fn to_logical(&self, scale: f64) -> Region<Logical> {
        let inv = 1.0 / scale;
        Region::from_rects(self.rects.iter().map(|rect| scale_rect_outward(*rect, inv, inv)))
    }

    /// Map damage from output orientation into the orientation of a buffer of `area` size.
    pub fn to_buffer(&self, transform: Transform, area: Size<i32, Physical>) -> Region<Buffer> {
        let area = area.to_logical(1);
        Region::from_rects(
            self.rects
                .iter()
                .map(|rect| rect.to_logical(1).to_buffer(1, transform, &area)),
        )
    }
}

impl<Kind> Default for Region<Kind> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Kind> Clone for Region<Kind> {
    fn clone(&self) -> Self {
        Self {
            rects: self.rects.clone(),
        }
    }
}

impl<Kind> PartialEq for Region<Kind> {
    /// Two regions are equal when they cover the same pixels.
    fn eq(&self, other: &Self) -> bool {
        self.area() == other.area() && self.intersect(other).area() == self.area()
    }
}

impl<Kind> fmt::Debug for Region<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.rects
                    .iter()
                    .map(|r| (r.loc.x, r.loc.y, r.size.w, r.size.h)),
            )
            .finish()
    }
}

impl<Kind> From<Rectangle<i32, Kind>> for Region<Kind> {
    fn from(rect: Rectangle<i32, Kind>) -> Self {
        Region::from_rect(rect)
    }
}
