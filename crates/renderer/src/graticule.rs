//! Latitude/longitude grid prepared on the async worker.

use foundation::bounds::GeoBounds;
use foundation::math::{GeoPoint, Vec2, wrap_longitude};
use scene::view_state::ViewState;

use crate::async_renderable::{AsyncSource, QueryAbort};
use crate::drawable::{DrawContext, Drawable};
use crate::frame::{RenderCommand, RenderFrame};

const SPACINGS_DEG: [f64; 10] = [30.0, 15.0, 10.0, 5.0, 2.0, 1.0, 0.5, 0.25, 0.1, 0.05];
const MAX_LINES: f64 = 12.0;
const SEGMENTS_PER_CELL: usize = 8;

/// Grid spacing giving at most a dozen lines across the larger side of
/// `bounds`.
pub fn spacing_for(bounds: &GeoBounds) -> f64 {
    let span = bounds.longitude_span().max(bounds.north - bounds.south);
    SPACINGS_DEG
        .iter()
        .copied()
        .take_while(|s| span / s <= MAX_LINES)
        .last()
        .unwrap_or(SPACINGS_DEG[0])
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraticuleLine {
    /// Longitudes in `[-180, 180]`; drawing shifts them next to the view.
    pub points: Vec<GeoPoint>,
    pub bounds: GeoBounds,
    pub color: u32,
}

impl Drawable for GraticuleLine {
    fn draw(&self, ctx: &DrawContext<'_>, frame: &mut RenderFrame) {
        let scene = &ctx.view.scene;
        let shift = f64::from(ctx.antimeridian.unwrap(&self.bounds));
        let mut run: Vec<Vec2> = Vec::with_capacity(self.points.len());
        for p in &self.points {
            // unroll onto [west, west + span] so the line stays contiguous
            let lng = if self.bounds.crosses_idl && p.longitude < self.bounds.west {
                p.longitude + 360.0
            } else {
                p.longitude
            };
            match scene.forward(GeoPoint::new(p.latitude, lng + shift)) {
                Ok(s) if (0.0..=1.0).contains(&s.z) => run.push(Vec2::new(s.x, s.y)),
                _ => flush(&mut run, self.color, frame),
            }
        }
        flush(&mut run, self.color, frame);
    }
}

fn flush(run: &mut Vec<Vec2>, color: u32, frame: &mut RenderFrame) {
    if run.len() >= 2 {
        frame.push(RenderCommand::Polyline {
            points: std::mem::take(run),
            color,
        });
    } else {
        run.clear();
    }
}

#[derive(Debug, Clone)]
pub struct Graticule {
    pub color: u32,
}

impl Default for Graticule {
    fn default() -> Self {
        Self { color: 0x80ffffff }
    }
}

impl Graticule {
    fn meridian(&self, lng: f64, south: f64, north: f64, spacing: f64) -> GraticuleLine {
        let steps = (((north - south) / spacing).ceil() as usize).max(1) * SEGMENTS_PER_CELL;
        let points = (0..=steps)
            .map(|i| GeoPoint::new(south + (north - south) * i as f64 / steps as f64, lng))
            .collect();
        GraticuleLine {
            points,
            bounds: GeoBounds::new(north, lng, south, lng),
            color: self.color,
        }
    }

    fn parallel(&self, lat: f64, extent: &GeoBounds, spacing: f64) -> GraticuleLine {
        let (west, span) = (extent.west, extent.longitude_span());
        let steps = ((span / spacing).ceil() as usize).max(1) * SEGMENTS_PER_CELL;
        let points = (0..=steps)
            .map(|i| GeoPoint::new(lat, wrap_longitude(west + span * i as f64 / steps as f64)))
            .collect();
        GraticuleLine {
            points,
            bounds: GeoBounds {
                north: lat,
                south: lat,
                ..*extent
            },
            color: self.color,
        }
    }
}

fn multiples(from: f64, to: f64, step: f64) -> impl Iterator<Item = f64> {
    let first = (from / step).ceil() as i64;
    let last = (to / step).floor() as i64;
    (first..=last).map(move |k| k as f64 * step)
}

impl AsyncSource for Graticule {
    type Pending = Vec<GraticuleLine>;
    type Renderable = GraticuleLine;

    fn create_pending(&self) -> Vec<GraticuleLine> {
        Vec::new()
    }

    fn reset_pending(&self, pending: &mut Vec<GraticuleLine>) {
        pending.clear();
    }

    fn query(&self, view: &ViewState, pending: &mut Vec<GraticuleLine>, abort: &QueryAbort) {
        let bounds = view.bounds;
        let spacing = spacing_for(&bounds);
        let (south, north) = (bounds.south.max(-90.0), bounds.north.min(90.0));

        let (east_half, west_half) = bounds.halves();
        let halves = if bounds.crosses_idl {
            vec![east_half, west_half]
        } else {
            vec![east_half]
        };
        let full_turn = bounds.longitude_span() >= 360.0;
        for half in &halves {
            for lng in multiples(half.west, half.east, spacing) {
                // +180 and -180 are the same meridian
                if lng >= 180.0 && (full_turn || bounds.crosses_idl) {
                    continue;
                }
                if abort.should_abort() {
                    return;
                }
                pending.push(self.meridian(lng, south, north, spacing));
            }
        }

        for lat in multiples(south, north, spacing) {
            if abort.should_abort() {
                return;
            }
            pending.push(self.parallel(lat, &bounds, spacing));
        }
    }

    fn update_render_lists(
        &self,
        pending: &mut Vec<GraticuleLine>,
        render_list: &mut Vec<GraticuleLine>,
        release_list: &mut Vec<GraticuleLine>,
    ) -> bool {
        release_list.append(render_list);
        render_list.append(pending);
        true
    }
}
