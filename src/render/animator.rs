//! Per-triangle morph tweens driven by pairings between two slides.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PlaybackOptions;
use crate::model::{Slide, Transition};
use crate::render::ease::Ease;
use crate::render::surface::{RenderSurface, ShapeId, ShapeStyle};

/// Delay before a triangle starts moving, proportional to how far down the
/// canvas it sits. Top rows move first.
pub fn stagger_delay(average_y: f32, max_y: f32, max_delay: Duration) -> Duration {
    if max_y.is_nan() || max_y <= 0.0 || !average_y.is_finite() {
        return Duration::ZERO;
    }
    let ratio = (average_y / max_y).clamp(0.0, 1.0);
    max_delay.mul_f32(ratio)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartStats {
    pub scheduled: usize,
    pub skipped: usize,
    /// Destination triangles no pairing reaches; they fade in where they sit.
    pub appearing: usize,
    /// Rendered shapes no pairing moves; they fade out where they sit.
    pub retiring: usize,
}

#[derive(Debug)]
struct Tween {
    from: ShapeStyle,
    to: ShapeStyle,
    start: Instant,
    /// Identity the shape takes on completion. `None` frees the shape.
    identity: Option<usize>,
}

pub struct TransitionAnimator {
    duration: Duration,
    max_delay: Duration,
    ease: Ease,
    shapes: Vec<ShapeStyle>,
    identities: HashMap<usize, ShapeId>,
    tweens: HashMap<ShapeId, Tween>,
    /// Faded-out shapes available for triangles that appear later.
    free: Vec<ShapeId>,
}

impl TransitionAnimator {
    pub fn new(options: &PlaybackOptions) -> Self {
        Self {
            duration: options.transition_duration,
            max_delay: options.max_stagger_delay,
            ease: options.easing,
            shapes: Vec::new(),
            identities: HashMap::new(),
            tweens: HashMap::new(),
            free: Vec::new(),
        }
    }

    /// Draws `slide` from scratch; shape `i` takes identity `i`.
    pub fn render_initial<R: RenderSurface>(&mut self, slide: &Slide, surface: &mut R) {
        surface.clear();
        self.tweens.clear();
        self.identities.clear();
        self.free.clear();
        self.shapes = slide
            .triangles
            .iter()
            .map(ShapeStyle::from_triangle)
            .collect();
        for (index, style) in self.shapes.iter().enumerate() {
            let id = ShapeId(index as u32);
            surface.create_shape(id, style);
            self.identities.insert(index, id);
        }
        debug!(slide = %slide.name, shapes = self.shapes.len(), "scene rebuilt");
    }

    /// Instant cut to `slide`, used when no transition exists.
    pub fn snap_to<R: RenderSurface>(&mut self, slide: &Slide, surface: &mut R) {
        self.render_initial(slide, surface);
    }

    /// Schedules one tween per usable pairing, all anchored at `now`.
    ///
    /// Shapes left out of every pairing lose their identity and fade out in
    /// place. Destination triangles no pairing reaches fade in in place, so the
    /// scene ends up holding every triangle of `to_slide`.
    pub fn start<R: RenderSurface>(
        &mut self,
        transition: &Transition,
        from_slide: &Slide,
        to_slide: &Slide,
        now: Instant,
        surface: &mut R,
    ) -> StartStats {
        // Finish anything still running so identities are settled before lookup.
        self.frame(now, surface);

        let max_y = from_slide.max_y();
        let mut stats = StartStats::default();
        let mut moving = HashSet::new();
        let mut reached = HashSet::new();
        for pairing in &transition.pairings {
            let (Some(source), Some(target)) = (
                from_slide.triangles.get(pairing.from_index),
                to_slide.triangles.get(pairing.to_index),
            ) else {
                warn!(
                    from = transition.from,
                    to = transition.to,
                    from_index = pairing.from_index,
                    to_index = pairing.to_index,
                    "pairing index out of range; skipping"
                );
                stats.skipped += 1;
                continue;
            };
            let Some(&id) = self.identities.get(&pairing.from_index) else {
                warn!(
                    from_index = pairing.from_index,
                    "no rendered shape carries this triangle; skipping"
                );
                stats.skipped += 1;
                continue;
            };
            let Some(current) = self.shapes.get(id.0 as usize).copied() else {
                stats.skipped += 1;
                continue;
            };
            let delay = stagger_delay(source.average_y(), max_y, self.max_delay);
            self.tweens.insert(
                id,
                Tween {
                    from: current,
                    to: ShapeStyle::from_triangle(target),
                    start: now + delay,
                    identity: Some(pairing.to_index),
                },
            );
            moving.insert(pairing.from_index);
            reached.insert(pairing.to_index);
            stats.scheduled += 1;
        }

        // Shapes no pairing moves fade out and give up their identity.
        let retiring: Vec<(usize, ShapeId)> = self
            .identities
            .iter()
            .filter(|(index, _)| !moving.contains(*index))
            .map(|(&index, &id)| (index, id))
            .collect();
        self.identities.clear();
        for (index, id) in retiring {
            let Some(current) = self.shapes.get(id.0 as usize).copied() else {
                continue;
            };
            let average_y = from_slide
                .triangles
                .get(index)
                .map_or(0.0, |triangle| triangle.average_y());
            self.tweens.insert(
                id,
                Tween {
                    from: current,
                    to: current.transparent(),
                    start: now + stagger_delay(average_y, max_y, self.max_delay),
                    identity: None,
                },
            );
            stats.retiring += 1;
        }

        let to_max_y = to_slide.max_y();
        for (index, target) in to_slide.triangles.iter().enumerate() {
            if reached.contains(&index) {
                continue;
            }
            let style = ShapeStyle::from_triangle(target);
            let hidden = style.transparent();
            let id = self.place_hidden(&hidden, surface);
            self.tweens.insert(
                id,
                Tween {
                    from: hidden,
                    to: style,
                    start: now + stagger_delay(target.average_y(), to_max_y, self.max_delay),
                    identity: Some(index),
                },
            );
            stats.appearing += 1;
        }

        debug!(
            from = transition.from,
            to = transition.to,
            scheduled = stats.scheduled,
            skipped = stats.skipped,
            appearing = stats.appearing,
            retiring = stats.retiring,
            "transition started"
        );
        stats
    }

    /// Puts `hidden` on a recycled shape, or a new one when none is free.
    fn place_hidden<R: RenderSurface>(&mut self, hidden: &ShapeStyle, surface: &mut R) -> ShapeId {
        if let Some(id) = self.free.pop() {
            if let Some(slot) = self.shapes.get_mut(id.0 as usize) {
                *slot = *hidden;
            }
            surface.update_shape(id, hidden);
            return id;
        }
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(*hidden);
        surface.create_shape(id, hidden);
        id
    }

    /// Samples every tween at `now` and pushes the result to the surface.
    /// Returns whether any tween is still running.
    pub fn frame<R: RenderSurface>(&mut self, now: Instant, surface: &mut R) -> bool {
        let mut finished = Vec::new();
        for (&id, tween) in &self.tweens {
            if now < tween.start {
                continue;
            }
            let elapsed = now.duration_since(tween.start);
            let progress = if self.duration.is_zero() {
                1.0
            } else {
                (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
            };
            let style = tween.from.interpolate(&tween.to, self.ease.apply(progress));
            surface.update_shape(id, &style);
            if let Some(slot) = self.shapes.get_mut(id.0 as usize) {
                *slot = style;
            }
            if progress >= 1.0 {
                finished.push(id);
            }
        }
        for id in finished {
            match self.tweens.remove(&id).and_then(|tween| tween.identity) {
                Some(index) => {
                    self.identities.insert(index, id);
                }
                None => self.free.push(id),
            }
        }
        self.is_active()
    }

    pub fn is_active(&self) -> bool {
        !self.tweens.is_empty()
    }

    /// Shape currently carrying triangle identity `index`.
    pub fn identity_of(&self, index: usize) -> Option<ShapeId> {
        self.identities.get(&index).copied()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }
}
