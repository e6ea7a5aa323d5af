//! Drawing surface abstraction and the in-memory implementation used by the
//! headless binary and the tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use palette::Srgba;
use tokio::time::sleep;
use tracing::debug;

use crate::config::SurfaceRetry;
use crate::error::SurfaceError;
use crate::model::{Point, Triangle};

/// Stable handle for a shape on the surface. A shape that has faded out may
/// be handed to a triangle that appears later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub u32);

/// Everything needed to draw one triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeStyle {
    pub points: [Point; 3],
    pub fill: Srgba,
}

impl ShapeStyle {
    pub fn from_triangle(triangle: &Triangle) -> Self {
        let [r, g, b] = triangle.color.map(|c| (c / 255.0).clamp(0.0, 1.0));
        Self {
            points: triangle.coordinates,
            fill: Srgba::new(r, g, b, triangle.opacity()),
        }
    }

    /// Same vertices and color with zero alpha.
    pub fn transparent(&self) -> Self {
        let mut hidden = *self;
        hidden.fill.alpha = 0.0;
        hidden
    }

    /// Linear blend of vertices and color; `t` is the eased progress.
    pub fn interpolate(&self, to: &ShapeStyle, t: f32) -> ShapeStyle {
        let mut points = self.points;
        for (point, target) in points.iter_mut().zip(to.points.iter()) {
            point[0] += (target[0] - point[0]) * t;
            point[1] += (target[1] - point[1]) * t;
        }
        let lerp = |a: f32, b: f32| a + (b - a) * t;
        ShapeStyle {
            points,
            fill: Srgba::new(
                lerp(self.fill.red, to.fill.red),
                lerp(self.fill.green, to.fill.green),
                lerp(self.fill.blue, to.fill.blue),
                lerp(self.fill.alpha, to.fill.alpha),
            ),
        }
    }
}

/// A canvas that can hold identified triangles.
pub trait RenderSurface: Send + 'static {
    fn is_ready(&mut self) -> bool;
    fn clear(&mut self);
    fn create_shape(&mut self, id: ShapeId, style: &ShapeStyle);
    fn update_shape(&mut self, id: ShapeId, style: &ShapeStyle);
}

/// Polls the surface until it reports ready or the retry budget runs out.
pub async fn wait_until_ready<R: RenderSurface>(
    surface: &mut R,
    retry: &SurfaceRetry,
) -> Result<(), SurfaceError> {
    for attempt in 1..=retry.attempts {
        if surface.is_ready() {
            debug!(attempt, "render surface ready");
            return Ok(());
        }
        if attempt < retry.attempts {
            sleep(retry.interval).await;
        }
    }
    Err(SurfaceError::NotReady {
        attempts: retry.attempts,
    })
}

#[derive(Debug, Default)]
struct Scene {
    shapes: BTreeMap<ShapeId, ShapeStyle>,
    clears: usize,
    mutations: usize,
}

/// Surface that keeps the scene in memory. Always ready.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    scene: Arc<Mutex<Scene>>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view that stays valid after the surface moves into the scheduler.
    pub fn probe(&self) -> SurfaceProbe {
        SurfaceProbe {
            scene: Arc::clone(&self.scene),
        }
    }

    fn with_scene<T>(&self, f: impl FnOnce(&mut Scene) -> T) -> T {
        f(&mut self.scene.lock().expect("headless scene poisoned"))
    }
}

impl RenderSurface for HeadlessSurface {
    fn is_ready(&mut self) -> bool {
        true
    }

    fn clear(&mut self) {
        self.with_scene(|scene| {
            scene.shapes.clear();
            scene.clears += 1;
            scene.mutations += 1;
        });
    }

    fn create_shape(&mut self, id: ShapeId, style: &ShapeStyle) {
        self.with_scene(|scene| {
            scene.shapes.insert(id, *style);
            scene.mutations += 1;
        });
    }

    fn update_shape(&mut self, id: ShapeId, style: &ShapeStyle) {
        self.with_scene(|scene| {
            if let Some(shape) = scene.shapes.get_mut(&id) {
                *shape = *style;
            }
            scene.mutations += 1;
        });
    }
}

#[derive(Debug, Clone)]
pub struct SurfaceProbe {
    scene: Arc<Mutex<Scene>>,
}

impl SurfaceProbe {
    fn read<T>(&self, f: impl FnOnce(&Scene) -> T) -> T {
        f(&self.scene.lock().expect("headless scene poisoned"))
    }

    pub fn shape(&self, id: ShapeId) -> Option<ShapeStyle> {
        self.read(|scene| scene.shapes.get(&id).copied())
    }

    pub fn shape_count(&self) -> usize {
        self.read(|scene| scene.shapes.len())
    }

    pub fn clear_count(&self) -> usize {
        self.read(|scene| scene.clears)
    }

    /// Total number of clear/create/update calls seen so far.
    pub fn mutation_count(&self) -> usize {
        self.read(|scene| scene.mutations)
    }
}
