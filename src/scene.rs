//! Hit-testing against the tracked world and the rendered notes.
//!
//! Plane tracking and note geometry live outside this crate; the session only needs to ask
//! two questions of them per frame.

use crate::{
    geometry::{Pose, ScreenPoint, Vec3},
    models::{Note, NoteId},
};

pub trait SceneProbe {
    /// Surface hit under `point` against tracked planes.
    fn raycast(&self, point: ScreenPoint) -> Option<Pose>;

    /// Topmost note rendered under `point`.
    fn pick_note_at(&self, point: ScreenPoint) -> Option<NoteId>;
}

#[derive(Debug, Clone, Copy)]
struct NoteRegion {
    note_id: NoteId,
    center: ScreenPoint,
    radius: f32,
}

/// A single horizontal plane filling the screen, seen straight from above.
///
/// Screen pixel `(x, y)` maps to world `(x / ppm, 0, y / ppm)`. Notes are picked through
/// circular screen regions registered by whoever places them. Used by the demo session and
/// by tests; a device build supplies its own probe.
#[derive(Debug, Clone)]
pub struct FlatScene {
    width: f32,
    height: f32,
    pixels_per_meter: f32,
    regions: Vec<NoteRegion>,
}

impl FlatScene {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            pixels_per_meter: 1000.0,
            regions: Vec::new(),
        }
    }

    pub fn contains(&self, point: ScreenPoint) -> bool {
        point.x >= 0.0 && point.y >= 0.0 && point.x < self.width && point.y < self.height
    }

    pub fn screen_point_of(&self, position: Vec3) -> ScreenPoint {
        ScreenPoint::new(
            position.x * self.pixels_per_meter,
            position.z * self.pixels_per_meter,
        )
    }

    /// Registers (or moves) the pick region of a note. Later regions are on top.
    pub fn set_note_region(&mut self, note_id: NoteId, center: ScreenPoint, radius: f32) {
        self.remove_note_region(note_id);
        self.regions.push(NoteRegion {
            note_id,
            center,
            radius,
        });
    }

    pub fn remove_note_region(&mut self, note_id: NoteId) {
        self.regions.retain(|region| region.note_id != note_id);
    }

    pub fn clear_regions(&mut self) {
        self.regions.clear();
    }

    /// Rebuilds every pick region from the notes' current positions, in registry order.
    pub fn track_notes(&mut self, notes: &[Note], radius: f32) {
        self.regions.clear();
        for note in notes {
            self.regions.push(NoteRegion {
                note_id: note.note_id,
                center: self.screen_point_of(note.transform.position),
                radius: radius * note.transform.scale,
            });
        }
    }
}

impl SceneProbe for FlatScene {
    fn raycast(&self, point: ScreenPoint) -> Option<Pose> {
        if !self.contains(point) {
            return None;
        }
        Some(Pose::at(Vec3::new(
            point.x / self.pixels_per_meter,
            0.0,
            point.y / self.pixels_per_meter,
        )))
    }

    fn pick_note_at(&self, point: ScreenPoint) -> Option<NoteId> {
        self.regions
            .iter()
            .rev()
            .find(|region| region.center.distance_sq(point) <= region.radius * region.radius)
            .map(|region| region.note_id)
    }
}
