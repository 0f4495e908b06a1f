//! Touch gesture classification.
//!
//! One finger: press, then either a tap (released before moving far) or a drag. Two or
//! more fingers: a combined pinch/rotate relative to a captured baseline. The classifier is
//! advanced once per frame and returns the events that frame produced; it never fails, and
//! input it cannot make sense of drops it back to `Idle`.

use serde::Serialize;

use crate::{
    geometry::{normalize_degrees, Pose, ScreenPoint, Vec3},
    models::NoteId,
    scene::SceneProbe,
};

use super::{
    config::GestureConfig,
    input::{FrameInput, TouchPhase, TouchSample},
};

// Per-frame tracing, only visible at debug level (ARMEMO_DEBUG=1).
const ENABLE_LOGS: bool = true;

use crate::log_debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GestureState {
    Idle,
    Pressed,
    Dragging,
    MultiTouch,
}

impl Default for GestureState {
    fn default() -> Self {
        GestureState::Idle
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GestureEvent {
    /// Released on empty surface with nothing selected.
    TapEmpty(Pose),
    TapOn(NoteId),
    /// Move the selected note; `note` is the press target, which equals the selection.
    DragTo { note: NoteId, position: Vec3 },
    /// Relative to the baseline captured on the last frame with `rebaseline == true`.
    PinchRotate {
        scale_factor: f32,
        angle_delta: f32,
        rebaseline: bool,
    },
    /// Released on empty space while something is selected.
    Release,
}

#[derive(Debug, Clone, Copy)]
struct Press {
    finger: u64,
    start: ScreenPoint,
    candidate: Option<NoteId>,
}

#[derive(Debug, Clone, Copy)]
struct PinchBaseline {
    fingers: (u64, u64),
    distance: f32,
    angle: f32,
}

#[derive(Debug, Default)]
pub struct GestureClassifier {
    config: GestureConfig,
    state: GestureState,
    press: Option<Press>,
    pinch: Option<PinchBaseline>,
}

impl GestureClassifier {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// Classifies one frame of input.
    ///
    /// `selected` is the note the registry currently has selected; drags only apply to it
    /// and a release on empty space means "deselect" rather than "create".
    pub fn advance(
        &mut self,
        frame: &FrameInput,
        scene: &dyn SceneProbe,
        selected: Option<NoteId>,
    ) -> Vec<GestureEvent> {
        let mut events = Vec::new();

        if frame.pointer_over_ui {
            return events;
        }

        if frame.has_duplicate_ids() {
            log_debug!("ignoring frame with duplicate finger ids");
            return events;
        }

        if frame.touches.len() >= 2 {
            self.advance_multi(&frame.touches[0], &frame.touches[1], &mut events);
            return events;
        }

        if self.state == GestureState::MultiTouch {
            // Stay latched until every finger is up so the last one cannot tap.
            if frame.touches.is_empty() {
                log_debug!("multi-touch finished");
                self.reset();
            }
            return events;
        }

        let sample = frame
            .touches
            .first()
            .copied()
            .or_else(|| frame.mouse.map(|mouse| mouse.as_touch()));

        match sample {
            Some(sample) => self.advance_single(sample, scene, selected, &mut events),
            None => {
                if self.state != GestureState::Idle {
                    log_debug!("touch vanished while {:?}; back to idle", self.state);
                    self.reset();
                }
            }
        }

        events
    }

    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
        self.press = None;
        self.pinch = None;
    }

    fn advance_single(
        &mut self,
        sample: TouchSample,
        scene: &dyn SceneProbe,
        selected: Option<NoteId>,
        events: &mut Vec<GestureEvent>,
    ) {
        if sample.phase == TouchPhase::Began {
            let candidate = scene.pick_note_at(sample.position);
            log_debug!("press at {:?}, candidate {:?}", sample.position, candidate);
            self.press = Some(Press {
                finger: sample.id,
                start: sample.position,
                candidate,
            });
            self.state = GestureState::Pressed;
            return;
        }

        let Some(press) = self.press else {
            // Moved/Ended without a press we saw begin (e.g. it began over the UI).
            return;
        };

        if press.finger != sample.id {
            self.reset();
            return;
        }

        match sample.phase {
            TouchPhase::Began => {}
            TouchPhase::Moved => {
                if self.state == GestureState::Pressed
                    && press.start.distance_sq(sample.position) > self.config.drag_threshold_sq
                {
                    log_debug!("press became a drag");
                    self.state = GestureState::Dragging;
                }

                if self.state == GestureState::Dragging {
                    if let Some(note) = press.candidate.filter(|c| Some(*c) == selected) {
                        if let Some(hit) = scene.raycast(sample.position) {
                            events.push(GestureEvent::DragTo {
                                note,
                                position: hit.position,
                            });
                        }
                    }
                }
            }
            TouchPhase::Ended => {
                if self.state == GestureState::Pressed {
                    if let Some(event) = classify_tap(press, sample.position, scene, selected) {
                        events.push(event);
                    }
                }
                self.reset();
            }
        }
    }

    fn advance_multi(
        &mut self,
        first: &TouchSample,
        second: &TouchSample,
        events: &mut Vec<GestureEvent>,
    ) {
        if self.state != GestureState::MultiTouch {
            log_debug!("entering multi-touch from {:?}", self.state);
            self.state = GestureState::MultiTouch;
            self.press = None;
            self.pinch = None;
        }

        // Keep a stable finger order so the angle does not flip when samples reorder.
        let (a, b) = if first.id <= second.id {
            (first, second)
        } else {
            (second, first)
        };

        let distance = a
            .position
            .distance(b.position)
            .max(self.config.min_pinch_distance);
        let angle = a.position.angle_to(b.position);
        let fingers = (a.id, b.id);
        let restarted = a.phase == TouchPhase::Began || b.phase == TouchPhase::Began;

        match self.pinch {
            Some(baseline) if baseline.fingers == fingers && !restarted => {
                events.push(GestureEvent::PinchRotate {
                    scale_factor: distance / baseline.distance,
                    angle_delta: normalize_degrees(angle - baseline.angle),
                    rebaseline: false,
                });
            }
            _ => {
                log_debug!("pinch baseline {distance:.1}px at {angle:.1} deg");
                self.pinch = Some(PinchBaseline {
                    fingers,
                    distance,
                    angle,
                });
                events.push(GestureEvent::PinchRotate {
                    scale_factor: 1.0,
                    angle_delta: 0.0,
                    rebaseline: true,
                });
            }
        }
    }
}

fn classify_tap(
    press: Press,
    release_at: ScreenPoint,
    scene: &dyn SceneProbe,
    selected: Option<NoteId>,
) -> Option<GestureEvent> {
    if let Some(target) = press.candidate {
        return Some(GestureEvent::TapOn(target));
    }

    if selected.is_none() {
        return scene.raycast(release_at).map(GestureEvent::TapEmpty);
    }

    Some(GestureEvent::Release)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gesture::input::{MouseButton, TouchPhase::*},
        scene::FlatScene,
    };

    fn p(x: f32, y: f32) -> ScreenPoint {
        ScreenPoint::new(x, y)
    }

    fn two(a: (f32, f32, TouchPhase), b: (f32, f32, TouchPhase)) -> FrameInput {
        FrameInput::touches(vec![
            TouchSample::new(1, p(a.0, a.1), a.2),
            TouchSample::new(2, p(b.0, b.1), b.2),
        ])
    }

    fn run(
        classifier: &mut GestureClassifier,
        scene: &FlatScene,
        selected: Option<NoteId>,
        frames: &[FrameInput],
    ) -> Vec<GestureEvent> {
        frames
            .iter()
            .flat_map(|frame| classifier.advance(frame, scene, selected))
            .collect()
    }

    fn is_terminal(event: &GestureEvent) -> bool {
        matches!(
            event,
            GestureEvent::TapOn(_) | GestureEvent::TapEmpty(_) | GestureEvent::Release
        )
    }

    #[test]
    fn short_press_on_empty_surface_is_tap_empty() {
        let scene = FlatScene::new(1000.0, 1000.0);
        let mut classifier = GestureClassifier::default();
        let events = run(
            &mut classifier,
            &scene,
            None,
            &[
                FrameInput::single(7, p(100.0, 100.0), Began),
                FrameInput::single(7, p(110.0, 105.0), Moved),
                FrameInput::single(7, p(110.0, 105.0), Ended),
            ],
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], GestureEvent::TapEmpty(_)));
        assert_eq!(classifier.state(), GestureState::Idle);
    }

    #[test]
    fn every_short_press_emits_exactly_one_terminal_event() {
        let mut scene = FlatScene::new(1000.0, 1000.0);
        let note = NoteId::new();
        scene.set_note_region(note, p(500.0, 500.0), 50.0);

        let starts = [(100.0, 100.0), (500.0, 500.0), (510.0, 490.0), (900.0, 20.0)];
        let wiggles = [(0.0, 0.0), (19.0, 0.0), (-14.0, 14.0), (0.0, -20.0)];

        for selected in [None, Some(note), Some(NoteId::new())] {
            for (sx, sy) in starts {
                for (dx, dy) in wiggles {
                    let mut classifier = GestureClassifier::default();
                    let events = run(
                        &mut classifier,
                        &scene,
                        selected,
                        &[
                            FrameInput::single(1, p(sx, sy), Began),
                            FrameInput::single(1, p(sx + dx, sy + dy), Moved),
                            FrameInput::single(1, p(sx + dx, sy + dy), Ended),
                        ],
                    );
                    assert_eq!(
                        events.iter().filter(|e| is_terminal(e)).count(),
                        1,
                        "start {sx},{sy} wiggle {dx},{dy} selected {selected:?}: {events:?}"
                    );
                    assert_eq!(events.len(), 1);
                }
            }
        }
    }

    #[test]
    fn press_on_note_taps_it() {
        let mut scene = FlatScene::new(1000.0, 1000.0);
        let note = NoteId::new();
        scene.set_note_region(note, p(200.0, 200.0), 30.0);
        let mut classifier = GestureClassifier::default();

        let events = run(
            &mut classifier,
            &scene,
            None,
            &[
                FrameInput::single(1, p(205.0, 200.0), Began),
                FrameInput::single(1, p(205.0, 200.0), Ended),
            ],
        );
        assert_eq!(events, vec![GestureEvent::TapOn(note)]);
    }

    #[test]
    fn release_on_empty_space_with_selection() {
        let scene = FlatScene::new(1000.0, 1000.0);
        let mut classifier = GestureClassifier::default();
        let events = run(
            &mut classifier,
            &scene,
            Some(NoteId::new()),
            &[
                FrameInput::single(1, p(10.0, 10.0), Began),
                FrameInput::single(1, p(10.0, 10.0), Ended),
            ],
        );
        assert_eq!(events, vec![GestureEvent::Release]);
    }

    #[test]
    fn drag_of_selected_note_emits_drag_and_no_tap() {
        let mut scene = FlatScene::new(1000.0, 1000.0);
        let note = NoteId::new();
        scene.set_note_region(note, p(300.0, 300.0), 40.0);
        let mut classifier = GestureClassifier::default();

        let events = run(
            &mut classifier,
            &scene,
            Some(note),
            &[
                FrameInput::single(1, p(300.0, 300.0), Began),
                FrameInput::single(1, p(310.0, 300.0), Moved),
                FrameInput::single(1, p(340.0, 300.0), Moved),
                FrameInput::single(1, p(400.0, 300.0), Moved),
                FrameInput::single(1, p(400.0, 300.0), Ended),
            ],
        );

        assert!(!events.iter().any(is_terminal), "{events:?}");
        assert_eq!(
            events,
            vec![
                GestureEvent::DragTo {
                    note,
                    position: Vec3::new(0.34, 0.0, 0.3)
                },
                GestureEvent::DragTo {
                    note,
                    position: Vec3::new(0.4, 0.0, 0.3)
                },
            ]
        );
    }

    #[test]
    fn dragging_an_unselected_note_does_nothing() {
        let mut scene = FlatScene::new(1000.0, 1000.0);
        let note = NoteId::new();
        scene.set_note_region(note, p(300.0, 300.0), 40.0);
        let mut classifier = GestureClassifier::default();

        let events = run(
            &mut classifier,
            &scene,
            None,
            &[
                FrameInput::single(1, p(300.0, 300.0), Began),
                FrameInput::single(1, p(380.0, 300.0), Moved),
                FrameInput::single(1, p(380.0, 300.0), Ended),
            ],
        );
        assert!(events.is_empty(), "{events:?}");
    }

    #[test]
    fn pinch_reports_factors_against_baseline() {
        let scene = FlatScene::new(2000.0, 2000.0);
        let mut classifier = GestureClassifier::default();

        let frames = [
            two((0.0, 0.0, Began), (100.0, 0.0, Began)),
            two((0.0, 0.0, Moved), (150.0, 0.0, Moved)),
            two((0.0, 0.0, Moved), (200.0, 0.0, Moved)),
            two((0.0, 0.0, Moved), (1000.0, 0.0, Moved)),
        ];
        let factors: Vec<f32> = run(&mut classifier, &scene, None, &frames)
            .into_iter()
            .map(|event| match event {
                GestureEvent::PinchRotate { scale_factor, .. } => scale_factor,
                other => panic!("unexpected {other:?}"),
            })
            .collect();

        assert_eq!(factors, vec![1.0, 1.5, 2.0, 10.0]);
        assert_eq!(classifier.state(), GestureState::MultiTouch);
    }

    #[test]
    fn rotation_is_relative_and_wrapped() {
        let scene = FlatScene::new(2000.0, 2000.0);
        let mut classifier = GestureClassifier::default();

        let events = run(
            &mut classifier,
            &scene,
            None,
            &[
                two((100.0, 100.0, Began), (200.0, 100.0, Began)),
                two((100.0, 100.0, Moved), (100.0, 200.0, Moved)),
            ],
        );
        match events[1] {
            GestureEvent::PinchRotate {
                angle_delta,
                rebaseline,
                ..
            } => {
                assert!((angle_delta - 90.0).abs() < 1e-3);
                assert!(!rebaseline);
            }
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn finger_restart_recaptures_baseline() {
        let scene = FlatScene::new(2000.0, 2000.0);
        let mut classifier = GestureClassifier::default();

        let events = run(
            &mut classifier,
            &scene,
            None,
            &[
                two((0.0, 0.0, Began), (100.0, 0.0, Began)),
                two((0.0, 0.0, Moved), (200.0, 0.0, Moved)),
                FrameInput::single(1, p(0.0, 0.0), Moved),
                FrameInput::touches(vec![
                    TouchSample::new(1, p(0.0, 0.0), Moved),
                    TouchSample::new(3, p(50.0, 0.0), Began),
                ]),
                FrameInput::touches(vec![
                    TouchSample::new(1, p(0.0, 0.0), Moved),
                    TouchSample::new(3, p(100.0, 0.0), Moved),
                ]),
            ],
        );

        let rebaselines: Vec<bool> = events
            .iter()
            .map(|event| match event {
                GestureEvent::PinchRotate { rebaseline, .. } => *rebaseline,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(rebaselines, vec![true, false, true, false]);
        assert!(matches!(
            events[3],
            GestureEvent::PinchRotate { scale_factor, .. } if scale_factor == 2.0
        ));
    }

    #[test]
    fn leftover_finger_after_pinch_never_taps() {
        let scene = FlatScene::new(2000.0, 2000.0);
        let mut classifier = GestureClassifier::default();

        let events = run(
            &mut classifier,
            &scene,
            None,
            &[
                FrameInput::single(1, p(10.0, 10.0), Began),
                two((10.0, 10.0, Moved), (110.0, 10.0, Began)),
                FrameInput::single(1, p(10.0, 10.0), Moved),
                FrameInput::single(1, p(10.0, 10.0), Ended),
            ],
        );
        assert_eq!(events.len(), 1, "{events:?}");
        assert_eq!(classifier.state(), GestureState::MultiTouch);

        classifier.advance(&FrameInput::empty(), &scene, None);
        assert_eq!(classifier.state(), GestureState::Idle);

        let tap = run(
            &mut classifier,
            &scene,
            None,
            &[
                FrameInput::single(4, p(10.0, 10.0), Began),
                FrameInput::single(4, p(10.0, 10.0), Ended),
            ],
        );
        assert!(matches!(tap.as_slice(), [GestureEvent::TapEmpty(_)]));
    }

    #[test]
    fn pointer_over_ui_suppresses_the_frame() {
        let scene = FlatScene::new(1000.0, 1000.0);
        let mut classifier = GestureClassifier::default();

        let events = run(
            &mut classifier,
            &scene,
            None,
            &[
                FrameInput::single(1, p(10.0, 10.0), Began).over_ui(),
                FrameInput::single(1, p(10.0, 10.0), Ended),
            ],
        );
        assert!(events.is_empty());
        assert_eq!(classifier.state(), GestureState::Idle);
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        let scene = FlatScene::new(1000.0, 1000.0);
        let mut classifier = GestureClassifier::default();
        let frame = FrameInput::touches(vec![
            TouchSample::new(1, p(0.0, 0.0), Began),
            TouchSample::new(1, p(50.0, 0.0), Began),
        ]);
        assert!(classifier.advance(&frame, &scene, None).is_empty());
        assert_eq!(classifier.state(), GestureState::Idle);
    }

    #[test]
    fn vanished_touch_degrades_to_idle() {
        let scene = FlatScene::new(1000.0, 1000.0);
        let mut classifier = GestureClassifier::default();
        classifier.advance(&FrameInput::single(1, p(0.0, 0.0), Began), &scene, None);
        assert_eq!(classifier.state(), GestureState::Pressed);
        assert!(classifier
            .advance(&FrameInput::empty(), &scene, None)
            .is_empty());
        assert_eq!(classifier.state(), GestureState::Idle);
    }

    #[test]
    fn mouse_emulates_a_single_touch() {
        let scene = FlatScene::new(1000.0, 1000.0);
        let mut classifier = GestureClassifier::default();
        let events = run(
            &mut classifier,
            &scene,
            None,
            &[
                FrameInput::mouse(p(40.0, 40.0), MouseButton::Pressed),
                FrameInput::mouse(p(41.0, 40.0), MouseButton::Held),
                FrameInput::mouse(p(41.0, 40.0), MouseButton::Released),
            ],
        );
        assert!(matches!(events.as_slice(), [GestureEvent::TapEmpty(_)]));
    }
}
