//! Scripted demo: places, edits and manipulates notes on a flat floor, then starts a second
//! session against the same anchor index and restores what the first one saved.
//!
//! `ARMEMO_DATA_DIR` picks where the index and settings live (defaults to a fresh directory
//! under the system temp directory, since the in-memory anchor service does not outlive the
//! process). `ARMEMO_DEBUG=1` turns on debug logging.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use log::info;
use tokio::runtime::Handle;

use armemo_lib::{
    CameraFrame, Database, FlatScene, FrameInput, InMemoryAnchorService, LumaQrDecoder,
    NoteContent, Rgba, ScreenPoint, SessionController, SettingsStore, TouchPhase, TouchSample,
};

const SCREEN: (f32, f32) = (1080.0, 1920.0);
const NOTE_RADIUS: f32 = 60.0;
const SETTLE: Duration = Duration::from_secs(10);
const CAMERA: (u32, u32) = (1280, 960);

/// Camera frame of a white wall with a memo's QR code taped slightly right of center.
fn camera_frame_with_code() -> Result<CameraFrame> {
    let memo = NoteContent {
        text: "Scanned memo".into(),
        font_color: Rgba::BLACK,
        background_color: Rgba::opaque(0xFF, 0xEE, 0x58),
        size: None,
    };
    let code = memo.to_qr()?;

    let mut frame = CameraFrame {
        pixels: vec![255; (CAMERA.0 * CAMERA.1) as usize],
        width: CAMERA.0,
        height: CAMERA.1,
    };
    code.paint(&mut frame, 584, 348, 6);
    Ok(frame)
}

fn data_dir() -> PathBuf {
    std::env::var_os("ARMEMO_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join(format!("armemo-demo-{}", std::process::id())))
}

fn frame(scene: &mut FlatScene, session: &mut SessionController, input: FrameInput) {
    let events = session.advance(&input, scene);
    for event in events {
        info!("gesture: {}", serde_json::to_string(&event).unwrap_or_default());
    }
    scene.track_notes(session.registry().notes(), NOTE_RADIUS);
}

fn tap(scene: &mut FlatScene, session: &mut SessionController, x: f32, y: f32) {
    let at = ScreenPoint::new(x, y);
    frame(scene, session, FrameInput::single(0, at, TouchPhase::Began));
    frame(scene, session, FrameInput::single(0, at, TouchPhase::Ended));
    frame(scene, session, FrameInput::empty());
}

fn print_events(session: &mut SessionController) {
    for event in session.take_note_events() {
        info!("note: {}", serde_json::to_string(&event).unwrap_or_default());
    }
}

fn print_notes(session: &SessionController) {
    for note in session.registry().notes() {
        info!(
            "  {} [{}] {:?} at ({:.3}, {:.3}) scale {:.2} yaw {:.1} status {:?}",
            note.note_id,
            note.sync_state.as_str(),
            note.content.text,
            note.transform.position.x,
            note.transform.position.z,
            note.transform.scale,
            note.transform.rotation.yaw_degrees(),
            note.status_text,
        );
    }
}

async fn first_session(
    settings: &SettingsStore,
    service: Arc<InMemoryAnchorService>,
    db: Database,
) -> Result<()> {
    let mut scene = FlatScene::new(SCREEN.0, SCREEN.1);
    let mut session =
        SessionController::new(settings.session_config(), service, db, Handle::current());
    session.enable_scanning(settings.scan_mode(), SCREEN, Arc::new(LumaQrDecoder));

    info!("== session 1: placing notes");

    // Place and rename a note, then dismiss it by tapping empty floor.
    tap(&mut scene, &mut session, 300.0, 400.0);
    session.edit_selected("Buy milk");
    tap(&mut scene, &mut session, 800.0, 1500.0);

    // A second note, dragged and pinched.
    tap(&mut scene, &mut session, 540.0, 900.0);
    let start = ScreenPoint::new(540.0, 900.0);
    frame(&mut scene, &mut session, FrameInput::single(1, start, TouchPhase::Began));
    for step in 1..=4 {
        let at = ScreenPoint::new(540.0 + 30.0 * step as f32, 900.0);
        frame(&mut scene, &mut session, FrameInput::single(1, at, TouchPhase::Moved));
    }
    let end = ScreenPoint::new(660.0, 900.0);
    frame(&mut scene, &mut session, FrameInput::single(1, end, TouchPhase::Ended));

    let pinch = |spread: f32, phase: TouchPhase| {
        FrameInput::touches(vec![
            TouchSample::new(2, ScreenPoint::new(660.0 - spread, 900.0), phase),
            TouchSample::new(3, ScreenPoint::new(660.0 + spread, 900.0), phase),
        ])
    };
    frame(&mut scene, &mut session, pinch(50.0, TouchPhase::Began));
    frame(&mut scene, &mut session, pinch(75.0, TouchPhase::Moved));
    frame(&mut scene, &mut session, pinch(75.0, TouchPhase::Ended));
    frame(&mut scene, &mut session, FrameInput::empty());

    // A third note that gets thrown away.
    tap(&mut scene, &mut session, 100.0, 100.0);
    tap(&mut scene, &mut session, 100.0, 100.0);
    session.delete_selected();

    // A QR code in front of the camera; the note lands where the code is.
    let camera = camera_frame_with_code()?;
    session.try_scan(camera.clone(), Instant::now());

    session.run_until_idle(&scene, SETTLE).await?;
    // Same code seen again: already placed.
    session.try_scan(camera, Instant::now() + Duration::from_secs(1));
    session.run_until_idle(&scene, SETTLE).await?;

    print_events(&mut session);
    info!("session 1 finished with {:?}", session.stats());
    print_notes(&session);

    session.shutdown();
    Ok(())
}

async fn second_session(
    settings: &SettingsStore,
    service: Arc<InMemoryAnchorService>,
    db: Database,
) -> Result<()> {
    let scene = FlatScene::new(SCREEN.0, SCREEN.1);
    let mut session =
        SessionController::new(settings.session_config(), service, db, Handle::current());

    info!("== session 2: restoring saved notes");
    session.load();
    session.run_until_idle(&scene, SETTLE).await?;

    print_events(&mut session);
    info!("session 2 restored {:?}", session.stats());
    print_notes(&session);

    session.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    armemo_lib::init_logging();

    info!("ARMemo demo starting up...");

    let dir = data_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create data directory {}", dir.display()))?;

    let settings = SettingsStore::new(dir.join("settings.json"))?;
    let db_path = dir.join("armemo.sqlite3");

    // Stands in for the cloud; outlives both sessions.
    let service = Arc::new(InMemoryAnchorService::new().with_latency(50, 250));

    first_session(&settings, service.clone(), Database::new(db_path.clone())?).await?;
    second_session(&settings, service, Database::new(db_path)?).await?;

    Ok(())
}
